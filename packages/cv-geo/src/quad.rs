//! The geofence index: a mixed quad/bi-partition tree over a rectangular
//! world bound.
//!
//! Each node carries two rectangles. The *crisp* bounds partition the parent
//! exactly and drive retrieval; the *fuzzy* bounds extend the crisp bounds
//! outward and drive insertion, so a shape near a boundary lands in every
//! leaf that could legitimately report it. Retrieval therefore never has
//! false negatives; callers filter the returned candidates with the shape's
//! own `contains`.
//!
//! The tree is built once at startup and read-only afterwards; concurrent
//! readers need no locking.

use crate::geodesy::Point;
use crate::shapes::{Bounds, Shape};

/// When the configured fuzzy dimensions are zero, a node's fuzzy extension
/// defaults to its crisp width/height divided by this factor.
const REDUCTION_FACTOR: f64 = 10.0;

const ROOT: usize = 0;

/// Split and occupancy parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct QuadConfig {
    /// Nodes shallower than this always split on insertion.
    pub min_levels: u32,
    /// Nodes at or below this depth never split, except to shed overflow.
    pub max_levels: u32,
    /// Minimum half-width/half-height, in degrees, for a directional split.
    pub min_degrees: f64,
    /// Leaf occupancy that triggers a split between min and max depth.
    pub max_elements: usize,
    /// Fuzzy boundary slack in longitude degrees; 0 = derive from node width.
    pub fuzzy_width: f64,
    /// Fuzzy boundary slack in latitude degrees; 0 = derive from node height.
    pub fuzzy_height: f64,
}

impl Default for QuadConfig {
    fn default() -> Self {
        Self {
            min_levels: 7,
            max_levels: 9,
            min_degrees: 0.003,
            max_elements: 32,
            fuzzy_width: 0.0,
            fuzzy_height: 0.0,
        }
    }
}

#[derive(Debug)]
struct QuadNode {
    bounds: Bounds,
    fuzzy: Bounds,
    level: u32,
    /// Child node ids: empty, 2 (bi-split), or 4 (quad-split).
    children: Vec<usize>,
    elements: Vec<Shape>,
}

impl QuadNode {
    fn new(sw: Point, ne: Point, level: u32, config: &QuadConfig) -> Self {
        let bounds = Bounds::new(sw, ne);

        let mut fuzzy_width = config.fuzzy_width;
        if fuzzy_width == 0.0 {
            fuzzy_width = bounds.width() / REDUCTION_FACTOR;
        }
        let mut fuzzy_height = config.fuzzy_height;
        if fuzzy_height == 0.0 {
            fuzzy_height = bounds.height() / REDUCTION_FACTOR;
        }

        let fuzzy = Bounds::new(
            Point::new(sw.lat - fuzzy_height, sw.lon - fuzzy_width),
            Point::new(ne.lat + fuzzy_height, ne.lon + fuzzy_width),
        );

        Self { bounds, fuzzy, level, children: Vec::new(), elements: Vec::new() }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The spatial index. Build with [`QuadTree::new`], fill with
/// [`QuadTree::insert`], then share read-only across workers.
#[derive(Debug)]
pub struct QuadTree {
    nodes: Vec<QuadNode>,
    config: QuadConfig,
}

impl QuadTree {
    pub fn new(sw: Point, ne: Point, config: QuadConfig) -> Self {
        let root = QuadNode::new(sw, ne, 0, &config);
        Self { nodes: vec![root], config }
    }

    /// The world bounds this tree covers.
    pub fn bounds(&self) -> &Bounds {
        &self.nodes[ROOT].bounds
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total elements across all leaves. Fuzzy insertion stores boundary
    /// shapes in several leaves, so this counts references, not shapes.
    pub fn element_count(&self) -> usize {
        self.nodes.iter().map(|n| n.elements.len()).sum()
    }

    /// Insert a shape into every leaf whose fuzzy bounds it touches.
    ///
    /// Insertion is total: a shape outside the (fuzzy) world is silently
    /// ignored. Uses an explicit work stack rather than recursion.
    pub fn insert(&mut self, shape: Shape) {
        if !shape.touches(&self.nodes[ROOT].fuzzy) {
            return;
        }

        let mut stack = vec![ROOT];

        while let Some(id) = stack.pop() {
            if !self.nodes[id].is_leaf() {
                self.push_touching_children(id, &shape, &mut stack);
                continue;
            }

            if self.nodes[id].level < self.config.min_levels {
                // Below the minimum depth: split regardless of occupancy.
                self.split(id, true);
                self.push_touching_children(id, &shape, &mut stack);
                continue;
            }

            if self.nodes[id].level < self.config.max_levels {
                self.split(id, false);
                if !self.nodes[id].is_leaf() {
                    self.push_touching_children(id, &shape, &mut stack);
                    continue;
                }
                // Too small to split: the shape lands here.
            }

            self.nodes[id].elements.push(shape.clone());

            if self.nodes[id].elements.len() > self.config.max_elements {
                // Saturated leaf: force a split and redistribute everything,
                // including the shape just added.
                self.split(id, true);
                if !self.nodes[id].is_leaf() {
                    self.redistribute(id);
                }
            }
        }
    }

    /// Return the elements of the leaf whose crisp bounds contain `pt`.
    ///
    /// Crisp child bounds partition the parent exactly, so exactly one leaf
    /// is reached; the first matching child wins boundary ties. Outside the
    /// root this returns the empty slice.
    pub fn retrieve(&self, pt: &Point) -> &[Shape] {
        match self.leaf_for(pt) {
            Some(id) => &self.nodes[id].elements,
            None => &[],
        }
    }

    /// The crisp (or fuzzy) bounds of the leaf that would answer a retrieval
    /// at `pt`, or `None` outside the world bounds.
    pub fn retrieve_bounds(&self, pt: &Point, fuzzy: bool) -> Option<Bounds> {
        self.leaf_for(pt)
            .map(|id| if fuzzy { self.nodes[id].fuzzy } else { self.nodes[id].bounds })
    }

    /// Descend the crisp partition to the leaf containing `pt`.
    fn leaf_for(&self, pt: &Point) -> Option<usize> {
        if !self.nodes[ROOT].bounds.contains(pt) {
            return None;
        }

        let mut id = ROOT;
        while !self.nodes[id].is_leaf() {
            let mut next = id;
            for &child in &self.nodes[id].children {
                if self.nodes[child].bounds.contains(pt) {
                    next = child;
                    break;
                }
            }
            if next == id {
                break;
            }
            id = next;
        }

        Some(id)
    }

    fn push_touching_children(&self, id: usize, shape: &Shape, stack: &mut Vec<usize>) {
        for &child in &self.nodes[id].children {
            if shape.touches(&self.nodes[child].fuzzy) {
                stack.push(child);
            }
        }
    }

    /// Split a leaf according to the adaptive policy: quad when both
    /// dimensions allow it, directional bi-split when only one does, no-op
    /// when neither does unless `force`d.
    fn split(&mut self, id: usize, force: bool) {
        let b = self.nodes[id].bounds;
        let can_split_ns = b.height() / 2.0 >= self.config.min_degrees;
        let can_split_we = b.width() / 2.0 >= self.config.min_degrees;

        if can_split_ns && can_split_we {
            self.quad_split(id);
        } else if can_split_ns {
            self.ns_split(id);
        } else if can_split_we {
            self.we_split(id);
        } else if force {
            self.quad_split(id);
        }
    }

    fn quad_split(&mut self, id: usize) {
        let b = self.nodes[id].bounds;
        let level = self.nodes[id].level + 1;
        let children = vec![
            self.add_node(b.west_midpoint(), b.north_midpoint(), level), // NW
            self.add_node(b.center(), b.ne, level),                      // NE
            self.add_node(b.sw, b.center(), level),                      // SW
            self.add_node(b.south_midpoint(), b.east_midpoint(), level), // SE
        ];
        self.nodes[id].children = children;
    }

    fn ns_split(&mut self, id: usize) {
        let b = self.nodes[id].bounds;
        let level = self.nodes[id].level + 1;
        let children = vec![
            self.add_node(b.west_midpoint(), b.ne, level), // N
            self.add_node(b.sw, b.east_midpoint(), level), // S
        ];
        self.nodes[id].children = children;
    }

    fn we_split(&mut self, id: usize) {
        let b = self.nodes[id].bounds;
        let level = self.nodes[id].level + 1;
        let children = vec![
            self.add_node(b.sw, b.north_midpoint(), level), // W
            self.add_node(b.south_midpoint(), b.ne, level), // E
        ];
        self.nodes[id].children = children;
    }

    fn add_node(&mut self, sw: Point, ne: Point, level: u32) -> usize {
        self.nodes.push(QuadNode::new(sw, ne, level, &self.config));
        self.nodes.len() - 1
    }

    /// Move a just-split node's elements down into every child whose fuzzy
    /// bounds they touch.
    fn redistribute(&mut self, id: usize) {
        let elements = std::mem::take(&mut self.nodes[id].elements);
        let children = self.nodes[id].children.clone();

        for element in elements {
            for &child in &children {
                if element.touches(&self.nodes[child].fuzzy) {
                    self.nodes[child].elements.push(element.clone());
                }
            }
        }
    }
}
