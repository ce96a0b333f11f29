//! Per-message decision engine.
//!
//! One handler instance lives on each worker. `process` parses a raw JSON
//! message, pulls out the three decision inputs (speed, position,
//! identifier), applies the velocity and geofence filters, performs the
//! configured redactions in place, and re-serializes. A fresh DOM is built
//! and dropped around every call so no allocator state leaks between
//! messages.
//!
//! Decision outcomes split into two classes:
//! - structural failures (`Parse`, `Missing`, `Other`) abort immediately and
//!   leave no output;
//! - policy failures (`Speed`, `Geoposition`) mark the result but let the
//!   remaining redactions run, so the rewritten document is still available
//!   to diagnostic consumers.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use cv_geo::{Point, QuadTree, Shape};

use crate::config::{flag_on, ConfigMap};
use crate::redaction_properties::RedactionProperties;
use crate::redactor::IdRedactor;
use crate::velocity::VelocityFilter;

pub const BSM_PAYLOAD_TYPE: &str = "us.dot.its.jpo.ode.model.OdeBsmPayload";
pub const TIM_PAYLOAD_TYPE: &str = "us.dot.its.jpo.ode.model.OdeTimPayload";

/// Meters added beyond each end of an edge's corridor rectangle during
/// geofence containment, unless configured otherwise.
const DEFAULT_BOX_EXTENSION_M: f64 = 10.0;

/// Why a message was or was not forwarded. Diagnostic only; never part of
/// the wire output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Success,
    Speed,
    Geoposition,
    Parse,
    Missing,
    Other,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Speed => "speed",
            ResultStatus::Geoposition => "geoposition",
            ResultStatus::Parse => "parse",
            ResultStatus::Missing => "missing",
            ResultStatus::Other => "other",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision inputs extracted from the last processed message, for
/// diagnostic logging.
#[derive(Debug, Clone)]
pub struct Bsm {
    pub position: Point,
    pub velocity: f64,
    pub id: String,
    pub original_id: Option<String>,
}

impl Default for Bsm {
    fn default() -> Self {
        Self {
            position: Point::new(90.0, 180.0),
            velocity: -1.0,
            id: String::from("UNASSIGNED"),
            original_id: None,
        }
    }
}

impl Bsm {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Bsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pos: ({}, {}), Spd: {} Id: {}",
            self.position.lat, self.position.lon, self.velocity, self.id
        )
    }
}

pub struct MessageHandler {
    quad: Arc<QuadTree>,
    velocity_filter: VelocityFilter,
    id_redactor: IdRedactor,
    redaction_fields: Arc<RedactionProperties>,
    box_extension: f64,

    velocity_on: bool,
    geofence_on: bool,
    id_redaction_on: bool,
    size_redaction_on: bool,
    partii_redaction_on: bool,

    result: ResultStatus,
    bsm: Bsm,
    json: String,
}

impl MessageHandler {
    pub fn new(
        quad: Arc<QuadTree>,
        redaction_fields: Arc<RedactionProperties>,
        conf: &ConfigMap,
    ) -> Result<Self> {
        let box_extension = match conf.get("privacy.filter.geofence.extension") {
            Some(value) => value
                .parse()
                .with_context(|| format!("bad geofence extension: {value}"))?,
            None => DEFAULT_BOX_EXTENSION_M,
        };

        Ok(Self {
            quad,
            velocity_filter: VelocityFilter::from_config(conf),
            id_redactor: IdRedactor::from_config(conf),
            redaction_fields,
            box_extension,
            velocity_on: flag_on(conf, "privacy.filter.velocity"),
            geofence_on: flag_on(conf, "privacy.filter.geofence"),
            id_redaction_on: flag_on(conf, "privacy.redaction.id"),
            size_redaction_on: flag_on(conf, "privacy.redaction.size"),
            partii_redaction_on: flag_on(conf, "privacy.redaction.partII"),
            result: ResultStatus::Success,
            bsm: Bsm::default(),
            json: String::new(),
        })
    }

    /// Handle one raw message. Returns true iff the rewritten document
    /// should be forwarded downstream. After the call, [`Self::result`]
    /// carries the decision and [`Self::json`] the rewritten document
    /// (empty for the structural-failure class).
    pub fn process(&mut self, raw: &str) -> bool {
        self.reset();

        let mut doc: Value = match serde_json::from_str(raw) {
            Ok(doc) => doc,
            Err(_) => {
                self.result = ResultStatus::Parse;
                return false;
            }
        };

        if !doc.is_object() {
            self.result = ResultStatus::Parse;
            return false;
        }

        if let Err(status) = self.inspect(&mut doc) {
            self.result = status;
            return false;
        }

        self.json = doc.to_string();
        self.result == ResultStatus::Success
    }

    pub fn result(&self) -> ResultStatus {
        self.result
    }

    /// The rewritten document from the last `process` call. Empty when the
    /// message failed structurally.
    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn bsm(&self) -> &Bsm {
        &self.bsm
    }

    pub fn box_extension(&self) -> f64 {
        self.box_extension
    }

    fn reset(&mut self) {
        self.result = ResultStatus::Success;
        self.bsm.reset();
        self.json.clear();
    }

    fn inspect(&mut self, doc: &mut Value) -> Result<(), ResultStatus> {
        let metadata = doc.get_mut("metadata").ok_or(ResultStatus::Missing)?;

        let sanitized = metadata.get_mut("sanitized").ok_or(ResultStatus::Missing)?;
        if !sanitized.is_boolean() {
            return Err(ResultStatus::Other);
        }
        *sanitized = Value::Bool(true);

        let payload_type = metadata
            .get("payloadType")
            .ok_or(ResultStatus::Missing)?
            .as_str()
            .ok_or(ResultStatus::Other)?
            .to_string();

        match payload_type.as_str() {
            BSM_PAYLOAD_TYPE => self.inspect_bsm(doc),
            TIM_PAYLOAD_TYPE => self.inspect_tim(doc),
            _ => Err(ResultStatus::Missing),
        }
    }

    fn inspect_bsm(&mut self, doc: &mut Value) -> Result<(), ResultStatus> {
        let core = doc
            .get_mut("payload")
            .ok_or(ResultStatus::Missing)?
            .get_mut("data")
            .ok_or(ResultStatus::Missing)?
            .get_mut("coreData")
            .ok_or(ResultStatus::Missing)?;

        let speed = require_f64(core, "speed")?;
        self.bsm.velocity = speed;
        if self.velocity_on && self.velocity_filter.suppress(speed) {
            self.result = ResultStatus::Speed;
        }

        let position = core.get("position").ok_or(ResultStatus::Missing)?;
        let latitude = require_f64(position, "latitude")?;
        let longitude = require_f64(position, "longitude")?;
        let point = Point::new(latitude, longitude);
        self.bsm.position = point;

        if self.geofence_on && !self.is_within_entity(&point) {
            self.result = ResultStatus::Geoposition;
        }

        let id_value = core.get("id").ok_or(ResultStatus::Missing)?;
        let mut id = id_value.as_str().ok_or(ResultStatus::Other)?.to_string();

        if self.id_redaction_on {
            self.bsm.original_id = Some(id.clone());
            if self.id_redactor.redact(&mut id) {
                if let Some(slot) = core.get_mut("id") {
                    *slot = Value::String(id.clone());
                }
            }
        }
        self.bsm.id = id;

        // Size is optional: absence is not an error, presence gets zeroed.
        if self.size_redaction_on {
            if let Some(size) = core.get_mut("size") {
                if size.get("length").is_some() {
                    size["length"] = Value::from(0);
                }
                if size.get("width").is_some() {
                    size["width"] = Value::from(0);
                }
            }
        }

        if self.partii_redaction_on {
            if let Some(data) = doc.get_mut("payload").and_then(|p| p.get_mut("data")) {
                self.redact_partii(data);
            }
        }

        Ok(())
    }

    fn inspect_tim(&mut self, doc: &mut Value) -> Result<(), ResultStatus> {
        let location = doc
            .get_mut("metadata")
            .ok_or(ResultStatus::Missing)?
            .get_mut("receivedMessageDetails")
            .ok_or(ResultStatus::Missing)?
            .get_mut("locationData")
            .ok_or(ResultStatus::Missing)?;

        let latitude = require_f64(location, "latitude")?;
        let longitude = require_f64(location, "longitude")?;
        let speed = require_f64(location, "speed")?;

        let point = Point::new(latitude, longitude);
        self.bsm.position = point;
        self.bsm.velocity = speed;

        if self.geofence_on && !self.is_within_entity(&point) {
            self.result = ResultStatus::Geoposition;
        }

        if self.velocity_on && self.velocity_filter.suppress(speed) {
            self.result = ResultStatus::Speed;
        }

        Ok(())
    }

    /// Whether some indexed shape contains the point. Quad retrieval is a
    /// superset of the true matches; each candidate applies its own exact
    /// containment, with edges widened to their highway-type corridor plus
    /// the configured extension.
    fn is_within_entity(&self, pt: &Point) -> bool {
        for shape in self.quad.retrieve(pt) {
            match shape {
                Shape::Edge(edge) => match edge.to_area(self.box_extension) {
                    Ok(area) => {
                        if area.contains(pt) {
                            return true;
                        }
                    }
                    Err(e) => debug!(uid = edge.uid(), "edge skipped in geofence test: {e}"),
                },
                Shape::Circle(circle) => {
                    if circle.contains(pt) {
                        return true;
                    }
                }
                Shape::Grid(grid) => {
                    if grid.contains(pt) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Remove every configured field name from the partII substructure,
    /// wherever it appears.
    fn redact_partii(&self, data: &mut Value) {
        let Some(partii) = data.get_mut("partII") else {
            return;
        };

        let mut removed = 0;
        for field in self.redaction_fields.fields() {
            removed += remove_all_members(partii, field);
        }

        if removed > 0 {
            debug!(removed, "redacted partII members");
        }
    }
}

/// A required member that must carry a JSON double. Missing member is
/// `Missing`; a member of any other type (integers included) is `Other`.
fn require_f64(obj: &Value, key: &str) -> Result<f64, ResultStatus> {
    let value = obj.get(key).ok_or(ResultStatus::Missing)?;
    if !value.is_f64() {
        return Err(ResultStatus::Other);
    }
    value.as_f64().ok_or(ResultStatus::Other)
}

/// Pre-order removal of every object member named `name` in the subtree.
/// Returns the number of members removed.
fn remove_all_members(value: &mut Value, name: &str) -> usize {
    let mut removed = 0;

    match value {
        Value::Object(map) => {
            if map.remove(name).is_some() {
                removed += 1;
            }
            for (_, child) in map.iter_mut() {
                if child.is_object() || child.is_array() {
                    removed += remove_all_members(child, name);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if item.is_object() || item.is_array() {
                    removed += remove_all_members(item, name);
                }
            }
        }
        _ => {}
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_geo::{Circle, QuadConfig};
    use serde_json::json;

    fn quad_with_circle() -> Arc<QuadTree> {
        let mut quad = QuadTree::new(
            Point::new(40.0, -84.0),
            Point::new(41.0, -83.0),
            QuadConfig::default(),
        );
        quad.insert(Shape::Circle(Arc::new(Circle::new(40.5, -83.5, 1, 1000.0))));
        Arc::new(quad)
    }

    fn full_conf() -> ConfigMap {
        let mut conf = ConfigMap::new();
        for key in [
            "privacy.filter.velocity",
            "privacy.filter.geofence",
            "privacy.redaction.id",
            "privacy.redaction.size",
            "privacy.redaction.partII",
        ] {
            conf.insert(key.into(), "ON".into());
        }
        conf
    }

    fn handler_with(conf: &ConfigMap, fields: RedactionProperties) -> MessageHandler {
        MessageHandler::new(quad_with_circle(), Arc::new(fields), conf).unwrap()
    }

    fn handler(conf: &ConfigMap) -> MessageHandler {
        handler_with(conf, RedactionProperties::default())
    }

    fn bsm(speed: f64, lat: f64, lon: f64, id: &str) -> Value {
        json!({
            "metadata": {
                "payloadType": BSM_PAYLOAD_TYPE,
                "sanitized": false
            },
            "payload": {
                "data": {
                    "coreData": {
                        "speed": speed,
                        "position": { "latitude": lat, "longitude": lon },
                        "id": id,
                        "size": { "length": 500, "width": 200 }
                    },
                    "partII": []
                }
            }
        })
    }

    #[test]
    fn in_fence_in_speed_message_is_forwarded_with_fresh_id() {
        let mut h = handler(&full_conf());
        let input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");

        assert!(h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Success);

        let out: Value = serde_json::from_str(h.json()).unwrap();
        let out_id = out["payload"]["data"]["coreData"]["id"].as_str().unwrap();
        assert_ne!(out_id, "A1B2C3D4");
        assert_eq!(out_id.len(), 8);
        assert!(out_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(out["metadata"]["sanitized"], json!(true));

        assert_eq!(h.bsm().original_id.as_deref(), Some("A1B2C3D4"));
    }

    #[test]
    fn slow_vehicle_is_suppressed_but_still_rewritten() {
        let mut h = handler(&full_conf());
        let input = bsm(1.0, 40.5, -83.5, "A1B2C3D4");

        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Speed);

        // The diagnostic output is a coherent, fully redacted document.
        let out: Value = serde_json::from_str(h.json()).unwrap();
        assert_eq!(out["metadata"]["sanitized"], json!(true));
        assert_ne!(out["payload"]["data"]["coreData"]["id"], json!("A1B2C3D4"));
    }

    #[test]
    fn out_of_fence_position_is_suppressed() {
        let mut h = handler(&full_conf());
        let input = bsm(10.0, 0.0, 0.0, "A1B2C3D4");

        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Geoposition);
        assert!(!h.json().is_empty());
    }

    #[test]
    fn missing_speed_drops_the_message_without_output() {
        let mut h = handler(&full_conf());
        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["payload"]["data"]["coreData"]
            .as_object_mut()
            .unwrap()
            .remove("speed");

        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Missing);
        assert!(h.json().is_empty());
    }

    #[test]
    fn integer_typed_speed_is_a_type_error() {
        let mut h = handler(&full_conf());
        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["payload"]["data"]["coreData"]["speed"] = json!(10);

        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Other);
    }

    #[test]
    fn string_speed_and_non_bool_sanitized_are_type_errors() {
        let mut h = handler(&full_conf());

        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["payload"]["data"]["coreData"]["speed"] = json!("fast");
        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Other);

        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["metadata"]["sanitized"] = json!("yes");
        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Other);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut h = handler(&full_conf());
        assert!(!h.process("{\"metadata\": "));
        assert_eq!(h.result(), ResultStatus::Parse);

        assert!(!h.process("[1, 2, 3]"));
        assert_eq!(h.result(), ResultStatus::Parse);
    }

    #[test]
    fn unknown_payload_type_is_missing() {
        let mut h = handler(&full_conf());
        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["metadata"]["payloadType"] = json!("us.dot.its.jpo.ode.model.OdeMapPayload");

        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Missing);
    }

    #[test]
    fn sanitized_flag_setting_is_idempotent() {
        let mut h = handler(&full_conf());
        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["metadata"]["sanitized"] = json!(true);

        assert!(h.process(&input.to_string()));
        let out: Value = serde_json::from_str(h.json()).unwrap();
        assert_eq!(out["metadata"]["sanitized"], json!(true));
    }

    #[test]
    fn size_fields_are_zeroed_when_present() {
        let mut h = handler(&full_conf());
        let input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");

        assert!(h.process(&input.to_string()));
        let out: Value = serde_json::from_str(h.json()).unwrap();
        assert_eq!(out["payload"]["data"]["coreData"]["size"]["length"], json!(0));
        assert_eq!(out["payload"]["data"]["coreData"]["size"]["width"], json!(0));
    }

    #[test]
    fn absent_size_is_not_an_error() {
        let mut h = handler(&full_conf());
        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["payload"]["data"]["coreData"].as_object_mut().unwrap().remove("size");

        assert!(h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Success);
    }

    #[test]
    fn partii_fields_are_removed_at_any_depth() {
        let mut fields = RedactionProperties::default();
        fields.add_field("pathHistory");
        let mut h = handler_with(&full_conf(), fields);

        let mut input = bsm(10.0, 40.5, -83.5, "A1B2C3D4");
        input["payload"]["data"]["partII"] = json!([
            { "pathHistory": { "crumbs": [1, 2, 3] }, "other": 1 },
            { "x": { "pathHistory": 0 } },
            { "nested": [ { "deep": { "pathHistory": [ { "pathHistory": true } ] } } ] }
        ]);

        assert!(h.process(&input.to_string()));
        let out: Value = serde_json::from_str(h.json()).unwrap();
        let partii = out["payload"]["data"]["partII"].to_string();
        assert!(!partii.contains("pathHistory"), "leftover members in {partii}");
        // Unlisted members survive.
        assert!(partii.contains("other"));
        assert!(partii.contains("nested"));
    }

    #[test]
    fn disabled_flags_leave_the_document_alone() {
        let conf = ConfigMap::new();
        let mut h = handler(&conf);
        // Slow and far outside the fence, but every filter is OFF.
        let input = bsm(0.5, 0.0, 0.0, "A1B2C3D4");

        assert!(h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Success);

        let out: Value = serde_json::from_str(h.json()).unwrap();
        assert_eq!(out["payload"]["data"]["coreData"]["id"], json!("A1B2C3D4"));
        assert_eq!(out["payload"]["data"]["coreData"]["size"]["length"], json!(500));
        // Sanitized is still forced on.
        assert_eq!(out["metadata"]["sanitized"], json!(true));
    }

    #[test]
    fn geofence_accepts_points_inside_an_edge_corridor() {
        let mut quad = QuadTree::new(
            Point::new(40.0, -84.0),
            Point::new(41.0, -83.0),
            QuadConfig::default(),
        );
        let v1 = Arc::new(cv_geo::Vertex::new(40.50, -83.50, 1));
        let v2 = Arc::new(cv_geo::Vertex::new(40.51, -83.50, 2));
        quad.insert(Shape::Edge(Arc::new(cv_geo::Edge::new(
            v1,
            v2,
            cv_geo::Highway::Primary,
            7,
        ))));

        let mut conf = ConfigMap::new();
        conf.insert("privacy.filter.geofence".into(), "ON".into());
        let mut h =
            MessageHandler::new(Arc::new(quad), Arc::new(RedactionProperties::default()), &conf)
                .unwrap();

        // On the segment.
        assert!(h.process(&bsm(10.0, 40.505, -83.50, "A1B2C3D4").to_string()));
        // Within the 30 m primary corridor.
        assert!(h.process(&bsm(10.0, 40.505, -83.5001, "A1B2C3D4").to_string()));
        // 300+ m off to the side.
        assert!(!h.process(&bsm(10.0, 40.505, -83.504, "A1B2C3D4").to_string()));
        assert_eq!(h.result(), ResultStatus::Geoposition);
    }

    #[test]
    fn geofence_extension_config_widens_the_corridor_ends() {
        let mut conf = full_conf();
        conf.insert("privacy.filter.geofence.extension".into(), "200.0".into());
        let h = handler(&conf);
        assert_eq!(h.box_extension(), 200.0);

        let mut conf = full_conf();
        conf.insert("privacy.filter.geofence.extension".into(), "wide".into());
        assert!(MessageHandler::new(
            quad_with_circle(),
            Arc::new(RedactionProperties::default()),
            &conf
        )
        .is_err());
    }

    fn tim(speed: f64, lat: f64, lon: f64) -> Value {
        json!({
            "metadata": {
                "payloadType": TIM_PAYLOAD_TYPE,
                "sanitized": false,
                "receivedMessageDetails": {
                    "locationData": {
                        "latitude": lat,
                        "longitude": lon,
                        "speed": speed
                    }
                }
            },
            "payload": { "data": { "MessageFrame": {} } }
        })
    }

    #[test]
    fn tim_messages_use_the_location_data_path() {
        let mut h = handler(&full_conf());

        assert!(h.process(&tim(10.0, 40.5, -83.5).to_string()));
        assert_eq!(h.result(), ResultStatus::Success);

        assert!(!h.process(&tim(10.0, 0.0, 0.0).to_string()));
        assert_eq!(h.result(), ResultStatus::Geoposition);

        assert!(!h.process(&tim(1.0, 40.5, -83.5).to_string()));
        assert_eq!(h.result(), ResultStatus::Speed);
    }

    #[test]
    fn tim_missing_location_member_is_missing() {
        let mut h = handler(&full_conf());
        let mut input = tim(10.0, 40.5, -83.5);
        input["metadata"]["receivedMessageDetails"]["locationData"]
            .as_object_mut()
            .unwrap()
            .remove("speed");

        assert!(!h.process(&input.to_string()));
        assert_eq!(h.result(), ResultStatus::Missing);
    }

    #[test]
    fn remove_all_members_counts_every_occurrence() {
        let mut value = json!({
            "a": { "target": 1, "b": { "target": 2 } },
            "c": [ { "target": 3 }, [ { "target": 4 } ] ],
            "target": 5
        });

        assert_eq!(remove_all_members(&mut value, "target"), 5);
        assert!(!value.to_string().contains("target"));
        assert_eq!(remove_all_members(&mut value, "target"), 0);
    }
}
