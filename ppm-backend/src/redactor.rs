//! Vehicle identifier redaction.
//!
//! Two states: *redact-all* (the default; every id is replaced) and
//! *include-list* (only ids present in the inclusion set are replaced).
//! Replacements are fresh random 32-bit values, so the same vehicle gets a
//! different identifier on every message and trajectories cannot be
//! stitched back together.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigMap;

pub struct IdRedactor {
    inclusion_set: HashSet<String>,
    /// false = redact everything; true = redact only the inclusion set.
    inclusions: bool,
    rng: StdRng,
}

impl Default for IdRedactor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdRedactor {
    pub fn new() -> Self {
        Self {
            inclusion_set: HashSet::new(),
            inclusions: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Build from `privacy.redaction.id.inclusions` (`ON` switches to
    /// include-list mode) and `privacy.redaction.id.included` (comma list of
    /// ids to populate the set with).
    pub fn from_config(conf: &ConfigMap) -> Self {
        let mut redactor = Self::new();

        if conf.get("privacy.redaction.id.inclusions").map(String::as_str) == Some("ON") {
            redactor.inclusions = true;
        }

        if let Some(list) = conf.get("privacy.redaction.id.included") {
            for id in list.split(',') {
                redactor.inclusion_set.insert(id.to_string());
            }
        }

        redactor
    }

    pub fn has_inclusions(&self) -> bool {
        self.inclusions
    }

    /// Size of the inclusion set, or `None` in redact-all mode.
    pub fn num_inclusions(&self) -> Option<usize> {
        self.inclusions.then(|| self.inclusion_set.len())
    }

    /// Return to redact-all mode, discarding the inclusion set.
    pub fn redact_all(&mut self) {
        self.inclusion_set.clear();
        self.inclusions = false;
    }

    /// Empty the inclusion set but stay in include-list mode, which
    /// effectively redacts nothing. Returns whether anything was removed.
    pub fn clear_inclusions(&mut self) -> bool {
        let had_any = !self.inclusion_set.is_empty();
        self.inclusion_set.clear();
        had_any
    }

    /// Add an id to the inclusion set; adding while in redact-all mode
    /// switches to include-list mode.
    pub fn add_inclusion(&mut self, id: &str) -> bool {
        let added = self.inclusion_set.insert(id.to_string());
        if !self.inclusions && added {
            self.inclusions = true;
        }
        added
    }

    pub fn remove_inclusion(&mut self, id: &str) -> bool {
        self.inclusion_set.remove(id)
    }

    /// A fresh random identifier: a uniform `u32` as 8 lower-case hex chars.
    fn random_id(&mut self) -> String {
        format!("{:08x}", self.rng.gen::<u32>())
    }

    /// Overwrite `id` with a random replacement if this redactor's state
    /// calls for it. Returns whether a redaction happened.
    pub fn redact(&mut self, id: &mut String) -> bool {
        if self.inclusions && !self.inclusion_set.contains(id.as_str()) {
            // Include-list mode and this id is not listed: leave it alone.
            return false;
        }

        *id = self.random_id();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> IdRedactor {
        let mut conf = ConfigMap::new();
        conf.insert("privacy.redaction.id.inclusions".into(), "ON".into());
        conf.insert("privacy.redaction.id.included".into(), "ID1,ID2".into());
        IdRedactor::from_config(&conf)
    }

    fn assert_8_hex(id: &str) {
        assert_eq!(id.len(), 8, "{id}");
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()), "{id}");
    }

    #[test]
    fn inclusion_state_transitions() {
        let mut idr = configured();
        assert!(idr.has_inclusions());
        assert_eq!(idr.num_inclusions(), Some(2));

        idr.clear_inclusions();
        assert!(idr.has_inclusions());
        assert_eq!(idr.num_inclusions(), Some(0));

        idr.redact_all();
        assert!(!idr.has_inclusions());
        assert_eq!(idr.num_inclusions(), None);
    }

    #[test]
    fn include_list_redacts_only_members() {
        let mut idr = configured();

        let mut listed = String::from("ID1");
        assert!(idr.redact(&mut listed));
        assert_ne!(listed, "ID1");
        assert_8_hex(&listed);

        let mut unlisted = String::from("IDX");
        assert!(!idr.redact(&mut unlisted));
        assert_eq!(unlisted, "IDX");
    }

    #[test]
    fn adding_an_id_switches_to_include_list() {
        let mut idr = IdRedactor::new();
        assert!(!idr.has_inclusions());

        assert!(idr.add_inclusion("ID3"));
        assert!(idr.has_inclusions());
        assert_eq!(idr.num_inclusions(), Some(1));

        let mut id = String::from("ID3");
        assert!(idr.redact(&mut id));
        assert_8_hex(&id);
    }

    #[test]
    fn removing_an_id_stops_its_redaction() {
        let mut idr = configured();
        assert!(idr.remove_inclusion("ID1"));
        assert_eq!(idr.num_inclusions(), Some(1));

        let mut id = String::from("ID1");
        assert!(!idr.redact(&mut id));
        assert_eq!(id, "ID1");

        let mut other = String::from("ID2");
        assert!(idr.redact(&mut other));
        assert_ne!(other, "ID2");
    }

    #[test]
    fn redact_all_replaces_everything() {
        let mut idr = configured();
        idr.redact_all();

        let mut id = String::from("ANYTHING");
        assert!(idr.redact(&mut id));
        assert_8_hex(&id);
    }

    #[test]
    fn cleared_include_list_redacts_nothing() {
        let mut idr = configured();
        idr.clear_inclusions();

        for original in ["ID1", "ID2", "IDX"] {
            let mut id = String::from(original);
            assert!(!idr.redact(&mut id));
            assert_eq!(id, original);
        }
    }

    #[test]
    fn replacements_are_fresh_per_call() {
        let mut idr = IdRedactor::new();
        let mut a = String::from("SAME");
        let mut b = String::from("SAME");
        idr.redact(&mut a);
        idr.redact(&mut b);
        assert_8_hex(&a);
        assert_8_hex(&b);
        assert_ne!(a, b);
    }
}
