//! PartII redaction field list.
//!
//! The names of the partII members to strip from forwarded BSMs live in a
//! plain text file, one field name per line, whose path comes from an
//! environment variable. An unset variable or a missing file is not an
//! error: the list is simply empty and partII redaction becomes a no-op.

use tracing::{info, warn};

/// Default environment variable naming the field file.
pub const REDACTION_PROPERTIES_ENV_VAR: &str = "REDACTION_PROPERTIES_PATH";

#[derive(Debug, Clone, Default)]
pub struct RedactionProperties {
    fields: Vec<String>,
}

impl RedactionProperties {
    /// Load from the file named by `REDACTION_PROPERTIES_PATH`.
    pub fn from_env() -> Self {
        Self::from_env_var(REDACTION_PROPERTIES_ENV_VAR)
    }

    /// Load from the file named by the given environment variable.
    pub fn from_env_var(var: &str) -> Self {
        match std::env::var(var) {
            Ok(path) if !path.is_empty() => Self::from_file(&path),
            _ => {
                info!("{var} not set; no partII fields will be redacted");
                Self::default()
            }
        }
    }

    /// Load from a field file directly. Each non-empty line is one field
    /// name to remove.
    pub fn from_file(path: &str) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("could not read redaction field file {path}: {e}");
                return Self::default();
            }
        };

        let fields: Vec<String> =
            content.lines().filter(|line| !line.is_empty()).map(String::from).collect();

        info!(count = fields.len(), "loaded partII redaction fields from {path}");
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn add_field(&mut self, name: &str) {
        self.fields.push(name.to_string());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_nonempty_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.txt");
        fs::write(&path, "pathHistory\n\npathPrediction\nbikeLaneUse\n").unwrap();

        let props = RedactionProperties::from_file(path.to_str().unwrap());
        assert_eq!(props.len(), 3);
        assert!(props.is_field("pathHistory"));
        assert!(props.is_field("bikeLaneUse"));
        assert!(!props.is_field("speed"));
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let props = RedactionProperties::from_file("/no/such/fields.txt");
        assert!(props.is_empty());
    }

    #[test]
    fn unset_variable_yields_empty_list() {
        // A variable name no test environment will have.
        let props = RedactionProperties::from_env_var("PPM_TEST_UNSET_FIELDS_VAR");
        assert!(props.is_empty());
    }

    #[test]
    fn env_var_points_at_field_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.txt");
        fs::write(&path, "pathHistory\n").unwrap();

        std::env::set_var("PPM_TEST_FIELDS_VAR", &path);
        let props = RedactionProperties::from_env_var("PPM_TEST_FIELDS_VAR");
        std::env::remove_var("PPM_TEST_FIELDS_VAR");

        assert_eq!(props.fields(), ["pathHistory"]);
    }

    #[test]
    fn add_field_extends_the_list() {
        let mut props = RedactionProperties::default();
        props.add_field("events");
        assert!(props.is_field("events"));
        assert_eq!(props.len(), 1);
    }
}
