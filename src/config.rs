//! Run configuration: presence policy, name backfill, roster sheet and the
//! header labels used to find identity columns.
//!
//! Options come from an optional YAML file; the CLI layers its flags on top.

use crate::error::RollCallResult;
use crate::types::PresencePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Header texts looked up case-insensitively in the poll export and in row 1
/// of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderLabels {
    pub email: String,
    pub full_name: String,
    pub sortable_name: String,
    pub first_name: String,
    pub last_name: String,
}

impl Default for HeaderLabels {
    fn default() -> Self {
        Self {
            email: "Email".to_string(),
            full_name: "Full name".to_string(),
            sortable_name: "Sortable name".to_string(),
            first_name: "First name".to_string(),
            last_name: "Last name".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub presence: PresencePolicy,
    /// Write poll names into blank roster name cells.
    pub backfill_names: bool,
    /// Roster worksheet; the tab the master was saved on when unset.
    pub sheet: Option<String>,
    pub labels: HeaderLabels,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            presence: PresencePolicy::Listed,
            backfill_names: true,
            sheet: None,
            labels: HeaderLabels::default(),
        }
    }
}

impl ReconcileOptions {
    pub fn from_yaml(content: &str) -> RollCallResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> RollCallResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let options = ReconcileOptions::default();
        assert_eq!(options.presence, PresencePolicy::Listed);
        assert!(options.backfill_names);
        assert!(options.sheet.is_none());
        assert_eq!(options.labels.email, "Email");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let options = ReconcileOptions::from_yaml(
            "backfill_names: false\nlabels:\n  email: E-mail Address\n",
        )
        .unwrap();
        assert!(!options.backfill_names);
        assert_eq!(options.labels.email, "E-mail Address");
        assert_eq!(options.labels.full_name, "Full name");
        assert_eq!(options.presence, PresencePolicy::Listed);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "presence:\n  mode: answered\n  question_match: Q1\nsheet: Roster"
        )
        .unwrap();

        let options = ReconcileOptions::load(file.path()).unwrap();
        assert_eq!(options.sheet.as_deref(), Some("Roster"));
        assert_eq!(
            options.presence,
            PresencePolicy::Answered {
                question_match: "Q1".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(ReconcileOptions::from_yaml("presence: [1, 2").is_err());
    }
}
