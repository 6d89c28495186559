//! Observational record of what a reconciliation did. Carries no control
//! flow back into the manager.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Created,
    Configured,
    Unchanged,
    Deleted,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Created => "created",
            Action::Configured => "configured",
            Action::Unchanged => "unchanged",
            Action::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSetEntry {
    /// Formatted object identity, `Kind/namespace/name`.
    pub subject: String,
    pub action: Action,
    /// Unified diff of the live vs merged YAML, set only by the diff
    /// operation when drift was detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl ChangeSetEntry {
    pub fn new(subject: impl Into<String>, action: Action) -> Self {
        Self {
            subject: subject.into(),
            action,
            diff: None,
        }
    }
}

impl fmt::Display for ChangeSetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.subject, self.action)
    }
}

/// Ordered, append-only list of change entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub entries: Vec<ChangeSetEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: ChangeSetEntry) {
        self.entries.push(entry);
    }

    pub fn append(&mut self, other: ChangeSet) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_formats_like_kubectl() {
        let entry = ChangeSetEntry::new("ConfigMap/demo/app-config", Action::Created);
        assert_eq!(entry.to_string(), "ConfigMap/demo/app-config created");
    }

    #[test]
    fn actions_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Configured).unwrap(), "\"configured\"");
    }

    #[test]
    fn append_preserves_order() {
        let mut a = ChangeSet::new();
        a.add(ChangeSetEntry::new("Namespace/demo", Action::Created));
        let mut b = ChangeSet::new();
        b.add(ChangeSetEntry::new("ConfigMap/demo/app-config", Action::Configured));
        a.append(b);
        assert_eq!(a.entries.len(), 2);
        assert_eq!(a.entries[1].subject, "ConfigMap/demo/app-config");
    }
}
