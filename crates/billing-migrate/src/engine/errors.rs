//! Run-level error list.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{FieldErrors, RemoteId};

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A writer rejected the record.
    Validation,
    /// Transform or write raised an error; the local connection was reset.
    Exception,
    /// The run budget elapsed.
    Timeout,
}

/// One failed row (or the run itself, for timeouts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportError {
    /// Entity type name, or `import` for run-level entries.
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub kind: ErrorKind,
    pub fields: FieldErrors,
}

impl ImportError {
    pub fn validation(
        scope: impl Into<String>,
        remote_id: Option<RemoteId>,
        fields: FieldErrors,
    ) -> Self {
        Self {
            scope: scope.into(),
            remote_id,
            kind: ErrorKind::Validation,
            fields,
        }
    }

    pub fn exception(
        scope: impl Into<String>,
        remote_id: Option<RemoteId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            remote_id,
            kind: ErrorKind::Exception,
            fields: FieldErrors::single("exception", message),
        }
    }

    pub fn timeout(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            remote_id: None,
            kind: ErrorKind::Timeout,
            fields: FieldErrors::single("timeout", message),
        }
    }

    /// Fold a later failure of the same source row into this entry.
    ///
    /// Fields of another entity type are keyed `scope.field`; an exception
    /// outranks a validation failure.
    pub fn absorb(&mut self, other: ImportError) {
        let qualify = other.scope != self.scope;
        for (field, messages) in other.fields.iter() {
            let key = if qualify {
                format!("{}.{}", other.scope, field)
            } else {
                field.clone()
            };
            for message in messages {
                self.fields.add(key.clone(), message.clone());
            }
        }
        if other.kind == ErrorKind::Exception {
            self.kind = ErrorKind::Exception;
        }
    }

    /// All messages joined.
    pub fn message(&self) -> String {
        self.fields
            .iter()
            .flat_map(|(_, messages)| messages.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.remote_id {
            Some(id) => write!(f, "{} #{}: {}", self.scope, id, self.message()),
            None => write!(f, "{}: {}", self.scope, self.message()),
        }
    }
}

/// Errors accumulated over a run, in the order they occurred.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorList {
    entries: Vec<ImportError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ImportError) {
        self.entries.push(error);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportError> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[ImportError] {
        &self.entries
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut ImportError> {
        self.entries.get_mut(index)
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Entries for one entity type.
    pub fn for_scope<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a ImportError> {
        self.entries.iter().filter(move |e| e.scope == scope)
    }

    /// Messages grouped by field name across all entries.
    pub fn by_field(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &self.entries {
            for (field, messages) in entry.fields.iter() {
                grouped
                    .entry(field.clone())
                    .or_default()
                    .extend(messages.iter().cloned());
            }
        }
        grouped
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ImportError;
    type IntoIter = std::slice::Iter<'a, ImportError>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_field_merges_entries() {
        let mut list = ErrorList::new();
        list.push(ImportError::validation(
            "clients",
            Some("2".into()),
            FieldErrors::single("email", "taken"),
        ));
        list.push(ImportError::validation(
            "contacts",
            Some("9".into()),
            FieldErrors::single("email", "missing"),
        ));
        list.push(ImportError::exception("invoices", None, "boom"));

        let grouped = list.by_field();
        assert_eq!(grouped["email"], vec!["taken", "missing"]);
        assert_eq!(grouped["exception"], vec!["boom"]);
        assert_eq!(list.count(ErrorKind::Validation), 2);
        assert_eq!(list.for_scope("clients").count(), 1);
    }

    #[test]
    fn test_display_includes_remote_id() {
        let e = ImportError::exception("invoices", Some("17".into()), "bad date");
        assert_eq!(e.to_string(), "invoices #17: bad date");
        let t = ImportError::timeout("import", "budget elapsed");
        assert_eq!(t.to_string(), "import: budget elapsed");
    }

    #[test]
    fn test_serializes_kind_in_snake_case() {
        let e = ImportError::timeout("import", "x");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert!(json.get("remote_id").is_none());
    }
}
