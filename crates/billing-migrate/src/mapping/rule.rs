//! Declarative field mapping rules.

use std::fmt;
use std::sync::Arc;

use crate::core::{Row, Value};
use crate::error::Result;

use super::cipher::FieldCodec;

/// Per-field transformation applied to a resolved value.
pub type Callback = Arc<dyn Fn(Value, &Row) -> Result<Value> + Send + Sync>;

/// Computes a value from the whole source row.
pub type ComputeFn = Arc<dyn Fn(&Row) -> Result<Value> + Send + Sync>;

/// Reference to a value in a source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// Plain column.
    Column(String),
    /// Path into a structured column (`settings.ssl.port`, `nameservers.0`).
    Path { column: String, segments: Vec<String> },
}

impl SourceRef {
    /// Parse `column` or `column.segment.segment`.
    pub fn parse(reference: &str) -> Self {
        let mut parts = reference.split('.');
        let column = parts.next().unwrap_or_default().to_string();
        let segments: Vec<String> = parts.map(str::to_string).collect();
        if segments.is_empty() {
            SourceRef::Column(column)
        } else {
            SourceRef::Path { column, segments }
        }
    }

    /// Read the referenced value; anything missing is `Null`.
    pub fn read(&self, row: &Row) -> Value {
        match self {
            SourceRef::Column(column) => row.get(column).clone(),
            SourceRef::Path { column, segments } => {
                let root = match row.get(column) {
                    Value::Json(json) => json.clone(),
                    Value::Text(text) => match serde_json::from_str(text) {
                        Ok(json) => json,
                        Err(_) => return Value::Null,
                    },
                    _ => return Value::Null,
                };
                segments
                    .iter()
                    .try_fold(&root, |node, segment| match node {
                        serde_json::Value::Object(map) => map.get(segment),
                        serde_json::Value::Array(items) => {
                            segment.parse::<usize>().ok().and_then(|i| items.get(i))
                        }
                        _ => None,
                    })
                    .cloned()
                    .map(Value::from)
                    .unwrap_or(Value::Null)
            }
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Column(column) => f.write_str(column),
            SourceRef::Path { column, segments } => write!(f, "{}.{}", column, segments.join(".")),
        }
    }
}

/// Where a rule's value comes from. Exactly one source per rule.
#[derive(Clone)]
pub enum RuleSource {
    Literal(Value),
    Reference {
        primary: SourceRef,
        alternate: Option<SourceRef>,
    },
    Computed(ComputeFn),
}

impl fmt::Debug for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            RuleSource::Reference { primary, alternate } => f
                .debug_struct("Reference")
                .field("primary", primary)
                .field("alternate", alternate)
                .finish(),
            RuleSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// One target field of a mapping table.
#[derive(Clone)]
pub struct MappingRule {
    pub key: String,
    pub source: RuleSource,
    pub callback: Option<Callback>,
    pub serialized: bool,
    pub encrypted: bool,
}

impl MappingRule {
    pub fn literal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_source(key, RuleSource::Literal(value.into()))
    }

    /// Rule reading `reference` (a column or a dotted path).
    pub fn field(key: impl Into<String>, reference: &str) -> Self {
        Self::with_source(
            key,
            RuleSource::Reference {
                primary: SourceRef::parse(reference),
                alternate: None,
            },
        )
    }

    pub fn computed(
        key: impl Into<String>,
        f: impl Fn(&Row) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::with_source(key, RuleSource::Computed(Arc::new(f)))
    }

    fn with_source(key: impl Into<String>, source: RuleSource) -> Self {
        Self {
            key: key.into(),
            source,
            callback: None,
            serialized: false,
            encrypted: false,
        }
    }

    /// Fallback reference used when the primary one is empty.
    /// No effect on literal or computed rules.
    #[must_use]
    pub fn or_else(mut self, reference: &str) -> Self {
        if let RuleSource::Reference { alternate, .. } = &mut self.source {
            *alternate = Some(SourceRef::parse(reference));
        }
        self
    }

    #[must_use]
    pub fn callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    #[must_use]
    pub fn serialized(mut self) -> Self {
        self.serialized = true;
        self
    }

    #[must_use]
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn alternate(&self) -> Option<&SourceRef> {
        match &self.source {
            RuleSource::Reference { alternate, .. } => alternate.as_ref(),
            _ => None,
        }
    }

    /// Resolve the target value for `row`.
    ///
    /// Literal rules return their value as is. Otherwise: primary reference,
    /// alternate if the primary is empty, callback, serialize, encrypt.
    /// NULL is never serialized or encrypted.
    pub fn resolve(&self, row: &Row, codec: &FieldCodec) -> Result<Value> {
        if let RuleSource::Literal(value) = &self.source {
            return Ok(value.clone());
        }
        let value = self.apply_callback(self.read(row)?, row)?;
        self.encode(value, codec)
    }

    /// Like [`MappingRule::resolve`], but if the value is still empty after
    /// the callback and the rule has an alternate, the alternate alone is
    /// run through the callback instead. Emptiness is judged before
    /// serialization and encryption.
    pub fn resolve_with_retry(&self, row: &Row, codec: &FieldCodec) -> Result<Value> {
        if let RuleSource::Literal(value) = &self.source {
            return Ok(value.clone());
        }
        let mut value = self.apply_callback(self.read(row)?, row)?;
        if value.is_empty() {
            if let Some(alternate) = self.alternate() {
                value = self.apply_callback(alternate.read(row), row)?;
            }
        }
        self.encode(value, codec)
    }

    fn read(&self, row: &Row) -> Result<Value> {
        match &self.source {
            RuleSource::Literal(value) => Ok(value.clone()),
            RuleSource::Reference { primary, alternate } => {
                let value = primary.read(row);
                Ok(match alternate {
                    Some(alternate) if value.is_empty() => alternate.read(row),
                    _ => value,
                })
            }
            RuleSource::Computed(f) => f(row),
        }
    }

    fn apply_callback(&self, value: Value, row: &Row) -> Result<Value> {
        match &self.callback {
            Some(callback) => callback(value, row),
            None => Ok(value),
        }
    }

    fn encode(&self, value: Value, codec: &FieldCodec) -> Result<Value> {
        let value = if self.serialized {
            codec.serialize(&value)?
        } else {
            value
        };
        if self.encrypted {
            codec.encrypt(&value)
        } else {
            Ok(value)
        }
    }
}

impl fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRule")
            .field("key", &self.key)
            .field("source", &self.source)
            .field("callback", &self.callback.is_some())
            .field("serialized", &self.serialized)
            .field("encrypted", &self.encrypted)
            .finish()
    }
}
