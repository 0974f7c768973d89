//! Named value transformations that mapping files can refer to.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{Row, Value};
use crate::error::{MigrateError, Result};

use super::cipher::FieldCipher;
use super::rule::Callback;

/// Registry of callbacks by name.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: BTreeMap<String, Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard callbacks.
    ///
    /// `source_cipher` decrypts values the foreign system stored encrypted
    /// (`decrypt_source`).
    pub fn with_builtins(source_cipher: Arc<dyn FieldCipher>) -> Self {
        let mut registry = Self::new();
        registry.register("trim", |v, _| Ok(map_text(v, |s| s.trim().to_string())));
        registry.register("lowercase", |v, _| Ok(map_text(v, |s| s.to_lowercase())));
        registry.register("uppercase", |v, _| Ok(map_text(v, |s| s.to_uppercase())));
        registry.register("bool_flag", |v, _| {
            Ok(if v.is_null() {
                Value::Null
            } else {
                Value::text(if v.as_bool() { "true" } else { "false" })
            })
        });
        registry.register("strip_html", |v, _| Ok(map_text(v, strip_html)));
        registry.register("first_line", |v, _| {
            Ok(map_text(v, |s| s.lines().next().unwrap_or_default().trim().to_string()))
        });
        registry.register("split_lines", |v, _| {
            Ok(match v.as_text() {
                None => Value::Null,
                Some(text) => Value::Json(serde_json::Value::Array(
                    text.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(|l| serde_json::Value::String(l.to_string()))
                        .collect(),
                )),
            })
        });
        registry.register("decrypt_source", move |v, _| match v.as_text() {
            Some(text) if !text.trim().is_empty() => Ok(Value::Text(source_cipher.decrypt(&text)?)),
            _ => Ok(v),
        });
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Value, &Row) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.callbacks.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Callback> {
        self.callbacks.get(name).cloned()
    }

    /// Look up a callback a mapping file names.
    pub fn require(&self, name: &str) -> Result<Callback> {
        self.get(name).ok_or_else(|| {
            MigrateError::Mapping(format!(
                "Unknown callback '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.callbacks.keys().map(String::as_str).collect()
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        other => other,
    }
}

fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::cipher::PassthroughCipher;

    fn registry() -> CallbackRegistry {
        CallbackRegistry::with_builtins(Arc::new(PassthroughCipher))
    }

    fn apply(name: &str, value: Value) -> Value {
        registry().require(name).unwrap()(value, &Row::new()).unwrap()
    }

    #[test]
    fn test_text_callbacks_leave_non_text_alone() {
        assert_eq!(apply("trim", Value::text("  a ")), Value::text("a"));
        assert_eq!(apply("uppercase", Value::text("ab")), Value::text("AB"));
        assert_eq!(apply("lowercase", Value::Int(5)), Value::Int(5));
        assert!(apply("trim", Value::Null).is_null());
    }

    #[test]
    fn test_bool_flag() {
        assert_eq!(apply("bool_flag", Value::text("on")), Value::text("true"));
        assert_eq!(apply("bool_flag", Value::Int(0)), Value::text("false"));
        assert!(apply("bool_flag", Value::Null).is_null());
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            apply("strip_html", Value::text("<p>Fish &amp; <b>chips</b></p>")),
            Value::text("Fish & chips")
        );
    }

    #[test]
    fn test_split_and_first_line() {
        assert_eq!(
            apply("split_lines", Value::text("a\n\n b \n")),
            Value::Json(serde_json::json!(["a", "b"]))
        );
        assert_eq!(apply("first_line", Value::text("a\nb")), Value::text("a"));
    }

    #[test]
    fn test_unknown_callback_lists_available() {
        let err = registry().require("rot13").err().unwrap().to_string();
        assert!(err.contains("trim"));
    }
}
