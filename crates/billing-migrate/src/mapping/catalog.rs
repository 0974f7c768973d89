//! Module, registrar and gateway mapping files.
//!
//! Each file maps one foreign integration class onto a local one and lists
//! the meta fields of the local module row or gateway as mapping rules.
//! Lookup by foreign name falls back from exact match, to the name with its
//! trailing version digits removed, to the generic mapping for the kind.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::Value;
use crate::error::{MigrateError, Result};

use super::callbacks::CallbackRegistry;
use super::rule::MappingRule;

/// Built-in mapping files, embedded at compile time.
const BUILTIN_FILES: &[(&str, &str)] = &[
    ("cpanel.yaml", include_str!("../../mappings/cpanel.yaml")),
    ("plesk.yaml", include_str!("../../mappings/plesk.yaml")),
    ("generic_server.yaml", include_str!("../../mappings/generic_server.yaml")),
    ("enom.yaml", include_str!("../../mappings/enom.yaml")),
    ("generic_registrar.yaml", include_str!("../../mappings/generic_registrar.yaml")),
    ("paypal.yaml", include_str!("../../mappings/paypal.yaml")),
    ("authorize.yaml", include_str!("../../mappings/authorize.yaml")),
    ("generic_gateway.yaml", include_str!("../../mappings/generic_gateway.yaml")),
];

/// Kind of integration a mapping applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Module,
    Registrar,
    Gateway,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Module => "module",
            ModuleKind::Registrar => "registrar",
            ModuleKind::Gateway => "gateway",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModuleKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "module" | "server" => Ok(ModuleKind::Module),
            "registrar" => Ok(ModuleKind::Registrar),
            "gateway" => Ok(ModuleKind::Gateway),
            other => Err(MigrateError::Mapping(format!(
                "Unknown module type '{}'. Expected one of: module, registrar, gateway",
                other
            ))),
        }
    }
}

/// A loaded mapping file.
#[derive(Debug, Clone)]
pub struct ModuleMapping {
    /// Foreign class name the file is keyed by (lowercase).
    pub class: String,
    pub kind: ModuleKind,
    /// Local class to install. `None` keeps the foreign class name.
    pub target_class: Option<String>,
    /// Display name of the local module or gateway.
    pub name: Option<String>,
    pub version: String,
    /// Fallback mapping for its kind.
    pub generic: bool,
    pub module_row_meta: Vec<MappingRule>,
    pub gateway_meta: Vec<MappingRule>,
}

impl ModuleMapping {
    /// Local class for a foreign module resolved through this mapping.
    pub fn target_class_for(&self, foreign: &str) -> String {
        self.target_class
            .clone()
            .unwrap_or_else(|| foreign.to_lowercase())
    }

    /// Meta rules for the mapping's kind.
    pub fn meta_rules(&self) -> &[MappingRule] {
        match self.kind {
            ModuleKind::Gateway => &self.gateway_meta,
            ModuleKind::Module | ModuleKind::Registrar => &self.module_row_meta,
        }
    }

    /// Parse a mapping file; callbacks are resolved by name.
    pub fn from_yaml(yaml: &str, callbacks: &CallbackRegistry) -> Result<Self> {
        let file: MappingFile = serde_yaml::from_str(yaml)?;
        let class = file.class.trim().to_lowercase();
        if class.is_empty() {
            return Err(MigrateError::Mapping("mapping file has an empty class".into()));
        }

        let convert = |specs: Vec<RuleSpec>| -> Result<Vec<MappingRule>> {
            specs
                .into_iter()
                .map(|spec| spec.into_rule(&class, callbacks))
                .collect()
        };

        Ok(Self {
            kind: file.kind,
            target_class: file.target_class.filter(|c| !c.trim().is_empty()),
            name: file.name,
            version: file.version,
            generic: file.generic,
            module_row_meta: convert(file.module_row_meta)?,
            gateway_meta: convert(file.gateway_meta)?,
            class,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingFile {
    class: String,
    #[serde(rename = "type")]
    kind: ModuleKind,
    #[serde(default)]
    target_class: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_mapping_version")]
    version: String,
    #[serde(default)]
    generic: bool,
    #[serde(default)]
    module_row_meta: Vec<RuleSpec>,
    #[serde(default)]
    gateway_meta: Vec<RuleSpec>,
}

fn default_mapping_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    key: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    alternate: Option<String>,
    #[serde(default)]
    callback: Option<String>,
    #[serde(default)]
    serialized: bool,
    #[serde(default)]
    encrypted: bool,
}

impl RuleSpec {
    fn into_rule(self, class: &str, callbacks: &CallbackRegistry) -> Result<MappingRule> {
        let mut rule = match (self.value, self.source) {
            (Some(value), None) => MappingRule::literal(&self.key, Value::from(value)),
            (None, Some(source)) => {
                let rule = MappingRule::field(&self.key, &source);
                match &self.alternate {
                    Some(alternate) => rule.or_else(alternate),
                    None => rule,
                }
            }
            _ => {
                return Err(MigrateError::Mapping(format!(
                    "{}: rule '{}' must have exactly one of 'value' or 'source'",
                    class, self.key
                )))
            }
        };
        if let Some(name) = &self.callback {
            rule = rule.callback(callbacks.require(name)?);
        }
        rule.serialized = self.serialized;
        rule.encrypted = self.encrypted;
        Ok(rule)
    }
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    VersionStripped,
    Generic,
}

/// Result of [`MappingCatalog::lookup`].
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub mapping: &'a ModuleMapping,
    pub matched: MatchKind,
}

/// All known mappings.
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    mappings: HashMap<(ModuleKind, String), ModuleMapping>,
    generics: HashMap<ModuleKind, ModuleMapping>,
}

impl MappingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the embedded mapping files.
    pub fn builtin(callbacks: &CallbackRegistry) -> Result<Self> {
        let mut catalog = Self::new();
        for (file, yaml) in BUILTIN_FILES {
            let mapping = ModuleMapping::from_yaml(yaml, callbacks)
                .map_err(|e| MigrateError::Mapping(format!("built-in {}: {}", file, e)))?;
            catalog.insert(mapping);
        }
        Ok(catalog)
    }

    /// Add or replace a mapping. Generic mappings become the kind's default.
    pub fn insert(&mut self, mapping: ModuleMapping) {
        if mapping.generic {
            self.generics.insert(mapping.kind, mapping);
        } else {
            self.mappings
                .insert((mapping.kind, mapping.class.clone()), mapping);
        }
    }

    /// Load every `*.yaml`/`*.yml` file of a directory over the current
    /// mappings. Malformed files are skipped with a warning.
    pub fn load_dir(&mut self, dir: &Path, callbacks: &CallbackRegistry) -> Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(MigrateError::from)
                .and_then(|yaml| ModuleMapping::from_yaml(&yaml, callbacks));
            match parsed {
                Ok(mapping) => {
                    debug!("Loaded mapping {} from {}", mapping.class, path.display());
                    self.insert(mapping);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping mapping file {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    /// Find the mapping for a foreign integration name.
    ///
    /// Exact name, then the name without trailing version digits, then the
    /// generic mapping for `kind`. `None` only if no generic mapping exists.
    pub fn lookup(&self, name: &str, kind: ModuleKind) -> Option<Resolved<'_>> {
        let name = name.trim().to_lowercase();
        if let Some(mapping) = self.mappings.get(&(kind, name.clone())) {
            return Some(Resolved {
                mapping,
                matched: MatchKind::Exact,
            });
        }
        if let Some(stripped) = strip_version(&name) {
            if let Some(mapping) = self.mappings.get(&(kind, stripped.to_string())) {
                return Some(Resolved {
                    mapping,
                    matched: MatchKind::VersionStripped,
                });
            }
        }
        self.generics.get(&kind).map(|mapping| Resolved {
            mapping,
            matched: MatchKind::Generic,
        })
    }

    pub fn len(&self) -> usize {
        self.mappings.len() + self.generics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `cpanel3` -> `cpanel`; `None` if there are no trailing digits or the
/// name is all digits.
pub fn strip_version(name: &str) -> Option<&str> {
    let stripped = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if stripped.len() == name.len() || stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::cipher::PassthroughCipher;
    use std::sync::Arc;

    fn callbacks() -> CallbackRegistry {
        CallbackRegistry::with_builtins(Arc::new(PassthroughCipher))
    }

    #[test]
    fn test_builtins_parse() {
        let catalog = MappingCatalog::builtin(&callbacks()).unwrap();
        assert_eq!(catalog.len(), BUILTIN_FILES.len());
    }

    #[test]
    fn test_version_digits_are_stripped() {
        let catalog = MappingCatalog::builtin(&callbacks()).unwrap();
        let resolved = catalog.lookup("cpanel3", ModuleKind::Module).unwrap();
        assert_eq!(resolved.mapping.class, "cpanel");
        assert_eq!(resolved.matched, MatchKind::VersionStripped);

        let exact = catalog.lookup("cPanel", ModuleKind::Module).unwrap();
        assert_eq!(exact.matched, MatchKind::Exact);
    }

    #[test]
    fn test_unknown_falls_back_to_generic_by_kind() {
        let catalog = MappingCatalog::builtin(&callbacks()).unwrap();
        let module = catalog.lookup("directadmin2", ModuleKind::Module).unwrap();
        assert_eq!(module.matched, MatchKind::Generic);
        assert_eq!(module.mapping.class, "generic_server");

        let gateway = catalog.lookup("stripe", ModuleKind::Gateway).unwrap();
        assert_eq!(gateway.mapping.class, "generic_gateway");
        assert_eq!(gateway.mapping.target_class_for("Stripe"), "stripe");
    }

    #[test]
    fn test_kind_partitions_lookup() {
        let catalog = MappingCatalog::builtin(&callbacks()).unwrap();
        let resolved = catalog.lookup("cpanel", ModuleKind::Registrar).unwrap();
        assert_eq!(resolved.matched, MatchKind::Generic);
    }

    #[test]
    fn test_no_generic_means_none() {
        assert!(MappingCatalog::new().lookup("cpanel", ModuleKind::Module).is_none());
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("cpanel3"), Some("cpanel"));
        assert_eq!(strip_version("plesk12"), Some("plesk"));
        assert_eq!(strip_version("cpanel"), None);
        assert_eq!(strip_version("123"), None);
    }

    #[test]
    fn test_rule_needs_exactly_one_source() {
        let yaml = "class: x\ntype: module\nmodule_row_meta:\n  - key: a\n    value: 1\n    source: b\n";
        assert!(ModuleMapping::from_yaml(yaml, &callbacks()).is_err());
        let yaml = "class: x\ntype: module\nmodule_row_meta:\n  - key: a\n";
        assert!(ModuleMapping::from_yaml(yaml, &callbacks()).is_err());
    }

    #[test]
    fn test_load_dir_overrides_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cpanel.yaml"),
            "class: cpanel\ntype: module\ntarget_class: cpanel_custom\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "class: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let cb = callbacks();
        let mut catalog = MappingCatalog::builtin(&cb).unwrap();
        assert_eq!(catalog.load_dir(dir.path(), &cb).unwrap(), 1);
        let resolved = catalog.lookup("cpanel", ModuleKind::Module).unwrap();
        assert_eq!(resolved.mapping.target_class_for("cpanel"), "cpanel_custom");
    }
}
