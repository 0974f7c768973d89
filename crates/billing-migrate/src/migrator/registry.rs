//! Migrator lookup by foreign system name and version.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{MigrateError, Result};

use super::whmcs::Whmcs52;
use super::{MigrationPlan, Migrator, MigratorArgs};

/// Builds a fresh plan.
pub type PlanConstructor = Arc<dyn Fn() -> Box<dyn MigrationPlan> + Send + Sync>;

/// Registry of migration plans keyed by `(system, version)`.
#[derive(Clone, Default)]
pub struct MigratorRegistry {
    constructors: BTreeMap<(String, String), PlanConstructor>,
}

fn key(system: &str, version: &str) -> (String, String) {
    (system.trim().to_lowercase(), version.trim().to_string())
}

impl MigratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled plans.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("whmcs", "5.2", || Box::new(Whmcs52::new()));
        registry
    }

    /// Register a plan constructor; replaces any previous one for the key.
    pub fn register<F>(&mut self, system: &str, version: &str, constructor: F)
    where
        F: Fn() -> Box<dyn MigrationPlan> + Send + Sync + 'static,
    {
        self.constructors
            .insert(key(system, version), Arc::new(constructor));
    }

    /// Registered keys as `system version`.
    pub fn available(&self) -> Vec<String> {
        self.constructors
            .keys()
            .map(|(system, version)| format!("{} {}", system, version))
            .collect()
    }

    /// Construct the plan registered for `(system, version)`.
    ///
    /// The plan must identify itself with the requested system and version;
    /// a constructor that builds some other plan is rejected.
    pub fn plan(&self, system: &str, version: &str) -> Result<Box<dyn MigrationPlan>> {
        let key = key(system, version);
        let constructor =
            self.constructors
                .get(&key)
                .ok_or_else(|| MigrateError::UnknownMigrator {
                    system: system.to_string(),
                    version: version.to_string(),
                    available: self.available().join(", "),
                })?;

        let plan = constructor();
        if plan.system().to_lowercase() != key.0 || plan.version() != key.1 {
            return Err(MigrateError::MigratorMismatch {
                requested: format!("{} {}", key.0, key.1),
                actual: format!("{} {}", plan.system(), plan.version()),
            });
        }
        debug!("Resolved migrator {} {}", key.0, key.1);
        Ok(plan)
    }

    /// Construct a migrator for `(system, version)`.
    pub fn create(&self, system: &str, version: &str, args: MigratorArgs) -> Result<Migrator> {
        Migrator::new(self.plan(system, version)?, args)
    }
}
