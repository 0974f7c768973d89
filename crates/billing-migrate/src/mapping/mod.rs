//! Declarative field mapping.
//!
//! - [`rule`]: one target field and how to compute it from a source row
//! - [`catalog`]: module/registrar/gateway mapping files with fallback lookup
//! - [`callbacks`]: named transformations mapping files refer to
//! - [`cipher`]: serialization and reversible encryption of stored values

pub mod callbacks;
pub mod catalog;
pub mod cipher;
pub mod rule;

pub use callbacks::CallbackRegistry;
pub use catalog::{strip_version, MappingCatalog, MatchKind, ModuleKind, ModuleMapping, Resolved};
pub use cipher::{AeadCipher, FieldCipher, FieldCodec, PassthroughCipher};
pub use rule::{Callback, ComputeFn, MappingRule, RuleSource, SourceRef};
