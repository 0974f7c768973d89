//! Import engine: run state, per-pass row loop, error collection.

mod context;
mod errors;
mod pass;
mod pricing;

pub use context::ImportContext;
pub use errors::{ErrorKind, ErrorList, ImportError};
pub use pass::{run_pass, PassStats, RowState};
pub use pricing::{Period, PricePoint};
