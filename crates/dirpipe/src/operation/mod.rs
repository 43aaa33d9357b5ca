//! The operation contract every pipeline step implements.

mod catalog;
mod context;
mod traits;

pub use catalog::{Constructor, OperationCatalog};
pub use context::{JobFile, ProgressSink};
pub use traits::{Operation, Params, decode_params};
