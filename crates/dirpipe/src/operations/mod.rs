//! Operations shipped with the crate.

mod copy;
mod dummy;

pub use copy::{CopyConfig, CopyOperation};
pub use dummy::{DummyConfig, DummyOperation};
