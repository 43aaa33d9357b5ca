//! Static table of known operation kinds.

use std::collections::BTreeMap;

use super::Operation;
use crate::operations::{CopyOperation, DummyOperation};
use crate::{Error, Result};

/// Builds a fresh, unconfigured operation.
pub type Constructor = fn() -> Box<dyn Operation>;

/// Maps an operation kind (as written in configuration) to its constructor.
#[derive(Clone, Default)]
pub struct OperationCatalog {
    entries: BTreeMap<&'static str, Constructor>,
}

impl OperationCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the operations shipped in this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog
            .register("dummy", || Box::new(DummyOperation::new()))
            .register("copy", || Box::new(CopyOperation::new()));
        catalog
    }

    /// Register (or replace) a constructor for `kind`.
    pub fn register(&mut self, kind: &'static str, constructor: Constructor) -> &mut Self {
        self.entries.insert(kind, constructor);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Instantiate an unconfigured operation.
    pub fn create(&self, kind: &str) -> Result<Box<dyn Operation>> {
        self.entries
            .get(kind)
            .map(|constructor| constructor())
            .ok_or_else(|| Error::UnknownOperation(kind.to_string()))
    }
}

impl std::fmt::Debug for OperationCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let catalog = OperationCatalog::builtin();
        assert_eq!(catalog.kinds(), vec!["copy", "dummy"]);
        assert!(catalog.contains("dummy"));
        assert_eq!(catalog.create("dummy").unwrap().name(), "Dummy Operation");
    }

    #[test]
    fn test_unknown_kind() {
        let catalog = OperationCatalog::builtin();
        let err = catalog.create("sftp").err().unwrap();
        assert!(matches!(err, Error::UnknownOperation(ref kind) if kind == "sftp"));
    }

    #[test]
    fn test_register_custom_kind() {
        let mut catalog = OperationCatalog::new();
        assert!(catalog.kinds().is_empty());
        catalog.register("noop", || Box::new(DummyOperation::new()));
        assert!(catalog.contains("noop"));
    }
}
