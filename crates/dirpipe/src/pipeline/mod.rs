//! Pipeline assembly and per-file execution.
//!
//! A [`Pipeline`] is the immutable, index-ordered list of configured
//! operations for one monitoring session. A [`Job`] runs that list for a
//! single file.

mod job;

pub use job::{Job, JobOutcome, JobState};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::operation::{Operation, OperationCatalog, Params};
use crate::{Error, Result};

/// One configured step, as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Catalog kind, e.g. `"copy"`.
    pub kind: String,
    #[serde(default)]
    pub params: Params,
}

impl OperationSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A configured operation at a fixed pipeline position.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub index: usize,
    pub name: String,
    pub params: Params,
    pub operation: Arc<dyn Operation>,
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("index", &self.index)
            .field("name", &self.name)
            .finish()
    }
}

/// The ordered list of operations applied to every file.
#[derive(Debug, Clone)]
pub struct Pipeline {
    operations: Arc<[OperationDescriptor]>,
}

impl Pipeline {
    /// Instantiate and configure every entry through `catalog`.
    ///
    /// Fails on the first unknown kind or invalid configuration.
    pub fn assemble(catalog: &OperationCatalog, specs: &[OperationSpec]) -> Result<Self> {
        let mut operations = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let mut operation = catalog.create(&spec.kind)?;
            operation.configure(&spec.params).map_err(|e| {
                let message = match e {
                    Error::Configuration(msg) => msg,
                    other => other.to_string(),
                };
                Error::config(format!("operation #{} ({}): {}", index, spec.kind, message))
            })?;
            debug!(index, kind = %spec.kind, "Configured operation");
            operations.push(OperationDescriptor {
                index,
                name: operation.name().to_string(),
                params: spec.params.clone(),
                operation: Arc::from(operation),
            });
        }
        Ok(Self {
            operations: operations.into(),
        })
    }

    /// Build a pipeline from operations that are already configured.
    pub fn from_operations(operations: Vec<Box<dyn Operation>>) -> Self {
        let operations: Vec<_> = operations
            .into_iter()
            .enumerate()
            .map(|(index, operation)| OperationDescriptor {
                index,
                name: operation.name().to_string(),
                params: Params::new(),
                operation: Arc::from(operation),
            })
            .collect();
        Self {
            operations: operations.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&OperationDescriptor> {
        self.operations.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter()
    }

    /// Display names in pipeline order.
    pub fn names(&self) -> Vec<String> {
        self.operations.iter().map(|d| d.name.clone()).collect()
    }

    /// Run every operation's preflight check in order, stopping at the first
    /// failure.
    pub async fn preflight(&self) -> Result<()> {
        for descriptor in self.operations.iter() {
            debug!(index = descriptor.index, name = %descriptor.name, "Running preflight check");
            descriptor
                .operation
                .preflight_check()
                .await
                .map_err(|e| Error::Preflight {
                    index: descriptor.index,
                    name: descriptor.name.clone(),
                    message: e.to_string(),
                })?;
        }
        info!(operations = self.len(), "Preflight checks passed");
        Ok(())
    }
}
