//! Operation trait and related types.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::context::{JobFile, ProgressSink};
use crate::{Error, Result};

/// Raw operation parameters, as read from the configuration surface.
pub type Params = Map<String, Value>;

/// Decode raw parameters into an operation's own config struct.
///
/// Decoding failures are reported as configuration errors.
pub fn decode_params<T: DeserializeOwned>(params: &Params) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| Error::config(format!("invalid parameters: {}", e)))
}

/// A single pipeline step.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Human-readable name, used for display only.
    fn name(&self) -> &'static str;

    /// Validate and store configuration.
    ///
    /// Called once while the pipeline is assembled, before monitoring starts.
    fn configure(&mut self, params: &Params) -> Result<()>;

    /// Optional side-effecting sanity check (connectivity, test write, ...).
    ///
    /// Never invoked by the scheduler; callers run it through
    /// [`Pipeline::preflight`](crate::pipeline::Pipeline::preflight) before
    /// enabling monitoring.
    async fn preflight_check(&self) -> Result<()> {
        Ok(())
    }

    /// Process one file.
    ///
    /// # Cancellation
    ///
    /// Implementations must poll `cancel` at every natural unit of work and
    /// return [`Error::Cancelled`] promptly once it fires. Nothing forces a
    /// running operation to stop.
    ///
    /// # Progress
    ///
    /// Report progress through `progress`; values outside `0..=100` are
    /// clamped and decreasing values are dropped.
    ///
    /// Metadata written through [`JobFile::insert_metadata`] is kept only if
    /// this returns `Ok`.
    async fn run(
        &self,
        file: &JobFile,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        destination: String,
        #[serde(default)]
        overwrite: bool,
    }

    #[test]
    fn test_decode_params() {
        let mut params = Params::new();
        params.insert("destination".into(), Value::from("/backup"));
        let sample: Sample = decode_params(&params).unwrap();
        assert_eq!(sample.destination, "/backup");
        assert!(!sample.overwrite);
    }

    #[test]
    fn test_decode_params_reports_configuration_error() {
        let err = decode_params::<Sample>(&Params::new()).unwrap_err();
        match err {
            Error::Configuration(msg) => assert!(msg.contains("destination")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}
