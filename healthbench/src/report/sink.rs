//! Report persistence

use std::path::{Path, PathBuf};

use super::RunReport;

/// Error type for result sinks
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for a finished report
pub trait ResultSink: Send + Sync {
    fn write(&self, report: &RunReport) -> Result<(), SinkError>;
}

/// Writes the report as one pretty-printed JSON document
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonFileSink {
    fn write(&self, report: &RunReport) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(report)?;

        let io_err = |source: std::io::Error| SinkError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&self.path, json).map_err(io_err)?;

        tracing::info!("Results saved to {}", self.path.display());
        Ok(())
    }
}
