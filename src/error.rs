use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Which of the two input tables a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Transactions,
    Stores,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Transactions => f.write_str("transactions"),
            SourceKind::Stores => f.write_str("stores"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{source_kind} source unavailable at {path:?}: {reason}")]
    SourceUnavailable {
        source_kind: SourceKind,
        path: PathBuf,
        reason: String,
    },

    /// Recorded, never returned from a load: unmatched rows are dropped.
    #[error("{dropped} transaction rows reference unknown stores")]
    Join { dropped: usize },

    #[error("insufficient data: need at least {needed} distinct dates, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("forecast model fit failed: {0}")]
    ModelFit(String),

    #[error("forecast horizon of {0} days runs past the supported calendar")]
    InvalidHorizon(u32),

    #[error("invalid group key '{0}'")]
    InvalidGroupKey(String),

    #[error("unknown measure '{0}' (expected sales or customers)")]
    InvalidMeasure(String),

    #[error("no records to summarise")]
    EmptyDataset,

    #[error("failed to write {path:?}: {reason}")]
    Export { path: PathBuf, reason: String },

    #[error("task for '{0}' panicked")]
    TaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_source() {
        let err = PipelineError::SourceUnavailable {
            source_kind: SourceKind::Stores,
            path: PathBuf::from("data/store.csv"),
            reason: "No such file".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("stores source unavailable"));
        assert!(msg.contains("store.csv"));

        let err = PipelineError::InsufficientData { needed: 2, got: 1 };
        assert_eq!(err.to_string(), "insufficient data: need at least 2 distinct dates, got 1");
    }
}
