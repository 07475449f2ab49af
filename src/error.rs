use std::fmt;
use thiserror::Error;

/// Data-shape errors raised while turning raw report entries into rows.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("entry #{index} is missing field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("entry #{index} has invalid `{field}`: {value}")]
    InvalidValue {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("entry #{index} has unparsable timestamp in `{field}`: {value}")]
    InvalidTimestamp {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("report has no entries for the whole window")]
    EmptyReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Fetch,
    Format,
    EnsureTable,
    ReplaceWindow,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Fetch => "fetch",
            Self::Format => "format",
            Self::EnsureTable => "ensure_table",
            Self::ReplaceWindow => "replace_window",
        };
        f.write_str(name)
    }
}

/// A sync run that stopped at `stage`.
#[derive(Debug, Error)]
#[error("{stage} failed: {source:#}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl PipelineError {
    pub fn new(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Single-line form of the error chain, used in failure notifications.
    pub fn summary(&self) -> String {
        self.to_string()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Sync(PipelineError),

    #[error("{sync}; failure notification also failed: {notify:#}")]
    Notify {
        sync: PipelineError,
        notify: anyhow::Error,
    },
}
