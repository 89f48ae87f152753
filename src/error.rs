//! Error types for loki-backfill

use crate::block::BlockInterval;
use std::fmt;

/// Result type alias for loki-backfill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for loki-backfill
#[derive(Debug)]
pub enum Error {
    /// Arrow-related errors
    Arrow(arrow::error::ArrowError),
    /// Parquet-related errors
    Parquet(parquet::errors::ParquetError),
    /// Object store errors
    ObjectStore(object_store::Error),
    /// IO errors
    Io(std::io::Error),
    /// HTTP transport errors talking to the query backend
    Http(reqwest::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors (flags, rules file, time window)
    Config(String),
    /// The query backend answered, but not with a usable matrix
    Query(String),
    /// Block session protocol or head errors
    Storage(String),
    /// Same series and timestamp appended twice with different values
    DuplicateSample { labels: String, timestamp: i64 },
    /// A step of the block write protocol failed
    BlockWrite {
        stage: WriteStage,
        interval: BlockInterval,
        source: Box<Error>,
    },
    /// Processing a rule failed
    Rule {
        rule: String,
        phase: RulePhase,
        source: Box<Error>,
    },
}

/// Step of the block write protocol an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    Open,
    Append,
    Commit,
    Flush,
    Close,
}

impl WriteStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStage::Open => "open",
            WriteStage::Append => "append",
            WriteStage::Commit => "commit",
            WriteStage::Flush => "flush",
            WriteStage::Close => "close",
        }
    }
}

/// Which half of rule processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePhase {
    Query,
    Write,
}

impl Error {
    pub(crate) fn block_write(stage: WriteStage, interval: BlockInterval, source: Error) -> Self {
        Error::BlockWrite {
            stage,
            interval,
            source: Box::new(source),
        }
    }

    pub(crate) fn rule(rule: &str, phase: RulePhase, source: Error) -> Self {
        Error::Rule {
            rule: rule.to_string(),
            phase,
            source: Box::new(source),
        }
    }

    /// Name of the rule this error is attributed to, if any.
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            Error::Rule { rule, .. } => Some(rule),
            _ => None,
        }
    }

    /// Whether this is a configuration error raised before any query or write.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Arrow(e) => Some(e),
            Error::Parquet(e) => Some(e),
            Error::ObjectStore(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::BlockWrite { source, .. } => Some(source.as_ref()),
            Error::Rule { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arrow(e) => write!(f, "Arrow error: {}", e),
            Error::Parquet(e) => write!(f, "Parquet error: {}", e),
            Error::ObjectStore(e) => write!(f, "Object store error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Query(msg) => write!(f, "Query error: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::DuplicateSample { labels, timestamp } => write!(
                f,
                "duplicate sample for timestamp {} in series {}",
                timestamp, labels
            ),
            Error::BlockWrite {
                stage,
                interval,
                source,
            } => write!(
                f,
                "block [{}, {}]: {}: {}",
                interval.start,
                interval.end,
                stage.as_str(),
                source
            ),
            Error::Rule {
                rule,
                phase: RulePhase::Query,
                source,
            } => write!(f, "loki query failed for rule {}: {}", rule, source),
            Error::Rule {
                rule,
                phase: RulePhase::Write,
                source,
            } => write!(f, "write blocks for rule {}: {}", rule, source),
        }
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(e: arrow::error::ArrowError) -> Self {
        Error::Arrow(e)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Error::Parquet(e)
    }
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        Error::ObjectStore(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(format!("parse rules yaml: {}", e))
    }
}
