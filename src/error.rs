use std::fmt;

#[derive(Debug)]
pub enum DictionaryError {
    /// A corpus document could not be fetched or parsed.
    DataUnavailable { path: String, reason: String },
    /// No usable embedding model for semantic ranking.
    ModelUnavailable(String),
    /// Empty or missing query, rejected before scoring.
    InvalidQuery(String),
    DimensionMismatch { expected: usize, actual: usize },
    Io(std::io::Error),
}

impl DictionaryError {
    pub fn data_unavailable(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        DictionaryError::DataUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Semantic failures that should fall back to lexical ranking.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            DictionaryError::ModelUnavailable(_) | DictionaryError::DimensionMismatch { .. }
        )
    }
}

impl fmt::Display for DictionaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictionaryError::DataUnavailable { path, reason } => {
                write!(f, "failed to load {path}: {reason}")
            }
            DictionaryError::ModelUnavailable(reason) => {
                write!(f, "embedding model unavailable: {reason}")
            }
            DictionaryError::InvalidQuery(reason) => write!(f, "invalid query: {reason}"),
            DictionaryError::DimensionMismatch { expected, actual } => write!(
                f,
                "query embedding has {actual} dimensions, corpus uses {expected}"
            ),
            DictionaryError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for DictionaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DictionaryError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DictionaryError {
    fn from(value: std::io::Error) -> Self {
        DictionaryError::Io(value)
    }
}

pub type Result<T, E = DictionaryError> = std::result::Result<T, E>;
