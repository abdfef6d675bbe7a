use thiserror::Error;

/// Failures raised by the translation core (codec, parser, minter, emitter)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("malformed {datatype} value `{raw}`: {reason}")]
    MalformedValue {
        datatype: &'static str,
        raw: String,
        reason: String,
    },

    #[error("unknown datatype `{0}`")]
    UnknownDatatype(String),

    #[error("LAST used before any CREATE in this session")]
    UnresolvedPlaceholder,

    #[error("node id collision for {kind} node `{id}`")]
    MintCollision { kind: &'static str, id: String },

    #[error("malformed command: {0}")]
    MalformedCommand(String),
}

impl ConvertError {
    pub fn malformed_value(
        datatype: &'static str,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConvertError::MalformedValue {
            datatype,
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_command(reason: impl Into<String>) -> Self {
        ConvertError::MalformedCommand(reason.into())
    }

    /// Short stable name, used in error reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::MalformedValue { .. } => "MalformedValue",
            ConvertError::UnknownDatatype(_) => "UnknownDatatype",
            ConvertError::UnresolvedPlaceholder => "UnresolvedPlaceholder",
            ConvertError::MintCollision { .. } => "MintCollision",
            ConvertError::MalformedCommand(_) => "MalformedCommand",
        }
    }

    /// Collisions mean the node id space is inconsistent; nothing after them can be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConvertError::MintCollision { .. })
    }
}

/// A core error tagged with the input line it came from
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {error}")]
pub struct LineError {
    pub line: u64,
    #[source]
    pub error: ConvertError,
}

impl LineError {
    pub fn new(line: u64, error: ConvertError) -> Self {
        Self { line, error }
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_collisions_are_fatal() {
        assert!(ConvertError::MintCollision {
            kind: "reference",
            id: "abc".to_string()
        }
        .is_fatal());
        assert!(!ConvertError::UnresolvedPlaceholder.is_fatal());
        assert!(!ConvertError::malformed_command("x").is_fatal());
    }

    #[test]
    fn line_error_display_includes_line() {
        let err = LineError::new(7, ConvertError::UnknownDatatype("geo-shape".to_string()));
        assert_eq!(err.to_string(), "line 7: unknown datatype `geo-shape`");
        assert_eq!(err.error.kind(), "UnknownDatatype");
    }
}
