//! Error types for the shardline reading store.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all shardline operations.
///
/// Each variant wraps the error enum of one concern: decoding persisted
/// records, compiling shard path templates, filesystem access, and loading
/// configuration.
#[derive(Error, Debug)]
pub enum ShardError {
    /// A record could not be decoded.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The shard path template is misconfigured.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] StorageIoError),

    /// The configuration file could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while decoding persisted records.
///
/// Line numbers are 1-based and refer to the record's position in the
/// decoded input. A single record decoded on its own reports line 0.
#[derive(Error, Debug)]
pub enum FormatError {
    /// The record does not have exactly three fields.
    #[error("line {line}: invalid sample element length: {count}")]
    FieldCount {
        /// Line of the offending record.
        line: u64,
        /// Number of fields found.
        count: usize,
    },

    /// The timestamp field is not valid RFC3339.
    #[error("line {line}: invalid sample time '{value}': {source}")]
    Timestamp {
        /// Line of the offending record.
        line: u64,
        /// The unparseable text.
        value: String,
        /// The underlying parse error.
        #[source]
        source: chrono::ParseError,
    },

    /// The value field is not a valid float.
    #[error("line {line}: invalid sample float '{value}': {source}")]
    Value {
        /// Line of the offending record.
        line: u64,
        /// The unparseable text.
        value: String,
        /// The underlying parse error.
        #[source]
        source: std::num::ParseFloatError,
    },

    /// The epoch has no four-digit-year RFC3339 form and could not be read
    /// back once written.
    #[error("line {line}: sample time out of range: {value}")]
    EpochRange {
        /// Line of the offending record.
        line: u64,
        /// The epoch as chrono prints it.
        value: String,
    },

    /// The input is not well-formed CSV.
    #[error("malformed record data: {source}")]
    Csv {
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },
}

impl FormatError {
    /// Returns the same error attributed to `line`.
    #[must_use]
    pub fn at_line(self, line: u64) -> Self {
        match self {
            Self::FieldCount { count, .. } => Self::FieldCount { line, count },
            Self::Timestamp { value, source, .. } => Self::Timestamp {
                line,
                value,
                source,
            },
            Self::Value { value, source, .. } => Self::Value {
                line,
                value,
                source,
            },
            Self::EpochRange { value, .. } => Self::EpochRange { line, value },
            other @ Self::Csv { .. } => other,
        }
    }

    /// The line this error refers to, when it has one.
    pub fn line(&self) -> Option<u64> {
        match self {
            Self::FieldCount { line, .. }
            | Self::Timestamp { line, .. }
            | Self::Value { line, .. }
            | Self::EpochRange { line, .. } => Some(*line),
            Self::Csv { source } => source.position().map(csv::Position::line),
        }
    }
}

/// Errors raised while compiling a shard path template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// An action names a function that is not in the function table.
    #[error("unknown template function '{name}' at offset {offset}")]
    UnknownFunction {
        /// The function name.
        name: String,
        /// Byte offset of the action in the template.
        offset: usize,
    },

    /// An action names a field other than `.Source` or `.Epoch`.
    #[error("unknown template field '{field}' at offset {offset}")]
    UnknownField {
        /// The field as written.
        field: String,
        /// Byte offset of the action in the template.
        offset: usize,
    },

    /// A function was given an argument it cannot accept.
    #[error("template function '{name}' cannot take argument '{argument}' (expected '{expected}')")]
    InvalidArgument {
        /// The function name.
        name: String,
        /// The argument as written.
        argument: String,
        /// The argument the function accepts.
        expected: String,
    },

    /// An action is empty or has too many tokens.
    #[error("malformed template action '{action}' at offset {offset}")]
    MalformedAction {
        /// The action body as written.
        action: String,
        /// Byte offset of the action in the template.
        offset: usize,
    },

    /// A `{{` has no matching `}}`.
    #[error("unterminated template action at offset {offset}")]
    Unterminated {
        /// Byte offset of the opening delimiter.
        offset: usize,
    },

    /// No template text was given.
    #[error("no template given")]
    Empty,
}

/// Errors raised by filesystem operations on shard files.
#[derive(Error, Debug)]
pub enum StorageIoError {
    /// A shard directory could not be created.
    #[error("failed to create directory '{}': {source}", path.display())]
    CreateDir {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A shard file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A temporary file could not be created next to the target.
    #[error("failed to create temporary file in '{}': {source}", dir.display())]
    CreateTemp {
        /// The directory the temporary file was to be created in.
        dir: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing or syncing the temporary file failed.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        /// The temporary file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The temporary file could not be renamed onto the target.
    #[error("failed to rename onto '{}': {source}", path.display())]
    Rename {
        /// The target path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A shard path is absolute or climbs out of the store root.
    #[error("shard path '{}' escapes the store root", path.display())]
    OutsideRoot {
        /// The relative path as routed.
        path: PathBuf,
    },

    /// Encoded records could not be flushed into memory.
    #[error("failed to encode records: {source}")]
    Encode {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The configuration file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::StorageConfig`].
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The configuration file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, ShardError>`.
pub type Result<T> = std::result::Result<T, ShardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_line_rewrites_line() {
        let err = FormatError::FieldCount { line: 0, count: 2 }.at_line(7);
        assert_eq!(err.line(), Some(7));
        assert_eq!(err.to_string(), "line 7: invalid sample element length: 2");
    }

    #[test]
    fn test_epoch_range_display() {
        let err = FormatError::EpochRange {
            line: 0,
            value: "+10000-01-01T00:00:00Z".to_string(),
        }
        .at_line(4);
        assert_eq!(err.line(), Some(4));
        assert_eq!(
            err.to_string(),
            "line 4: sample time out of range: +10000-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_wrapped_error_display() {
        let err: ShardError = TemplateError::Empty.into();
        assert_eq!(err.to_string(), "template error: no template given");
    }
}
