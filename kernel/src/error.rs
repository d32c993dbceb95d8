//! Definitions of errors that the reader can encounter

use std::backtrace::{Backtrace, BacktraceStatus};
use std::string::FromUtf8Error;

use crate::Version;

/// A [`std::result::Result`] that has the reader [`Error`] as the error variant
pub type DeltaResult<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that the reader can run into
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// This is an error that includes a backtrace. To have a particular type of error include such
    /// backtrace (when RUST_BACKTRACE=1), annotate the error with `#[error(transparent)]` and then
    /// add the error type and enum variant to the `from_with_backtrace!` macro invocation below.
    /// See IOError for an example.
    #[error("{source}\n{backtrace}")]
    Backtraced {
        source: Box<Self>,
        backtrace: Box<Backtrace>,
    },

    /// A single log line or checkpoint row could not be decoded into an action
    #[error("Failed to parse log action: {0}")]
    ParseError(String),

    /// A file in `_delta_log` whose name matches none of the known patterns
    #[error("Unrecognized file in the transaction log: {0}")]
    UnrecognizedLogFile(String),

    /// There is no log at the given location, and no checkpoint hint pointed at one
    #[error("No delta table found at {0}")]
    TableNotFound(String),

    /// The log is structurally broken: a commit is missing or a file is misplaced
    #[error("Invalid table: {0}")]
    InvalidTable(String),

    /// The selected checkpoint is missing some of the files it is made of
    #[error("Corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),

    /// The requested version is newer than anything the log contains
    #[error("Version {requested} not found, latest available version is {latest}")]
    VersionNotFound { requested: Version, latest: Version },

    /// Reached the start of the log segment without finding a protocol action
    #[error("No protocol found at version {0}")]
    MissingProtocol(Version),

    /// Reached the start of the log segment without finding a metadata action
    #[error("No table metadata found at version {0}")]
    MissingMetadata(Version),

    /// The table requires a reader version this crate does not implement
    #[error("Unsupported minimum reader version {0}")]
    UnsupportedProtocolVersion(i32),

    /// The table lists reader features that are not supported
    #[error("Unsupported reader features: {}", .0.join(", "))]
    UnsupportedReaderFeatures(Vec<String>),

    /// `delta.columnMapping.mode` has a value other than none, id or name
    #[error("Unsupported column mapping mode: {0}")]
    UnsupportedColumnMapping(String),

    /// An error performing operations on an object store
    #[cfg(feature = "default-engine")]
    #[error("Error interacting with object store: {0}")]
    ObjectStore(object_store::Error),

    /// An error converting a path into an object store path
    #[cfg(feature = "default-engine")]
    #[error("Object store path error: {0}")]
    ObjectStorePath(#[from] object_store::path::Error),

    /// An error decoding a parquet checkpoint
    #[cfg(feature = "default-engine")]
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A generic error with a message
    #[error("Generic delta log error: {0}")]
    Generic(String),

    /// A generic error wrapping another error
    #[error("Generic error: {source}")]
    GenericError {
        /// Source error
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// An error performing IO operations
    #[error(transparent)]
    IOError(std::io::Error),

    /// A file that was expected to exist was not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The JSON content of a file could not be parsed
    #[error(transparent)]
    MalformedJson(serde_json::Error),

    /// A url could not be parsed or joined
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// File content was not valid utf-8
    #[error("Could not convert to string from utf-8: {0}")]
    Utf8Error(#[from] FromUtf8Error),
}

// Convenience constructors for Error types that take a String argument
impl Error {
    pub fn generic_err(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::GenericError {
            source: source.into(),
        }
    }
    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }
    pub fn file_not_found(path: impl ToString) -> Self {
        Self::FileNotFound(path.to_string())
    }
    pub fn parse(msg: impl ToString) -> Self {
        Self::ParseError(msg.to_string())
    }
    pub fn unrecognized_log_file(name: impl ToString) -> Self {
        Self::UnrecognizedLogFile(name.to_string())
    }
    pub fn table_not_found(location: impl ToString) -> Self {
        Self::TableNotFound(location.to_string())
    }
    pub fn invalid_table(msg: impl ToString) -> Self {
        Self::InvalidTable(msg.to_string())
    }
    pub fn corrupt_checkpoint(msg: impl ToString) -> Self {
        Self::CorruptCheckpoint(msg.to_string())
    }
    pub fn unsupported_column_mapping(mode: impl ToString) -> Self {
        Self::UnsupportedColumnMapping(mode.to_string())
    }

    /// True for every error that means the log is structurally broken, as opposed to unsupported
    /// or unreadable.
    pub fn is_invalid_table(&self) -> bool {
        match self {
            Self::InvalidTable(_) | Self::CorruptCheckpoint(_) => true,
            Self::Backtraced { source, .. } => source.is_invalid_table(),
            _ => false,
        }
    }

    /// Strip a [`Error::Backtraced`] wrapper, if any.
    pub fn into_inner(self) -> Self {
        match self {
            Self::Backtraced { source, .. } => source.into_inner(),
            err => err,
        }
    }

    // Capture a backtrace when the error is constructed.
    #[must_use]
    pub fn with_backtrace(self) -> Self {
        let backtrace = Backtrace::capture();
        match backtrace.status() {
            BacktraceStatus::Captured => Self::Backtraced {
                source: Box::new(self),
                backtrace: Box::new(backtrace),
            },
            _ => self,
        }
    }
}

macro_rules! from_with_backtrace(
    ( $(($error_type: ty, $error_variant: ident)), * ) => {
        $(
            impl From<$error_type> for Error {
                fn from(value: $error_type) -> Self {
                    Self::$error_variant(value).with_backtrace()
                }
            }
        )*
    };
);

from_with_backtrace!(
    (serde_json::Error, MalformedJson),
    (std::io::Error, IOError)
);

#[cfg(feature = "default-engine")]
impl From<object_store::Error> for Error {
    fn from(value: object_store::Error) -> Self {
        match value {
            object_store::Error::NotFound { path, .. } => Self::file_not_found(path),
            err => Self::ObjectStore(err),
        }
    }
}
