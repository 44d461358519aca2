use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The error type covering everything this library can fail with.
///
/// Errors bubble up unchanged to the [`crate::PeLoader`] entry points: callers
/// either receive a fully formed value or one of these. The single deliberate
/// exception is an unresolved metadata token, which is not an error at all:
/// the IL reader degrades to a stringified token and the exception-table
/// fixup leaves the raw token in place (see [`crate::il::IlReader::read_token`]).
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged or violates the format and could not be parsed.
    ///
    /// Covers malformed PE structures, invalid signature grammar, unexpected
    /// calling-convention bytes, and similar format-level breakage. Carries
    /// the source location that detected the problem.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of bound read would have occurred!")]
    OutOfBounds,

    /// This file uses a feature the library does not handle.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE container parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Recursion limit reached.
    ///
    /// Signature grammars nest (arrays of arrays, pointer chains); a depth
    /// cap prevents stack overflow on malicious blobs. The associated value
    /// is the limit that was hit.
    #[error("Reached the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The metadata backend refused an operation.
    ///
    /// Raised when a [`crate::metadata::import::MetadataImport`] operation is
    /// asked about a token that does not exist in its scope, or the scope
    /// itself could not be opened.
    #[error("Metadata operation failed: {0}")]
    Metadata(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
