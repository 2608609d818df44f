use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemaError {
    #[error("CLI error: {0}")]
    CliError(String),

    /// Invariant violation: unsorted input, a record outside the graph
    /// window, or a malformed alignment.
    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("could not open {0}")]
    OpenFile(String),

    #[error("could not read {0}")]
    ReadFile(String),

    #[error("could not write {0}")]
    WriteFile(String),

    #[error("thread error: {0}")]
    Thread(String),

    #[error("parsing error: {0}")]
    ParsingError(String),

    #[error("state error: {0}")]
    StateError(String),

    #[error("file IO error: {0}")]
    FileIOError(#[from] std::io::Error),

    #[error("ParseInt error {0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("UTF-8 decoding error: {0}")]
    Utf8DecodingError(#[from] std::str::Utf8Error),

    #[error("invalid position: {0}")]
    InvalidPosition(#[from] noodles::core::position::TryFromIntError),
}
