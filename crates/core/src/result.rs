//! Core results and error types

use thiserror::Error;

/// Core error type encompassing all core module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read file at the specified path.
    #[error("could not read file '{path}': {source}")]
    FileRead {
        /// The path to the file that could not be read.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A type or method descriptor is malformed.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// A constant literal could not be parsed or does not fit its push form.
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),

    /// A member declaration (`[owner;]name[(args)ret]` / `[owner;]name:type`) is malformed.
    #[error("invalid member declaration: {0}")]
    InvalidMember(String),

    /// The opcode name or number is not part of the instruction set.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    /// A jump references a label that is not placed in the same sequence.
    #[error("dangling label L{0}")]
    DanglingLabel(u32),

    /// The same label is placed more than once.
    #[error("label L{0} placed twice")]
    DuplicateLabel(u32),

    /// A node handle does not refer to a live node of the sequence.
    #[error("no live node with id {0}")]
    UnknownNode(u32),

    /// Failed to parse assembly at the specified line.
    #[error("assembly parse error at line {line}: {msg} ⇒ `{raw}`")]
    ParseError {
        /// The line number where parsing failed.
        line: usize,
        /// Description of the parsing error.
        msg: String,
        /// The raw content that failed to parse.
        raw: String,
    },

    /// Unit encoding or decoding failed.
    #[error("unit codec failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// Opaque operand bytes are not valid hex.
    #[error("hex decode failed: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
