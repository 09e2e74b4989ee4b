//! Error kinds shared by every subsystem in this crate.
//!
//! One flat enum, a manual `Display`, and `From` impls at the i/o boundary,
//! rather than pulling in a derive-macro error crate.

use std::fmt;
use std::io;
use std::string::FromUtf8Error;

pub type CResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    InvalidSyntax(String),
    TableNotFound(String),
    TableAlreadyExists(String),
    ColumnNotFound(String),
    InvalidColumnType(String),
    DimensionMismatch { expected: usize, got: usize },
    DuplicateEmbeddingDimension(usize),
    TooManyEmbeddings(String),

    TransactionAlreadyActive,
    NoActiveTransaction,
    TransactionNotActive(u64),

    IndexNotFound(String),
    IndexAlreadyExists(String),
    RowNotFound(u64),

    DuplicateExternalId(u64),
    NodeNotFound(u64),
    EdgeNotFound { src: u64, dst: u64, edge_type: String },
    SourceNodeNotFound(u64),
    DestinationNodeNotFound(u64),

    InvalidWalMagic,
    UnsupportedWalVersion(u32),
    ChecksumMismatch,
    InvalidRecordType(u8),
    BufferTooSmall,
    WalDiskQuotaExceeded { requested: u64, quota: u64 },

    AbsolutePathNotAllowed(String),
    PathTraversalNotAllowed(String),
    InvalidWalPath(String),
    WalPathTooLong(usize),
    SymlinkNotAllowed(String),
    CannotDeleteCurrentWalFile(String),

    Io(String),
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSyntax(msg) => write!(f, "invalid syntax: {msg}"),
            Error::TableNotFound(name) => write!(f, "table not found: {name}"),
            Error::TableAlreadyExists(name) => write!(f, "table already exists: {name}"),
            Error::ColumnNotFound(name) => write!(f, "column not found: {name}"),
            Error::InvalidColumnType(msg) => write!(f, "invalid column type: {msg}"),
            Error::DimensionMismatch { expected, got } => {
                write!(f, "embedding dimension mismatch: expected {expected}, got {got}")
            }
            Error::DuplicateEmbeddingDimension(dim) => {
                write!(f, "duplicate embedding dimension in schema: {dim}")
            }
            Error::TooManyEmbeddings(name) => {
                write!(f, "too many embedding columns for table: {name}")
            }
            Error::TransactionAlreadyActive => write!(f, "transaction already active"),
            Error::NoActiveTransaction => write!(f, "no active transaction"),
            Error::TransactionNotActive(txid) => write!(f, "transaction not active: {txid}"),
            Error::IndexNotFound(name) => write!(f, "index not found: {name}"),
            Error::IndexAlreadyExists(name) => write!(f, "index already exists: {name}"),
            Error::RowNotFound(row_id) => write!(f, "row not found: {row_id}"),
            Error::DuplicateExternalId(id) => write!(f, "duplicate external id: {id}"),
            Error::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Error::EdgeNotFound { src, dst, edge_type } => {
                write!(f, "edge not found: {src} -> {dst} ({edge_type})")
            }
            Error::SourceNodeNotFound(id) => write!(f, "source node not found: {id}"),
            Error::DestinationNodeNotFound(id) => write!(f, "destination node not found: {id}"),
            Error::InvalidWalMagic => write!(f, "invalid wal file magic"),
            Error::UnsupportedWalVersion(v) => write!(f, "unsupported wal version: {v}"),
            Error::ChecksumMismatch => write!(f, "wal record checksum mismatch"),
            Error::InvalidRecordType(t) => write!(f, "invalid wal record type: {t}"),
            Error::BufferTooSmall => write!(f, "buffer too small"),
            Error::WalDiskQuotaExceeded { requested, quota } => write!(
                f,
                "wal disk quota exceeded: requested {requested} bytes, quota is {quota} bytes"
            ),
            Error::AbsolutePathNotAllowed(p) => write!(f, "absolute path not allowed: {p}"),
            Error::PathTraversalNotAllowed(p) => write!(f, "path traversal not allowed: {p}"),
            Error::InvalidWalPath(p) => write!(f, "invalid wal path: {p}"),
            Error::WalPathTooLong(len) => write!(f, "wal path too long: {len} bytes"),
            Error::SymlinkNotAllowed(p) => write!(f, "symlink not allowed: {p}"),
            Error::CannotDeleteCurrentWalFile(p) => {
                write!(f, "cannot delete current wal file: {p}")
            }
            Error::Io(msg) => write!(f, "i/o error: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Self {
        Error::Internal(err.to_string())
    }
}
