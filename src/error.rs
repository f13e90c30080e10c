use thiserror::Error;

/// Errors raised by the storage, transaction, and execution core.
///
/// `LockAbort`/`BufferAbort` are expected to drive the caller to
/// `Transaction::rollback`; `BadSyntax` is returned to the SQL caller without
/// affecting the rest of the transaction; `Io` is fatal to the enclosing
/// operation.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("cannot access block: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad syntax: {0}")]
    BadSyntax(String),

    #[error("lock abort")]
    LockAbort,

    #[error("buffer abort")]
    BufferAbort,

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
