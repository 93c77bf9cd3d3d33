// src/error.rs
// Error type for the plumbing around the draw engine (files, persistence, requests).
// The engine itself never fails: malformed draws are silent no-ops.

use std::path::PathBuf;

use crate::defs::{BaseId, Number, PrizeId};

#[derive(Debug, thiserror::Error)]
pub enum BingoError {
    /// A ticket source file could not be read
    #[error("failed to read ticket source {}: {source}", .path.display())]
    TicketSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Session record or request body is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session '{0}' already exists")]
    SessionExists(String),

    /// Session ids name files on disk
    #[error("invalid session id '{0}': use letters, digits, '-' or '_'")]
    InvalidSessionId(String),

    #[error("prize {0} not found")]
    PrizeNotFound(PrizeId),

    #[error("unknown prize type '{0}'")]
    UnknownPrizeKind(String),

    /// A session references a base id twice
    #[error("base {0} declared more than once")]
    DuplicateBase(BaseId),

    #[error("invalid barcode '{0}'")]
    InvalidBarcode(String),

    /// The ball was out of range or already drawn
    #[error("number {0} rejected: out of range or already drawn")]
    DrawRejected(Number),

    #[error("no drawn numbers to undo")]
    NothingToUndo,

    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A mutex guarding shared state was poisoned by a panicking holder
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

pub type BingoResult<T> = Result<T, BingoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        assert_eq!(BingoError::SessionNotFound("s1".to_string()).to_string(), "session 's1' not found");
        assert_eq!(BingoError::DrawRejected(80).to_string(), "number 80 rejected: out of range or already drawn");
        assert_eq!(BingoError::UnknownPrizeKind("linha".to_string()).to_string(), "unknown prize type 'linha'");
        assert_eq!(BingoError::LockPoisoned("catalog cache").to_string(), "catalog cache lock poisoned");
    }

    #[test]
    fn test_io_error_has_source() {
        let err: BingoError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, BingoError::Io(_)));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_ticket_source_names_path_and_keeps_cause() {
        let err = BingoError::TicketSource {
            path: PathBuf::from("bases/main.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.to_string(), "failed to read ticket source bases/main.txt: missing");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_error_converts() {
        let err: BingoError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert!(matches!(err, BingoError::Json(_)));
        assert!(err.to_string().starts_with("invalid JSON: "));
    }
}
