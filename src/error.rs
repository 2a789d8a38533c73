//! Hard failure cases. Benign no-ops (undo at the floor of history, snap
//! with nothing selected, ...) are `bool` returns on the operations
//! themselves, not errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The imported document is not a recognizable save file. The session
    /// state is untouched when this is returned.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Export was requested with no tracks in the store.
    #[error("nothing to export")]
    NothingToExport,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
