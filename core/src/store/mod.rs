//! A small, file-backed document database with map/reduce views and live queries.
//!
//! # Core Concepts
//!
//! *   **[`Database`]:** A named collection of schema-less JSON [`Document`]s stored in
//!     a directory. Opened with [`Database::open`], which creates the directory layout
//!     on first use. Every write is checked against the document's revision
//!     (optimistic concurrency) and advances the database's change sequence.
//! *   **[`View`]:** A named, versioned map (and optional reduce) function. The
//!     database keeps an index of everything the map function emitted for each
//!     document and updates it incrementally on every write. Redefining a view with the
//!     same version keeps its index; bumping the version rebuilds it.
//! *   **[`Query`]:** Reads a view's rows in key order, optionally reduced and grouped.
//! *   **[`LiveQuery`]:** A query the database keeps current. After
//!     [`LiveQuery::start`], every change to the database re-runs the query and, when
//!     the rows differ, dispatches [`RowsChanged`] to the registered listeners. Every
//!     refresh also dispatches [`Refreshed`].
//!
//! # On-disk Layout
//!
//! ```text
//! <directory>/
//!     <name>.sldb/
//!         manifest.json      database id and format version
//!         docs/
//!             <id>.json      one file per document
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use southlake_core::store::{Database, Document, Query, View};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = tempfile::tempdir()?;
//!     let db = Database::open(dir.path(), "notes").await?;
//!
//!     db.define_view(View::new("by_type", "1", |doc, emit| {
//!         if let Some(ty) = doc.doc_type() {
//!             emit.emit(json!(ty), json!(1));
//!         }
//!     }));
//!
//!     let mut doc = Document::new();
//!     doc.set("type", json!("file"));
//!     db.put(doc).await?;
//!
//!     let rows = db.query(&Query::new("by_type"))?;
//!     assert_eq!(rows.len(), 1);
//!     Ok(())
//! }
//! ```

pub use self::database::Database;
pub use self::document::Document;
pub use self::live_query::{LiveQuery, LiveQueryEvents, Refreshed, RowsChanged};
pub use self::query::{Query, QueryRow};
pub use self::view::{collate, Emitter, MapFn, ReduceFn, View};

mod database;
mod document;
mod live_query;
mod query;
mod view;

use std::path::PathBuf;
use thiserror::Error;

/// Extension of the directory holding a database.
pub const DATABASE_EXTENSION: &str = "sldb";
pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const DOCUMENTS_DIR_NAME: &str = "docs";
/// Highest manifest format this build can read.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid database name: {0:?}")]
    InvalidDatabaseName(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Database is corrupt or unreadable: {0}")]
    CorruptDatabase(PathBuf),

    #[error("Database format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Document serialization/deserialization error")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid document id: {0:?}")]
    InvalidDocumentId(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Revision conflict on document {id}: expected {expected:?}, found {actual:?}")]
    RevisionConflict {
        id: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("No view named {0:?} has been defined")]
    UnknownView(String),

    #[error("Live query has not been started")]
    LiveQueryNotStarted,

    #[error("Live query was stopped")]
    LiveQueryStopped,
}

impl Error {
    /// Whether this error came out of opening a database, as opposed to a read,
    /// write or query against an open one.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidDatabaseName(_)
                | Error::NotADirectory(_)
                | Error::CorruptDatabase(_)
                | Error::UnsupportedVersion { .. }
                | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
