//! Data layer of South Lake.
//!
//! - [`store`]: an embedded JSON document database with versioned map/reduce views
//!   and live queries.
//! - [`model`]: the typed records (sections, folders, files...) stored in it.
//! - [`manager`]: the cached, always up-to-date projections the application reads,
//!   and the special nodes located in them.
//! - [`editor`]: chooses an editor for a file.

pub mod editor;
pub mod event;
pub mod manager;
pub mod model;
pub mod store;

pub use manager::DatabaseManager;
