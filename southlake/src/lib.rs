use std::path::{Path, PathBuf};

use southlake_core::DatabaseManager;
use southlake_core::editor::EditorRegistry;
use southlake_core::store::DATABASE_EXTENSION;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod commands;

pub struct AppContext {
    pub manager: DatabaseManager,
    pub editors: EditorRegistry,
}

impl AppContext {
    pub async fn open(store: &Path, name: &str) -> anyhow::Result<Self> {
        let manager = DatabaseManager::open_named(store, name).await
            .map_err(|e| anyhow::anyhow!("Failed to open database {} in {}: {}", name, store.display(), e))?;
        Ok(AppContext { manager, editors: EditorRegistry::with_default_editors() })
    }
}

/// Installs the log subscriber. `RUST_LOG` takes precedence over the flags.
pub fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}

/// The directory the database should be opened in.
///
/// An explicit directory is used as is. Otherwise the current directory and its
/// parents are searched for one already containing the database; if none does,
/// the current directory is used.
pub fn resolve_store(explicit: Option<PathBuf>, name: &str) -> anyhow::Result<PathBuf> {
    if let Some(store) = explicit {
        return Ok(store);
    }
    let current = std::env::current_dir()?;
    let database_dir = format!("{name}.{DATABASE_EXTENSION}");
    let found = current.ancestors().find(|dir| dir.join(&database_dir).is_dir());
    Ok(found.map(Path::to_path_buf).unwrap_or(current))
}
