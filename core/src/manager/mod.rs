//! The application's view of the database.
//!
//! [`DatabaseManager`] opens the store, registers the record types and views, and
//! keeps three projections up to date through live queries:
//!
//! - the sections, sorted by index, with their child data sources resolved,
//! - the tags with the number of files carrying each,
//! - the files.
//!
//! Each live query is created and started the first time its projection is read.
//! Reads never wait: until the first result has been delivered they return `None`.
//! [`DatabaseManager::settle`] waits for every started projection to catch up with
//! the writes made so far.
//!
//! The children of each section are reloaded whenever the database changes, so
//! they follow child documents written or edited after their section.
//!
//! Whenever the sections or their children change, the significant nodes (the
//! notebook, shortcuts, folders and smart folders sections and the library,
//! calendar, tags and inbox sources) are located in them until the library has
//! been found. Missing nodes are logged and reported by
//! [`DatabaseManager::missing_significant_nodes`], never fatal.

pub mod bootstrap;
pub mod significant;
pub mod views;
mod projection;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::event::Listener;
use crate::model::{DataSource, ModelRegistry, RegistryError, Section, Tag};
use crate::store::{self, Database, LiveQuery, Query, Refreshed, RowsChanged};

use self::projection::Projections;
use self::significant::{MissingSignificantNode, SignificantNodes};
use self::views::{FILES_VIEW, SECTIONS_VIEW, TAGS_VIEW};

pub const DEFAULT_DATABASE_NAME: &str = "southlake";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] store::Error),

    #[error("Model registration failed: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, Error>;

// A started live query and the listeners that feed a projection from it.
struct Subscription {
    live_query: Arc<LiveQuery>,
    _rows_changed: Listener<RowsChanged>,
    _refreshed: Option<Listener<Refreshed>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("view", &self.live_query.query().view()).finish()
    }
}

#[derive(Debug)]
pub struct DatabaseManager {
    database: Arc<Database>,
    models: Arc<ModelRegistry>,
    projections: Arc<Projections>,
    sections_query: OnceLock<Subscription>,
    tags_query: OnceLock<Subscription>,
    files_query: OnceLock<Subscription>,
}

impl DatabaseManager {
    /// Opens (or creates) the `southlake` database in `directory`.
    pub async fn open(directory: &Path) -> Result<Self> {
        Self::open_named(directory, DEFAULT_DATABASE_NAME).await
    }

    pub async fn open_named(directory: &Path, name: &str) -> Result<Self> {
        Self::open_with(directory, name, |_| Ok(())).await
    }

    /// Opens the database with the default record types plus whatever `register`
    /// adds to the registry.
    #[instrument(skip(register))]
    pub async fn open_with<F>(directory: &Path, name: &str, register: F) -> Result<Self>
    where
        F: FnOnce(&mut ModelRegistry) -> std::result::Result<(), RegistryError>,
    {
        let mut models = ModelRegistry::with_default_models();
        register(&mut models)?;

        let database = Database::open(directory, name).await?;
        views::define_views(&database);
        debug!("Opened database {} with {} documents", database.name(), database.document_count());

        Ok(DatabaseManager {
            database,
            models: Arc::new(models),
            projections: Arc::new(Projections::default()),
            sections_query: OnceLock::new(),
            tags_query: OnceLock::new(),
            files_query: OnceLock::new(),
        })
    }

    /// The underlying database, for writes. Projections follow writes once the
    /// corresponding live query has refreshed.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    // --- Projections ---

    /// All sections in ascending index order, with their children resolved.
    pub fn sections(&self) -> Option<Arc<Vec<Section>>> {
        self.sections_subscription();
        self.projections.sections()
    }

    /// Every tag used by a file, with its file count.
    pub fn tags(&self) -> Option<Arc<Vec<Tag>>> {
        self.tags_query.get_or_init(|| {
            let projections = self.projections.clone();
            self.subscribe(Query::new(TAGS_VIEW).group_level(1), move |event| {
                projections.update_tags(&event.rows);
            })
        });
        self.projections.tags()
    }

    pub fn files(&self) -> Option<Arc<Vec<DataSource>>> {
        self.files_query.get_or_init(|| {
            let projections = self.projections.clone();
            let models = self.models.clone();
            self.subscribe(Query::new(FILES_VIEW), move |event| {
                projections.update_files(&event.rows, &models);
            })
        });
        self.projections.files()
    }

    // Sections are rebuilt when the view rows change. Their children live in other
    // documents, so those are reloaded after every refresh of the query.
    fn sections_subscription(&self) -> &Subscription {
        self.sections_query.get_or_init(|| {
            let mut subscription = {
                let projections = self.projections.clone();
                let database = self.database.clone();
                let models = self.models.clone();
                self.subscription(Query::new(SECTIONS_VIEW), move |event| {
                    projections.update_sections(&event.rows, &database, &models);
                })
            };

            let projections = self.projections.clone();
            let database = self.database.clone();
            let models = self.models.clone();
            subscription._refreshed = Some(Listener::new(&subscription.live_query.on.refreshed, move |_| {
                projections.refresh_children(&database, &models);
            }));
            subscription.live_query.start();
            subscription
        })
    }

    fn subscribe<F>(&self, query: Query, on_change: F) -> Subscription
    where
        F: Fn(&RowsChanged) + Send + Sync + 'static,
    {
        let subscription = self.subscription(query, on_change);
        subscription.live_query.start();
        subscription
    }

    // Listeners are registered before the query starts so the first delivery is
    // not missed.
    fn subscription<F>(&self, query: Query, on_change: F) -> Subscription
    where
        F: Fn(&RowsChanged) + Send + Sync + 'static,
    {
        let live_query = LiveQuery::new(self.database.clone(), query);
        let listener = Listener::new(&live_query.on.rows_changed, on_change);
        Subscription { live_query, _rows_changed: listener, _refreshed: None }
    }

    /// Waits until every projection that has been read at least once reflects all
    /// writes made before this call.
    pub async fn settle(&self) -> Result<()> {
        let subscriptions = [&self.sections_query, &self.tags_query, &self.files_query];
        for subscription in subscriptions.into_iter().filter_map(OnceLock::get) {
            subscription.live_query.wait_until_current().await?;
        }
        Ok(())
    }

    // --- Significant nodes ---

    /// A snapshot of every significant node reference.
    pub fn significant_nodes(&self) -> SignificantNodes {
        self.significant(|nodes| nodes.clone())
    }

    /// The significant nodes the last resolution reported missing. Empty before the
    /// sections have been delivered, and frozen once the library has been found.
    pub fn missing_significant_nodes(&self) -> Vec<MissingSignificantNode> {
        self.sections_subscription();
        self.projections.missing_significant()
    }

    fn significant<T>(&self, f: impl FnOnce(&SignificantNodes) -> T) -> T {
        // The sections drive resolution.
        self.sections_subscription();
        self.projections.with_significant(f)
    }

    pub fn notebook_section(&self) -> Option<Section> {
        self.significant(|nodes| nodes.notebook_section.clone())
    }

    pub fn shortcuts_section(&self) -> Option<Section> {
        self.significant(|nodes| nodes.shortcuts_section.clone())
    }

    pub fn folders_section(&self) -> Option<Section> {
        self.significant(|nodes| nodes.folders_section.clone())
    }

    pub fn smart_folders_section(&self) -> Option<Section> {
        self.significant(|nodes| nodes.smart_folders_section.clone())
    }

    pub fn library_source(&self) -> Option<DataSource> {
        self.significant(|nodes| nodes.library_source.clone())
    }

    pub fn calendar_source(&self) -> Option<DataSource> {
        self.significant(|nodes| nodes.calendar_source.clone())
    }

    pub fn tags_source(&self) -> Option<DataSource> {
        self.significant(|nodes| nodes.tags_source.clone())
    }

    pub fn inbox_source(&self) -> Option<DataSource> {
        self.significant(|nodes| nodes.inbox_source.clone())
    }

    pub fn trash_source(&self) -> Option<DataSource> {
        self.significant(|nodes| nodes.trash_source.clone())
    }
}
