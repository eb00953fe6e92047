use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use clap::crate_version;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::document::{next_revision, validate_id};
use super::query::{self, IndexEntry};
use super::{
    collate, Document, Error, Query, QueryRow, Result, View, DATABASE_EXTENSION,
    DOCUMENTS_DIR_NAME, FORMAT_VERSION, MANIFEST_FILENAME,
};

/// A named document database stored in a directory.
///
/// All reads are served from memory. Writes go to disk first and are applied in
/// memory only once the file is written, so a failed write leaves the database
/// unchanged. Each successful write advances [`Database::sequence`] and wakes
/// every receiver returned by [`Database::subscribe`].
#[derive(Debug)]
pub struct Database {
    name: String,
    // Absolute path to the `<name>.sldb` directory
    path: PathBuf,
    id: Uuid,
    state: RwLock<State>,
    // Serializes writers; never held by readers
    write_lock: Mutex<()>,
    changes: watch::Sender<u64>,
    runtime: Handle,
    live_queries_started: AtomicUsize,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<String, Document>,
    views: HashMap<String, ViewIndex>,
    sequence: u64,
}

impl State {
    fn apply_put(&mut self, document: Document) {
        for index in self.views.values_mut() {
            index.update(&document);
        }
        self.documents.insert(document.id().to_string(), document);
        self.sequence += 1;
    }

    fn apply_delete(&mut self, id: &str) {
        for index in self.views.values_mut() {
            index.remove(id);
        }
        self.documents.remove(id);
        self.sequence += 1;
    }
}

/// Everything one view emitted, kept sorted by key and then document id.
#[derive(Debug)]
struct ViewIndex {
    view: Arc<View>,
    entries: Vec<IndexEntry>,
}

impl ViewIndex {
    fn build<'a>(view: View, documents: impl Iterator<Item = &'a Document>) -> Self {
        let mut index = ViewIndex { view: Arc::new(view), entries: Vec::new() };
        for document in documents {
            index.insert(document);
        }
        index
    }

    fn insert(&mut self, document: &Document) {
        for (key, value) in self.view.map(document) {
            let position = self.entries.partition_point(|e| {
                collate(&e.key, &key).then_with(|| e.doc_id.as_str().cmp(document.id())).is_le()
            });
            self.entries.insert(position, IndexEntry { key, value, doc_id: document.id().to_string() });
        }
    }

    fn remove(&mut self, id: &str) {
        self.entries.retain(|e| e.doc_id != id);
    }

    fn update(&mut self, document: &Document) {
        self.remove(document.id());
        self.insert(document);
    }
}

/// Stored in `<name>.sldb/manifest.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct DatabaseManifest {
    id: Uuid,
    /// Format version of the on-disk layout.
    version: u32,
    /// Version of the library that created the database.
    created_by: String,
}

impl DatabaseManifest {
    fn new() -> Self {
        DatabaseManifest {
            id: Uuid::new_v4(),
            version: FORMAT_VERSION,
            created_by: crate_version!().to_string(),
        }
    }
}

impl Database {
    /// Opens the database `name` inside `directory`, creating the directory and an
    /// empty database if needed.
    ///
    /// Must be called from within a tokio runtime; live queries on this database are
    /// spawned onto that runtime.
    #[instrument(skip(directory), fields(directory = %directory.display()))]
    pub async fn open(directory: &Path, name: &str) -> Result<Arc<Database>> {
        validate_name(name)?;

        match fs::metadata(directory).await {
            Ok(meta) if !meta.is_dir() => return Err(Error::NotADirectory(directory.to_path_buf())),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store directory does not exist, creating it");
                fs::create_dir_all(directory).await?;
            }
            Err(e) => return Err(Error::Io(e)),
        }

        let path = directory.join(format!("{}.{}", name, DATABASE_EXTENSION));
        let manifest_path = path.join(MANIFEST_FILENAME);
        let docs_dir = path.join(DOCUMENTS_DIR_NAME);

        let manifest = match fs::metadata(&path).await {
            Ok(meta) if !meta.is_dir() => return Err(Error::NotADirectory(path)),
            Ok(_) => read_manifest(&manifest_path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Creating new database at {}", path.display());
                fs::create_dir_all(&docs_dir).await?;
                let manifest = DatabaseManifest::new();
                write_manifest(&manifest_path, &manifest).await?;
                manifest
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if manifest.version > FORMAT_VERSION {
            return Err(Error::UnsupportedVersion { found: manifest.version, supported: FORMAT_VERSION });
        }

        fs::create_dir_all(&docs_dir).await?;
        let documents = load_documents(&docs_dir).await?;
        debug!("Opened database {} with {} documents", name, documents.len());

        let (changes, _) = watch::channel(0);
        Ok(Arc::new(Database {
            name: name.to_string(),
            path,
            id: manifest.id,
            state: RwLock::new(State { documents, ..State::default() }),
            write_lock: Mutex::new(()),
            changes,
            runtime: Handle::current(),
            live_queries_started: AtomicUsize::new(0),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the `<name>.sldb` directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unique id assigned when the database was created.
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.path.join(DOCUMENTS_DIR_NAME).join(format!("{}.json", id))
    }

    // --- Documents ---

    pub fn get(&self, id: &str) -> Option<Document> {
        self.read_state().documents.get(id).cloned()
    }

    /// All documents, ordered by id.
    pub fn all_documents(&self) -> Vec<Document> {
        self.read_state().documents.values().cloned().collect()
    }

    pub fn document_count(&self) -> usize {
        self.read_state().documents.len()
    }

    /// Saves `document` and returns it with its new revision.
    ///
    /// The document's revision must match the stored one (`None` for a document
    /// that does not exist yet), otherwise the write is rejected with
    /// [`Error::RevisionConflict`].
    #[instrument(skip(self, document), fields(id = %document.id()))]
    pub async fn put(&self, mut document: Document) -> Result<Document> {
        validate_id(document.id())?;
        let _guard = self.write_lock.lock().await;

        let current = self.current_revision(document.id());
        if current.as_deref() != document.rev() {
            return Err(Error::RevisionConflict {
                id: document.id().to_string(),
                expected: document.rev().map(str::to_string),
                actual: current,
            });
        }
        document.set_rev(Some(next_revision(current.as_deref())));

        let content = serde_json::to_vec_pretty(&document.to_value())?;
        let path = self.document_path(document.id());
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, content).await?;
        fs::rename(&temp, &path).await?;

        let sequence = {
            let mut state = self.write_state();
            state.apply_put(document.clone());
            state.sequence
        };
        self.changes.send_replace(sequence);
        debug!("Saved document at revision {:?} (sequence {})", document.rev(), sequence);
        Ok(document)
    }

    /// Deletes the document `id`, which must be at revision `rev`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, rev: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let current = self.current_revision(id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        if current != rev {
            return Err(Error::RevisionConflict {
                id: id.to_string(),
                expected: Some(rev.to_string()),
                actual: Some(current),
            });
        }

        fs::remove_file(self.document_path(id)).await?;

        let sequence = {
            let mut state = self.write_state();
            state.apply_delete(id);
            state.sequence
        };
        self.changes.send_replace(sequence);
        debug!("Deleted document (sequence {})", sequence);
        Ok(())
    }

    fn current_revision(&self, id: &str) -> Option<String> {
        self.read_state().documents.get(id).and_then(|d| d.rev().map(str::to_string))
    }

    // --- Views ---

    /// Registers `view`, indexing every document.
    ///
    /// If a view with the same name and version is already defined this does
    /// nothing and returns `false`. A new name or a different version (re)builds the
    /// index and returns `true`.
    pub fn define_view(&self, view: View) -> bool {
        let mut state = self.write_state();
        if let Some(existing) = state.views.get(view.name()) {
            if existing.view.version() == view.version() {
                return false;
            }
            debug!("View {} changed version {} -> {}, reindexing", view.name(), existing.view.version(), view.version());
        }
        let name = view.name().to_string();
        let index = ViewIndex::build(view, state.documents.values());
        state.views.insert(name, index);
        // Queries over the redefined view must re-run.
        state.sequence += 1;
        let sequence = state.sequence;
        drop(state);
        self.changes.send_replace(sequence);
        true
    }

    pub fn view(&self, name: &str) -> Option<Arc<View>> {
        self.read_state().views.get(name).map(|index| index.view.clone())
    }

    /// Runs `query` against the current index.
    pub fn query(&self, query: &Query) -> Result<Vec<QueryRow>> {
        self.query_at_sequence(query).map(|(rows, _)| rows)
    }

    /// Runs `query` and returns the sequence the result reflects.
    pub(crate) fn query_at_sequence(&self, query: &Query) -> Result<(Vec<QueryRow>, u64)> {
        let state = self.read_state();
        let index = state.views.get(query.view())
            .ok_or_else(|| Error::UnknownView(query.view().to_string()))?;
        let rows = query::run(&index.view, query, index.entries.iter(), |id| state.documents.get(id).cloned());
        Ok((rows, state.sequence))
    }

    // --- Change feed ---

    /// Number of changes applied since the database was opened.
    pub fn sequence(&self) -> u64 {
        self.read_state().sequence
    }

    /// A receiver that always holds the latest [`sequence`](Self::sequence).
    /// Changes coalesce: a slow receiver only sees the most recent value.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn record_live_query_started(&self) {
        self.live_queries_started.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of live queries that have been started on this database.
    pub fn live_query_count(&self) -> usize {
        self.live_queries_started.load(Ordering::SeqCst)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        && !name.starts_with('-');
    if valid { Ok(()) } else { Err(Error::InvalidDatabaseName(name.to_string())) }
}

async fn read_manifest(path: &Path) -> Result<DatabaseManifest> {
    let content = fs::read(path).await.map_err(|e| {
        warn!("Failed to read database manifest '{}': {}", path.display(), e);
        Error::CorruptDatabase(path.to_path_buf())
    })?;
    serde_json::from_slice(&content).map_err(|e| {
        warn!("Failed to parse database manifest '{}': {}", path.display(), e);
        Error::CorruptDatabase(path.to_path_buf())
    })
}

async fn write_manifest(path: &Path, manifest: &DatabaseManifest) -> Result<()> {
    let content = serde_json::to_string_pretty(manifest)?;
    fs::write(path, content).await?;
    debug!("Database manifest written to {}", path.display());
    Ok(())
}

async fn load_documents(dir: &Path) -> Result<BTreeMap<String, Document>> {
    let mut documents = BTreeMap::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
        let content = fs::read(&path).await?;
        let document: Document = serde_json::from_slice(&content).map_err(|e| {
            warn!("Failed to parse document '{}': {}", path.display(), e);
            Error::CorruptDatabase(path.clone())
        })?;
        if stem.as_deref() != Some(document.id()) {
            warn!("Document id {:?} does not match file '{}'", document.id(), path.display());
            return Err(Error::CorruptDatabase(path));
        }
        documents.insert(document.id().to_string(), document);
    }
    Ok(documents)
}
