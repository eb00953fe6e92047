use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::event::{define_event_listeners, Event};

use super::{Database, Error, Query, QueryRow, Result};

/// Dispatched by a [`LiveQuery`] when its result rows change.
#[derive(Debug, Clone)]
pub struct RowsChanged {
    pub rows: Arc<Vec<QueryRow>>,
}

impl Event for RowsChanged {
    type HandlerReturnType = ();
}

/// Dispatched by a [`LiveQuery`] after every refresh, whether or not the rows
/// changed. `sequence` is the database sequence the refresh reflects.
#[derive(Debug, Clone, Copy)]
pub struct Refreshed {
    pub sequence: u64,
}

impl Event for Refreshed {
    type HandlerReturnType = ();
}

define_event_listeners! { LiveQueryEvents {
    rows_changed: RowsChanged,
    refreshed: Refreshed,
}}

/// A query that the database keeps up to date.
///
/// Nothing happens until [`start`](Self::start). From then on a task on the
/// database's runtime re-runs the query after every change and dispatches
/// [`RowsChanged`] to `on.rows_changed` on the first run and whenever the rows
/// differ from the previous run, then [`Refreshed`] to `on.refreshed` after every
/// run. Listeners are called from that task, before waiters of
/// [`wait_until_current`](Self::wait_until_current) are released.
#[derive(Debug)]
pub struct LiveQuery {
    database: Arc<Database>,
    query: Query,
    rows: RwLock<Option<Arc<Vec<QueryRow>>>>,
    // Sequence of the last refresh, `None` before the first one
    progress: watch::Sender<Option<u64>>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    pub on: LiveQueryEvents,
}

impl LiveQuery {
    pub fn new(database: Arc<Database>, query: Query) -> Arc<Self> {
        let (progress, _) = watch::channel(None);
        Arc::new(LiveQuery {
            database,
            query,
            rows: RwLock::new(None),
            progress,
            task: Mutex::new(None),
            stopped: AtomicBool::new(false),
            on: LiveQueryEvents::new(),
        })
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Starts keeping the query up to date. Calling this again has no effect,
    /// including after [`stop`](Self::stop).
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        debug!("Starting live query on view {}", self.query.view());
        self.database.record_live_query_started();

        let live_query = Arc::downgrade(self);
        let changes = self.database.subscribe();
        *task = Some(self.database.runtime().spawn(refresh_loop(live_query, changes)));
    }

    pub fn is_started(&self) -> bool {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Stops the refresh task. The last rows stay readable.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            task.abort();
        }
    }

    /// The rows of the most recent refresh, `None` until the first one completed.
    pub fn rows(&self) -> Option<Arc<Vec<QueryRow>>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Waits until this live query has caught up with every change the database
    /// had applied when this was called, listeners included.
    pub async fn wait_until_current(&self) -> Result<()> {
        if !self.is_started() {
            return Err(Error::LiveQueryNotStarted);
        }
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::LiveQueryStopped);
        }
        let target = self.database.sequence();
        let mut progress = self.progress.subscribe();
        progress
            .wait_for(|seen| seen.is_some_and(|seen| seen >= target))
            .await
            .map(|_| ())
            .map_err(|_| Error::LiveQueryStopped)
    }

    fn refresh(&self) {
        let (rows, sequence) = match self.database.query_at_sequence(&self.query) {
            Ok(result) => result,
            Err(e) => {
                error!("Live query on view {} failed: {}", self.query.view(), e);
                // Waiters must not hang on a query that cannot run.
                self.progress.send_replace(Some(self.database.sequence()));
                return;
            }
        };

        let changed = {
            let mut current = self.rows.write().unwrap_or_else(PoisonError::into_inner);
            if current.as_deref().is_some_and(|previous| *previous == rows) {
                None
            } else {
                let rows = Arc::new(rows);
                *current = Some(rows.clone());
                Some(rows)
            }
        };

        if let Some(rows) = changed {
            debug!("Live query on view {} changed ({} rows)", self.query.view(), rows.len());
            self.on.rows_changed.dispatch(&mut RowsChanged { rows });
        }
        self.on.refreshed.dispatch(&mut Refreshed { sequence });
        self.progress.send_replace(Some(sequence));
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

async fn refresh_loop(live_query: Weak<LiveQuery>, mut changes: watch::Receiver<u64>) {
    loop {
        changes.borrow_and_update();
        match live_query.upgrade() {
            Some(live_query) => live_query.refresh(),
            None => break,
        }
        if changes.changed().await.is_err() {
            break;
        }
    }
}
