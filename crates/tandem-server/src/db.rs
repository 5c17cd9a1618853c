//! Shared handle to the durable store.
//!
//! One `rusqlite` connection serves the whole process; connection workers
//! await the lock, so a slow store call suspends only the calling worker.

use std::sync::Arc;

use tokio::sync::Mutex;

use tandem_store::Database;

pub type SharedDb = Arc<Mutex<Database>>;

/// Wrap a freshly opened database for sharing across tasks.
pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}
