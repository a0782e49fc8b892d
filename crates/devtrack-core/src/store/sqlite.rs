//! SQLite-backed document store.
//!
//! Documents are stored as JSON text per `(collection, id)`. Watches are served
//! in-process: every committed mutation pushes a fresh snapshot to the
//! watchers of that collection while the connection lock is held, so
//! snapshots are delivered in commit order.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::watch::{select, WatchRegistry};
use super::{
    Document, DocumentStore, FieldFilter, Fields, SnapshotReceiver, StoreError, StoreResult,
};
use crate::util::unix_millis_now;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Local [`DocumentStore`] persisted in a `SQLite` file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    watches: Arc<Mutex<WatchRegistry>>,
    data_version: Arc<AtomicI64>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path. Runs migrations.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
        migrate(&conn)?;
        let version = data_version(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            watches: Arc::new(Mutex::new(WatchRegistry::default())),
            data_version: Arc::new(AtomicI64::new(version)),
        })
    }

    /// Pick up commits made through other connections to the same file and
    /// push fresh snapshots to every open watch. Returns whether anything
    /// changed since the last call.
    pub async fn refresh(&self) -> StoreResult<bool> {
        let seen = Arc::clone(&self.data_version);
        self.run(move |conn, watches| {
            let version = data_version(conn)?;
            if seen.swap(version, Ordering::SeqCst) == version {
                return Ok(false);
            }
            for collection in watches.collections() {
                notify(conn, watches, &collection)?;
            }
            Ok(true)
        })
        .await
    }

    /// Run `operation` on the blocking pool with the connection and watch
    /// registry locked.
    async fn run<T, F>(&self, operation: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &mut WatchRegistry) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let watches = Arc::clone(&self.watches);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn);
            let mut watches = lock(&watches);
            operation(&mut conn, &mut watches)
        })
        .await
        .map_err(|error| StoreError::Backend(format!("store task failed: {error}")))?
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn data_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )?;
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if version < 1 {
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);
            INSERT INTO schema_version (version) VALUES (1);
            COMMIT;",
        )?;
        tracing::debug!("Migrated document store to schema version {CURRENT_VERSION}");
    }

    Ok(())
}

fn load_collection(conn: &Connection, collection: &str) -> StoreResult<Vec<Document>> {
    let mut statement =
        conn.prepare("SELECT id, fields FROM documents WHERE collection = ? ORDER BY seq")?;
    let rows = statement.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut documents = Vec::new();
    for row in rows {
        let (id, fields) = row?;
        documents.push(Document::new(id, serde_json::from_str(&fields)?));
    }
    Ok(documents)
}

fn load_document(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<Fields>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT fields FROM documents WHERE collection = ? AND id = ?",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|raw| serde_json::from_str(&raw).map_err(StoreError::from))
        .transpose()
}

fn write_document(
    conn: &Connection,
    collection: &str,
    id: &str,
    fields: &Fields,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO documents (collection, id, fields, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (collection, id)
         DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at",
        params![
            collection,
            id,
            serde_json::to_string(fields)?,
            unix_millis_now()
        ],
    )?;
    Ok(())
}

fn notify(conn: &Connection, watches: &mut WatchRegistry, collection: &str) -> StoreResult<()> {
    if watches.has_watchers(collection) {
        let current = load_collection(conn, collection)?;
        watches.notify(collection, &current);
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.run(move |conn, _| {
            Ok(load_document(conn, &collection, &id)?.map(|fields| Document::new(id, fields)))
        })
        .await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.run(move |conn, watches| {
            write_document(conn, &collection, &id, &fields)?;
            notify(conn, watches, &collection)
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.run(move |conn, watches| {
            let tx = conn.transaction()?;
            let mut existing = load_document(&tx, &collection, &id)?
                .ok_or_else(|| StoreError::not_found(&collection, &id))?;
            existing.extend(fields);
            write_document(&tx, &collection, &id, &existing)?;
            tx.commit()?;
            notify(conn, watches, &collection)
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.run(move |conn, watches| {
            let removed = conn.execute(
                "DELETE FROM documents WHERE collection = ? AND id = ?",
                params![collection, id],
            )?;
            if removed > 0 {
                notify(conn, watches, &collection)?;
            }
            Ok(())
        })
        .await
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let collection = collection.to_string();
        self.run(move |conn, _| load_collection(conn, &collection))
            .await
    }

    async fn query_eq(&self, collection: &str, filter: &FieldFilter) -> StoreResult<Vec<Document>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.run(move |conn, _| {
            let current = load_collection(conn, &collection)?;
            Ok(select(&current, Some(&filter)))
        })
        .await
    }

    async fn watch(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> StoreResult<SnapshotReceiver> {
        let collection = collection.to_string();
        self.run(move |conn, watches| {
            let current = load_collection(conn, &collection)?;
            Ok(watches.register(&collection, filter, &current))
        })
        .await
    }
}
