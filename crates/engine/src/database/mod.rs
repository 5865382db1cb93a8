//! Database struct and open/close logic
//!
//! A `Database` wraps one backend and the transaction manager guarding it.
//! It can be ephemeral, or bound to a data directory that holds the
//! configuration file and the saved named queries. The quads themselves live
//! in the backend.
//!
//! ## Transaction API
//!
//! 1. **Closure API** (recommended): `db.transaction(|conn| { ... })`
//!    - Commit on success, rollback on error
//!    - `transaction_with_retry` reruns the closure on isolation conflicts
//!
//! 2. **Manual API**: `db.connection()` then `begin()` / `commit()`
//!    - For callers that need control over commit timing
//!
//! 3. **Auto-commit**: `add`, `remove` and the read helpers wrap one
//!    operation each.

pub mod config;
mod transactions;

pub use config::{OptimistConfig, CONFIG_FILE_NAME};
pub use transactions::RetryConfig;

use crate::named_query::{NamedQuery, NamedQueryRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use optimist_concurrency::{
    ChangeListener, IsolationLevel, TransactionConnection, TransactionManager, TransactionMetrics,
};
use optimist_core::{
    Backend, BindingSet, Dataset, Quad, QuadPattern, StoreError, StoreResult, TupleExpr,
};
use optimist_storage::MemoryStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// File in the data directory holding saved named queries
pub const NAMED_QUERIES_FILE: &str = "named_queries.json";

/// How long shutdown waits for open transactions to finish
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Main database handle with transaction support
///
/// # Example
///
/// ```text
/// use optimist_engine::Database;
///
/// let db = Database::open_in_memory()?;
/// db.transaction(|conn| {
///     let seen = conn.size(&QuadPattern::any())?;
///     conn.add_statement(quad)?;
///     Ok(seen)
/// })?;
/// ```
pub struct Database {
    /// Data directory path (`None` for ephemeral databases)
    data_dir: Option<PathBuf>,

    /// Shared coordinator for every transaction on the backend
    manager: Arc<TransactionManager>,

    /// Configuration the database was opened with (mirrors optimist.toml)
    config: OptimistConfig,

    /// Registered named queries by name
    named_queries: DashMap<String, Arc<NamedQuery>>,

    /// Set to false during shutdown to reject new transactions
    accepting_transactions: AtomicBool,
}

impl Database {
    /// Open an ephemeral database over an empty in-memory store
    pub fn open_in_memory() -> StoreResult<Arc<Self>> {
        Self::with_backend(Arc::new(MemoryStore::new()), OptimistConfig::default())
    }

    /// Open an ephemeral database over `backend`
    ///
    /// Nothing is written to disk; named queries are lost when the database
    /// is dropped.
    pub fn with_backend(backend: Arc<dyn Backend>, cfg: OptimistConfig) -> StoreResult<Arc<Self>> {
        Self::build(None, backend, cfg)
    }

    /// Open a database whose data directory is `path`
    ///
    /// Creates the directory and a default `optimist.toml` if missing, reads
    /// the configuration and restores saved named queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the
    /// configuration or saved queries cannot be read.
    pub fn open<P: AsRef<Path>>(path: P, backend: Arc<dyn Backend>) -> StoreResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        OptimistConfig::write_default_if_missing(&config_path)?;
        let cfg = OptimistConfig::from_file(&config_path)?;

        Self::build(Some(data_dir), backend, cfg)
    }

    /// Open a database at `path` with an explicit configuration
    ///
    /// The configuration is written to `optimist.toml` so later
    /// [`Database::open`] calls pick up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        backend: Arc<dyn Backend>,
        cfg: OptimistConfig,
    ) -> StoreResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        cfg.validate()?;
        cfg.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        Self::build(Some(data_dir), backend, cfg)
    }

    fn build(
        data_dir: Option<PathBuf>,
        backend: Arc<dyn Backend>,
        cfg: OptimistConfig,
    ) -> StoreResult<Arc<Self>> {
        let isolation = cfg.validate()?;
        let manager = TransactionManager::with_options(backend, isolation, cfg.large_block)?;
        let db = Arc::new(Self {
            data_dir,
            manager,
            config: cfg,
            named_queries: DashMap::new(),
            accepting_transactions: AtomicBool::new(true),
        });
        db.restore_named_queries()?;

        info!(
            target: "optimist::engine",
            data_dir = ?db.data_dir,
            isolation = %isolation,
            large_block = db.config.large_block,
            named_queries = db.named_queries.len(),
            "Database opened"
        );
        Ok(db)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Data directory, `None` for ephemeral databases
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &OptimistConfig {
        &self.config
    }

    /// Default isolation level of new connections
    pub fn isolation(&self) -> IsolationLevel {
        self.manager.isolation()
    }

    /// The shared transaction manager
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Check if the database is accepting transactions
    pub fn is_open(&self) -> bool {
        self.accepting_transactions.load(Ordering::SeqCst)
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.manager.metrics()
    }

    fn check_accepting(&self) -> StoreResult<()> {
        if !self.is_open() {
            return Err(StoreError::invalid_input("Database is shutting down"));
        }
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a connection for manual transaction control
    pub fn connection(&self) -> StoreResult<TransactionConnection> {
        self.check_accepting()?;
        self.manager.connection()
    }

    /// Run `f` inside one transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise. An isolation
    /// conflict at commit is returned to the caller.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut TransactionConnection) -> StoreResult<T>,
    {
        let mut conn = self.connection()?;
        conn.begin()?;
        let result = f(&mut conn);
        Self::run_single_attempt(&mut conn, result)
    }

    /// Run `f` inside a transaction, rerunning it on isolation conflicts
    ///
    /// Each attempt gets a fresh transaction. Errors other than conflicts,
    /// and the conflict of the last attempt, are returned unchanged.
    ///
    /// # Example
    ///
    /// ```text
    /// let result = db.transaction_with_retry(RetryConfig::default(), |conn| {
    ///     let seen = conn.size(&counter_pattern)?;
    ///     conn.add_statement(counter_quad(seen))?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn transaction_with_retry<F, T>(&self, config: RetryConfig, f: F) -> StoreResult<T>
    where
        F: Fn(&mut TransactionConnection) -> StoreResult<T>,
    {
        let mut attempt = 0;
        loop {
            match self.transaction(&f) {
                Err(e) if e.is_conflict() && attempt < config.max_retries => {
                    warn!(
                        target: "optimist::engine",
                        attempt,
                        error = %e,
                        "Transaction conflicted, retrying"
                    );
                    std::thread::sleep(config.calculate_delay(attempt));
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Commit on success, roll back on error
    fn run_single_attempt<T>(conn: &mut TransactionConnection, result: StoreResult<T>) -> StoreResult<T> {
        match result {
            Ok(value) => match conn.commit() {
                Ok(()) => Ok(value),
                Err(e) => {
                    // A failed flush leaves the transaction prepared
                    conn.rollback();
                    Err(e)
                }
            },
            Err(e) => {
                conn.rollback();
                Err(e)
            }
        }
    }

    // ========================================================================
    // Auto-commit helpers
    // ========================================================================

    /// Add quads in a transaction of their own
    pub fn add(&self, quads: impl IntoIterator<Item = Quad>) -> StoreResult<()> {
        self.transaction(|conn| conn.add_all(quads))
    }

    /// Remove every quad matching `pattern` in a transaction of its own
    pub fn remove(&self, pattern: &QuadPattern) -> StoreResult<()> {
        self.transaction(|conn| conn.remove_statements(pattern))
    }

    /// Committed quads matching `pattern`
    pub fn statements(&self, pattern: &QuadPattern, include_inferred: bool) -> StoreResult<Vec<Quad>> {
        let mut conn = self.connection()?;
        conn.get_statements(pattern, include_inferred)?.collect()
    }

    /// Number of committed quads matching `pattern`
    pub fn size(&self, pattern: &QuadPattern) -> StoreResult<u64> {
        self.connection()?.size(pattern)
    }

    /// Evaluate `plan` against the committed state
    pub fn evaluate(
        &self,
        plan: &TupleExpr,
        dataset: Option<&Dataset>,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> StoreResult<Vec<BindingSet>> {
        let mut conn = self.connection()?;
        conn.evaluate(plan, dataset, bindings, include_inferred)?.collect()
    }

    // ========================================================================
    // Change listeners
    // ========================================================================

    /// Register a listener told about every committed transaction
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.manager.add_listener(listener);
    }

    /// Remove a listener previously registered with the same `Arc`
    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        self.manager.remove_listener(listener)
    }

    // ========================================================================
    // Named queries
    // ========================================================================

    /// Register `plan` under `name` and start tracking its result status
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name is taken.
    pub fn create_named_query(&self, name: &str, plan: TupleExpr) -> StoreResult<Arc<NamedQuery>> {
        self.check_accepting()?;
        match self.named_queries.entry(name.to_string()) {
            Entry::Occupied(_) => Err(StoreError::invalid_input(format!(
                "Named query '{}' already exists",
                name
            ))),
            Entry::Vacant(slot) => {
                let query = Arc::new(NamedQuery::new(name.to_string(), plan, &self.manager));
                self.manager.add_listener(query.clone());
                slot.insert(Arc::clone(&query));
                info!(target: "optimist::engine", query = name, "Named query created");
                Ok(query)
            }
        }
    }

    /// Replace the plan stored under `name`, creating it if missing
    ///
    /// The old query stops tracking changes; the new one starts with a fresh
    /// result status.
    pub fn replace_named_query(&self, name: &str, plan: TupleExpr) -> StoreResult<Arc<NamedQuery>> {
        self.check_accepting()?;
        let query = Arc::new(NamedQuery::new(name.to_string(), plan, &self.manager));
        self.manager.add_listener(query.clone());
        if let Some(old) = self.named_queries.insert(name.to_string(), Arc::clone(&query)) {
            self.detach(old);
        }
        info!(target: "optimist::engine", query = name, "Named query replaced");
        Ok(query)
    }

    /// The named query registered under `name`
    pub fn named_query(&self, name: &str) -> Option<Arc<NamedQuery>> {
        self.named_queries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Names of all registered named queries, sorted
    pub fn named_query_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named_queries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Drop the named query registered under `name`
    pub fn remove_named_query(&self, name: &str) -> bool {
        match self.named_queries.remove(name) {
            Some((_, query)) => {
                self.detach(query);
                info!(target: "optimist::engine", query = name, "Named query removed");
                true
            }
            None => false,
        }
    }

    fn detach(&self, query: Arc<NamedQuery>) {
        let listener: Arc<dyn ChangeListener> = query;
        self.manager.remove_listener(&listener);
    }

    fn named_queries_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(NAMED_QUERIES_FILE))
    }

    fn restore_named_queries(&self) -> StoreResult<()> {
        let Some(path) = self.named_queries_path() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            StoreError::internal(format!(
                "Failed to read named queries '{}': {}",
                path.display(),
                e
            ))
        })?;
        let records: Vec<NamedQueryRecord> = serde_json::from_str(&content).map_err(|e| {
            StoreError::invalid_input(format!(
                "Failed to parse named queries '{}': {}",
                path.display(),
                e
            ))
        })?;
        for record in records {
            let query = Arc::new(NamedQuery::restore(record, &self.manager));
            self.manager.add_listener(query.clone());
            self.named_queries.insert(query.name().to_string(), query);
        }
        Ok(())
    }

    /// Write every named query to the data directory
    ///
    /// Does nothing for ephemeral databases or when persistence is disabled
    /// in the configuration.
    pub fn save_named_queries(&self) -> StoreResult<()> {
        let Some(path) = self.named_queries_path() else {
            return Ok(());
        };
        if !self.config.persist_named_queries {
            return Ok(());
        }
        let mut records: Vec<NamedQueryRecord> =
            self.named_queries.iter().map(|e| e.value().record()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let content = serde_json::to_string_pretty(&records)
            .map_err(|e| StoreError::internal(format!("Failed to serialize named queries: {}", e)))?;
        std::fs::write(&path, content).map_err(|e| {
            StoreError::internal(format!(
                "Failed to write named queries '{}': {}",
                path.display(),
                e
            ))
        })
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Graceful shutdown
    ///
    /// 1. Stops accepting new transactions
    /// 2. Waits for open transactions to finish
    /// 3. Saves named queries
    /// 4. Interrupts every remaining lock wait
    pub fn shutdown(&self) -> StoreResult<()> {
        if !self.accepting_transactions.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let start = Instant::now();
        while self.manager.active_count() > 0 && start.elapsed() < SHUTDOWN_TIMEOUT {
            std::thread::sleep(Duration::from_millis(10));
        }
        if self.manager.active_count() > 0 {
            warn!(
                target: "optimist::engine",
                active = self.manager.active_count(),
                "Shutting down with open transactions"
            );
        }

        let saved = self.save_named_queries();
        self.manager.shutdown();
        info!(target: "optimist::engine", "Database shut down");
        saved
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.save_named_queries() {
                warn!(target: "optimist::engine", error = %e, "Failed to save named queries on drop");
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("isolation", &self.isolation())
            .field("named_queries", &self.named_queries.len())
            .field("open", &self.is_open())
            .finish()
    }
}
