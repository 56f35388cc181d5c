use std::path::PathBuf;
use std::time::Duration;

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 8;
/// Default time to wait for a pooled connection.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time SQLite waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration options supplied when opening a [`super::Store`].
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Maximum number of open connections.
    pub pool_size: usize,
    /// How long a checkout waits for a free connection.
    pub acquire_timeout: Duration,
    /// How long a statement waits on the write lock held by another connection.
    pub busy_timeout: Duration,
    /// Whether to create the database file when it does not exist.
    pub create_if_missing: bool,
    /// Whether to apply pending schema migrations on open.
    pub migrate: bool,
}

impl StoreOptions {
    /// Creates options for the database at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            create_if_missing: true,
            migrate: true,
        }
    }

    /// Sets the maximum number of pooled connections.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the pool checkout timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether a missing database file is created.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets whether migrations run on open.
    pub fn migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }
}
