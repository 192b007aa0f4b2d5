//! A small fixed pool of storage handles for background readers.
//!
//! Each handle is an independent connection to the same database file. A
//! caller that finds every handle checked out sleeps briefly and retries; once
//! the retry budget is spent it gets [`Error::PoolExhausted`], which is
//! transient. Multi-statement graph mutations go through
//! [`ConnectionPool::exclusive`], which serializes them pool-wide.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::Storage;
use crate::{Error, Result};

/// Pool sizing and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: 4,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl PoolOptions {
    /// Default retry policy with `size` connections.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }
}

pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Storage>>,
    write_lock: Mutex<()>,
    options: PoolOptions,
}

impl ConnectionPool {
    /// Open `options.size` handles on `path`. The schema is not touched.
    pub fn open(path: &Path, options: PoolOptions) -> Result<Self> {
        if options.size == 0 {
            return Err(Error::InvalidInput(
                "Pool size must be at least 1".to_string(),
            ));
        }
        let handles = (0..options.size)
            .map(|_| Storage::open(path))
            .collect::<Result<Vec<_>>>()?;
        debug!(path = %path.display(), size = options.size, "Opened connection pool");

        Ok(Self {
            path: path.to_path_buf(),
            idle: Mutex::new(handles),
            write_lock: Mutex::new(()),
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> PoolOptions {
        self.options
    }

    /// Handles not currently checked out.
    pub fn available(&self) -> usize {
        self.lock_idle().len()
    }

    /// Check out a handle, retrying while all are busy.
    pub fn acquire(&self) -> Result<PooledStorage<'_>> {
        let attempts = self.options.max_retries + 1;
        for attempt in 1..=attempts {
            if let Some(storage) = self.lock_idle().pop() {
                return Ok(PooledStorage {
                    pool: self,
                    storage: Some(storage),
                });
            }
            if attempt < attempts {
                warn!(
                    attempt,
                    max_retries = self.options.max_retries,
                    "No idle connection, retrying"
                );
                thread::sleep(self.options.retry_delay);
            }
        }
        Err(Error::PoolExhausted { attempts })
    }

    /// Run `f` on a pooled handle while holding the pool-wide write lock.
    pub fn exclusive<T>(&self, f: impl FnOnce(&mut Storage) -> Result<T>) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut storage = self.acquire()?;
        f(&mut storage)
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Storage>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, storage: Storage) {
        self.lock_idle().push(storage);
    }
}

/// A checked-out handle. Returned to the pool on drop.
pub struct PooledStorage<'a> {
    pool: &'a ConnectionPool,
    storage: Option<Storage>,
}

impl Deref for PooledStorage<'_> {
    type Target = Storage;

    fn deref(&self) -> &Storage {
        self.storage
            .as_ref()
            .unwrap_or_else(|| unreachable!("storage is only taken in drop"))
    }
}

impl DerefMut for PooledStorage<'_> {
    fn deref_mut(&mut self) -> &mut Storage {
        self.storage
            .as_mut()
            .unwrap_or_else(|| unreachable!("storage is only taken in drop"))
    }
}

impl Drop for PooledStorage<'_> {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.release(storage);
        }
    }
}
