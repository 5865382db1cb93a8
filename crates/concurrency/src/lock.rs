//! Write-preferring read/write lock managers
//!
//! Unlike a scoped `RwLock` guard, a [`Lock`] is an owned value: it can be
//! stored in a registry while its transaction is active, upgraded in place,
//! and released from any thread by dropping it.
//!
//! # Policy
//!
//! - Readers share the lock; a writer holds it alone
//! - Once a writer is waiting, new readers wait too (write preference)
//! - `try_write` and `Lock::try_upgrade` never block
//! - `interrupt` fails every current and future wait with
//!   [`StoreError::Interrupted`]

use optimist_core::{StoreError, StoreResult};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;

/// Mode a lock is held in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared
    Read,
    /// Exclusive
    Write,
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
    interrupted: bool,
}

/// Hands out shared and exclusive [`Lock`]s
pub struct LockManager {
    name: &'static str,
    state: Mutex<LockState>,
    released: Condvar,
}

impl LockManager {
    /// New manager; `name` appears in errors and logs
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        })
    }

    /// Name of this manager
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire a shared lock, blocking while a writer holds or awaits it
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the manager is interrupted while waiting.
    pub fn read(self: &Arc<Self>) -> StoreResult<Lock> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return Err(StoreError::Interrupted { lock: self.name });
            }
            if !state.writer && state.waiting_writers == 0 {
                break;
            }
            self.released.wait(&mut state);
        }
        state.readers += 1;
        Ok(self.grant(LockMode::Read))
    }

    /// Acquire the exclusive lock, blocking until all holders release it
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the manager is interrupted while waiting.
    pub fn write(self: &Arc<Self>) -> StoreResult<Lock> {
        let mut state = self.state.lock();
        state.waiting_writers += 1;
        loop {
            if state.interrupted {
                state.waiting_writers -= 1;
                self.released.notify_all();
                return Err(StoreError::Interrupted { lock: self.name });
            }
            if !state.writer && state.readers == 0 {
                break;
            }
            self.released.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writer = true;
        Ok(self.grant(LockMode::Write))
    }

    /// Acquire the exclusive lock only if it is free right now
    pub fn try_write(self: &Arc<Self>) -> Option<Lock> {
        let mut state = self.state.lock();
        if state.interrupted || state.writer || state.readers > 0 {
            return None;
        }
        state.writer = true;
        Some(self.grant(LockMode::Write))
    }

    /// Fail all current and future waits
    pub fn interrupt(&self) {
        self.state.lock().interrupted = true;
        self.released.notify_all();
    }

    /// Number of shared holders
    pub fn reader_count(&self) -> usize {
        self.state.lock().readers
    }

    /// True if the exclusive lock is held
    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer
    }

    fn grant(self: &Arc<Self>, mode: LockMode) -> Lock {
        Lock {
            manager: Arc::clone(self),
            mode,
        }
    }

    fn release(&self, mode: LockMode) {
        let mut state = self.state.lock();
        match mode {
            LockMode::Read => state.readers = state.readers.saturating_sub(1),
            LockMode::Write => state.writer = false,
        }
        drop(state);
        self.released.notify_all();
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LockManager")
            .field("name", &self.name)
            .field("readers", &state.readers)
            .field("writer", &state.writer)
            .field("waiting_writers", &state.waiting_writers)
            .finish()
    }
}

/// A held lock; released on drop
pub struct Lock {
    manager: Arc<LockManager>,
    mode: LockMode,
}

impl Lock {
    /// Mode currently held
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Upgrade a shared lock to exclusive if this is the only holder
    ///
    /// Never blocks. Returns true if the lock is now held exclusively.
    pub fn try_upgrade(&mut self) -> bool {
        if self.mode == LockMode::Write {
            return true;
        }
        let mut state = self.manager.state.lock();
        if state.interrupted || state.writer || state.readers != 1 {
            return false;
        }
        state.readers = 0;
        state.writer = true;
        self.mode = LockMode::Write;
        true
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        self.manager.release(self.mode);
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("manager", &self.manager.name)
            .field("mode", &self.mode)
            .finish()
    }
}
