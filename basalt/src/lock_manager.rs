//! Per-page shared/exclusive locks and the manager that arbitrates them.
//!
//! Every page gets a [`PageLock`] the first time any transaction asks for
//! it; the lock then lives for the rest of the process. A transaction may
//! acquire the same page repeatedly; each grant is pushed onto its
//! per-transaction mode stack and released LIFO. The only upgrade path is
//! the sole-holder upgrade: a transaction that is the lone holder of a page
//! (in any mode) may take the write lock immediately. Everyone else waits on
//! the page's monitor and gives up when the timeout elapses; there is no
//! deadlock detection beyond that.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::basalt_debug_log;
use crate::errors::DbError;
use crate::transaction::TransactionId;
use crate::tuple::PageId;

/// How long an acquire waits before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Represents the different modes of locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LockError {
    Timeout,
}

#[derive(Debug, Default)]
struct LockState {
    /// Number of Shared entries across all stacks.
    readers: usize,
    /// Number of Exclusive entries across all stacks. More than one only
    /// through reentrant write acquisition by the single write holder.
    writers: usize,
    /// Per-transaction stacks of granted modes, most recent last.
    acquired: HashMap<TransactionId, Vec<LockMode>>,
}

impl LockState {
    fn locked(&self) -> bool {
        self.readers > 0 || self.writers > 0
    }

    fn write_locked(&self) -> bool {
        self.writers > 0
    }

    fn holds_write(&self, tid: TransactionId) -> bool {
        self.acquired
            .get(&tid)
            .is_some_and(|stack| stack.contains(&LockMode::Exclusive))
    }

    fn sole_holder(&self, tid: TransactionId) -> bool {
        self.acquired.len() == 1 && self.acquired.contains_key(&tid)
    }

    fn grant(&mut self, tid: TransactionId, mode: LockMode) {
        match mode {
            LockMode::Shared => self.readers += 1,
            LockMode::Exclusive => self.writers += 1,
        }
        self.acquired.entry(tid).or_default().push(mode);
    }

    fn retire(&mut self, mode: LockMode) -> Result<(), DbError> {
        let counter = match mode {
            LockMode::Shared => &mut self.readers,
            LockMode::Exclusive => &mut self.writers,
        };
        *counter = counter
            .checked_sub(1)
            .ok_or_else(|| DbError::Storage("released more locks than acquired".to_string()))?;
        Ok(())
    }
}

/// Shared/exclusive lock state for a single page.
pub struct PageLock {
    pid: PageId,
    state: Mutex<LockState>,
    waiters: Condvar,
}

impl PageLock {
    fn new(pid: PageId) -> Self {
        Self {
            pid,
            state: Mutex::new(LockState::default()),
            waiters: Condvar::new(),
        }
    }

    /// Acquires a shared lock for `tid`, waiting up to `timeout` while
    /// another transaction holds the write lock. A write holder is granted
    /// the read immediately (downgrade); a waiter that wakes to find the
    /// page still write-held fails.
    pub fn read_lock(&self, tid: TransactionId, timeout: Duration) -> Result<(), LockError> {
        let mut state = self.state.lock().unwrap();
        while state.write_locked() {
            if state.holds_write(tid) {
                basalt_debug_log!(
                    "[PageLock::read_lock] {tid} already write-holds page {}, granting read",
                    self.pid
                );
                state.grant(tid, LockMode::Shared);
                return Ok(());
            }
            basalt_debug_log!(
                "[PageLock::read_lock] page {} is write-locked, {tid} waiting",
                self.pid
            );
            state = self.waiters.wait_timeout(state, timeout).unwrap().0;
            if state.write_locked() {
                basalt_debug_log!(
                    "[PageLock::read_lock] page {} still write-locked, {tid} timing out",
                    self.pid
                );
                return Err(LockError::Timeout);
            }
        }
        state.grant(tid, LockMode::Shared);
        Ok(())
    }

    /// Acquires the exclusive lock for `tid`, waiting up to `timeout` while
    /// the page is held by anyone else. The sole holder of the page is
    /// upgraded immediately, whatever modes it holds.
    pub fn write_lock(&self, tid: TransactionId, timeout: Duration) -> Result<(), LockError> {
        let mut state = self.state.lock().unwrap();
        while state.locked() {
            if state.sole_holder(tid) {
                basalt_debug_log!(
                    "[PageLock::write_lock] {tid} solely holds page {}, granting write",
                    self.pid
                );
                state.grant(tid, LockMode::Exclusive);
                return Ok(());
            }
            basalt_debug_log!(
                "[PageLock::write_lock] page {} is locked, {tid} waiting",
                self.pid
            );
            state = self.waiters.wait_timeout(state, timeout).unwrap().0;
            if state.locked() {
                basalt_debug_log!(
                    "[PageLock::write_lock] page {} still locked, {tid} timing out",
                    self.pid
                );
                return Err(LockError::Timeout);
            }
        }
        state.grant(tid, LockMode::Exclusive);
        Ok(())
    }

    /// Releases the most recently acquired mode held by `tid` and wakes one
    /// waiter. Fails if `tid` holds nothing on this page.
    pub fn release_one(&self, tid: TransactionId) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let stack = state.acquired.get_mut(&tid).ok_or_else(|| {
            DbError::Storage(format!("{tid} holds no locks on page {}", self.pid))
        })?;
        let mode = stack
            .pop()
            .ok_or_else(|| DbError::Storage("empty lock stack".to_string()))?;
        if stack.is_empty() {
            state.acquired.remove(&tid);
        }
        state.retire(mode)?;
        self.waiters.notify_one();
        Ok(())
    }

    /// Drains every mode `tid` holds on this page and wakes one waiter.
    pub fn release_all(&self, tid: TransactionId) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let stack = state.acquired.remove(&tid).ok_or_else(|| {
            DbError::Storage(format!("{tid} holds no locks on page {}", self.pid))
        })?;
        for mode in stack {
            state.retire(mode)?;
        }
        self.waiters.notify_one();
        Ok(())
    }

    pub fn holds_lock(&self, tid: TransactionId) -> bool {
        self.state.lock().unwrap().acquired.contains_key(&tid)
    }

    #[cfg(test)]
    fn counters(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        let stacked = state.acquired.values().map(|s| s.len()).sum();
        (state.readers, state.writers, stacked)
    }
}

/// Maps page ids to their locks and applies the configured timeout.
pub struct LockManager {
    locks: Mutex<HashMap<PageId, Arc<PageLock>>>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn lock_for(&self, pid: PageId) -> Arc<PageLock> {
        // Lock creation is serialized through the table mutex; the timed
        // wait itself happens on the page's own monitor so waiters on
        // different pages do not block each other.
        self.locks
            .lock()
            .unwrap()
            .entry(pid)
            .or_insert_with(|| Arc::new(PageLock::new(pid)))
            .clone()
    }

    /// Acquires `mode` on `pid` for `tid`, blocking up to the timeout.
    pub fn acquire(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<(), LockError> {
        let lock = self.lock_for(pid);
        match mode {
            LockMode::Shared => lock.read_lock(tid, self.timeout),
            LockMode::Exclusive => lock.write_lock(tid, self.timeout),
        }
    }

    /// Releases one acquired mode, most recent first.
    pub fn release_one(&self, tid: TransactionId, pid: PageId) -> Result<(), DbError> {
        let lock = self
            .locks
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or_else(|| DbError::Storage(format!("no lock exists for page {pid}")))?;
        lock.release_one(tid)
    }

    /// Releases everything `tid` holds on `pid`. A page the transaction
    /// touched but no longer holds (a released insert probe) is a no-op.
    pub fn release_all(&self, tid: TransactionId, pid: PageId) -> Result<(), DbError> {
        let Some(lock) = self.locks.lock().unwrap().get(&pid).cloned() else {
            return Ok(());
        };
        if !lock.holds_lock(tid) {
            return Ok(());
        }
        lock.release_all(tid)
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.locks
            .lock()
            .unwrap()
            .get(&pid)
            .is_some_and(|lock| lock.holds_lock(tid))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}
