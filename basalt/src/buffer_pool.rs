//! The bounded page cache coordinating locks, disk reads and commits.
//!
//! Every page an operator touches comes through [`BufferPool::get_page`],
//! which acquires the page lock before the cache is consulted. The pool runs
//! NO STEAL: a dirty page is never written out by eviction, only by its own
//! transaction's commit (or `flush_*`, whose callers accept the
//! consequences). Commit writes the log record for each dirty page and
//! forces the log before the page itself goes to disk.

use linked_hash_map::LinkedHashMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::basalt_debug_log;
use crate::catalog::Catalog;
use crate::errors::DbError;
use crate::failpoint::{self, FaultSite};
use crate::heap_page::HeapPage;
use crate::lock_manager::{LockManager, LockMode, DEFAULT_LOCK_TIMEOUT};
use crate::transaction::TransactionId;
use crate::tuple::{PageId, Tuple};
use crate::wal::RecoveryLog;

/// Default number of pages the pool caches.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// A cached page, shared by every transaction that holds a lock on it.
pub type PageHandle = Arc<Mutex<HeapPage>>;

pub struct BufferPool {
    capacity: usize,
    /// Insertion-ordered so eviction can approximate oldest-first.
    pages: Mutex<LinkedHashMap<PageId, PageHandle>>,
    touched: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
    log: Arc<dyn RecoveryLog>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, log: Arc<dyn RecoveryLog>) -> Self {
        Self::with_config(DEFAULT_POOL_PAGES, DEFAULT_LOCK_TIMEOUT, catalog, log)
    }

    pub fn with_capacity(
        num_pages: usize,
        catalog: Arc<Catalog>,
        log: Arc<dyn RecoveryLog>,
    ) -> Self {
        Self::with_config(num_pages, DEFAULT_LOCK_TIMEOUT, catalog, log)
    }

    pub fn with_config(
        num_pages: usize,
        lock_timeout: Duration,
        catalog: Arc<Catalog>,
        log: Arc<dyn RecoveryLog>,
    ) -> Self {
        Self {
            capacity: num_pages,
            pages: Mutex::new(LinkedHashMap::new()),
            touched: Mutex::new(HashMap::new()),
            lock_manager: LockManager::new(lock_timeout),
            catalog,
            log,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Fetches a page on behalf of a transaction, locking it in the
    /// requested mode first.
    ///
    /// A lock that cannot be acquired within the timeout aborts the caller:
    /// the transaction is expected to finish with
    /// `transaction_complete(tid, false)`. A cache miss loads the page from
    /// its heap file, evicting the oldest clean page if the pool is full; a
    /// pool full of dirty pages is an error.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<PageHandle, DbError> {
        if self.lock_manager.acquire(tid, pid, mode).is_err() {
            basalt_debug_log!(
                "[BufferPool::get_page] {tid} failed to acquire {mode:?} on page {pid}"
            );
            return Err(DbError::TransactionAborted);
        }

        self.touched
            .lock()
            .unwrap()
            .entry(tid)
            .or_default()
            .insert(pid);

        let mut pages = self.pages.lock().unwrap();
        if let Some(handle) = pages.get(&pid) {
            return Ok(handle.clone());
        }

        if pages.len() == self.capacity {
            self.evict_page(&mut pages)?;
        }

        basalt_debug_log!("[BufferPool::get_page] miss on page {pid}, loading from disk");
        let file = self.catalog.file(pid.table_id)?;
        let handle: PageHandle = Arc::new(Mutex::new(file.read_page(pid)?));
        pages.insert(pid, handle.clone());
        Ok(handle)
    }

    /// Evicts the first clean page in insertion order. Dirty pages are never
    /// victims (NO STEAL); a pool where everything is dirty has no victim.
    fn evict_page(
        &self,
        pages: &mut LinkedHashMap<PageId, PageHandle>,
    ) -> Result<(), DbError> {
        let victim = pages
            .iter()
            .find(|(_, handle)| handle.lock().unwrap().dirtied_by().is_none())
            .map(|(pid, _)| *pid);
        match victim {
            Some(pid) => {
                basalt_debug_log!("[BufferPool::evict_page] evicting clean page {pid}");
                pages.remove(&pid);
                Ok(())
            }
            None => Err(DbError::Storage(
                "cannot evict: every cached page is dirty".to_string(),
            )),
        }
    }

    /// Gives back a single acquired lock mode.
    ///
    /// This steps outside two-phase locking and exists for exactly one
    /// caller: the heap file's insertion probe releasing its read lock on a
    /// page that turned out to be full.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) -> Result<(), DbError> {
        self.lock_manager.release_one(tid, pid)
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_lock(tid, pid)
    }

    /// Adds a tuple to the named table and marks every modified page dirty.
    /// After this returns the dirtied pages are in the cache and visible to
    /// any later `get_page`, subject to locking.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: u32,
        tuple: &mut Tuple,
    ) -> Result<(), DbError> {
        let file = self.catalog.file(table_id)?;
        let modified = file.insert_tuple(tid, tuple, self)?;
        for handle in modified {
            handle.lock().unwrap().mark_dirty(Some(tid));
        }
        Ok(())
    }

    /// Removes a tuple from the table its record id names, marking the
    /// modified page dirty.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<(), DbError> {
        let rid = tuple.record_id().ok_or_else(|| {
            DbError::Storage("cannot delete a tuple that was never placed".to_string())
        })?;
        let file = self.catalog.file(rid.page_id.table_id)?;
        let modified = file.delete_tuple(tid, tuple, self)?;
        for handle in modified {
            handle.lock().unwrap().mark_dirty(Some(tid));
        }
        Ok(())
    }

    /// Commits or aborts a transaction.
    ///
    /// On commit every page the transaction dirtied is logged (before-image
    /// then after-image), the log is forced, and the page is written through
    /// and becomes clean. On abort the cached copy is replaced with a fresh
    /// read from disk, discarding the in-memory modifications. Either way,
    /// every lock the transaction holds is released.
    pub fn transaction_complete(
        &self,
        tid: TransactionId,
        commit: bool,
    ) -> Result<(), DbError> {
        let Some(touched) = self.touched.lock().unwrap().get(&tid).cloned() else {
            return Ok(());
        };
        basalt_debug_log!(
            "[BufferPool::transaction_complete] {tid} {} ({} pages touched)",
            if commit { "commit" } else { "abort" },
            touched.len()
        );

        for &pid in &touched {
            let handle = self.pages.lock().unwrap().get(&pid).cloned();
            if let Some(handle) = handle {
                let mut page = handle.lock().unwrap();
                if page.dirtied_by().is_some() {
                    if commit {
                        self.flush_locked(pid, &mut page)?;
                        page.mark_dirty(None);
                        page.set_before_image();
                    } else {
                        basalt_debug_log!(
                            "[BufferPool::transaction_complete] rolling back page {pid}"
                        );
                        let file = self.catalog.file(pid.table_id)?;
                        *page = file.read_page(pid)?;
                    }
                }
            }
            self.lock_manager.release_all(tid, pid)?;
        }

        self.touched.lock().unwrap().remove(&tid);
        Ok(())
    }

    /// Logs and writes one page. The log record and its force precede the
    /// heap-file write, which is what a recovery layer would rely on.
    fn flush_locked(&self, pid: PageId, page: &mut HeapPage) -> Result<(), DbError> {
        if let Some(dirtier) = page.dirtied_by() {
            failpoint::trip(FaultSite::LogWrite)?;
            self.log
                .log_write(dirtier, pid, page.before_image(), &page.page_data())?;
            failpoint::trip(FaultSite::LogForce)?;
            self.log.force()?;
        }
        failpoint::trip(FaultSite::PageWrite)?;
        let file = self.catalog.file(pid.table_id)?;
        file.write_page(page)?;
        Ok(())
    }

    /// Writes one cached page through to disk (leaving its dirty marker
    /// untouched). No-op when the page is not cached.
    pub fn flush_page(&self, pid: PageId) -> Result<(), DbError> {
        let handle = self.pages.lock().unwrap().get(&pid).cloned();
        if let Some(handle) = handle {
            let mut page = handle.lock().unwrap();
            self.flush_locked(pid, &mut page)?;
        }
        Ok(())
    }

    /// Writes every dirty page a transaction has touched and marks them
    /// clean again.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<(), DbError> {
        let Some(touched) = self.touched.lock().unwrap().get(&tid).cloned() else {
            return Ok(());
        };
        for pid in touched {
            let handle = self.pages.lock().unwrap().get(&pid).cloned();
            if let Some(handle) = handle {
                let mut page = handle.lock().unwrap();
                if page.dirtied_by().is_some() {
                    self.flush_locked(pid, &mut page)?;
                    page.mark_dirty(None);
                    page.set_before_image();
                }
            }
        }
        Ok(())
    }

    /// Writes every currently-dirty page through. This writes uncommitted
    /// data under NO STEAL; the caller owns the consequences.
    pub fn flush_all_pages(&self) -> Result<(), DbError> {
        let dirty: Vec<PageId> = {
            let pages = self.pages.lock().unwrap();
            pages
                .iter()
                .filter(|(_, handle)| handle.lock().unwrap().dirtied_by().is_some())
                .map(|(pid, _)| *pid)
                .collect()
        };
        for pid in dirty {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, pid: PageId) {
        self.pages.lock().unwrap().remove(&pid);
    }

    #[cfg(test)]
    fn cached_pids(&self) -> Vec<PageId> {
        self.pages.lock().unwrap().keys().copied().collect()
    }
}
