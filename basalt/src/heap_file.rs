//! Heap files: fixed-size pages stored contiguously in a single file.
//!
//! Page N lives at byte offset `N * PAGE_SIZE`; there is no file header.
//! All page traffic from query execution goes through the buffer pool so
//! that locking and caching stay in one place; this module only touches the
//! file directly for raw page reads and writes.

use std::collections::hash_map::DefaultHasher;
use std::fs::{create_dir_all, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::basalt_debug_log;
use crate::buffer_pool::{BufferPool, PageHandle};
use crate::errors::DbError;
use crate::heap_page::HeapPage;
use crate::lock_manager::LockMode;
use crate::schema::Schema;
use crate::transaction::TransactionId;
use crate::tuple::{PageId, Tuple};
use crate::PAGE_SIZE;

/// One table's on-disk storage.
pub struct HeapFile {
    file: Mutex<File>,
    path: PathBuf,
    id: u32,
    schema: Arc<Schema>,
    num_pages: AtomicUsize,
}

impl HeapFile {
    /// Opens (creating if needed) the heap file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, schema: Arc<Schema>) -> Result<Self, DbError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        let abs = std::fs::canonicalize(path_ref)?;
        let mut hasher = DefaultHasher::new();
        abs.hash(&mut hasher);
        let id = hasher.finish() as u32;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as usize;
        basalt_debug_log!(
            "[HeapFile::open] {abs:?}: id {id}, {file_size} bytes, {num_pages} pages"
        );

        Ok(Self {
            file: Mutex::new(file),
            path: abs,
            id,
            schema,
            num_pages: AtomicUsize::new(num_pages),
        })
    }

    /// Stable table id derived from the absolute file path.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of pages in this file, counting pages allocated but not yet
    /// flushed.
    pub fn num_pages(&self) -> usize {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Reads one page.
    ///
    /// A request for the page just past the end allocates a fresh empty page
    /// and extends the page count, so a writer can grow the table through
    /// the ordinary read path. Anything further out is an error.
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage, DbError> {
        let num_pages = self.num_pages();
        if pid.page_no > num_pages {
            return Err(DbError::Storage(format!(
                "page {} is out of range for a {num_pages}-page file",
                pid
            )));
        }
        if pid.page_no == num_pages {
            self.num_pages.fetch_add(1, Ordering::SeqCst);
            basalt_debug_log!("[HeapFile::read_page] allocating fresh page {pid}");
            return HeapPage::new(pid, &HeapPage::empty_page_data(), self.schema.clone());
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        {
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start((pid.page_no * PAGE_SIZE) as u64))?;
            // An allocated-but-never-flushed page reads short; the tail of
            // the buffer stays zero, which parses as empty slots.
            let mut filled = 0;
            while filled < PAGE_SIZE {
                let n = file.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
        }
        HeapPage::new(pid, &buf, self.schema.clone())
    }

    /// Writes one page at its offset, extending the file when appending.
    pub fn write_page(&self, page: &HeapPage) -> Result<(), DbError> {
        let pid = page.pid();
        let bytes = page.page_data();
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((pid.page_no * PAGE_SIZE) as u64))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        self.num_pages.fetch_max(pid.page_no + 1, Ordering::SeqCst);
        basalt_debug_log!("[HeapFile::write_page] wrote page {pid}");
        Ok(())
    }

    /// Finds room for `tuple`, inserts it, and returns the modified pages.
    ///
    /// Existing pages are probed under a read lock. A full page's probe lock
    /// is released on the spot rather than held to commit; the probe saw no
    /// row data it acts on and the insert lands on a different page, so this
    /// deliberate, local departure from two-phase locking keeps bulk loads
    /// from write-locking the whole table. The first page with a free slot
    /// is re-acquired under a write lock and takes the tuple; if every page
    /// is full, the page past the end is requested under a write lock, which
    /// makes `read_page` allocate it.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<PageHandle>, DbError> {
        for page_no in 0..self.num_pages() {
            let pid = PageId::new(self.id, page_no);
            let handle = pool.get_page(tid, pid, LockMode::Shared)?;
            let has_room = handle.lock().unwrap().num_empty_slots() > 0;
            if has_room {
                let handle = pool.get_page(tid, pid, LockMode::Exclusive)?;
                handle.lock().unwrap().insert_tuple(tuple)?;
                return Ok(vec![handle]);
            }
            pool.release_page(tid, pid)?;
        }

        let pid = PageId::new(self.id, self.num_pages());
        basalt_debug_log!("[HeapFile::insert_tuple] extending table {} with page {pid}", self.id);
        let handle = pool.get_page(tid, pid, LockMode::Exclusive)?;
        handle.lock().unwrap().insert_tuple(tuple)?;
        Ok(vec![handle])
    }

    /// Deletes the tuple at its record id and returns the modified page.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<PageHandle>, DbError> {
        let rid = tuple.record_id().ok_or_else(|| {
            DbError::Storage("cannot delete a tuple that was never placed".to_string())
        })?;
        let handle = pool.get_page(tid, rid.page_id, LockMode::Exclusive)?;
        handle.lock().unwrap().delete_tuple(tuple)?;
        Ok(vec![handle])
    }

    /// A cursor over every tuple in the file, in page order then slot
    /// order. Each page is fetched through the buffer pool under a read
    /// lock as the cursor reaches it.
    pub fn iterator(self: &Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapFileIter {
        HeapFileIter {
            file: self.clone(),
            pool,
            tid,
            next_page: 0,
            current: Vec::new(),
            pos: 0,
        }
    }
}

/// Lazy table cursor; obtain a fresh one (or call [`HeapFileIter::rewind`])
/// to restart.
pub struct HeapFileIter {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    next_page: usize,
    current: Vec<Tuple>,
    pos: usize,
}

impl HeapFileIter {
    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            if self.pos < self.current.len() {
                let tuple = self.current[self.pos].clone();
                self.pos += 1;
                return Ok(Some(tuple));
            }
            if self.next_page >= self.file.num_pages() {
                return Ok(None);
            }
            let pid = PageId::new(self.file.id(), self.next_page);
            self.next_page += 1;
            let handle = self.pool.get_page(self.tid, pid, LockMode::Shared)?;
            let page = handle.lock().unwrap();
            self.current = page.iter().cloned().collect();
            self.pos = 0;
        }
    }

    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current.clear();
        self.pos = 0;
    }
}
