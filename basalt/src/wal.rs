//! The narrow write-ahead log interface consumed at commit.
//!
//! The buffer pool promises that for every dirty page it flushes, the log
//! record carrying the page's before- and after-images is written and forced
//! before the page itself reaches the heap file. Nothing here replays the
//! log; recovery is a separate concern layered on the same ordering
//! guarantee.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::transaction::TransactionId;
use crate::tuple::PageId;

/// What the buffer pool needs from a log at commit time.
pub trait RecoveryLog: Send + Sync {
    /// Records the transition of one page. Must precede the page write.
    fn log_write(
        &self,
        tid: TransactionId,
        pid: PageId,
        before_image: &[u8],
        after_image: &[u8],
    ) -> io::Result<()>;

    /// Persists every preceding `log_write`.
    fn force(&self) -> io::Result<()>;
}

/// One record in the log file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WalRecord {
    pub tid: u64,
    pub table_id: u32,
    pub page_no: u64,
    pub before_image: Vec<u8>,
    pub after_image: Vec<u8>,
}

/// Fixed-size prefix of every record: total length, transaction id and a
/// CRC32 of the encoded body.
const HEADER_LEN: usize = 4 + 8 + 4;

fn encode_header(total_len: u32, tid: u64, crc: u32) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..4].copy_from_slice(&total_len.to_le_bytes());
    out[4..12].copy_from_slice(&tid.to_le_bytes());
    out[12..].copy_from_slice(&crc.to_le_bytes());
    out
}

fn decode_header(raw: &[u8; HEADER_LEN]) -> (u32, u64, u32) {
    let total_len = u32::from_le_bytes(raw[..4].try_into().unwrap());
    let tid = u64::from_le_bytes(raw[4..12].try_into().unwrap());
    let crc = u32::from_le_bytes(raw[12..].try_into().unwrap());
    (total_len, tid, crc)
}

/// Append-only file-backed log.
pub struct WalFile {
    file: Mutex<File>,
}

impl WalFile {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Reads every record back, verifying checksums. For tests and
    /// recovery-adjacent tooling.
    pub fn records(&self) -> io::Result<Vec<WalRecord>> {
        let mut buf = Vec::new();
        {
            let file = self.file.lock().unwrap();
            let mut reader = file.try_clone()?;
            drop(file);
            reader.seek(SeekFrom::Start(0))?;
            reader.read_to_end(&mut buf)?;
        }

        let mut records = Vec::new();
        let mut pos = 0;
        while pos + HEADER_LEN <= buf.len() {
            let raw: [u8; HEADER_LEN] = buf[pos..pos + HEADER_LEN].try_into().unwrap();
            let (total_len, _tid, crc) = decode_header(&raw);
            let body_start = pos + HEADER_LEN;
            let body_end = pos + total_len as usize;
            if body_end > buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated log record",
                ));
            }
            let body = &buf[body_start..body_end];

            let mut hasher = Hasher::new();
            hasher.update(body);
            if hasher.finalize() != crc {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "log record crc mismatch",
                ));
            }

            let record = bincode::deserialize(body)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
            pos = body_end;
        }
        Ok(records)
    }
}

impl RecoveryLog for WalFile {
    fn log_write(
        &self,
        tid: TransactionId,
        pid: PageId,
        before_image: &[u8],
        after_image: &[u8],
    ) -> io::Result<()> {
        let record = WalRecord {
            tid: tid.raw(),
            table_id: pid.table_id,
            page_no: pid.page_no as u64,
            before_image: before_image.to_vec(),
            after_image: after_image.to_vec(),
        };
        let body = bincode::serialize(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let total_len = (HEADER_LEN + body.len()) as u32;
        let header = encode_header(total_len, tid.raw(), crc);

        let mut file = self.file.lock().unwrap();
        file.write_all(&header)?;
        file.write_all(&body)?;
        Ok(())
    }

    fn force(&self) -> io::Result<()> {
        let file = self.file.lock().unwrap();
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_round_trip_with_checksums() {
        let dir = tempdir().unwrap();
        let wal = WalFile::open(dir.path().join("onyx.wal")).unwrap();

        let tid = TransactionId::new();
        let pid = PageId::new(3, 7);
        wal.log_write(tid, pid, &[1, 2, 3], &[4, 5, 6]).unwrap();
        wal.log_write(tid, pid, &[4, 5, 6], &[7, 8, 9]).unwrap();
        wal.force().unwrap();

        let records = wal.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tid, tid.raw());
        assert_eq!(records[0].table_id, 3);
        assert_eq!(records[0].page_no, 7);
        assert_eq!(records[0].after_image, vec![4, 5, 6]);
        assert_eq!(records[1].before_image, vec![4, 5, 6]);
    }

    #[test]
    fn reopening_preserves_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("onyx.wal");

        let tid = TransactionId::new();
        {
            let wal = WalFile::open(&path).unwrap();
            wal.log_write(tid, PageId::new(1, 0), &[0], &[1]).unwrap();
            wal.force().unwrap();
        }
        let wal = WalFile::open(&path).unwrap();
        wal.log_write(tid, PageId::new(1, 1), &[1], &[2]).unwrap();
        assert_eq!(wal.records().unwrap().len(), 2);
    }
}
