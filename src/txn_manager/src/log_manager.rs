use common::ids::{ContainerId, Lsn, Rid};
use common::QuarryError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// What a log record describes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LogRecordKind {
    Begin,
    Commit,
    Abort,
    Insert {
        container_id: ContainerId,
        rid: Rid,
        bytes: Vec<u8>,
    },
    Delete {
        container_id: ContainerId,
        rid: Rid,
        bytes: Vec<u8>,
    },
    Update {
        container_id: ContainerId,
        rid: Rid,
        old_bytes: Vec<u8>,
        new_bytes: Vec<u8>,
    },
}

/// One write-ahead log record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: u64,
    pub prev_lsn: Lsn,
    pub kind: LogRecordKind,
}

/// The log: an in-memory buffer appended to one log file per database.
/// Records are serialized as JSON lines; a static checkpoint truncates the
/// file.
pub struct LogManager {
    path: PathBuf,
    buffer: Mutex<Vec<LogRecord>>,
    next_lsn: AtomicU64,
}

impl LogManager {
    pub fn new(path: PathBuf) -> Result<Self, QuarryError> {
        // Create the file eagerly so open_db sees it.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| QuarryError::IOError(format!("Cannot open log file {:?}: {}", path, e)))?;
        Ok(LogManager {
            path,
            buffer: Mutex::new(Vec::new()),
            next_lsn: AtomicU64::new(0),
        })
    }

    /// Append a record to the log buffer, assigning its lsn.
    pub fn add_log_to_buffer(
        &self,
        txn_id: u64,
        prev_lsn: Lsn,
        kind: LogRecordKind,
    ) -> Lsn {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        let record = LogRecord {
            lsn,
            txn_id,
            prev_lsn,
            kind,
        };
        self.buffer.lock().unwrap().push(record);
        lsn
    }

    /// Write the buffered records out and clear the buffer.
    pub fn flush_log_to_disk(&self) -> Result<(), QuarryError> {
        let records: Vec<LogRecord> = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.drain(..).collect()
        };
        if records.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for record in records {
            let line = serde_json::to_string(&record).map_err(|e| {
                QuarryError::InternalError(format!("Cannot serialize log record: {}", e))
            })?;
            writeln!(file, "{}", line)?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Discard the buffer and truncate the log file. Used by the static
    /// checkpoint after everything dirty has been flushed.
    pub fn truncate(&self) -> Result<(), QuarryError> {
        self.buffer.lock().unwrap().clear();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        Ok(())
    }

    /// Number of records waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::testutil::*;
    use std::fs;
    use temp_testdir::TempDir;

    #[test]
    fn test_log_append_flush_truncate() {
        init();
        let tdir = TempDir::new(gen_random_dir(), true);
        let mut path = tdir.to_path_buf();
        fs::create_dir_all(&path).unwrap();
        path.push("db.log");
        let lm = LogManager::new(path.clone()).unwrap();

        let l0 = lm.add_log_to_buffer(1, common::ids::INVALID_LSN, LogRecordKind::Begin);
        let l1 = lm.add_log_to_buffer(
            1,
            l0,
            LogRecordKind::Insert {
                container_id: 3,
                rid: Rid::new(0, 0),
                bytes: vec![1, 2, 3],
            },
        );
        assert!(l1 > l0);
        assert_eq!(2, lm.buffered());
        lm.flush_log_to_disk().unwrap();
        assert_eq!(0, lm.buffered());
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(2, contents.lines().count());

        lm.truncate().unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.is_empty());
    }
}
