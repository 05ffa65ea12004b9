use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use csv::{ReaderBuilder, Terminator, Writer, WriterBuilder};
use log::{debug, error, info};

use crate::data_capture::types::CapturedRequest;
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::RequestLog;
use crate::storage::types::{LogRow, LOG_HEADER};

/// Append-only CSV request log.
///
/// Every operation runs under one process-wide lock covering open, write,
/// flush and close of the file, so concurrent appends land as whole rows in a
/// single order. The file is reopened per call and never held between calls.
pub struct CsvLogStore {
    path: PathBuf,
    appended: Mutex<u64>, // rows appended by this process; guards the file
}

impl CsvLogStore {
    /// Creates a store for `path`. No I/O happens until the first operation.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            appended: Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows successfully appended through this instance.
    pub fn appended(&self) -> u64 {
        *self.lock()
    }

    /// Creates the file if needed and writes the header row if it is empty.
    ///
    /// Calling it again, or on a file that already has content, is a no-op.
    pub fn initialize(&self) -> Result<(), StorageError> {
        let _guard = self.lock();
        let mut file = self.open()?;
        let offset = self.current_len(&file)?;
        if offset > 0 {
            debug!("Request log {} already initialized ({} byte(s))", self.path.display(), offset);
            return Ok(());
        }

        let mut writer = row_writer();
        writer
            .write_record(LOG_HEADER)
            .map_err(|e| StorageError::EncodeFailed(e.to_string()))?;
        let buf = finish(writer)?;
        commit(&self.path, &mut file, offset, &buf)?;
        info!("Initialized request log {}", self.path.display());
        Ok(())
    }

    /// Reads every persisted row back, in file order.
    ///
    /// A missing or empty file yields no rows. A file whose first row is not
    /// the expected header is rejected.
    pub fn read_rows(&self) -> Result<Vec<LogRow>, StorageError> {
        let _guard = self.lock();
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!("Failed to open request log {}: {}", self.path.display(), e);
                return Err(StorageError::ReadFailed(e.to_string()));
            }
        };

        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?
            .clone();
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        if headers.iter().ne(LOG_HEADER.iter().copied()) {
            error!("Unexpected header in {}: {:?}", self.path.display(), headers);
            return Err(StorageError::ReadFailed(format!("unexpected header {:?}", headers)));
        }

        let rows = reader
            .deserialize::<LogRow>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                error!("Malformed row in {}: {}", self.path.display(), e);
                StorageError::ReadFailed(e.to_string())
            })?;
        debug!("Read {} row(s) from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // The file on disk is the state that matters; a panicked holder
        // cannot have left a partial row behind.
        self.appended.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> Result<File, StorageError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                error!("Failed to open request log {}: {}", self.path.display(), e);
                StorageError::OpenFailed(e)
            })
    }

    fn current_len(&self, file: &File) -> Result<u64, StorageError> {
        file.metadata().map(|m| m.len()).map_err(|e| {
            error!("Failed to stat request log {}: {}", self.path.display(), e);
            StorageError::OpenFailed(e)
        })
    }
}

impl RequestLog for CsvLogStore {
    fn append(&self, record: CapturedRequest) -> Result<(), StorageError> {
        let row = LogRow::from(record);

        let mut appended = self.lock();
        let mut file = self.open()?;
        let offset = self.current_len(&file)?;

        let mut writer = row_writer();
        if offset == 0 {
            writer
                .write_record(LOG_HEADER)
                .map_err(|e| StorageError::EncodeFailed(e.to_string()))?;
        }
        writer
            .serialize(&row)
            .map_err(|e| StorageError::EncodeFailed(e.to_string()))?;
        let buf = finish(writer)?;
        commit(&self.path, &mut file, offset, &buf)?;

        *appended += 1;
        info!(
            "Logged request to {}: {} {} {} at {}",
            self.path.display(),
            row.remote_addr,
            row.method,
            row.request_uri,
            row.event_time
        );
        Ok(())
    }
}

/// What a commit needs from the underlying log file.
trait LogFile: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Writes `buf` in one go and syncs it. On failure the file is cut back
/// to `offset` so no partial row survives.
fn commit<F: LogFile>(path: &Path, file: &mut F, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
    if let Err(e) = file.write_all(buf).and_then(|()| file.sync()) {
        error!("Failed to append to request log {}: {}", path.display(), e);
        if let Err(rollback) = file.truncate(offset) {
            error!(
                "Failed to roll back request log {} to {} byte(s): {}",
                path.display(),
                offset,
                rollback
            );
        }
        return Err(StorageError::WriteFailed(e));
    }
    Ok(())
}

fn row_writer() -> Writer<Vec<u8>> {
    WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: Writer<Vec<u8>>) -> Result<Vec<u8>, StorageError> {
    writer
        .into_inner()
        .map_err(|e| StorageError::EncodeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::types::{FormFields, HeaderSnapshot};
    use std::fs;
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn record(addr: &str, method: &str, uri: &str, ua: &str, time: u64) -> CapturedRequest {
        CapturedRequest {
            remote_addr: addr.to_string(),
            peer: None,
            method: method.to_string(),
            request_uri: uri.to_string(),
            headers: HeaderSnapshot::default(),
            user_agent: ua.to_string(),
            form: FormFields::default(),
            event_time: time,
            honeypot_name: "web-01".to_string(),
        }
    }

    fn header_count(content: &str) -> usize {
        content
            .lines()
            .filter(|l| *l == "RemoteAddr,Method,RequestURI,UserAgent,EventTime,HoneypotName")
            .count()
    }

    #[test]
    fn test_first_append_writes_header_then_row() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("requests_log.csv"));

        store
            .append(record("10.0.0.5", "POST", "/login", "curl/8.0", 1_700_000_000))
            .unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            content,
            "RemoteAddr,Method,RequestURI,UserAgent,EventTime,HoneypotName\n\
             10.0.0.5,POST,/login,curl/8.0,1700000000,web-01\n"
        );
        assert_eq!(store.appended(), 1);
    }

    #[test]
    fn test_rows_read_back_in_append_order() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("log.csv"));

        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("192.0.2.{}", i), "GET", &format!("/p/{}", i), "scanner", 100 + i))
            .collect();
        let expected: Vec<LogRow> = records.iter().cloned().map(LogRow::from).collect();
        for r in records {
            store.append(r).unwrap();
        }

        assert_eq!(store.read_rows().unwrap(), expected);
        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(header_count(&content), 1);
        assert_eq!(content.lines().count(), 11);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("log.csv"));

        store.initialize().unwrap();
        store.initialize().unwrap();
        store.append(record("::1", "HEAD", "/", "", 1)).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(header_count(&content), 1);
        assert_eq!(content.lines().count(), 2);
        assert_eq!(store.read_rows().unwrap().len(), 1);
    }

    #[test]
    fn test_existing_log_is_appended_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.csv");

        let first = CsvLogStore::new(&path);
        first.append(record("198.51.100.1", "GET", "/a", "ua", 1)).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let second = CsvLogStore::new(&path);
        second.initialize().unwrap();
        second.append(record("198.51.100.2", "GET", "/b", "ua", 2)).unwrap();
        let after = fs::read_to_string(&path).unwrap();

        assert!(after.starts_with(&before));
        assert_eq!(header_count(&after), 1);
        let rows = second.read_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].request_uri, "/a");
        assert_eq!(rows[1].request_uri, "/b");
    }

    #[test]
    fn test_concurrent_appends_are_whole_and_header_written_once() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("log.csv"));
        let threads = 16;
        let per_thread = 20;
        let barrier = Barrier::new(threads);

        std::thread::scope(|s| {
            for t in 0..threads {
                let store = &store;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..per_thread {
                        let ua = format!("agent {} with, comma and \"quotes\" #{}", t, i);
                        store
                            .append(record("203.0.113.9", "POST", &format!("/t{}/{}", t, i), &ua, 42))
                            .unwrap();
                    }
                });
            }
        });

        let rows = store.read_rows().unwrap();
        assert_eq!(rows.len(), threads * per_thread);
        assert_eq!(store.appended(), (threads * per_thread) as u64);

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(header_count(&content), 1);
        assert!(content.starts_with("RemoteAddr,"));

        for t in 0..threads {
            let mine: Vec<_> = rows
                .iter()
                .filter(|r| r.request_uri.starts_with(&format!("/t{}/", t)))
                .collect();
            assert_eq!(mine.len(), per_thread);
            // a single thread's appends keep their relative order
            for (i, row) in mine.iter().enumerate() {
                assert_eq!(row.request_uri, format!("/t{}/{}", t, i));
                assert_eq!(row.user_agent, format!("agent {} with, comma and \"quotes\" #{}", t, i));
            }
        }
    }

    #[test]
    fn test_fields_with_separators_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("log.csv"));
        let ua = "Mozilla/5.0 (X11, Linux)\r\n\"injected\",1,2,3";

        store.append(record("10.1.1.1", "GET", "/?a=1,2", ua, 7)).unwrap();

        let rows = store.read_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_agent, ua);
        assert_eq!(rows[0].request_uri, "/?a=1,2");
        assert_eq!(rows[0].event_time, 7);
    }

    #[test]
    fn test_unopenable_log_reports_error() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("missing").join("log.csv"));

        let err = store.append(record("10.0.0.1", "GET", "/", "", 1)).unwrap_err();
        assert!(matches!(err, StorageError::OpenFailed(_)));
        assert!(store.initialize().is_err());
        assert_eq!(store.appended(), 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_read_rows_of_missing_or_empty_file() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("log.csv"));
        assert!(store.read_rows().unwrap().is_empty());

        fs::write(store.path(), "").unwrap();
        assert!(store.read_rows().unwrap().is_empty());

        store.initialize().unwrap();
        assert!(store.read_rows().unwrap().is_empty());
    }

    #[test]
    fn test_read_rows_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("log.csv"));
        fs::write(store.path(), "a,b,c\n1,2,3\n").unwrap();

        assert!(matches!(store.read_rows(), Err(StorageError::ReadFailed(_))));
    }

    /// In-memory file that accepts `capacity` bytes in total, then fails.
    struct CappedFile {
        data: Vec<u8>,
        capacity: usize,
        fail_sync: bool,
    }

    impl Write for CappedFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity.saturating_sub(self.data.len());
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogFile for CappedFile {
        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync {
                return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
            }
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn test_short_write_is_rolled_back() {
        let existing = b"RemoteAddr,Method,RequestURI,UserAgent,EventTime,HoneypotName\n".to_vec();
        let mut file = CappedFile {
            data: existing.clone(),
            capacity: existing.len() + 10,
            fail_sync: false,
        };

        let result = commit(
            Path::new("capped.csv"),
            &mut file,
            existing.len() as u64,
            b"10.0.0.5,POST,/login,curl/8.0,1700000000,web-01\n",
        );

        assert!(matches!(result, Err(StorageError::WriteFailed(_))));
        assert_eq!(file.data, existing);
    }

    #[test]
    fn test_failed_sync_is_rolled_back() {
        let mut file = CappedFile {
            data: Vec::new(),
            capacity: usize::MAX,
            fail_sync: true,
        };

        let result = commit(Path::new("capped.csv"), &mut file, 0, b"a,b\n");

        assert!(matches!(result, Err(StorageError::WriteFailed(_))));
        assert!(file.data.is_empty());
    }

    #[test]
    fn test_complete_write_is_kept() {
        let mut file = CappedFile {
            data: b"x\n".to_vec(),
            capacity: usize::MAX,
            fail_sync: false,
        };

        commit(Path::new("capped.csv"), &mut file, 2, b"a,b\n").unwrap();

        assert_eq!(file.data, b"x\na,b\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_device_reports_write_failure() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let store = CsvLogStore::new("/dev/full");

        let err = store.append(record("10.0.0.1", "GET", "/", "", 1)).unwrap_err();

        assert!(matches!(err, StorageError::WriteFailed(_)));
        assert_eq!(store.appended(), 0);
    }
}
