use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use slog::Logger;

use crate::error::{ConcordError, Result};

/// A single entry in a Raft node's replicated log.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub command: String,
}

impl LogEntry {
    pub fn new(term: u64, command: impl Into<String>) -> LogEntry {
        LogEntry {
            term,
            command: command.into(),
        }
    }

    fn to_line(&self) -> Result<String> {
        if self.command.contains(',') || self.command.contains('\n') {
            return Err(ConcordError::Fatal(format!(
                "log command must not contain a comma or newline: {:?}",
                self.command
            )));
        }
        Ok(format!("{},{}", self.term, self.command))
    }

    fn from_line(line: &str) -> Result<LogEntry> {
        let (term, command) = line.split_once(',').ok_or_else(|| {
            ConcordError::Fatal(format!("corrupt log line (no comma): {:?}", line))
        })?;
        let term: u64 = term
            .parse()
            .map_err(|_| ConcordError::Fatal(format!("corrupt log line (bad term): {:?}", line)))?;
        Ok(LogEntry {
            term,
            command: command.to_string(),
        })
    }
}

/// The persisted term/vote the node must restore before answering any vote
/// or append-entries RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedMeta {
    pub current_term: u64,
    pub voted_for: Option<String>,
}

impl Default for PersistedMeta {
    fn default() -> Self {
        PersistedMeta {
            current_term: 0,
            voted_for: None,
        }
    }
}

const META_PREFIX: &str = "meta,";

struct Inner {
    meta: PersistedMeta,
    entries: Vec<LogEntry>,
    last_mtime: Option<SystemTime>,
}

/// An append-only log on stable storage, owned exclusively by one Raft node.
/// The first line of the file is a distinguished meta line carrying
/// `current_term`/`voted_for`; every following line is one log entry.
pub struct DurableLogStore {
    path: PathBuf,
    logger: Logger,
    inner: Mutex<Inner>,
}

impl DurableLogStore {
    pub fn new(path: impl Into<PathBuf>, logger: Logger) -> Result<DurableLogStore> {
        let path = path.into();
        let (meta, entries) = Self::read_file(&path)?;
        let last_mtime = Self::mtime(&path);
        Ok(DurableLogStore {
            path,
            logger,
            inner: Mutex::new(Inner {
                meta,
                entries,
                last_mtime,
            }),
        })
    }

    fn mtime(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).ok().and_then(|m| m.modified().ok())
    }

    fn read_file(path: &Path) -> Result<(PersistedMeta, Vec<LogEntry>)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((PersistedMeta::default(), Vec::new()))
            }
            Err(e) => return Err(e.into()),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut meta = PersistedMeta::default();
        let mut entries = Vec::new();

        if let Some(first) = lines.next() {
            let first = first?;
            if let Some(rest) = first.strip_prefix(META_PREFIX) {
                let (term, voted_for) = rest.split_once(',').ok_or_else(|| {
                    ConcordError::Fatal(format!("corrupt meta line: {:?}", first))
                })?;
                let term: u64 = term.parse().map_err(|_| {
                    ConcordError::Fatal(format!("corrupt meta line (bad term): {:?}", first))
                })?;
                let voted_for = if voted_for == "-" {
                    None
                } else {
                    Some(voted_for.to_string())
                };
                meta = PersistedMeta {
                    current_term: term,
                    voted_for,
                };
            } else {
                entries.push(LogEntry::from_line(&first)?);
            }
        }

        for line in lines {
            entries.push(LogEntry::from_line(&line?)?);
        }

        Ok((meta, entries))
    }

    fn write_file(path: &Path, meta: &PersistedMeta, entries: &[LogEntry]) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let voted_for = meta.voted_for.as_deref().unwrap_or("-");
            writeln!(tmp, "{}{},{}", META_PREFIX, meta.current_term, voted_for)?;
            for entry in entries {
                writeln!(tmp, "{}", entry.to_line()?)?;
            }
            tmp.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Reload in-memory state from disk if the file's mtime has changed since
    /// the last load. This is how a follower observes an administrative
    /// deletion of its log file.
    pub fn refresh(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let current_mtime = Self::mtime(&self.path);
        if current_mtime != inner.last_mtime {
            let (meta, entries) = Self::read_file(&self.path)?;
            inner.meta = meta;
            inner.entries = entries;
            inner.last_mtime = current_mtime;
        }
        Ok(())
    }

    pub fn append(&self, entry: LogEntry) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.push(entry);
        let meta = inner.meta.clone();
        let entries = inner.entries.clone();
        Self::write_file(&self.path, &meta, &entries)?;
        inner.last_mtime = Self::mtime(&self.path);
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<LogEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.entries.clone())
    }

    pub fn replace_all(&self, entries: Vec<LogEntry>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let meta = inner.meta.clone();
        Self::write_file(&self.path, &meta, &entries)?;
        inner.entries = entries;
        inner.last_mtime = Self::mtime(&self.path);
        Ok(())
    }

    pub fn truncate_suffix(&self, index: usize) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        let kept: Vec<LogEntry> = inner.entries[..index.min(inner.entries.len())].to_vec();
        drop(inner);
        self.replace_all(kept)
    }

    pub fn delete(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        inner.entries.clear();
        inner.last_mtime = None;
        slog::info!(self.logger, "deleted log file"; "path" => self.path.display().to_string());
        Ok(())
    }

    pub fn load_meta(&self) -> Result<PersistedMeta> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.meta.clone())
    }

    /// Persist `current_term`/`voted_for` before the node responds to a vote
    /// or append-entries RPC.
    pub fn save_meta(&self, meta: PersistedMeta) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::write_file(&self.path, &meta, &inner.entries)?;
        inner.meta = meta;
        inner.last_mtime = Self::mtime(&self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::get_test_logger;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("concord-log-store-test-{}-{}-{}", std::process::id(), n, name))
    }

    #[test]
    fn append_and_load_round_trips() {
        let path = temp_path("append");
        let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
        store.append(LogEntry::new(1, "a")).unwrap();
        store.append(LogEntry::new(1, "b")).unwrap();
        store.append(LogEntry::new(2, "c")).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(
            loaded,
            vec![
                LogEntry::new(1, "a"),
                LogEntry::new(1, "b"),
                LogEntry::new(2, "c"),
            ]
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_empty() {
        let path = temp_path("missing");
        let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
        assert_eq!(store.load_all().unwrap(), Vec::new());
    }

    #[test]
    fn replace_all_of_load_all_is_noop() {
        let path = temp_path("idempotent");
        let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
        store.append(LogEntry::new(1, "a")).unwrap();
        store.append(LogEntry::new(2, "b")).unwrap();

        let loaded = store.load_all().unwrap();
        store.replace_all(loaded.clone()).unwrap();
        assert_eq!(store.load_all().unwrap(), loaded);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn truncate_suffix_drops_tail() {
        let path = temp_path("truncate");
        let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
        store.append(LogEntry::new(1, "a")).unwrap();
        store.append(LogEntry::new(1, "b")).unwrap();
        store.append(LogEntry::new(1, "c")).unwrap();

        store.truncate_suffix(1).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![LogEntry::new(1, "a")]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn delete_then_load_all_is_empty() {
        let path = temp_path("delete");
        let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
        store.append(LogEntry::new(1, "a")).unwrap();
        store.delete().unwrap();
        assert_eq!(store.load_all().unwrap(), Vec::new());
    }

    #[test]
    fn meta_persists_across_reopen() {
        let path = temp_path("meta");
        {
            let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
            store
                .save_meta(PersistedMeta {
                    current_term: 4,
                    voted_for: Some("node2".to_string()),
                })
                .unwrap();
        }
        let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
        assert_eq!(
            store.load_meta().unwrap(),
            PersistedMeta {
                current_term: 4,
                voted_for: Some("node2".to_string()),
            }
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_line_is_fatal() {
        let path = temp_path("corrupt");
        fs::write(&path, "meta,0,-\nnot-a-valid-line-without-comma-but-with-term\n").ok();
        // A line missing the comma separator is corrupt.
        fs::write(&path, "meta,0,-\nnocomma\n").unwrap();
        let result = DurableLogStore::new(&path, get_test_logger());
        assert!(matches!(result, Err(ConcordError::Fatal(_))));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn refresh_observes_external_deletion() {
        let path = temp_path("refresh");
        let store = DurableLogStore::new(&path, get_test_logger()).unwrap();
        store.append(LogEntry::new(1, "a")).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);

        fs::remove_file(&path).unwrap();
        store.refresh().unwrap();
        assert_eq!(store.load_all().unwrap(), Vec::new());
    }
}
