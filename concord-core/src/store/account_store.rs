use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use slog::Logger;

use crate::error::{ConcordError, Result};

/// A single scalar balance on stable storage, owned exclusively by one
/// participant. Writes are atomic (write-to-temp-then-rename).
pub struct DurableAccountStore {
    path: PathBuf,
    logger: Logger,
    balance: Mutex<i64>,
}

impl DurableAccountStore {
    /// Opens the account file, initializing it with `initial_balance` if it
    /// does not yet exist.
    pub fn new(path: impl Into<PathBuf>, initial_balance: i64, logger: Logger) -> Result<DurableAccountStore> {
        let path = path.into();
        let balance = match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents)?,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::write_file(&path, initial_balance)?;
                initial_balance
            }
            Err(e) => return Err(e.into()),
        };
        Ok(DurableAccountStore {
            path,
            logger,
            balance: Mutex::new(balance),
        })
    }

    fn parse(contents: &str) -> Result<i64> {
        contents
            .trim()
            .parse()
            .map_err(|_| ConcordError::Fatal(format!("corrupt account balance: {:?}", contents)))
    }

    fn write_file(path: &PathBuf, balance: i64) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, balance.to_string())?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn read(&self) -> i64 {
        *self.balance.lock().unwrap()
    }

    pub fn write(&self, new_balance: i64) -> Result<()> {
        let mut balance = self.balance.lock().unwrap();
        Self::write_file(&self.path, new_balance)?;
        slog::debug!(self.logger, "wrote balance"; "balance" => new_balance);
        *balance = new_balance;
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
        std::env::temp_dir().join(format!("concord-account-store-test-{}-{}-{}", std::process::id(), n, name))
    }

    #[test]
    fn first_start_initializes_balance() {
        let path = temp_path("init");
        let store = DurableAccountStore::new(&path, 200, get_test_logger()).unwrap();
        assert_eq!(store.read(), 200);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn write_then_reopen_persists() {
        let path = temp_path("persist");
        {
            let store = DurableAccountStore::new(&path, 200, get_test_logger()).unwrap();
            store.write(100).unwrap();
        }
        let store = DurableAccountStore::new(&path, 999, get_test_logger()).unwrap();
        assert_eq!(store.read(), 100);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_balance_is_fatal() {
        let path = temp_path("corrupt");
        fs::write(&path, "not-a-number").unwrap();
        let result = DurableAccountStore::new(&path, 0, get_test_logger());
        assert!(matches!(result, Err(ConcordError::Fatal(_))));
        let _ = fs::remove_file(&path);
    }
}
