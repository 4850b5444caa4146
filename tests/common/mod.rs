use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use concord_core::logging::get_test_logger;
use concord_core::store::{DurableAccountStore, DurableLogStore, DurableTransactionJournal};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh, collision-free temp path for one test's durable file.
pub fn temp_path(label: &str) -> std::path::PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("concord-itest-{}-{}-{}", std::process::id(), n, label))
}

pub fn account_store(label: &str, initial_balance: i64) -> Arc<DurableAccountStore> {
    Arc::new(DurableAccountStore::new(temp_path(label), initial_balance, get_test_logger()).unwrap())
}

pub fn journal(label: &str) -> Arc<DurableTransactionJournal> {
    Arc::new(DurableTransactionJournal::new(temp_path(label), get_test_logger()).unwrap())
}

pub fn log_store(label: &str) -> Arc<DurableLogStore> {
    Arc::new(DurableLogStore::new(temp_path(label), get_test_logger()).unwrap())
}

/// Binds a throwaway TCP listener to reserve a free port, then drops it.
/// There's an inherent TOCTOU race (another process could grab the port
/// before the caller binds it), acceptable for test purposes.
pub fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
