pub mod account_store;
pub mod journal_store;
pub mod log_store;

pub use account_store::DurableAccountStore;
pub use journal_store::{DurableTransactionJournal, JournalRecord};
pub use log_store::{DurableLogStore, LogEntry, PersistedMeta};
