use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_derive::{Deserialize, Serialize};
use slog::Logger;

use crate::error::Result;
use crate::model::{Transaction, TransactionStatus};

/// The single record a coordinator keeps durable: its most recent
/// transaction and the decision it journaled for it. Overwritten on every
/// transaction; consulted on recovery after a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub transaction: Transaction,
    pub status: TransactionStatus,
}

/// A coordinator's durable decision journal, owned exclusively by that
/// coordinator. Write-ahead: the journal is written *before* any Commit RPC
/// is sent, so recovery can always rebuild the committed-or-aborted outcome.
pub struct DurableTransactionJournal {
    path: PathBuf,
    logger: Logger,
    record: Mutex<Option<JournalRecord>>,
}

impl DurableTransactionJournal {
    pub fn new(path: impl Into<PathBuf>, logger: Logger) -> Result<DurableTransactionJournal> {
        let path = path.into();
        let record = match fs::read_to_string(&path) {
            Ok(contents) => Some(serde_json::from_str(&contents)?),
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(DurableTransactionJournal {
            path,
            logger,
            record: Mutex::new(record),
        })
    }

    pub fn read(&self) -> Option<JournalRecord> {
        self.record.lock().unwrap().clone()
    }

    pub fn write(&self, record: JournalRecord) -> Result<()> {
        let mut guard = self.record.lock().unwrap();
        let contents = serde_json::to_string(&record)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        slog::info!(self.logger, "journaled decision";
            "status" => format!("{:?}", record.status),
            "source" => record.transaction.source.clone(),
            "destination" => record.transaction.destination.clone());
        *guard = Some(record);
        Ok(())
    }
}
