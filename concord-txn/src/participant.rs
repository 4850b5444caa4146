use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use slog::Logger;

use concord_core::model::Transaction;
use concord_core::store::DurableAccountStore;

use crate::audit::AuditLog;
use crate::messages::CrashScenario;

/// A 2PC participant owning exactly one account. `crash_scenario` is a
/// one-shot injection: it fires the next time its matching
/// operation runs, then disarms itself.
pub struct Participant {
    pub id: String,
    pub address: String,
    pub account: String,
    store: Arc<DurableAccountStore>,
    logger: Logger,
    crash_scenario: Mutex<CrashScenario>,
    /// How long a fired crash scenario sleeps. Callers arrange this to
    /// exceed the coordinator's per-call timeout.
    crash_sleep: Duration,
    audit_log: Option<AuditLog>,
}

impl Participant {
    /// `store` is opened by the caller (see `DurableAccountStore::new`),
    /// mirroring how `RaftNode::new` takes an already-opened log store.
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        account: impl Into<String>,
        store: Arc<DurableAccountStore>,
        logger: Logger,
    ) -> Participant {
        Participant {
            id: id.into(),
            address: address.into(),
            account: account.into(),
            store,
            logger,
            crash_scenario: Mutex::new(CrashScenario::None),
            crash_sleep: Duration::from_secs(30),
            audit_log: None,
        }
    }

    pub fn with_crash_sleep(mut self, crash_sleep: Duration) -> Participant {
        self.crash_sleep = crash_sleep;
        self
    }

    /// Opts this participant into pushing its own balance-change audit
    /// records to a Raft cluster, independent of any coordinator-side audit
    /// (wired up via the CLI's participant `--peers` flag).
    pub fn with_audit_log(mut self, audit_log: AuditLog) -> Participant {
        self.audit_log = Some(audit_log);
        self
    }

    pub fn get_balance(&self) -> i64 {
        self.store.read()
    }

    pub fn set_initial_balance(&self, balance: i64) -> String {
        match self.store.write(balance) {
            Ok(()) => format!("balance set to {}", balance),
            Err(e) => format!("failed to set balance: {}", e),
        }
    }

    pub fn set_crash_scenario(&self, scenario: Option<CrashScenario>) -> String {
        let armed = scenario.unwrap_or(CrashScenario::None);
        *self.crash_scenario.lock().unwrap() = armed;
        match armed {
            CrashScenario::None => "crash scenario cleared".to_string(),
            CrashScenario::BeforeResponse => "armed: before_response".to_string(),
            CrashScenario::AfterResponse => "armed: after_response".to_string(),
        }
    }

    /// Takes and disarms the scenario if it equals `expected`.
    fn fire_if_armed(&self, expected: CrashScenario) -> bool {
        let mut current = self.crash_scenario.lock().unwrap();
        if *current == expected {
            *current = CrashScenario::None;
            true
        } else {
            false
        }
    }

    /// Vote yes iff this node doesn't own `tx.source`, or owns it with
    /// sufficient balance. A before_response crash sleeps past
    /// the coordinator's timeout before returning.
    pub fn prepare(&self, tx: &Transaction) -> bool {
        if self.fire_if_armed(CrashScenario::BeforeResponse) {
            slog::warn!(self.logger, "simulating before_response crash"; "account" => self.account.clone());
            thread::sleep(self.crash_sleep);
        }

        if self.account == tx.source {
            let vote = self.store.read() >= tx.amount;
            slog::info!(self.logger, "prepare"; "account" => self.account.clone(), "vote" => vote);
            vote
        } else {
            true
        }
    }

    /// Applies the deterministic transfer rule for this node's account.
    /// An after_response crash sleeps past the coordinator's timeout but
    /// still applies the update beforehand.
    pub fn commit(&self, tx: &Transaction) -> bool {
        let victim = self.fire_if_armed(CrashScenario::AfterResponse);

        let involved = self.account == tx.source || self.account == tx.destination;
        let result = if self.account == tx.source {
            let balance = self.store.read();
            if balance < tx.amount {
                false
            } else {
                self.store.write(balance - tx.amount).is_ok()
            }
        } else if self.account == tx.destination {
            let balance = self.store.read();
            self.store.write(balance + tx.amount).is_ok()
        } else {
            true
        };

        slog::info!(self.logger, "commit"; "account" => self.account.clone(), "applied" => result);

        if result && involved {
            if let Some(audit_log) = &self.audit_log {
                audit_log.record(&self.logger, tx);
            }
        }

        if victim {
            slog::warn!(self.logger, "simulating after_response crash"; "account" => self.account.clone());
            thread::sleep(self.crash_sleep);
        }

        result
    }

    /// No-op acknowledgement; a participant only ever mutates on Commit.
    pub fn abort(&self, tx: &Transaction) -> bool {
        slog::info!(self.logger, "abort"; "account" => self.account.clone(), "source" => tx.source.clone(), "destination" => tx.destination.clone());
        true
    }
}
