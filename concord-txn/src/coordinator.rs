use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use slog::Logger;

use concord_core::model::{Transaction, TransactionStatus};
use concord_core::rpc::RpcClient;
use concord_core::store::{DurableTransactionJournal, JournalRecord};

use crate::audit::AuditLog;
use crate::messages::{AbortRequest, CommitRequest, PrepareRequest};

/// A 2PC coordinator over a fixed, statically-known set of participants
/// 2PC coordinator over a fixed, statically-known set of participants.
pub struct Coordinator {
    pub address: String,
    pub timeout: Duration,
    participants: HashMap<String, concord_core::config::ParticipantRef>,
    journal: Arc<DurableTransactionJournal>,
    rpc: RpcClient,
    logger: Logger,
    audit_log: Option<AuditLog>,
}

impl Coordinator {
    pub fn new(
        address: impl Into<String>,
        timeout: Duration,
        participants: HashMap<String, concord_core::config::ParticipantRef>,
        journal: Arc<DurableTransactionJournal>,
        logger: Logger,
        audit_log: Option<AuditLog>,
    ) -> Coordinator {
        Coordinator {
            address: address.into(),
            timeout,
            participants,
            journal,
            rpc: RpcClient::new(),
            logger,
            audit_log,
        }
    }

    fn find_by_account(&self, account: &str) -> Option<&concord_core::config::ParticipantRef> {
        self.participants.values().find(|p| p.account == account)
    }

    fn get_balance(&self, address: &str) -> Option<i64> {
        self.rpc
            .call::<_, crate::messages::BalanceResponse>(address, "/txn/get_balance", &(), self.timeout)
            .ok()
            .map(|r| r.balance)
    }

    fn broadcast<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let addresses: Vec<String> = self.participants.values().map(|p| p.address.clone()).collect();
        let handles: Vec<_> = addresses
            .into_iter()
            .map(|address| {
                let f = Arc::clone(&f);
                thread::spawn(move || f(&address))
            })
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Runs the full StartTransaction protocol.
    pub fn start_transaction(&self, tx: Transaction) -> bool {
        if tx.flags.recover {
            self.recover_from_crash(true);
        }

        let source_ref = match self.find_by_account(&tx.source) {
            Some(r) => r.clone(),
            None => {
                slog::warn!(self.logger, "start_transaction rejected: unknown source account"; "source" => tx.source.clone());
                self.journal_and_abort(&tx);
                return false;
            }
        };

        let balance = self.get_balance(&source_ref.address);
        match balance {
            Some(b) if b >= tx.amount => {}
            _ => {
                slog::info!(self.logger, "start_transaction rejected: insufficient funds or unreachable source";
                    "source" => tx.source.clone(), "amount" => tx.amount);
                self.journal_and_abort(&tx);
                return false;
            }
        }

        let addresses: Vec<String> = self.participants.values().map(|p| p.address.clone()).collect();
        let votes: Vec<bool> = {
            let handles: Vec<_> = addresses
                .iter()
                .cloned()
                .map(|address| {
                    let tx = tx.clone();
                    let rpc = self.rpc.clone();
                    let timeout = self.timeout;
                    thread::spawn(move || {
                        let request = PrepareRequest { transaction: tx };
                        rpc.call::<_, crate::messages::VoteResponse>(&address, "/txn/prepare", &request, timeout)
                            .map(|r| r.vote)
                            .unwrap_or(false)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap_or(false)).collect()
        };

        if votes.iter().all(|v| *v) {
            if let Err(e) = self.journal.write(JournalRecord {
                transaction: tx.clone(),
                status: TransactionStatus::Committed,
            }) {
                slog::error!(self.logger, "fatal: failed to journal commit decision"; "error" => format!("{}", e));
                std::process::exit(1);
            }

            if tx.flags.simulate_crash {
                slog::warn!(self.logger, "simulating coordinator crash after journaling commit, before broadcast");
                std::process::exit(1);
            }

            let acks: Vec<bool> = {
                let handles: Vec<_> = addresses
                    .iter()
                    .cloned()
                    .map(|address| {
                        let tx = tx.clone();
                        let rpc = self.rpc.clone();
                        let timeout = self.timeout;
                        thread::spawn(move || {
                            let request = CommitRequest { transaction: tx };
                            rpc.call::<_, crate::messages::AckResponse>(&address, "/txn/commit", &request, timeout)
                                .map(|r| r.ok)
                                .unwrap_or(false)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap_or(false)).collect()
            };

            if let Some(audit_log) = &self.audit_log {
                audit_log.record(&self.logger, &tx);
            }

            acks.iter().all(|a| *a)
        } else {
            slog::info!(self.logger, "start_transaction aborting: at least one participant voted no or timed out";
                "source" => tx.source.clone(), "destination" => tx.destination.clone());
            self.journal_and_abort(&tx);
            false
        }
    }

    fn journal_and_abort(&self, tx: &Transaction) {
        if let Err(e) = self.journal.write(JournalRecord {
            transaction: tx.clone(),
            status: TransactionStatus::Aborted,
        }) {
            slog::error!(self.logger, "fatal: failed to journal abort decision"; "error" => format!("{}", e));
            std::process::exit(1);
        }
        self.broadcast({
            let tx = tx.clone();
            let rpc = self.rpc.clone();
            let timeout = self.timeout;
            move |address: &str| {
                let request = AbortRequest {
                    transaction: tx.clone(),
                };
                let _ = rpc.call::<_, crate::messages::AckResponse>(address, "/txn/abort", &request, timeout);
            }
        });
    }

    /// Replays the journaled decision after a simulated crash.
    pub fn recover_from_crash(&self, flag: bool) -> bool {
        if !flag {
            return true;
        }

        match self.journal.read() {
            None => true,
            Some(record) => match record.status {
                TransactionStatus::Committed => {
                    slog::info!(self.logger, "recovering: re-broadcasting commit"; "source" => record.transaction.source.clone());
                    self.broadcast({
                        let tx = record.transaction.clone();
                        let rpc = self.rpc.clone();
                        let timeout = self.timeout;
                        move |address: &str| {
                            let request = CommitRequest { transaction: tx.clone() };
                            let _ = rpc.call::<_, crate::messages::AckResponse>(address, "/txn/commit", &request, timeout);
                        }
                    });
                    true
                }
                TransactionStatus::Aborted | TransactionStatus::Prepared => {
                    slog::info!(self.logger, "recovering: re-broadcasting abort"; "source" => record.transaction.source.clone());
                    self.broadcast({
                        let tx = record.transaction.clone();
                        let rpc = self.rpc.clone();
                        let timeout = self.timeout;
                        move |address: &str| {
                            let request = AbortRequest { transaction: tx.clone() };
                            let _ = rpc.call::<_, crate::messages::AckResponse>(address, "/txn/abort", &request, timeout);
                        }
                    });
                    true
                }
            },
        }
    }

    /// Terminates the process abruptly, leaving the journal as-is.
    pub fn simulate_coordinator_crash(&self) -> ! {
        slog::warn!(self.logger, "simulating coordinator crash");
        std::process::exit(1);
    }
}
