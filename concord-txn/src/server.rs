use std::sync::Arc;

use concord_core::error::Result;
use concord_core::rpc::RpcServer;

use crate::coordinator::Coordinator;
use crate::messages::{
    AbortRequest, AckResponse, BalanceResponse, CommitRequest, ConfirmationResponse, PrepareRequest,
    RecoverFromCrashRequest, RecoverFromCrashResponse, SetCrashScenarioRequest, SetInitialBalanceRequest,
    StartTransactionRequest, StartTransactionResponse, VoteResponse,
};
use crate::participant::Participant;

/// Registers the participant endpoints on `server`.
pub fn register_participant_routes(server: &mut RpcServer, participant: Arc<Participant>) {
    let p = Arc::clone(&participant);
    server.route("/txn/prepare", "txn_prepare", move |request: PrepareRequest| -> VoteResponse {
        VoteResponse {
            vote: p.prepare(&request.transaction),
        }
    });

    let p = Arc::clone(&participant);
    server.route("/txn/commit", "txn_commit", move |request: CommitRequest| -> AckResponse {
        AckResponse {
            ok: p.commit(&request.transaction),
        }
    });

    let p = Arc::clone(&participant);
    server.route("/txn/abort", "txn_abort", move |request: AbortRequest| -> AckResponse {
        AckResponse {
            ok: p.abort(&request.transaction),
        }
    });

    let p = Arc::clone(&participant);
    server.route("/txn/get_balance", "txn_get_balance", move |_: ()| -> BalanceResponse {
        BalanceResponse {
            balance: p.get_balance(),
        }
    });

    let p = Arc::clone(&participant);
    server.route(
        "/txn/set_initial_balance",
        "txn_set_initial_balance",
        move |request: SetInitialBalanceRequest| -> ConfirmationResponse {
            ConfirmationResponse {
                message: p.set_initial_balance(request.balance),
            }
        },
    );

    let p = Arc::clone(&participant);
    server.route(
        "/txn/set_crash_scenario",
        "txn_set_crash_scenario",
        move |request: SetCrashScenarioRequest| -> ConfirmationResponse {
            ConfirmationResponse {
                message: p.set_crash_scenario(request.scenario),
            }
        },
    );
}

/// Registers the coordinator endpoints on `server`.
pub fn register_coordinator_routes(server: &mut RpcServer, coordinator: Arc<Coordinator>) {
    let c = Arc::clone(&coordinator);
    server.route(
        "/txn/start_transaction",
        "txn_start_transaction",
        move |request: StartTransactionRequest| -> StartTransactionResponse {
            StartTransactionResponse {
                success: c.start_transaction(request.transaction),
            }
        },
    );

    let c = Arc::clone(&coordinator);
    server.route(
        "/txn/recover_from_crash",
        "txn_recover_from_crash",
        move |request: RecoverFromCrashRequest| -> RecoverFromCrashResponse {
            RecoverFromCrashResponse {
                success: c.recover_from_crash(request.replay),
            }
        },
    );

    // simulate_coordinator_crash never returns a response -- the process
    // exits mid-request. Registered anyway so the endpoint exists on the
    // wire; `iron` simply never gets to write a response.
    let c = Arc::clone(&coordinator);
    server.route(
        "/txn/simulate_coordinator_crash",
        "txn_simulate_coordinator_crash",
        move |_: ()| -> AckResponse {
            c.simulate_coordinator_crash();
        },
    );
}

pub fn run_participant(address: String, participant: Arc<Participant>) -> Result<()> {
    let mut server = RpcServer::new();
    register_participant_routes(&mut server, participant);
    server.listen(&address)
}

pub fn run_coordinator(address: String, coordinator: Arc<Coordinator>) -> Result<()> {
    let mut server = RpcServer::new();
    register_coordinator_routes(&mut server, coordinator);
    server.listen(&address)
}

/// Binds a participant's RPC surface without blocking; returns the resolved
/// local address and the thread serving requests forever. Intended for
/// tests that bind to `127.0.0.1:0`.
pub fn spawn_participant(address: &str, participant: Arc<Participant>) -> Result<(String, std::thread::JoinHandle<()>)> {
    let mut server = RpcServer::new();
    register_participant_routes(&mut server, participant);
    let bound = server.bind(address)?;
    let resolved = bound.local_addr();
    let handle = std::thread::spawn(move || bound.serve_forever());
    Ok((resolved, handle))
}

/// Binds a coordinator's RPC surface without blocking; returns the resolved
/// local address and the thread serving requests forever.
pub fn spawn_coordinator(address: &str, coordinator: Arc<Coordinator>) -> Result<(String, std::thread::JoinHandle<()>)> {
    let mut server = RpcServer::new();
    register_coordinator_routes(&mut server, coordinator);
    let bound = server.bind(address)?;
    let resolved = bound.local_addr();
    let handle = std::thread::spawn(move || bound.serve_forever());
    Ok((resolved, handle))
}
