use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use concord_core::config::ParticipantRef;
use concord_core::logging::get_test_logger;
use concord_core::model::{Transaction, TransactionFlags};
use concord_txn::messages::CrashScenario;
use concord_txn::server::spawn_participant;
use concord_txn::{Coordinator, Participant};

mod common;

fn spawn_two_participants(balance_a: i64, balance_b: i64) -> (Arc<Participant>, Arc<Participant>, HashMap<String, ParticipantRef>) {
    let store_a = common::account_store("A", balance_a);
    let store_b = common::account_store("B", balance_b);

    let participant_a = Arc::new(
        Participant::new("node-a", "127.0.0.1:0", "A", store_a, get_test_logger())
            .with_crash_sleep(Duration::from_millis(400)),
    );
    let participant_b = Arc::new(
        Participant::new("node-b", "127.0.0.1:0", "B", store_b, get_test_logger())
            .with_crash_sleep(Duration::from_millis(400)),
    );

    let (addr_a, _handle_a) = spawn_participant("127.0.0.1:0", Arc::clone(&participant_a)).unwrap();
    let (addr_b, _handle_b) = spawn_participant("127.0.0.1:0", Arc::clone(&participant_b)).unwrap();

    let mut participants = HashMap::new();
    participants.insert(
        "node-a".to_string(),
        ParticipantRef {
            address: addr_a,
            account: "A".to_string(),
        },
    );
    participants.insert(
        "node-b".to_string(),
        ParticipantRef {
            address: addr_b,
            account: "B".to_string(),
        },
    );

    (participant_a, participant_b, participants)
}

fn coordinator(participants: HashMap<String, ParticipantRef>, timeout: Duration) -> Coordinator {
    Coordinator::new(
        "127.0.0.1:0",
        timeout,
        participants,
        common::journal("journal"),
        get_test_logger(),
        None,
    )
}

#[test]
fn happy_path_transfer() {
    let (participant_a, participant_b, participants) = spawn_two_participants(200, 300);
    let coordinator = coordinator(participants, Duration::from_secs(1));

    let tx = Transaction::new("A", "B", 100);
    assert!(coordinator.start_transaction(tx));

    assert_eq!(participant_a.get_balance(), 100);
    assert_eq!(participant_b.get_balance(), 400);
}

/// Rejected before any Prepare is sent.
#[test]
fn insufficient_funds_is_rejected() {
    let (participant_a, participant_b, participants) = spawn_two_participants(90, 50);
    let coordinator = coordinator(participants, Duration::from_secs(1));

    let tx = Transaction::new("A", "B", 100);
    assert!(!coordinator.start_transaction(tx));

    assert_eq!(participant_a.get_balance(), 90);
    assert_eq!(participant_b.get_balance(), 50);
}

/// Prepare times out, treated as no.
#[test]
fn participant_crash_before_response_aborts() {
    let (participant_a, participant_b, participants) = spawn_two_participants(200, 300);
    participant_a
        .set_crash_scenario(Some(CrashScenario::BeforeResponse));
    // participant_a will sleep well past the coordinator's timeout.
    let coordinator = coordinator(participants, Duration::from_millis(200));

    let tx = Transaction::new("A", "B", 100);
    assert!(!coordinator.start_transaction(tx));

    assert_eq!(participant_a.get_balance(), 200);
    assert_eq!(participant_b.get_balance(), 300);
}

/// Commit applies before the sleep, even though the coordinator's view of
/// that ack may time out.
#[test]
fn participant_slow_after_response_still_applies() {
    let (participant_a, participant_b, participants) = spawn_two_participants(200, 300);
    participant_a.set_crash_scenario(Some(CrashScenario::AfterResponse));
    let coordinator = coordinator(participants, Duration::from_secs(2));

    let tx = Transaction::new("A", "B", 100);
    // Balances are the pinned invariant here; the boolean return is not.
    let _ = coordinator.start_transaction(tx);

    assert_eq!(participant_a.get_balance(), 100);
    assert_eq!(participant_b.get_balance(), 400);
}

#[test]
fn prepare_followed_by_abort_leaves_balance_unchanged() {
    let (participant_a, _participant_b, participants) = spawn_two_participants(200, 300);
    let _coordinator = coordinator(participants, Duration::from_secs(1));

    let tx = Transaction {
        source: "A".to_string(),
        destination: "B".to_string(),
        amount: 50,
        flags: TransactionFlags::default(),
    };
    participant_a.prepare(&tx);
    participant_a.abort(&tx);
    assert_eq!(participant_a.get_balance(), 200);
}
