//! Blocks in, settlements out: the watcher driving the real orchestrator.

use std::sync::Arc;
use std::time::Duration;

use stealthmax_directory::{InMemoryDirectory, NameDirectory};
use stealthmax_keys::{KeyDeriver, MasterSecret};
use stealthmax_settlement::{Operation, SettlementOrchestrator, SimulatedRollup};
use stealthmax_types::*;
use stealthmax_watcher::{
    AddressBook, BlockWatcher, ChainBlock, ChainTransaction, ScriptedChain, Supervisor,
    SupervisorExit,
};
use tokio::sync::watch;

struct Node {
    keys: KeyDeriver,
    directory: Arc<InMemoryDirectory>,
    rollup: SimulatedRollup,
    chain: Arc<ScriptedChain>,
    book: AddressBook,
    watcher: BlockWatcher,
}

async fn node(names: &[&str]) -> Node {
    let keys = KeyDeriver::new(MasterSecret::new([0x21; 32]));
    let directory = Arc::new(InMemoryDirectory::new());
    for name in names {
        let address = keys.legacy(name).unwrap().address();
        directory
            .upsert(&NameRecord::registered(
                *name,
                address,
                RollupAddress::new(format!("T6{name}")),
            ))
            .await
            .unwrap();
    }
    let rollup = SimulatedRollup::new();
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        keys.clone(),
        directory.clone(),
        Arc::new(rollup.clone()),
        SettlementConfig::default(),
    ));
    let chain = Arc::new(ScriptedChain::new());
    let book = AddressBook::new();
    book.refresh(directory.as_ref()).await.unwrap();
    let watcher = BlockWatcher::new(
        chain.clone(),
        book.clone(),
        orchestrator,
        WatcherConfig {
            poll_interval: Duration::from_millis(5),
            restart_delay: Duration::from_millis(5),
            max_restarts: Some(10),
            ..WatcherConfig::default()
        },
    )
    .starting_after(0);
    Node {
        keys,
        directory,
        rollup,
        chain,
        book,
        watcher,
    }
}

fn pay(n: u8, to: Address, wei: u128) -> ChainTransaction {
    ChainTransaction {
        hash: TxHash([n; 32]),
        from: Address([0xab; 20]),
        to: Some(to),
        value: NativeAmount::from_wei(wei),
    }
}

fn idle() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn payment_rotates_and_snapshot_follows() {
    let mut n = node(&["alice"]).await;
    let first = n.keys.legacy("alice").unwrap().address();
    n.chain.push(ChainBlock {
        number: 1,
        transactions: vec![pay(1, first, 1_500_000_000_000_000_000)],
    });

    assert_eq!(n.watcher.poll_once(&idle()).await.unwrap(), 1);

    let rotated = n.keys.rotation_address("alice", 0).unwrap();
    assert_eq!(n.directory.get("alice").unwrap().receiving_address, rotated);
    let snapshot = n.book.snapshot();
    assert!(!snapshot.contains(&first));
    assert_eq!(snapshot.name_of(&rotated), Some("alice"));

    // The next payment lands on the rotated address without a refresh.
    n.chain.push(ChainBlock {
        number: 2,
        transactions: vec![pay(2, rotated, 1)],
    });
    n.watcher.poll_once(&idle()).await.unwrap();
    assert_eq!(n.directory.get("alice").unwrap().counter, 2);
    assert_eq!(n.rollup.count(Operation::Deposit), 2);
}

#[tokio::test]
async fn same_block_transfers_are_sequential_cycles() {
    let mut n = node(&["alice", "bob"]).await;
    let alice = n.keys.legacy("alice").unwrap().address();
    let bob = n.keys.legacy("bob").unwrap().address();
    n.chain.push(ChainBlock {
        number: 1,
        transactions: vec![pay(1, alice, 10), pay(2, bob, 20), pay(3, alice, 30)],
    });

    n.watcher.poll_once(&idle()).await.unwrap();

    let stats = n.watcher.stats();
    assert_eq!(stats.transfers_matched, 3);
    assert_eq!(stats.transfers_settled, 3);
    // Alice's second payment settles under her name after the first rotated her.
    assert_eq!(n.directory.get("alice").unwrap().counter, 2);
    assert_eq!(n.directory.get("bob").unwrap().counter, 1);
    assert_eq!(n.rollup.count(Operation::Deposit), 3);
    let next = n.keys.rotation_address("alice", 1).unwrap();
    assert_eq!(n.book.snapshot().name_of(&next), Some("alice"));
}

#[tokio::test]
async fn supervised_watcher_survives_transport_errors() {
    let mut n = node(&["carol"]).await;
    let carol = n.keys.legacy("carol").unwrap().address();
    n.chain.push(ChainBlock {
        number: 1,
        transactions: vec![pay(1, carol, 5)],
    });
    n.chain.fail_next(3);

    let (tx, rx) = watch::channel(false);
    let supervisor = Supervisor::new(&WatcherConfig {
        restart_delay: Duration::from_millis(5),
        max_restarts: Some(10),
        ..WatcherConfig::default()
    });
    let directory = n.directory.clone();
    let stop = async move {
        for _ in 0..200 {
            if directory.get("carol").is_some_and(|r| r.counter == 1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
    };
    let (exit, ()) = tokio::join!(supervisor.run(&mut n.watcher, rx), stop);

    assert_eq!(exit, SupervisorExit::Shutdown);
    assert_eq!(n.directory.get("carol").unwrap().counter, 1);
    assert_eq!(n.rollup.count(Operation::Deposit), 1);
}
