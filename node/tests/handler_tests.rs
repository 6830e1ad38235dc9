//! Message handler tests. The handler runs against nullable infrastructure;
//! outbound frames are captured from the broadcaster queue and decoded.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

use rota_crypto::{address_from_public, keypair_from_seed};
use rota_ledger::{Block, Chain};
use rota_messages::{Message, Status};
use rota_network::{Broadcaster, PeerManager, SyncState};
use rota_node::{Disposition, MessageHandler, CHAIN_PAGE_BLOCKS};
use rota_nullables::{NullClock, NullEngine, NullStore};
use rota_protocol::decode;
use rota_transactions::{Transaction, TxKind};
use rota_types::{Address, Amount, BlockHash, ChainParams, KeyPair, Timestamp};

const START_MS: u64 = 1_739_600_000_000;
const OWN_ADDR: &str = "10.0.0.1:3000";
const NODE_ID: &str = "00000000000000aa";

struct Harness {
    handler: MessageHandler,
    outbound: mpsc::Receiver<(String, Vec<u8>)>,
    dials: mpsc::Receiver<String>,
    store: Arc<NullStore>,
}

fn open_chain(clock: Arc<NullClock>, store: Arc<NullStore>) -> Chain {
    Chain::open(ChainParams::default(), clock, store, Arc::new(NullEngine::new())).expect("open chain")
}

fn harness() -> Harness {
    let clock = Arc::new(NullClock::new(START_MS));
    let store = Arc::new(NullStore::new());
    let chain = open_chain(clock.clone(), store.clone());
    let (outbound_tx, outbound) = mpsc::channel(256);
    let (dial_tx, dials) = mpsc::channel(16);
    let handler = MessageHandler::new(
        Arc::new(Mutex::new(chain)),
        Arc::new(RwLock::new(PeerManager::new(Some(OWN_ADDR.into())))),
        Broadcaster::new(outbound_tx),
        clock,
        NODE_ID.into(),
        dial_tx,
    );
    Harness {
        handler,
        outbound,
        dials,
        store,
    }
}

/// A separate chain of `count` blocks past genesis, all by `validator`.
fn source_chain(validator: &Address, count: usize) -> Vec<Block> {
    let clock = Arc::new(NullClock::new(START_MS));
    let mut chain = open_chain(clock.clone(), Arc::new(NullStore::new()));
    for _ in 0..count {
        clock.advance(10_000);
        chain
            .create_block(validator)
            .expect("block applies")
            .expect("validator holds the slot");
    }
    chain.blocks().to_vec()
}

fn account(seed: u8) -> (KeyPair, Address) {
    let kp = keypair_from_seed(&[seed; 32]);
    let addr = address_from_public(&kp.public);
    (kp, addr)
}

fn transfer(kp: &KeyPair, to: &Address, amount: u128, nonce: u64) -> Transaction {
    let mut tx = Transaction::new(
        TxKind::Transfer,
        address_from_public(&kp.public),
        to.clone(),
        Amount::new(amount),
        nonce,
        Amount::new(1),
        Timestamp::from_millis(START_MS + nonce),
    );
    tx.sign(kp).expect("sign");
    tx
}

async fn fund(h: &Harness, addr: &Address, amount: u128) {
    let grant = Transaction::reward(addr.clone(), Amount::new(amount), Timestamp::from_millis(1));
    h.handler
        .chain()
        .lock()
        .await
        .apply_transaction(&grant)
        .expect("grant applies");
}

fn status(node_id: &str, public_addr: Option<&str>, height: u64) -> Message {
    Message::Status(Status {
        node_id: node_id.into(),
        public_addr: public_addr.map(str::to_string),
        height,
        last_hash: BlockHash::new([height as u8; 32]),
    })
}

/// Everything queued for sending so far, decoded.
fn sent(h: &mut Harness) -> Vec<(String, Message)> {
    let mut out = Vec::new();
    while let Ok((peer, frame)) = h.outbound.try_recv() {
        let message = decode(&frame[4..]).expect("outbound frame decodes");
        out.push((peer, message));
    }
    out
}

/// Connect `peer` and complete its handshake at `height`, discarding replies.
async fn handshake(h: &mut Harness, peer: &str, height: u64) {
    h.handler.on_connected(peer, None).await;
    let disposition = h.handler.handle(peer, status(&format!("node-{peer}"), None, height)).await;
    assert_eq!(disposition, Disposition::Keep);
    sent(h);
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connecting_sends_status_with_local_tip() {
    let mut h = harness();
    h.handler.on_connected("p1", None).await;

    let genesis = Block::genesis(&ChainParams::default());
    assert_eq!(
        sent(&mut h),
        vec![(
            "p1".to_string(),
            Message::Status(Status {
                node_id: NODE_ID.into(),
                public_addr: Some(OWN_ADDR.into()),
                height: 1,
                last_hash: genesis.hash,
            })
        )]
    );
}

#[tokio::test]
async fn self_connection_is_dropped_and_address_forgotten() {
    let mut h = harness();
    h.handler.peers().write().await.add_known("10.0.0.9:3000");
    h.handler.on_connected("p1", Some("10.0.0.9:3000".into())).await;
    sent(&mut h);

    let disposition = h.handler.handle("p1", status(NODE_ID, None, 1)).await;

    assert_eq!(disposition, Disposition::Disconnect);
    assert!(!h.handler.peers().read().await.is_known("10.0.0.9:3000"));
    assert!(sent(&mut h).is_empty());
}

#[tokio::test]
async fn status_with_empty_chain_is_rejected() {
    let mut h = harness();
    h.handler.on_connected("p1", None).await;
    assert_eq!(h.handler.handle("p1", status("other", None, 0)).await, Disposition::Disconnect);
}

#[tokio::test]
async fn status_from_taller_peer_shares_peers_and_starts_sync() {
    let mut h = harness();
    h.handler.on_connected("p1", None).await;
    sent(&mut h);

    h.handler.handle("p1", status("peer-a", Some("10.0.0.2:3000"), 5)).await;

    assert_eq!(
        sent(&mut h),
        vec![
            (
                "p1".to_string(),
                Message::Peers {
                    addrs: vec!["10.0.0.2:3000".into()]
                }
            ),
            ("p1".to_string(), Message::RequestBlock { index: 1 }),
        ]
    );
    assert_eq!(
        h.handler.sync_state().await,
        SyncState::Syncing {
            target: 5,
            peer: "p1".into()
        }
    );
    let chain = h.handler.chain().lock().await;
    assert!(chain.peers().any(|addr| addr == "10.0.0.2:3000"));
}

// ---------------------------------------------------------------------------
// Serving and syncing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn serves_blocks_and_whole_chain() {
    let mut h = harness();
    let genesis = Block::genesis(&ChainParams::default());

    h.handler.handle("p1", Message::RequestBlock { index: 0 }).await;
    h.handler.handle("p1", Message::RequestBlock { index: 7 }).await;
    h.handler.handle("p1", Message::RequestChain { from: 0 }).await;

    assert_eq!(
        sent(&mut h),
        vec![
            (
                "p1".to_string(),
                Message::BlockResponse {
                    block: Some(genesis.clone())
                }
            ),
            ("p1".to_string(), Message::BlockResponse { block: None }),
            (
                "p1".to_string(),
                Message::Chain {
                    from: 0,
                    height: 1,
                    blocks: vec![genesis]
                }
            ),
        ]
    );
}

#[tokio::test]
async fn sync_walks_blocks_then_requests_mempools() {
    let mut h = harness();
    let (_, validator) = account(9);
    let source = source_chain(&validator, 3);

    handshake(&mut h, "p1", 4).await;
    assert!(h.handler.is_syncing().await);

    for index in 1..4 {
        let block = source[index].clone();
        h.handler
            .handle("p1", Message::BlockResponse { block: Some(block) })
            .await;
        let expected = if index < 3 {
            Message::RequestBlock { index: index as u64 + 1 }
        } else {
            Message::GetMempool
        };
        assert_eq!(sent(&mut h), vec![("p1".to_string(), expected)]);
    }

    let chain = h.handler.chain().lock().await;
    assert_eq!(chain.height(), 4);
    assert_eq!(chain.tip(), &source[3]);
    drop(chain);
    assert_eq!(h.handler.sync_state().await, SyncState::Idle);
}

#[tokio::test]
async fn fork_during_sync_rebuilds_from_full_chain() {
    let mut h = harness();
    let (_, ours) = account(8);
    let (_, theirs) = account(9);
    h.handler
        .chain()
        .lock()
        .await
        .create_block(&ours)
        .expect("applies")
        .expect("our slot");
    let source = source_chain(&theirs, 3);

    handshake(&mut h, "p1", 4).await;
    h.handler
        .handle(
            "p1",
            Message::BlockResponse {
                block: Some(source[2].clone()),
            },
        )
        .await;
    assert_eq!(sent(&mut h), vec![("p1".to_string(), Message::RequestChain { from: 0 })]);

    h.handler
        .handle(
            "p1",
            Message::Chain {
                from: 0,
                height: 4,
                blocks: source.clone(),
            },
        )
        .await;
    assert_eq!(sent(&mut h), vec![("p1".to_string(), Message::GetMempool)]);

    let chain = h.handler.chain().lock().await;
    assert_eq!(chain.blocks(), source.as_slice());
    assert_eq!(chain.balance(&ours), Amount::ZERO);
}

/// Answer `client`'s chain requests from `server` until the client stops
/// asking. Returns the number of pages served and everything the client
/// queued after the last page.
async fn serve_pages(client: &mut Harness, server: &mut Harness, mut from: u64) -> (usize, Vec<(String, Message)>) {
    let mut pages = 0;
    loop {
        pages += 1;
        server.handler.handle("client", Message::RequestChain { from }).await;
        let (_, page) = sent(server).pop().expect("server answers with a page");
        client.handler.handle("p1", page).await;

        let queued = sent(client);
        let next = queued.iter().find_map(|(to, message)| match message {
            Message::RequestChain { from } if to == "p1" => Some(*from),
            _ => None,
        });
        match next {
            Some(next) => from = next,
            None => return (pages, queued),
        }
    }
}

#[tokio::test]
async fn fork_recovery_collects_a_chain_longer_than_one_page() {
    let mut client = harness();
    let mut server = harness();
    let (_, ours) = account(8);
    let (_, theirs) = account(9);
    let source = source_chain(&theirs, CHAIN_PAGE_BLOCKS + 44);
    server
        .handler
        .chain()
        .lock()
        .await
        .rebuild_from(source.clone())
        .expect("server adopts source chain");
    client
        .handler
        .chain()
        .lock()
        .await
        .create_block(&ours)
        .expect("applies")
        .expect("our slot");

    handshake(&mut client, "p2", 1).await;
    handshake(&mut client, "p1", source.len() as u64).await;
    client
        .handler
        .handle(
            "p1",
            Message::BlockResponse {
                block: Some(source[2].clone()),
            },
        )
        .await;
    assert_eq!(sent(&mut client), vec![("p1".to_string(), Message::RequestChain { from: 0 })]);

    let (pages, after) = serve_pages(&mut client, &mut server, 0).await;

    assert_eq!(pages, 2);
    let tip = source.last().cloned().expect("source has blocks");
    assert!(after.contains(&("p2".to_string(), Message::Block { block: tip })));
    assert!(after.contains(&("p1".to_string(), Message::GetMempool)));
    assert!(!after
        .iter()
        .any(|(to, message)| to == "p1" && matches!(message, Message::Block { .. })));

    let chain = client.handler.chain().lock().await;
    assert_eq!(chain.blocks(), source.as_slice());
    assert_eq!(chain.balance(&ours), Amount::ZERO);
    drop(chain);
    assert_eq!(client.handler.sync_state().await, SyncState::Idle);
}

#[tokio::test]
async fn broken_page_sequence_abandons_the_rebuild() {
    let mut h = harness();
    let (_, ours) = account(8);
    let (_, theirs) = account(9);
    h.handler
        .chain()
        .lock()
        .await
        .create_block(&ours)
        .expect("applies")
        .expect("our slot");
    let local_tip = h.handler.chain().lock().await.tip().clone();
    let source = source_chain(&theirs, 5);

    handshake(&mut h, "p1", 6).await;
    h.handler
        .handle(
            "p1",
            Message::BlockResponse {
                block: Some(source[2].clone()),
            },
        )
        .await;
    sent(&mut h);

    h.handler
        .handle(
            "p1",
            Message::Chain {
                from: 3,
                height: 6,
                blocks: source[3..].to_vec(),
            },
        )
        .await;

    assert!(sent(&mut h).is_empty());
    assert_eq!(h.handler.sync_state().await, SyncState::Idle);
    assert_eq!(h.handler.chain().lock().await.tip(), &local_tip);
}

#[tokio::test]
async fn shorter_chain_is_not_adopted() {
    let mut h = harness();
    let (_, validator) = account(9);
    let local_tip = {
        let mut chain = h.handler.chain().lock().await;
        chain.create_block(&validator).expect("applies").expect("slot");
        chain.create_block(&validator).expect("applies").expect("slot");
        chain.tip().clone()
    };

    h.handler
        .handle(
            "p1",
            Message::Chain {
                from: 0,
                height: 2,
                blocks: source_chain(&validator, 1),
            },
        )
        .await;

    assert_eq!(h.handler.chain().lock().await.tip(), &local_tip);
    assert!(sent(&mut h).is_empty());
}

#[tokio::test]
async fn block_responses_from_non_partners_are_ignored() {
    let mut h = harness();
    let (_, validator) = account(9);
    let source = source_chain(&validator, 1);

    h.handler
        .handle(
            "stranger",
            Message::BlockResponse {
                block: Some(source[1].clone()),
            },
        )
        .await;

    assert_eq!(h.handler.chain().lock().await.height(), 1);
}

#[tokio::test]
async fn partner_disconnect_resumes_from_next_tallest_peer() {
    let mut h = harness();
    handshake(&mut h, "p1", 5).await;
    handshake(&mut h, "p2", 4).await;
    assert_eq!(h.handler.sync_state().await, SyncState::Syncing { target: 5, peer: "p1".into() });

    h.handler.on_disconnected("p1").await;

    assert_eq!(sent(&mut h), vec![("p2".to_string(), Message::RequestBlock { index: 1 })]);
    assert_eq!(h.handler.sync_state().await, SyncState::Syncing { target: 4, peer: "p2".into() });
}

// ---------------------------------------------------------------------------
// Mempool exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mempool_is_served_and_replayed_in_nonce_order() {
    let (alice_kp, alice) = account(1);
    let (_, bob) = account(2);
    let txs = vec![transfer(&alice_kp, &bob, 10, 0), transfer(&alice_kp, &bob, 10, 1)];

    let mut source = harness();
    fund(&source, &alice, 1_000).await;
    for tx in &txs {
        source.handler.submit_transaction(tx.clone()).await.expect("admitted");
    }
    source.handler.handle("p1", Message::GetMempool).await;
    let served = match sent(&mut source).pop() {
        Some((_, Message::Mempool { txs })) => txs,
        other => panic!("expected MEMPOOL reply, got {other:?}"),
    };
    assert_eq!(served.len(), 2);

    let target = harness();
    fund(&target, &alice, 1_000).await;
    let reversed: Vec<Transaction> = served.into_iter().rev().collect();
    target.handler.handle("p1", Message::Mempool { txs: reversed }).await;

    let chain = target.handler.chain().lock().await;
    assert_eq!(chain.mempool().len(), 2);
    assert_eq!(chain.pending_nonce(&alice), 2);
}

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accepted_transaction_is_relayed_except_to_origin() {
    let mut h = harness();
    let (alice_kp, alice) = account(1);
    let (_, bob) = account(2);
    fund(&h, &alice, 1_000).await;
    handshake(&mut h, "p1", 1).await;
    handshake(&mut h, "p2", 1).await;

    let tx = transfer(&alice_kp, &bob, 10, 0);
    h.handler.handle("p1", Message::Transaction { tx: tx.clone() }).await;
    assert_eq!(sent(&mut h), vec![("p2".to_string(), Message::Transaction { tx: tx.clone() })]);

    // The echo from p2 is a duplicate and goes nowhere.
    h.handler.handle("p2", Message::Transaction { tx }).await;
    assert!(sent(&mut h).is_empty());
    assert_eq!(h.handler.chain().lock().await.mempool().len(), 1);
}

#[tokio::test]
async fn gossip_is_ignored_while_syncing() {
    let mut h = harness();
    let (alice_kp, alice) = account(1);
    let (_, bob) = account(2);
    fund(&h, &alice, 1_000).await;
    handshake(&mut h, "p1", 5).await;

    h.handler
        .handle("p2", Message::Transaction { tx: transfer(&alice_kp, &bob, 10, 0) })
        .await;

    assert!(h.handler.chain().lock().await.mempool().is_empty());
    assert!(sent(&mut h).is_empty());
}

#[tokio::test]
async fn accepted_block_is_relayed_and_updates_peer_tip() {
    let mut h = harness();
    let (_, validator) = account(9);
    let source = source_chain(&validator, 1);
    handshake(&mut h, "p1", 1).await;
    handshake(&mut h, "p2", 1).await;

    h.handler
        .handle("p1", Message::Block { block: source[1].clone() })
        .await;

    assert_eq!(sent(&mut h), vec![("p2".to_string(), Message::Block { block: source[1].clone() })]);
    assert_eq!(h.handler.chain().lock().await.height(), 2);
    let peers = h.handler.peers().read().await;
    assert_eq!(peers.peer("p1").map(|p| p.height), Some(2));
}

#[tokio::test]
async fn block_that_failed_to_persist_is_not_relayed() {
    let mut h = harness();
    let (_, validator) = account(9);
    let source = source_chain(&validator, 1);
    handshake(&mut h, "p1", 1).await;
    handshake(&mut h, "p2", 1).await;
    h.store.fail_saves(rota_ledger::SAVE_ATTEMPTS);

    h.handler
        .handle("p1", Message::Block { block: source[1].clone() })
        .await;

    assert_eq!(h.handler.chain().lock().await.height(), 2);
    assert!(sent(&mut h).is_empty());
}

#[tokio::test]
async fn block_ahead_of_tip_starts_sync_from_sender() {
    let mut h = harness();
    let (_, validator) = account(9);
    let source = source_chain(&validator, 3);
    handshake(&mut h, "p1", 1).await;

    h.handler
        .handle("p1", Message::Block { block: source[3].clone() })
        .await;

    assert_eq!(sent(&mut h), vec![("p1".to_string(), Message::RequestBlock { index: 1 })]);
    assert_eq!(h.handler.sync_state().await, SyncState::Syncing { target: 4, peer: "p1".into() });
}

#[tokio::test]
async fn block_from_wrong_validator_is_dropped() {
    let mut h = harness();
    let (_, registered) = account(8);
    h.handler.handle("p0", Message::Announce { address: registered.clone() }).await;
    let genesis = Block::genesis(&ChainParams::default());

    // Find an identity that loses the genesis slot to `registered`.
    let intruder = {
        let chain = h.handler.chain().lock().await;
        (10..=255u8)
            .map(|seed| account(seed).1)
            .find(|candidate| chain.select_validator(&genesis.hash, Some(candidate)) != *candidate)
            .expect("some identity loses the slot")
    };
    let forged = source_chain(&intruder, 1);
    handshake(&mut h, "p1", 1).await;
    handshake(&mut h, "p2", 1).await;

    h.handler
        .handle("p1", Message::Block { block: forged[1].clone() })
        .await;

    assert_eq!(h.handler.chain().lock().await.height(), 1);
    assert!(sent(&mut h).is_empty());
}

#[tokio::test]
async fn announce_registers_only_well_formed_addresses() {
    let h = harness();
    let (_, validator) = account(9);

    h.handler
        .handle("p1", Message::Announce { address: Address::new("not-a-key") })
        .await;
    assert!(h.handler.chain().lock().await.valid_validators().is_empty());

    h.handler
        .handle("p1", Message::Announce { address: validator.clone() })
        .await;
    assert_eq!(h.handler.chain().lock().await.valid_validators(), vec![validator]);
}

#[tokio::test]
async fn peers_message_persists_and_dials_new_addresses() {
    let mut h = harness();
    h.handler
        .handle(
            "p1",
            Message::Peers {
                addrs: vec!["10.0.0.5:3000".into(), OWN_ADDR.into(), String::new()],
            },
        )
        .await;

    assert_eq!(h.dials.try_recv().ok(), Some("10.0.0.5:3000".to_string()));
    assert!(h.dials.try_recv().is_err());
    let chain = h.handler.chain().lock().await;
    assert_eq!(chain.peers().collect::<Vec<_>>(), vec!["10.0.0.5:3000"]);
}

// ---------------------------------------------------------------------------
// Local duties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_registers_and_announces_validator() {
    let mut h = harness();
    let (_, validator) = account(9);
    handshake(&mut h, "p1", 1).await;

    h.handler.heartbeat(Some(&validator)).await;

    assert_eq!(
        sent(&mut h),
        vec![("p1".to_string(), Message::Announce { address: validator.clone() })]
    );
    assert_eq!(h.handler.chain().lock().await.valid_validators(), vec![validator]);
}

#[tokio::test]
async fn observer_heartbeat_sends_nothing() {
    let mut h = harness();
    handshake(&mut h, "p1", 1).await;
    h.handler.heartbeat(None).await;
    assert!(sent(&mut h).is_empty());
}

#[tokio::test]
async fn production_broadcasts_block_in_slot() {
    let mut h = harness();
    let (_, validator) = account(9);
    handshake(&mut h, "p1", 1).await;

    let receipt = h.handler.produce(&validator).await.expect("validator holds the slot");

    assert_eq!(receipt.index, 1);
    let tip = h.handler.chain().lock().await.tip().clone();
    assert_eq!(sent(&mut h), vec![("p1".to_string(), Message::Block { block: tip })]);
}

#[tokio::test]
async fn production_pauses_while_syncing() {
    let mut h = harness();
    let (_, validator) = account(9);
    handshake(&mut h, "p1", 5).await;

    assert!(h.handler.produce(&validator).await.is_none());
    assert_eq!(h.handler.chain().lock().await.height(), 1);
}
