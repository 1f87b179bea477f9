//! End-to-end chain state tests: genesis boot, block connection, mempool
//! behavior, and fork reorganization.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use secp256k1::{rand::rngs::OsRng, Message, PublicKey, Secp256k1, SecretKey};
use tempdir::TempDir;

use kernel_chain::{
    amount::Amount,
    block::{Block, Header, Height},
    parameters::genesis::{genesis_block, GENESIS_PAYOUT_PUB_KEY_HASH, GENESIS_TIMESTAMP},
    transaction::{LockTime, Transaction, SIGHASH_ALL},
    transparent::{hash160, CoinbaseData, Input, OutPoint, Output, Script, SEQUENCE_FINAL},
    work::difficulty::CompactDifficulty,
};
use kernel_consensus::block::subsidy::block_subsidy;
use kernel_state::{ChainManager, Config, Mempool, Store};

/// A target easy enough that a couple of nonce increments find a block.
fn easy_bits() -> CompactDifficulty {
    CompactDifficulty::from_parts(0x20, 0x7f_ff_ff)
}

struct TestKey {
    secret: SecretKey,
    public: PublicKey,
    pub_key_hash: [u8; 20],
}

impl TestKey {
    fn random() -> TestKey {
        let secp = Secp256k1::new();
        let mut rng = OsRng::new().expect("OS rng is available");
        let (secret, public) = secp.generate_keypair(&mut rng);
        TestKey {
            secret,
            public,
            pub_key_hash: hash160(&public.serialize()),
        }
    }

    fn lock_script(&self) -> Script {
        Script::new_p2pkh(&self.pub_key_hash)
    }

    /// Sign every input of `tx`, all of which must spend outputs locked to
    /// this key.
    fn sign(&self, tx: &mut Transaction) {
        let secp = Secp256k1::new();
        let lock_script = self.lock_script();
        for index in 0..tx.inputs.len() {
            let sighash = tx.sighash(index, &lock_script).expect("signable input");
            let message = Message::from_slice(sighash.as_ref()).expect("32-byte digest");
            let signature = secp.sign(&message, &self.secret);
            let mut sig_bytes = signature.serialize_der().to_vec();
            sig_bytes.push(SIGHASH_ALL as u8);
            let outpoint = tx.inputs[index].outpoint().expect("spend input");
            tx.inputs[index] = Input::PrevOut {
                outpoint,
                unlock_script: Script::new_p2pkh_unlock(&sig_bytes, &self.public.serialize()),
                sequence: SEQUENCE_FINAL,
            };
        }
    }
}

struct Node {
    _dir: TempDir,
    chain: Arc<ChainManager>,
}

impl Node {
    fn start() -> Node {
        let dir = TempDir::new("kernel-state-test").expect("tempdir");
        let config = Config::new(dir.path());
        let store = Store::open(&config).expect("store opens");
        let mempool = Mempool::new(&store).expect("mempool opens");
        let chain = ChainManager::new(store, mempool).expect("chain manager");
        chain.init_genesis().expect("genesis bootstrap");
        chain.check_utxo_consistency().expect("consistency check");
        Node { _dir: dir, chain }
    }

    fn store(&self) -> &Store {
        self.chain.store()
    }

    fn mempool(&self) -> &Mempool {
        self.chain.mempool()
    }

    fn tip_height(&self) -> u32 {
        self.chain.tip().expect("tip exists").height.0
    }
}

/// Mine a child of `parent` containing `txs` (after the coinbase), paying
/// the whole allowed reward to `miner_h160`. `tag` keeps coinbases on
/// different branches distinct, like an extranonce.
fn mine_child(
    parent: &Block,
    parent_height: u32,
    txs: Vec<Transaction>,
    fees: Amount,
    miner_h160: [u8; 20],
    tag: &[u8],
) -> Block {
    let height = Height(parent_height + 1);
    let reward = block_subsidy(height).checked_add(fees).expect("no overflow");
    let coinbase = Transaction::new(
        1,
        vec![Input::new_coinbase(height, CoinbaseData::new(tag.to_vec()))],
        vec![Output::new(reward, Script::new_p2pkh(&miner_h160))],
        LockTime::none(),
    );

    let mut transactions = vec![Arc::new(coinbase)];
    transactions.extend(txs.into_iter().map(Arc::new));
    let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();

    let time = parent.header.time + Duration::seconds(30);
    let mut nonce = 0u32;
    loop {
        let header = Header::new(
            1,
            parent.hash(),
            merkle_root,
            time,
            easy_bits(),
            nonce,
        );
        let target = header.difficulty_threshold.to_expanded().expect("target");
        if header.hash() < target {
            return Block {
                header,
                transactions,
            };
        }
        nonce += 1;
    }
}

/// A signed transaction spending `outpoint` (locked to `key`, worth
/// `input_value`): `amount` to `to_h160`, the rest minus `fee` back to the
/// key.
fn spend(
    key: &TestKey,
    outpoint: OutPoint,
    input_value: Amount,
    amount: Amount,
    fee: Amount,
    to_h160: [u8; 20],
) -> Transaction {
    let change = input_value
        .checked_sub(amount)
        .and_then(|rest| rest.checked_sub(fee))
        .expect("inputs cover amount and fee");
    let mut outputs = vec![Output::new(amount, Script::new_p2pkh(&to_h160))];
    if change > Amount::zero() {
        outputs.push(Output::new(change, key.lock_script()));
    }
    let mut tx = Transaction::new(
        1,
        vec![Input::new_spend(outpoint)],
        outputs,
        LockTime::none(),
    );
    key.sign(&mut tx);
    tx
}

#[test]
fn genesis_boot_creates_the_expected_state() {
    let node = Node::start();
    assert_eq!(node.tip_height(), 0);
    assert_eq!(node.store().utxo_entry_count(), 1);
    assert_eq!(
        node.store()
            .balance_by_pub_key_hash(&GENESIS_PAYOUT_PUB_KEY_HASH)
            .unwrap(),
        Amount::from_base_units(5_000_000_000)
    );
    let tip = node.chain.tip().unwrap().hash;
    assert_eq!(node.store().last_applied_hash().unwrap(), Some(tip));
    assert_eq!(
        genesis_block().header.time,
        Utc.timestamp(GENESIS_TIMESTAMP as i64, 0)
    );

    // Booting again over the same directory is a no-op.
    node.chain.init_genesis().unwrap();
    assert_eq!(node.tip_height(), 0);
}

#[test]
fn a_mined_block_extends_the_chain() {
    let node = Node::start();
    let miner = TestKey::random();
    let block = mine_child(
        &genesis_block(),
        0,
        vec![],
        Amount::zero(),
        miner.pub_key_hash,
        b"m1",
    );
    assert!(node.chain.process_new_block(Arc::new(block.clone())).unwrap());
    assert_eq!(node.tip_height(), 1);
    assert_eq!(node.store().utxo_entry_count(), 2);
    assert_eq!(
        node.store()
            .balance_by_pub_key_hash(&miner.pub_key_hash)
            .unwrap(),
        block_subsidy(Height(1))
    );

    // Feeding the same block again is a no-op.
    assert!(!node.chain.process_new_block(Arc::new(block)).unwrap());
    assert_eq!(node.tip_height(), 1);
}

#[test]
fn a_spend_flows_through_mempool_and_block() {
    let node = Node::start();
    let alice = TestKey::random();
    let bob = TestKey::random();

    let b1 = mine_child(
        &genesis_block(),
        0,
        vec![],
        Amount::zero(),
        alice.pub_key_hash,
        b"m1",
    );
    node.chain.process_new_block(Arc::new(b1.clone())).unwrap();

    let coinbase_id = b1.transactions[0].hash();
    let fee = Amount::from_base_units(5_000);
    let tx = spend(
        &alice,
        OutPoint {
            hash: coinbase_id,
            index: 0,
        },
        block_subsidy(Height(1)),
        Amount::from_base_units(1_000_000_000),
        fee,
        bob.pub_key_hash,
    );
    let txid = tx.hash();

    let admitted_fee = node.mempool().admit(tx.clone(), node.store()).unwrap();
    assert_eq!(admitted_fee, fee);
    assert!(node.mempool().contains(&txid));

    // The template picks the transaction up along with its fee.
    let template = node.mempool().select_for_block();
    assert_eq!(template.tx_ids, vec![txid]);
    assert_eq!(template.total_fees, fee);

    let b2 = mine_child(
        &b1,
        1,
        template.transactions,
        template.total_fees,
        alice.pub_key_hash,
        b"m2",
    );
    node.chain.process_new_block(Arc::new(b2)).unwrap();

    assert_eq!(node.tip_height(), 2);
    assert!(node.mempool().is_empty());
    assert_eq!(
        node.store().balance_by_pub_key_hash(&bob.pub_key_hash).unwrap(),
        Amount::from_base_units(1_000_000_000)
    );
    // Alice holds the change plus both coinbases (block 2's includes the fee).
    let expected_alice = block_subsidy(Height(1))
        .checked_sub(Amount::from_base_units(1_000_000_000))
        .unwrap()
        .checked_sub(fee)
        .unwrap()
        .checked_add(block_subsidy(Height(2)))
        .unwrap()
        .checked_add(fee)
        .unwrap();
    assert_eq!(
        node.store()
            .balance_by_pub_key_hash(&alice.pub_key_hash)
            .unwrap(),
        expected_alice
    );
    // The transaction is locatable through the index now.
    assert!(node.store().transaction_by_id(&txid).unwrap().is_some());
}

#[test]
fn mempool_rejects_double_spends_and_duplicates() {
    let node = Node::start();
    let alice = TestKey::random();
    let bob = TestKey::random();
    let carol = TestKey::random();

    let b1 = mine_child(
        &genesis_block(),
        0,
        vec![],
        Amount::zero(),
        alice.pub_key_hash,
        b"m1",
    );
    node.chain.process_new_block(Arc::new(b1.clone())).unwrap();

    let outpoint = OutPoint {
        hash: b1.transactions[0].hash(),
        index: 0,
    };
    let fee = Amount::from_base_units(1_000);
    let to_bob = spend(
        &alice,
        outpoint,
        block_subsidy(Height(1)),
        Amount::from_base_units(400_000_000),
        fee,
        bob.pub_key_hash,
    );
    let to_carol = spend(
        &alice,
        outpoint,
        block_subsidy(Height(1)),
        Amount::from_base_units(300_000_000),
        fee,
        carol.pub_key_hash,
    );

    node.mempool().admit(to_bob.clone(), node.store()).unwrap();
    // The conflicting spend is rejected; only the first stays.
    assert!(node.mempool().admit(to_carol, node.store()).is_err());
    assert_eq!(node.mempool().len(), 1);

    // Admitting the same transaction twice changes nothing either.
    assert!(node.mempool().admit(to_bob, node.store()).is_err());
    assert_eq!(node.mempool().len(), 1);

    // Mining includes only the surviving transaction.
    let template = node.mempool().select_for_block();
    assert_eq!(template.transactions.len(), 1);
    assert_eq!(template.tx_ids[0], node.mempool().entries()[0].0);
}

/// A heavier fork re-roots the chain, the UTXO set matches a from-scratch
/// replay of the winning branch, and transactions unique to the losing
/// branch return to the mempool.
#[test]
fn heavier_forks_reorganize_and_restore_orphaned_transactions() {
    let node = Node::start();
    let alice = TestKey::random();
    let bob = TestKey::random();

    // Shared prefix: s1 pays alice.
    let s1 = mine_child(
        &genesis_block(),
        0,
        vec![],
        Amount::zero(),
        alice.pub_key_hash,
        b"shared",
    );
    node.chain.process_new_block(Arc::new(s1.clone())).unwrap();

    // Branch A: a2 carries alice's payment to bob, a3 extends it.
    let fee = Amount::from_base_units(2_000);
    let payment = spend(
        &alice,
        OutPoint {
            hash: s1.transactions[0].hash(),
            index: 0,
        },
        block_subsidy(Height(1)),
        Amount::from_base_units(700_000_000),
        fee,
        bob.pub_key_hash,
    );
    let payment_id = payment.hash();

    let a2 = mine_child(&s1, 1, vec![payment.clone()], fee, alice.pub_key_hash, b"a2");
    let a3 = mine_child(&a2, 2, vec![], Amount::zero(), alice.pub_key_hash, b"a3");
    node.chain.process_new_block(Arc::new(a2.clone())).unwrap();
    node.chain.process_new_block(Arc::new(a3.clone())).unwrap();
    assert_eq!(node.tip_height(), 3);
    assert_eq!(node.chain.tip().unwrap().hash, a3.hash());

    // Branch B from s1: one block longer, so strictly more work.
    let b2 = mine_child(&s1, 1, vec![], Amount::zero(), bob.pub_key_hash, b"b2");
    let b3 = mine_child(&b2, 2, vec![], Amount::zero(), bob.pub_key_hash, b"b3");
    let b4 = mine_child(&b3, 3, vec![], Amount::zero(), bob.pub_key_hash, b"b4");

    node.chain.process_new_block(Arc::new(b2.clone())).unwrap();
    // Equal accumulated work: the current tip wins, no reorganization yet.
    node.chain.process_new_block(Arc::new(b3.clone())).unwrap();
    assert_eq!(node.chain.tip().unwrap().hash, a3.hash());

    // The fourth block tips the scale.
    node.chain.process_new_block(Arc::new(b4.clone())).unwrap();
    assert_eq!(node.tip_height(), 4);
    assert_eq!(node.chain.tip().unwrap().hash, b4.hash());

    // The orphaned payment is back in the mempool: its input (s1's
    // coinbase) exists on both branches.
    assert!(node.mempool().contains(&payment_id));

    // The UTXO set equals a from-scratch replay of genesis → B4.
    let replay = Node::start();
    replay.chain.process_new_block(Arc::new(s1.clone())).unwrap();
    replay.chain.process_new_block(Arc::new(b2)).unwrap();
    replay.chain.process_new_block(Arc::new(b3)).unwrap();
    replay.chain.process_new_block(Arc::new(b4)).unwrap();
    assert_eq!(
        node.store().utxo_snapshot().unwrap(),
        replay.store().utxo_snapshot().unwrap()
    );

    // Extending A past B's work reorganizes straight back.
    let a4 = mine_child(&a3, 3, vec![], Amount::zero(), alice.pub_key_hash, b"a4");
    let a5 = mine_child(&a4, 4, vec![], Amount::zero(), alice.pub_key_hash, b"a5");
    node.chain.process_new_block(Arc::new(a4.clone())).unwrap();
    node.chain.process_new_block(Arc::new(a5.clone())).unwrap();
    assert_eq!(node.chain.tip().unwrap().hash, a5.hash());

    // The payment is confirmed again (in a2), so it left the mempool.
    assert!(!node.mempool().contains(&payment_id));
    assert!(node.store().transaction_by_id(&payment_id).unwrap().is_some());

    let replay_a = Node::start();
    for block in [&s1, &a2, &a3, &a4, &a5] {
        replay_a
            .chain
            .process_new_block(Arc::new(block.clone()))
            .unwrap();
    }
    assert_eq!(
        node.store().utxo_snapshot().unwrap(),
        replay_a.store().utxo_snapshot().unwrap()
    );
}

/// A coinbase claiming more than subsidy + fees fails at connect time, and
/// the chain rolls back to the previous tip.
#[test]
fn overclaiming_coinbase_is_rejected_at_connect() {
    let node = Node::start();
    let miner = TestKey::random();

    let good = mine_child(
        &genesis_block(),
        0,
        vec![],
        Amount::zero(),
        miner.pub_key_hash,
        b"good",
    );
    node.chain.process_new_block(Arc::new(good.clone())).unwrap();

    // Hand-roll a child whose coinbase claims one unit too much.
    let greedy = mine_child(
        &good,
        1,
        vec![],
        Amount::from_base_units(1),
        miner.pub_key_hash,
        b"greedy",
    );
    let greedy_hash = greedy.hash();
    assert!(node.chain.process_new_block(Arc::new(greedy)).is_err());

    // The tip is untouched and the offender is marked invalid in the index.
    assert_eq!(node.chain.tip().unwrap().hash, good.hash());
    assert_eq!(node.store().last_applied_hash().unwrap(), Some(good.hash()));
    let entry = node.store().index_entry(&greedy_hash).unwrap().unwrap();
    assert_eq!(entry.status, kernel_state::index::BlockStatus::Invalid);
}

/// Wiping the last-applied marker forces a rebuild that converges to the
/// same UTXO set.
#[test]
fn utxo_rebuild_replays_the_main_chain() {
    let node = Node::start();
    let miner = TestKey::random();

    let b1 = mine_child(
        &genesis_block(),
        0,
        vec![],
        Amount::zero(),
        miner.pub_key_hash,
        b"m1",
    );
    let b2 = mine_child(&b1, 1, vec![], Amount::zero(), miner.pub_key_hash, b"m2");
    node.chain.process_new_block(Arc::new(b1)).unwrap();
    node.chain.process_new_block(Arc::new(b2)).unwrap();

    let before = node.store().utxo_snapshot().unwrap();
    node.store().rebuild_utxos().unwrap();
    assert_eq!(node.store().utxo_snapshot().unwrap(), before);
    assert_eq!(
        node.store().last_applied_hash().unwrap(),
        Some(node.chain.tip().unwrap().hash)
    );
}
