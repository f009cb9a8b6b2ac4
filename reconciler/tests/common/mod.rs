// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::U256;
use async_trait::async_trait;
use promo_core::chain::{ChainId, EvmNetwork};
use promo_core::fee_schedule::FeeSchedule;
use reconciler::chain_adapter::{
    AdapterSet, ChainAdapter, Confirmation, FetchError, TransactionView, TransferOutput,
};
use reconciler::reconciliation::{Reconciler, ReconcilerConfig};
use reconciler::storage::Storage;
use reconciler::verifier::TransactionVerifier;
use tempfile::TempDir;

pub const ETH: ChainId = ChainId::Evm(EvmNetwork::Ethereum);
pub const BASE: ChainId = ChainId::Evm(EvmNetwork::Base);

pub const EVM_RECIPIENT: &str = "0x00000000219ab540356cbb839cbe05303d7705fa";
pub const BTC_RECIPIENT: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
pub const SOL_RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

pub const PENDING_TTL: Duration = Duration::from_secs(30 * 60);

/// In-process chain double answering from a script keyed by transaction id.
pub struct ScriptedAdapter {
    chain: ChainId,
    responses: Mutex<HashMap<String, Result<TransactionView, FetchError>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedAdapter {
    pub fn new(chain: ChainId) -> Self {
        Self {
            chain,
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(&self, tx_id: &str, response: Result<TransactionView, FetchError>) {
        self.responses
            .lock()
            .expect("lock script")
            .insert(tx_id.to_ascii_lowercase(), response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainAdapter for ScriptedAdapter {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn fetch(&self, tx_id: &str) -> Result<TransactionView, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .expect("lock script")
            .get(&tx_id.to_ascii_lowercase())
            .cloned()
            .unwrap_or(Err(FetchError::NotFound))
    }
}

/// A confirmed transfer of `amounts` (one output each) to `recipient`.
pub fn confirmed_transfer(
    chain: ChainId,
    tx_id: &str,
    recipient: &str,
    amounts: &[U256],
) -> TransactionView {
    let confirmation = match chain {
        ChainId::Solana => Confirmation::Commitment { finalized: true },
        _ => Confirmation::Blocks(12),
    };
    TransactionView {
        chain,
        tx_id: tx_id.to_string(),
        confirmed: true,
        confirmation,
        outputs: amounts
            .iter()
            .map(|amount| TransferOutput {
                address: recipient.to_string(),
                amount: *amount,
            })
            .collect(),
        sender: Some("sender-address".to_string()),
        block_time: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
        chain_reference: 19_000_000,
    }
}

pub fn evm_tx_id(byte: u8) -> String {
    format!("0x{}", format!("{byte:02x}").repeat(32))
}

pub fn btc_tx_id(byte: u8) -> String {
    format!("{byte:02x}").repeat(32)
}

pub fn sol_signature(seed: char) -> String {
    let mut signature = "5".repeat(44);
    signature.push_str(&seed.to_string().repeat(44));
    signature
}

pub fn wei(value: u128) -> U256 {
    U256::from(value)
}

/// Manually advanced clock shared with the reconciler.
#[derive(Clone)]
pub struct TestClock(Arc<Mutex<SystemTime>>);

impl TestClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(
            UNIX_EPOCH + Duration::from_secs(1_750_000_000),
        )))
    }

    pub fn now(&self) -> SystemTime {
        *self.0.lock().expect("lock clock")
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().expect("lock clock");
        *now += by;
    }
}

pub struct TestDb {
    _dir: TempDir,
    pub path: String,
}

pub fn temp_db(name: &str) -> TestDb {
    let dir = tempfile::Builder::new()
        .prefix(format!("reconciler-{name}-").as_str())
        .tempdir()
        .expect("create temporary test directory");
    let path = dir.path().join("promo.sqlite");
    TestDb {
        _dir: dir,
        path: path.to_string_lossy().into_owned(),
    }
}

pub struct Harness {
    pub db: TestDb,
    pub clock: TestClock,
    pub reconciler: Reconciler,
}

impl Harness {
    /// Reconciler over the default fee table with every adapter's chain enabled.
    pub fn new(name: &str, adapters: &[Arc<ScriptedAdapter>]) -> Self {
        let db = temp_db(name);
        let storage = Storage::open(&db.path, "NORMAL").expect("open storage");

        let mut set = AdapterSet::new();
        let mut recipients = BTreeMap::new();
        for adapter in adapters {
            set.insert(Arc::clone(adapter) as Arc<dyn ChainAdapter>);
            recipients.insert(adapter.chain(), recipient_for(adapter.chain()).to_string());
        }

        let clock = TestClock::new();
        let shared = clock.clone();
        let reconciler = Reconciler::new(
            FeeSchedule::with_defaults().expect("default fee schedule"),
            TransactionVerifier::new(set, 1),
            storage,
            ReconcilerConfig {
                pending_ttl: PENDING_TTL,
                recipients,
            },
        )
        .with_clock(Arc::new(move || shared.now()));

        Self {
            db,
            clock,
            reconciler,
        }
    }

    /// Separate connection for asserting on persisted state.
    pub fn storage(&self) -> Storage {
        Storage::open(&self.db.path, "NORMAL").expect("open storage")
    }
}

pub fn recipient_for(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Bitcoin => BTC_RECIPIENT,
        ChainId::Evm(_) => EVM_RECIPIENT,
        ChainId::Solana => SOL_RECIPIENT,
    }
}
