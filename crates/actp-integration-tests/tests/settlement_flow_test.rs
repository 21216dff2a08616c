//! Integration tests for end-to-end settlement flows.
//!
//! Covers the full transaction lifecycle across the kernel and agent crates:
//! 1. Funding, creation and escrow linking
//! 2. Work states, milestones and settlement
//! 3. Cancellation, disputes and mediator resolution
//! 4. Event fan-out and durable snapshots

use std::sync::Arc;

use actp_agent::{CostModel, Job, ProviderAgent, ProviderConfig, ServeOutcome};
use actp_core::{Address, Amount, BasisPoints, ProtocolConfig};
use actp_kernel::{
    ErrorKind, EventBus, EventPayload, JsonFileSink, LedgerError, LedgerStore, ManualClock,
    NewTransaction, ResolutionDistribution, TransactionEngine, TransactionState, TxId,
};

// ============================================================================
// Helper Functions
// ============================================================================

const T0: i64 = 1_700_000_000;
const DAY: i64 = 86_400;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Market {
    engine: TransactionEngine,
    clock: Arc<ManualClock>,
    requester: Address,
    provider: Address,
    mediator: Address,
    treasury: Address,
}

impl Market {
    fn new() -> Self {
        Self::with_store(Arc::new(LedgerStore::in_memory()))
    }

    fn with_store(store: Arc<LedgerStore>) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(T0));
        let config = ProtocolConfig::default();
        let mediator = config.mediator.clone();
        let treasury = config.treasury.clone();
        let engine = TransactionEngine::new(config, store, clock.clone()).unwrap();
        Self {
            engine,
            clock,
            requester: Address::named("requester"),
            provider: Address::named("provider"),
            mediator,
            treasury,
        }
    }

    fn open_transaction(&self, amount: Amount) -> TxId {
        self.engine.fund_account(&self.requester, amount).unwrap();
        let tx_id = self
            .engine
            .create_transaction(NewTransaction::new(
                self.requester.clone(),
                self.provider.clone(),
                amount,
                T0 + DAY,
            ))
            .unwrap();
        self.engine.link_escrow(&self.requester, &tx_id).unwrap();
        tx_id
    }

    fn advance(&self, actor: &Address, tx_id: &TxId, target: TransactionState) {
        self.engine.transition_state(actor, tx_id, target, None).unwrap();
    }

    fn deliver(&self, tx_id: &TxId) {
        self.advance(&self.provider, tx_id, TransactionState::InProgress);
        self.advance(&self.provider, tx_id, TransactionState::Delivered);
    }

    fn balance(&self, who: &Address) -> Amount {
        self.engine.balance_of(who)
    }

    fn remaining(&self, tx_id: &TxId) -> Amount {
        let escrow_id = self.engine.transaction(tx_id).unwrap().escrow_id.unwrap();
        self.engine.escrow(&escrow_id).unwrap().remaining()
    }
}

fn units(n: u64) -> Amount {
    Amount::from_units(n)
}

fn cents(units: u64, cents: u64) -> Amount {
    Amount::from_cents(units, cents)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn happy_path_settles_net_of_fee() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(100));
    assert_eq!(m.balance(&m.requester), Amount::ZERO);
    assert_eq!(m.remaining(&tx_id), units(100));

    m.deliver(&tx_id);
    m.advance(&m.requester, &tx_id, TransactionState::Settled);

    assert_eq!(m.balance(&m.provider), units(99));
    assert_eq!(m.balance(&m.treasury), units(1));
    assert_eq!(m.remaining(&tx_id), Amount::ZERO);

    let escrow_id = m.engine.transaction(&tx_id).unwrap().escrow_id.unwrap();
    let escrow = m.engine.escrow(&escrow_id).unwrap();
    assert_eq!(escrow.released, escrow.amount);
    assert!(!escrow.locked);
}

#[test]
fn milestones_and_final_settlement() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(1_000));
    m.advance(&m.provider, &tx_id, TransactionState::InProgress);

    m.engine.release_milestone(&m.requester, &tx_id, units(250)).unwrap();
    assert_eq!(m.balance(&m.provider), cents(247, 50));
    m.engine.release_milestone(&m.requester, &tx_id, units(250)).unwrap();
    assert_eq!(m.balance(&m.provider), units(495));
    assert_eq!(m.remaining(&tx_id), units(500));

    m.advance(&m.provider, &tx_id, TransactionState::Delivered);
    m.advance(&m.requester, &tx_id, TransactionState::Settled);

    assert_eq!(m.balance(&m.provider), units(990));
    assert_eq!(m.balance(&m.treasury), units(10));
    assert_eq!(
        m.balance(&m.provider).checked_add(m.balance(&m.treasury)),
        Some(units(1_000))
    );
}

#[test]
fn requester_cancels_after_deadline_with_penalty() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(500));

    m.clock.set(T0 + DAY + 1);
    m.advance(&m.requester, &tx_id, TransactionState::Cancelled);

    assert_eq!(m.balance(&m.requester), units(475));
    assert_eq!(m.balance(&m.provider), units(25));
    assert_eq!(m.balance(&m.treasury), Amount::ZERO);
}

#[test]
fn dispute_resolved_by_mediator() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(100));
    m.deliver(&tx_id);
    m.advance(&m.requester, &tx_id, TransactionState::Disputed);

    let short = ResolutionDistribution {
        requester_amount: units(30),
        provider_amount: units(60),
        mediator_amount: units(9),
        mediator: m.mediator.clone(),
    };
    let err = m.engine.submit_resolution(&m.mediator, &tx_id, short).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let distribution = ResolutionDistribution {
        requester_amount: units(30),
        provider_amount: units(60),
        mediator_amount: units(10),
        mediator: m.mediator.clone(),
    };
    m.engine.submit_resolution(&m.mediator, &tx_id, distribution).unwrap();
    m.advance(&m.mediator, &tx_id, TransactionState::Settled);

    assert_eq!(m.balance(&m.provider), cents(59, 40));
    assert_eq!(m.balance(&m.requester), units(30));
    assert_eq!(m.balance(&m.mediator), units(10));
    assert_eq!(m.balance(&m.treasury), cents(0, 60));
}

#[test]
fn below_minimum_and_self_dealing_are_rejected() {
    let m = Market::new();

    let err = m
        .engine
        .create_transaction(NewTransaction::new(
            m.requester.clone(),
            m.provider.clone(),
            cents(0, 1),
            T0 + DAY,
        ))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = m
        .engine
        .create_transaction(NewTransaction::new(
            m.requester.clone(),
            m.requester.clone(),
            units(10),
            T0 + DAY,
        ))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn second_settle_is_rejected() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(100));
    m.deliver(&tx_id);
    m.advance(&m.requester, &tx_id, TransactionState::Settled);

    let err = m
        .engine
        .transition_state(&m.requester, &tx_id, TransactionState::Settled, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    assert_eq!(err.guidance(), "refresh the transaction state; the action is not available from here");
}

#[test]
fn fee_change_does_not_reach_in_flight_transactions() {
    let m = Market::new();
    let early = m.open_transaction(units(100));

    m.engine
        .set_platform_fee(&m.mediator, BasisPoints::new(300).unwrap())
        .unwrap();
    let late = m.open_transaction(units(100));

    m.deliver(&early);
    m.deliver(&late);
    m.advance(&m.requester, &early, TransactionState::Settled);
    m.advance(&m.requester, &late, TransactionState::Settled);

    // 1.00 from the early transaction, 3.00 from the late one
    assert_eq!(m.balance(&m.treasury), units(4));
    assert_eq!(m.balance(&m.provider), units(99 + 97));
}

#[test]
fn provider_waits_out_dispute_window() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(100));
    m.deliver(&tx_id);

    let err = m
        .engine
        .transition_state(&m.provider, &tx_id, TransactionState::Settled, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooEarly);
    assert_eq!(err.guidance(), "wait for the dispute window to close");

    m.clock.advance(2 * DAY + 1);
    m.advance(&m.provider, &tx_id, TransactionState::Settled);
    assert_eq!(m.balance(&m.provider), units(99));
}

#[test]
fn insufficient_funds_error_carries_details() {
    let m = Market::new();
    let tx_id = m
        .engine
        .create_transaction(NewTransaction::new(
            m.requester.clone(),
            m.provider.clone(),
            units(100),
            T0 + DAY,
        ))
        .unwrap();

    let err = m.engine.link_escrow(&m.requester, &tx_id).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    let details = err.details();
    assert_eq!(details["required"], "100.000000 USDC");
    assert_eq!(details["available"], "0.000000 USDC");
    assert_eq!(err.guidance(), "fund your account");
    assert_eq!(
        m.engine.transaction(&tx_id).unwrap().state,
        TransactionState::Initiated
    );
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn event_bus_sees_log_in_commit_order() {
    let m = Market::new();
    let bus = EventBus::new(EventBus::DEFAULT_CAPACITY);
    let mut rx = bus.subscribe();
    bus.attach(m.engine.store());

    let tx_id = m.open_transaction(units(100));
    m.deliver(&tx_id);
    m.advance(&m.requester, &tx_id, TransactionState::Settled);

    let mut received = Vec::new();
    while let Ok(event) = rx.try_recv() {
        received.push(event);
    }
    assert_eq!(received, m.engine.events());

    let names: Vec<&str> = received.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "AccountFunded",
            "TransactionCreated",
            "EscrowLinked",
            "StateTransitioned",
            "StateTransitioned",
            "StateTransitioned",
            "EscrowReleased",
            "FeeCollected",
            "StateTransitioned",
        ]
    );
    assert!(received.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));

    let last = received.last().unwrap();
    assert_eq!(
        last.payload,
        EventPayload::StateTransitioned {
            tx_id,
            from_state: TransactionState::Delivered,
            to_state: TransactionState::Settled,
        }
    );
}

#[test]
fn rejected_operation_publishes_nothing() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(100));
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    bus.attach(m.engine.store());

    let _ = m
        .engine
        .transition_state(&m.requester, &tx_id, TransactionState::Delivered, None);
    assert!(rx.try_recv().is_err());
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn json_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let tx_id = {
        let store = Arc::new(LedgerStore::with_sink(Box::new(JsonFileSink::new(&path))));
        let m = Market::with_store(store);
        let tx_id = m.open_transaction(units(100));
        m.deliver(&tx_id);
        tx_id
    };

    let store = Arc::new(LedgerStore::open(Box::new(JsonFileSink::new(&path))).unwrap());
    let m = Market::with_store(store);
    let tx = m.engine.transaction(&tx_id).unwrap();
    assert_eq!(tx.state, TransactionState::Delivered);
    assert_eq!(tx.delivered_at, Some(T0));

    m.advance(&m.requester, &tx_id, TransactionState::Settled);
    assert_eq!(m.balance(&m.provider), units(99));

    let reopened = LedgerStore::open(Box::new(JsonFileSink::new(&path))).unwrap();
    assert_eq!(*reopened.get_state(), *m.engine.snapshot());
}

// ============================================================================
// Provider Agent
// ============================================================================

#[test]
fn agent_serves_job_and_requester_settles() {
    let m = Market::new();
    let tx_id = m.open_transaction(units(50));

    let config = ProviderConfig::new(
        CostModel::new(units(5), cents(0, 10), "token"),
        0.25,
    );
    let handler = |job: &Job| -> actp_agent::Result<Vec<u8>> {
        Ok(job.input.iter().rev().copied().collect())
    };
    let agent = ProviderAgent::new(m.provider.clone(), config, handler).unwrap();

    let job = Job::for_transaction(&m.engine.transaction(&tx_id).unwrap(), b"abc".to_vec(), 100);
    let outcome = agent.serve(&m.engine, &job).unwrap();
    assert_eq!(
        outcome,
        ServeOutcome::Delivered {
            tx_id: tx_id.clone(),
            result: b"cba".to_vec(),
            proof: *blake3::hash(b"cba").as_bytes(),
        }
    );

    m.advance(&m.requester, &tx_id, TransactionState::Settled);
    assert_eq!(m.balance(&m.provider), cents(49, 50));
}
