//! End-to-end treasury scenarios against the stub ledger, venue and oracle.
//!
//! Flow exercised:
//! 1. Provision + initialize a 90-day treasury, partner deposits (10000, 10000)
//! 2. Pre-inform / withdraw protocol across the epoch boundary
//! 3. Trader swap through the constant-product pool
//! 4. Fee harvest (automatic and manual) at the boundary

use std::sync::Arc;

use treasury_domain::{
    Amount, AssetId, InitializeParams, Leg, Principal, Reserves, SqrtPriceX96, Timestamp,
    Treasury, TreasuryError, TreasuryId, DEFAULT_EPOCH_DURATION, SECONDS_PER_DAY,
};
use treasury_exec::stub::constant_product_out;
use treasury_exec::{
    AssetTransferPort, Clock, ExecError, Executor, ManualClock, StubAssetLedger, StubOracle,
    StubVenue, SwapRequest, SwapVenuePort,
};
use treasury_store::MemoryStore;
use uuid::Uuid;

const T0: Timestamp = 1_700_000_000;
const DAY: u64 = SECONDS_PER_DAY;
const POOL_DEPTH: Amount = 10_000_000_000;

type StubExecutor = Executor<StubAssetLedger, StubVenue, StubOracle, MemoryStore>;

struct Fixture {
    executor: Arc<StubExecutor>,
    ledger: Arc<StubAssetLedger>,
    venue: Arc<StubVenue>,
    oracle: Arc<StubOracle>,
    clock: Arc<ManualClock>,
    id: TreasuryId,
}

fn token_a() -> AssetId {
    AssetId::new("TKA")
}
fn token_b() -> AssetId {
    AssetId::new("TKB")
}
fn partner() -> Principal {
    Principal::new("partner")
}
fn trader() -> Principal {
    Principal::new("trader")
}
fn owner() -> Principal {
    Principal::new("owner")
}
fn router() -> Principal {
    Principal::new("router")
}
fn account() -> Principal {
    Principal::new("treasury")
}

fn params() -> InitializeParams {
    InitializeParams {
        partner: partner(),
        trader: trader(),
        owner: owner(),
        asset_x: token_b(),
        asset_y: token_a(),
        epoch_start: T0,
        epoch_duration: DEFAULT_EPOCH_DURATION,
        pre_inform_margin: None,
        fee_rate: None,
        fee_asset: None,
        venue: router(),
        pool_fee_tier: None,
    }
}

/// Initialized treasury with no deposits yet
async fn setup_empty() -> Fixture {
    let ledger = Arc::new(StubAssetLedger::new());
    let venue = Arc::new(StubVenue::new(ledger.clone(), Principal::new("pool"), 3_000));
    venue.seed_liquidity(&token_a(), POOL_DEPTH);
    venue.seed_liquidity(&token_b(), POOL_DEPTH);
    let oracle = Arc::new(StubOracle::new(SqrtPriceX96::from_ratio(1, 1).unwrap()));
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(T0));

    let executor = Arc::new(Executor::new(
        ledger.clone(),
        venue.clone(),
        oracle.clone(),
        store,
        clock.clone(),
    ));

    let treasury = Treasury::provisioned(Uuid::now_v7(), account());
    executor.register(&treasury).await.unwrap();
    executor.initialize(treasury.id, params()).await.unwrap();

    Fixture { executor, ledger, venue, oracle, clock, id: treasury.id }
}

/// Partner holds and has approved `amount` of both tokens
async fn fund(f: &Fixture, who: &Principal, amount: Amount) {
    for asset in [token_a(), token_b()] {
        f.ledger.mint(&asset, who, amount);
        f.ledger.approve(&asset, who, &account(), amount).await.unwrap();
    }
}

/// Initialized treasury holding (10000, 10000)
async fn setup() -> Fixture {
    let f = setup_empty().await;
    fund(&f, &partner(), 10_000).await;
    f.executor.deposit(f.id, &partner(), 10_000, 10_000).await.unwrap();
    f
}

async fn reserves(f: &Fixture) -> Reserves {
    f.executor.treasury(f.id).await.unwrap().reserves
}

/// What the stub pool would pay right now for `amount_in` of `asset_in`
fn pool_quote(f: &Fixture, asset_in: &AssetId, asset_out: &AssetId, amount_in: Amount) -> Amount {
    let pool = f.venue.pool();
    constant_product_out(
        amount_in,
        f.ledger.balance(asset_in, pool),
        f.ledger.balance(asset_out, pool),
        3_000,
    )
    .unwrap()
}

fn domain_err(err: ExecError) -> TreasuryError {
    match err {
        ExecError::Treasury(e) => e,
        other => panic!("Expected domain error, got {other:?}"),
    }
}

// =============================================================================
// Scenario: pre-inform and withdraw across the boundary
// =============================================================================

#[tokio::test]
async fn test_withdrawal_protocol_scenario() {
    let f = setup().await;
    assert_eq!(reserves(&f).await, Reserves::new(10_000, 10_000));

    // Day 85: window open
    f.clock.set(T0 + 85 * DAY);
    f.executor.pre_inform(f.id, &partner(), 100, 100).await.unwrap();

    // Day 88: window closed
    f.clock.set(T0 + 88 * DAY);
    let err = f.executor.pre_inform(f.id, &partner(), 100, 100).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::WindowClosed { .. }));

    // After day 90
    f.clock.set(T0 + 91 * DAY);
    let before = f.executor.treasury(f.id).await.unwrap();
    let err = f.executor.withdraw(f.id, &partner(), 200, 200).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::AmountExceedsPreinformed { .. }));
    assert_eq!(f.executor.treasury(f.id).await.unwrap(), before);

    let receipt = f.executor.withdraw(f.id, &partner(), 100, 100).await.unwrap();
    assert_eq!(receipt.treasury.pending_amounts(), (0, 0));
    assert_eq!(receipt.treasury.reserves, Reserves::new(9_900, 9_900));
    assert_eq!(f.ledger.balance(&token_a(), &partner()), 100);
    assert_eq!(f.ledger.balance(&token_b(), &account()), 9_900);
}

#[tokio::test]
async fn test_withdraw_before_rollover_rejected() {
    let f = setup().await;
    f.clock.set(T0 + 10 * DAY);
    f.executor.pre_inform(f.id, &partner(), 100, 100).await.unwrap();

    f.clock.set(T0 + 80 * DAY);
    let err = f.executor.withdraw(f.id, &partner(), 100, 100).await.unwrap_err();
    assert_eq!(
        domain_err(err),
        TreasuryError::AlreadyHarvestedThisEpoch { next_allowed: T0 + DEFAULT_EPOCH_DURATION }
    );
}

// =============================================================================
// Scenario: swap then harvest
// =============================================================================

#[tokio::test]
async fn test_swap_then_harvest_scenario() {
    let f = setup().await;

    let receipt = f.executor.swap(f.id, &trader(), &router(), &token_a(), 3_000).await.unwrap();
    assert_eq!(receipt.treasury.reserves, Reserves::new(7_000, 12_990));
    assert_eq!(receipt.events[0].event_type(), "swapped");
    assert_eq!(f.ledger.balance(&token_b(), &account()), 12_990);

    // sqrt(0.25) * 2^96: one A is worth a quarter B
    let quarter: SqrtPriceX96 = "39614081257132168796771975168".parse().unwrap();
    f.oracle.set_price(quarter);

    f.clock.set(T0 + 89 * DAY);
    let err = f.executor.harvest(f.id).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::AlreadyHarvestedThisEpoch { .. }));

    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);
    assert!(f.executor.is_harvest_due(f.id).await.unwrap());

    // Recompute: value both snapshots in B at the current price
    let nav_now = 7_000 / 4 + 12_990;
    let nav_baseline = 10_000 / 4 + 10_000;
    let expected_fee: Amount = (nav_now - nav_baseline) * 20 / 100;
    assert_eq!(expected_fee, 448);

    let receipt = f.executor.harvest(f.id).await.unwrap();
    assert_eq!(receipt.treasury.reserves, Reserves::new(7_000, 12_990 - expected_fee));
    assert_eq!(f.ledger.balance(&token_b(), &trader()), expected_fee);

    // Once per epoch
    f.clock.advance(DAY);
    let err = f.executor.harvest(f.id).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::AlreadyHarvestedThisEpoch { .. }));

    f.clock.set(T0 + 2 * DEFAULT_EPOCH_DURATION);
    let receipt = f.executor.harvest(f.id).await.unwrap();
    // no price move and no trades since the rebase
    assert_eq!(receipt.treasury.reserves, Reserves::new(7_000, 12_542));
}

#[tokio::test]
async fn test_harvest_fulfils_pending_intent() {
    let f = setup().await;
    f.clock.set(T0 + 85 * DAY);
    f.executor.pre_inform(f.id, &partner(), 100, 100).await.unwrap();
    f.executor.swap(f.id, &trader(), &router(), &token_a(), 3_000).await.unwrap();
    f.oracle.set_price(SqrtPriceX96::from_ratio(1, 4).unwrap());

    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);
    let receipt = f.executor.harvest(f.id).await.unwrap();

    assert_eq!(receipt.treasury.reserves, Reserves::new(6_900, 12_442));
    assert_eq!(receipt.treasury.pending, None);
    assert_eq!(f.ledger.balance(&token_a(), &partner()), 100);
    assert_eq!(f.ledger.balance(&token_b(), &partner()), 100);
    let types: Vec<_> = receipt.events.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["fee_harvested", "withdrawn"]);
}

#[tokio::test]
async fn test_manual_fee_withdrawal() {
    let f = setup().await;
    f.executor.swap(f.id, &trader(), &router(), &token_a(), 3_000).await.unwrap();
    f.oracle.set_price(SqrtPriceX96::from_ratio(1, 4).unwrap());
    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);
    let desk = Principal::new("desk");

    let err = f
        .executor
        .withdraw_fee(f.id, &trader(), 213, 0, &token_b(), &desk)
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        TreasuryError::SlippageExceeded { leg: Leg::A, minimum: 213, realized: 212 }
    );
    assert_eq!(reserves(&f).await, Reserves::new(7_000, 12_990));

    let converted = pool_quote(&f, &token_a(), &token_b(), 212);

    // min_out_b covers the whole payout: 394 direct plus the conversion
    let receipt = f
        .executor
        .withdraw_fee(f.id, &trader(), 212, 394 + converted, &token_b(), &desk)
        .await
        .unwrap();
    assert_eq!(receipt.treasury.reserves, Reserves::new(6_788, 12_596));
    assert_eq!(f.ledger.balance(&token_b(), &desk), 394 + converted);
    assert_eq!(f.ledger.balance(&token_a(), &desk), 0);

    // shares the harvest watermark
    let err = f.executor.harvest(f.id).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::AlreadyHarvestedThisEpoch { .. }));
}

#[tokio::test]
async fn test_manual_fee_withdrawal_rejects_short_conversion() {
    let f = setup().await;
    f.executor.swap(f.id, &trader(), &router(), &token_a(), 3_000).await.unwrap();
    f.oracle.set_price(SqrtPriceX96::from_ratio(1, 4).unwrap());
    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);
    let desk = Principal::new("desk");
    let expected = pool_quote(&f, &token_a(), &token_b(), 212);

    // Someone else dumps A into the pool before the withdrawal lands
    let whale = Principal::new("whale");
    let dump: Amount = 9 * POOL_DEPTH;
    f.ledger.mint(&token_a(), &whale, dump);
    f.ledger.approve(&token_a(), &whale, &router(), dump).await.unwrap();
    f.venue
        .exact_input_swap(&SwapRequest {
            router: router(),
            asset_in: token_a(),
            asset_out: token_b(),
            fee_tier: 3_000,
            amount_in: dump,
            payer: whale.clone(),
            recipient: whale,
        })
        .await
        .unwrap();
    let realized = pool_quote(&f, &token_a(), &token_b(), 212);
    assert!(realized < expected);

    let err = f
        .executor
        .withdraw_fee(f.id, &trader(), 212, 394 + expected, &token_b(), &desk)
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        TreasuryError::SlippageExceeded { leg: Leg::B, minimum: expected, realized }
    );

    assert_eq!(reserves(&f).await, Reserves::new(7_000, 12_990));
    assert_eq!(f.ledger.balance(&token_a(), &account()), 7_000);
    assert_eq!(f.ledger.balance(&token_b(), &account()), 12_990);
    assert_eq!(f.ledger.balance(&token_b(), &desk), 0);
    assert!(f.executor.is_harvest_due(f.id).await.unwrap());

    // a caller willing to take the moved price still gets paid
    f.executor.withdraw_fee(f.id, &trader(), 212, 394, &token_b(), &desk).await.unwrap();
    assert_eq!(f.ledger.balance(&token_b(), &desk), 394 + realized);
}

// =============================================================================
// Scenario: trader rotated out of the fee asset
// =============================================================================

/// Treasury after the trader sold almost all of its B: (10000 + bought, 10)
async fn setup_rotated() -> (Fixture, Amount) {
    let f = setup().await;
    let bought = pool_quote(&f, &token_b(), &token_a(), 9_990);
    let receipt = f.executor.swap(f.id, &trader(), &router(), &token_b(), 9_990).await.unwrap();
    assert_eq!(receipt.treasury.reserves, Reserves::new(10_000 + bought, 10));
    (f, bought)
}

#[tokio::test]
async fn test_harvest_after_rotation_out_of_fee_asset() {
    let (f, bought) = setup_rotated().await;
    f.oracle.set_price(SqrtPriceX96::from_ratio(4, 1).unwrap());
    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);

    // Fee in B far exceeds the 10 B held, so both legs pay pro rata
    let held_a = 10_000 + bought;
    let nav_now = held_a * 4 + 10;
    let fee: Amount = (nav_now - (10_000 * 4 + 10_000)) * 20 / 100;
    assert!(fee > 10);
    let released_a = held_a * fee / nav_now;
    let released_b = 10 * fee / nav_now;
    let converted = pool_quote(&f, &token_a(), &token_b(), released_a);

    let receipt = f.executor.harvest(f.id).await.unwrap();
    assert_eq!(
        receipt.treasury.reserves,
        Reserves::new(held_a - released_a, 10 - released_b)
    );
    assert_eq!(f.ledger.balance(&token_b(), &trader()), released_b + converted);
    assert_eq!(f.ledger.balance(&token_a(), &trader()), 0);
    let types: Vec<_> = receipt.events.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["fee_harvested", "fee_converted"]);

    assert!(!f.executor.is_harvest_due(f.id).await.unwrap());
}

#[tokio::test]
async fn test_harvest_after_rotation_fulfils_pending_intent() {
    let f = setup().await;
    f.clock.set(T0 + 85 * DAY);
    f.executor.pre_inform(f.id, &partner(), 100, 5).await.unwrap();
    f.executor.swap(f.id, &trader(), &router(), &token_b(), 9_990).await.unwrap();
    f.oracle.set_price(SqrtPriceX96::from_ratio(4, 1).unwrap());

    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);
    let receipt = f.executor.harvest(f.id).await.unwrap();

    assert_eq!(receipt.treasury.pending, None);
    assert_eq!(receipt.treasury.reserves.b, 5);
    assert_eq!(f.ledger.balance(&token_a(), &partner()), 100);
    assert_eq!(f.ledger.balance(&token_b(), &partner()), 5);
    assert!(f.ledger.balance(&token_b(), &trader()) > 0);
    assert!(!f.executor.is_harvest_due(f.id).await.unwrap());
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_deposits_credit_each_asset_independently() {
    let f = setup_empty().await;
    fund(&f, &partner(), 1_000).await;

    let mut expected = Reserves::default();
    for (a, b) in [(0, 0), (5, 0), (0, 7), (123, 456)] {
        let receipt = f.executor.deposit(f.id, &partner(), a, b).await.unwrap();
        expected = Reserves::new(expected.a + a, expected.b + b);
        assert_eq!(receipt.treasury.reserves, expected);
    }
    assert_eq!(f.ledger.balance(&token_a(), &account()), 128);
    assert_eq!(f.ledger.balance(&token_b(), &account()), 463);
}

#[tokio::test]
async fn test_pre_inform_overwrites_inside_window() {
    let f = setup().await;
    for (day, a, b) in [(1, 100, 100), (30, 5, 0), (86, 0, 9)] {
        f.clock.set(T0 + day * DAY);
        let receipt = f.executor.pre_inform(f.id, &partner(), a, b).await.unwrap();
        assert_eq!(receipt.treasury.pending_amounts(), (a, b));
    }

    for day in [87, 88, 89] {
        f.clock.set(T0 + day * DAY);
        let err = f.executor.pre_inform(f.id, &partner(), 1, 1).await.unwrap_err();
        assert!(matches!(domain_err(err), TreasuryError::WindowClosed { .. }));
    }
    assert_eq!(f.executor.treasury(f.id).await.unwrap().pending_amounts(), (0, 9));
}

#[tokio::test]
async fn test_partial_withdrawals_reduce_pending() {
    let f = setup().await;
    f.clock.set(T0 + DAY);
    f.executor.pre_inform(f.id, &partner(), 100, 50).await.unwrap();
    f.clock.set(T0 + DEFAULT_EPOCH_DURATION + 1);

    let receipt = f.executor.withdraw(f.id, &partner(), 30, 50).await.unwrap();
    assert_eq!(receipt.treasury.pending_amounts(), (70, 0));
    assert_eq!(receipt.treasury.reserves, Reserves::new(9_970, 9_950));

    let receipt = f.executor.withdraw(f.id, &partner(), 70, 0).await.unwrap();
    assert_eq!(receipt.treasury.pending, None);
    assert_eq!(receipt.treasury.reserves, Reserves::new(9_900, 9_950));
}

#[tokio::test]
async fn test_swap_uses_venue_reported_output() {
    let f = setup().await;
    let receipt = f.executor.swap(f.id, &trader(), &router(), &token_a(), 3).await.unwrap();
    assert_eq!(receipt.treasury.reserves, Reserves::new(9_997, 10_001));

    let err = f.executor.swap(f.id, &partner(), &router(), &token_a(), 3).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_swap_failure_rolls_back() {
    let f = setup().await;
    f.venue.set_fail_next(true);

    let err = f.executor.swap(f.id, &trader(), &router(), &token_a(), 3_000).await.unwrap_err();
    assert!(matches!(err, ExecError::ExternalCall(_)));

    assert_eq!(reserves(&f).await, Reserves::new(10_000, 10_000));
    assert_eq!(f.ledger.allowance(&token_a(), &account(), &router()), 0);
    assert_eq!(f.ledger.balance(&token_a(), &account()), 10_000);
}

#[tokio::test]
async fn test_harvest_payout_failure_rolls_back() {
    let f = setup().await;
    f.executor.swap(f.id, &trader(), &router(), &token_a(), 3_000).await.unwrap();
    f.oracle.set_price(SqrtPriceX96::from_ratio(1, 4).unwrap());
    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);

    f.ledger.set_fail_next(true);
    assert!(f.executor.harvest(f.id).await.is_err());
    assert_eq!(reserves(&f).await, Reserves::new(7_000, 12_990));
    assert!(f.executor.is_harvest_due(f.id).await.unwrap());

    f.oracle.set_fail_next(true);
    assert!(matches!(f.executor.harvest(f.id).await, Err(ExecError::ExternalCall(_))));

    f.executor.harvest(f.id).await.unwrap();
}

#[tokio::test]
async fn test_initialization_rules() {
    let f = setup().await;
    let err = f.executor.initialize(f.id, params()).await.unwrap_err();
    assert_eq!(domain_err(err), TreasuryError::AlreadyInitialized);

    let template = Treasury::template(Principal::new("template"));
    f.executor.register(&template).await.unwrap();
    let err = f.executor.initialize(template.id, params()).await.unwrap_err();
    assert_eq!(domain_err(err), TreasuryError::NotInitializable);

    let err = f.executor.register(&template).await.unwrap_err();
    assert!(matches!(err, ExecError::Store(_)));
}

#[tokio::test]
async fn test_initialize_rejects_shared_principals() {
    let ledger = Arc::new(StubAssetLedger::new());
    let venue = Arc::new(StubVenue::new(ledger.clone(), Principal::new("pool"), 3_000));
    let oracle = Arc::new(StubOracle::new(SqrtPriceX96::from_ratio(1, 1).unwrap()));
    let executor = Executor::new(
        ledger,
        venue,
        oracle,
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(T0)),
    );
    let treasury = Treasury::provisioned(Uuid::now_v7(), account());
    executor.register(&treasury).await.unwrap();

    let alice = Principal::new("alice");
    let mut shared = params();
    shared.partner = alice.clone();
    shared.trader = alice.clone();
    let err = executor.initialize(treasury.id, shared).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::InvalidTerms(_)));

    // still initializable, and alice holds no role
    assert!(!executor.treasury(treasury.id).await.unwrap().is_initialized());
    let err = executor.swap(treasury.id, &alice, &router(), &token_a(), 1).await.unwrap_err();
    assert_eq!(domain_err(err), TreasuryError::NotInitialized);
}

#[tokio::test]
async fn test_sync_reserves_picks_up_donations() {
    let f = setup().await;
    f.ledger.mint(&token_b(), &account(), 25);

    let err = f.executor.sync_reserves(f.id, &trader()).await.unwrap_err();
    assert!(matches!(domain_err(err), TreasuryError::Unauthorized { .. }));

    let receipt = f.executor.sync_reserves(f.id, &owner()).await.unwrap();
    assert_eq!(receipt.treasury.reserves, Reserves::new(10_000, 10_025));
}

#[tokio::test]
async fn test_fee_recipient_receives_automatic_harvest() {
    let f = setup().await;
    let desk = Principal::new("desk");
    f.executor.set_fee_recipient(f.id, &trader(), desk.clone()).await.unwrap();
    f.executor.swap(f.id, &trader(), &router(), &token_a(), 3_000).await.unwrap();
    f.oracle.set_price(SqrtPriceX96::from_ratio(1, 4).unwrap());
    f.clock.set(T0 + DEFAULT_EPOCH_DURATION);

    f.executor.harvest(f.id).await.unwrap();
    assert_eq!(f.ledger.balance(&token_b(), &desk), 448);
    assert_eq!(f.ledger.balance(&token_b(), &trader()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_are_serialized() {
    let f = setup_empty().await;
    fund(&f, &partner(), 1_000).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let executor = f.executor.clone();
        let id = f.id;
        handles.push(tokio::spawn(async move {
            executor.deposit(id, &partner(), 10, 20).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(reserves(&f).await, Reserves::new(200, 400));
    assert_eq!(f.ledger.balance(&token_b(), &account()), 400);
    // initialized + 20 deposits
    assert_eq!(f.executor.events(f.id).await.unwrap().len(), 21);
    assert!(f.executor.clock().now() >= T0);
}
