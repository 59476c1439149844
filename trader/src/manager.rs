//! `MarketEngineManager`: owns one worker thread per market, wiring together the engine,
//! strategy, queues and startup recovery built elsewhere in this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use tradebot_account::{AccountManager, MarketBudget};
use tradebot_core::config::{AccountConfig, EngineConfig, MarketManagerConfig, RecoveryConfig};
use tradebot_core::config::StrategyConfig;
use tradebot_core::{BotError, Candle, Market, RestError};
use tradebot_engine::{EngineEvent, MarketEngine, OrderApi, OrderStore, SharedOrderApi};
use tradebot_strategies::{
    bot_prefix, AccountSnapshot, FillEvent, OrderStatusEvent, RsiMeanReversionStrategy, StrategyParams,
};

use crate::mapper::MessageMapper;
use crate::queues::{private_order_channel, MarketDataQueue, PrivateOrderQueue};
use crate::router::EventRouter;

const PRIVATE_QUEUE_POLL: Duration = Duration::from_millis(50);

/// Everything one market's worker thread owns exclusively once spawned.
struct WorkerContext {
    market: Market,
    market_data_queue: Arc<MarketDataQueue>,
    private_order_queue: PrivateOrderQueue,
    engine: MarketEngine,
    strategy: RsiMeanReversionStrategy,
    account: AccountManager,
    mapper: Arc<dyn MessageMapper>,
    stop: Arc<AtomicBool>,
    /// The bar currently being built; only a newer, distinct-timestamp candle finalizes it.
    pending_candle: Option<Candle>,
}

/// Builds and runs the per-market worker pool. Construction performs the initial account
/// sync and startup recovery; `start`/`stop` control the worker threads and are both
/// idempotent.
pub struct MarketEngineManager {
    contexts: Mutex<Vec<WorkerContext>>,
    private_order_senders: Vec<(Market, Sender<String>)>,
    stop_flags: Vec<Arc<AtomicBool>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for MarketEngineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketEngineManager")
            .field("markets", &self.stop_flags.len())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

#[allow(clippy::too_many_arguments)]
impl MarketEngineManager {
    /// Builds one worker context per market: fetches the account (failing construction if
    /// it cannot, per §7), runs startup recovery for each market (logged, non-fatal), then
    /// re-syncs the ledger against a fresh account snapshot on a best-effort basis.
    pub fn new(
        markets: Vec<Market>,
        strategy_id: impl Into<String>,
        strategy_params: StrategyParams,
        strategy_config: StrategyConfig,
        engine_config: EngineConfig,
        account_config: AccountConfig,
        manager_config: MarketManagerConfig,
        recovery_config: RecoveryConfig,
        api_client: Box<dyn OrderApi>,
        mapper: Arc<dyn MessageMapper>,
    ) -> Result<Self, BotError> {
        let strategy_id = strategy_id.into();
        let mut seen = HashSet::new();
        let markets: Vec<Market> = markets.into_iter().filter(|m| seen.insert(m.clone())).collect();

        let api = Arc::new(SharedOrderApi::new(api_client));
        let account_snapshot = fetch_account_with_retry(&api, manager_config.sync_retry)
            .map_err(|e| BotError::Construction(format!("initial account sync failed: {e}")))?;

        let account = AccountManager::new(&markets, &account_snapshot, account_config);
        let recovery = crate::recovery::StartupRecovery::new(recovery_config);

        let mut contexts = Vec::with_capacity(markets.len());
        let mut stop_flags = Vec::with_capacity(markets.len());
        let mut private_order_senders = Vec::with_capacity(markets.len());

        for market in &markets {
            let store = Arc::new(OrderStore::default());
            let mut engine = MarketEngine::new(
                market.clone(),
                Arc::clone(&api),
                store,
                account.clone(),
                engine_config,
            );

            let mut strategy = RsiMeanReversionStrategy::new(
                strategy_id.clone(),
                market.clone(),
                strategy_params,
                strategy_config,
            );

            let prefix = bot_prefix(&strategy_id, market);
            recovery.run(&mut engine, &mut strategy, &api, market, &account_snapshot, &prefix);

            let stop = Arc::new(AtomicBool::new(false));
            stop_flags.push(Arc::clone(&stop));

            let (tx, private_order_queue) = private_order_channel();
            private_order_senders.push((market.clone(), tx));
            contexts.push(WorkerContext {
                market: market.clone(),
                market_data_queue: Arc::new(MarketDataQueue::new(manager_config.queue_capacity)),
                private_order_queue,
                engine,
                strategy,
                account: account.clone(),
                mapper: Arc::clone(&mapper),
                stop,
                pending_candle: None,
            });
        }

        match fetch_account_with_retry(&api, manager_config.sync_retry) {
            Ok(fresh) => account.sync_with_account(&fresh),
            Err(err) => warn!(error = %err, "post-recovery account re-sync failed, continuing with construction-time snapshot"),
        }

        Ok(Self {
            contexts: Mutex::new(contexts),
            private_order_senders,
            stop_flags,
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Registers every market's queues with `router` so incoming feed traffic reaches the
    /// right worker. Must run before `start`.
    pub fn register_with(&self, router: &mut EventRouter) {
        let contexts = self.contexts.lock();
        for ctx in contexts.iter() {
            router.register_market_data(ctx.market.clone(), Arc::clone(&ctx.market_data_queue));
        }
        for (market, sender) in &self.private_order_senders {
            router.register_private_order(market.clone(), sender.clone());
        }
    }

    /// Spawns one worker thread per market. Idempotent: a second call is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let contexts = std::mem::take(&mut *self.contexts.lock());
        let mut handles = self.handles.lock();
        for ctx in contexts {
            let market = ctx.market.clone();
            let handle = thread::Builder::new()
                .name(format!("worker-{market}"))
                .spawn(move || worker_loop(ctx))
                .expect("failed to spawn market worker thread");
            handles.push(handle);
        }
    }

    /// Signals every worker to stop and joins its thread. Idempotent; safe to call even if
    /// `start` was never called.
    pub fn stop(&self) {
        for flag in &self.stop_flags {
            flag.store(true, Ordering::SeqCst);
        }
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            if let Err(err) = handle.join() {
                error!(?err, "market worker thread panicked");
            }
        }
    }
}

impl Drop for MarketEngineManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reusable bounded-retry wrapper used both for the fail-fast construction-time sync and
/// the best-effort post-recovery resync; callers decide what to do with the `Result`.
fn fetch_account_with_retry(api: &SharedOrderApi, retries: u32) -> Result<tradebot_core::Account, RestError> {
    let attempts = retries.max(1);
    let mut last_err = RestError::Unknown;
    for attempt in 0..attempts {
        match api.get_my_account() {
            Ok(account) => return Ok(account),
            Err(err) => {
                last_err = err;
                if attempt + 1 < attempts {
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }
    Err(last_err)
}

fn account_snapshot_for(account: &AccountManager, market: &str) -> AccountSnapshot {
    let budget = account
        .get_budget(market)
        .unwrap_or_else(|| MarketBudget::flat(market));
    AccountSnapshot {
        krw_available: budget.available_krw,
        coin_available: budget.coin_balance,
    }
}

fn drain_engine_events(ctx: &mut WorkerContext) {
    for event in ctx.engine.poll_events() {
        match event {
            EngineEvent::Fill(f) => ctx.strategy.on_fill(&FillEvent {
                identifier: f.identifier,
                order_id: f.order_id,
                trade_id: f.trade_id,
                position: f.position,
                fill_price: f.fill_price,
                filled_volume: f.filled_volume,
            }),
            EngineEvent::Status(s) => ctx.strategy.on_order_update(&OrderStatusEvent {
                identifier: s.identifier,
                order_id: s.order_id,
                status: s.status,
                position: s.position,
                executed_volume: s.executed_volume,
                remaining_volume: s.remaining_volume,
            }),
        }
    }
}

/// Applies the bar-boundary rule from §4.8: an incoming candle either starts a new pending
/// bar, overwrites the in-progress one (same timestamp), or — on a distinct, newer
/// timestamp — finalizes the old pending bar and returns it for dispatch to the strategy.
fn apply_bar_boundary(ctx: &mut WorkerContext, candle: Candle) -> Option<Candle> {
    match ctx.pending_candle.take() {
        None => {
            ctx.pending_candle = Some(candle);
            None
        }
        Some(pending) if pending.start_timestamp == candle.start_timestamp => {
            ctx.pending_candle = Some(candle);
            None
        }
        Some(pending) => {
            ctx.pending_candle = Some(candle);
            Some(pending)
        }
    }
}

fn handle_market_data_message(ctx: &mut WorkerContext, raw: &str) {
    match ctx.mapper.map_market_data(raw) {
        Ok(Some(candle)) => {
            let Some(finalized) = apply_bar_boundary(ctx, candle) else {
                return;
            };
            let snapshot = account_snapshot_for(&ctx.account, &ctx.market);
            if let Some(decision) = ctx.strategy.on_candle(&finalized, &snapshot) {
                if let Some(order) = decision.order {
                    if let Err(err) = ctx.engine.submit(&order) {
                        warn!(market = %ctx.market, error = %err, "order submission failed");
                        ctx.strategy.on_submit_failed();
                    }
                }
            }
        }
        Ok(None) => {}
        Err(err) => warn!(market = %ctx.market, error = %err, "failed to map market data message"),
    }
}

fn handle_my_order_message(ctx: &mut WorkerContext, raw: &str) {
    match ctx.mapper.map_my_order(raw) {
        Ok((order, trade)) => {
            ctx.engine.on_order_snapshot(order);
            if let Some(trade) = trade {
                ctx.engine.on_my_trade(&trade);
            }
        }
        Err(err) => warn!(market = %ctx.market, error = %err, "failed to map private order message"),
    }
}

/// The worker's run loop: binds the engine to this thread, drains both queues every
/// iteration, and keeps going even when a single message fails to handle.
fn worker_loop(mut ctx: WorkerContext) {
    ctx.engine.bind_to_current_thread();
    info!(market = %ctx.market, "worker started");
    while !ctx.stop.load(Ordering::Relaxed) {
        if let Some(raw) = ctx.market_data_queue.pop_timeout(Duration::from_millis(0)) {
            handle_market_data_message(&mut ctx, &raw);
        }
        if let Some(raw) = ctx.private_order_queue.pop_timeout(PRIVATE_QUEUE_POLL) {
            handle_my_order_message(&mut ctx, &raw);
        }
        drain_engine_events(&mut ctx);
    }
    info!(market = %ctx.market, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradebot_core::{Account, Candle, MyTrade, OrderId, Position};
    use tradebot_engine::OrderApi as _;

    struct StubApi {
        account: Account,
    }
    impl OrderApi for StubApi {
        fn get_my_account(&mut self) -> Result<Account, RestError> {
            Ok(self.account.clone())
        }
        fn get_open_orders(&mut self, _market: &str) -> Result<Vec<tradebot_core::Order>, RestError> {
            Ok(vec![])
        }
        fn cancel_order(&mut self, _order_id: Option<&str>, _identifier: Option<&str>) -> Result<bool, RestError> {
            Ok(true)
        }
        fn post_order(&mut self, _request: &tradebot_core::OrderRequest) -> Result<OrderId, RestError> {
            Ok("U1".into())
        }
    }

    struct StubMapper;
    impl MessageMapper for StubMapper {
        fn map_my_order(&self, _raw: &str) -> Result<(tradebot_core::Order, Option<MyTrade>), BotError> {
            Err(BotError::Construction("unused in this test".into()))
        }
        fn map_market_data(&self, raw: &str) -> Result<Option<Candle>, BotError> {
            Ok(Some(Candle::new(raw.to_string(), 1.0, 1.0, 1.0, 1.0, 1.0, "t0")))
        }
    }

    fn krw(free: f64) -> Position {
        Position {
            currency: "KRW".into(),
            free,
            avg_buy_price: 0.0,
            unit_currency: "KRW".into(),
        }
    }

    #[test]
    fn construction_builds_one_context_per_deduplicated_market() {
        let account = Account {
            id: "a".into(),
            positions: vec![krw(1_000_000.0)],
        };
        let api: Box<dyn OrderApi> = Box::new(StubApi { account });
        let mgr = MarketEngineManager::new(
            vec!["KRW-BTC".to_string(), "KRW-BTC".to_string(), "KRW-ETH".to_string()],
            "strat",
            StrategyParams {
                rsi_length: 14,
                oversold: 30.0,
                overbought: 70.0,
                trend_look_window: 5,
                max_trend_strength: 1.0,
                volatility_window: 10,
                min_volatility: 0.0,
                risk_percent: 10.0,
                stop_loss_pct: 2.0,
                profit_target_pct: 4.0,
            },
            StrategyConfig::default(),
            EngineConfig::default(),
            AccountConfig::default(),
            MarketManagerConfig::default(),
            RecoveryConfig::default(),
            api,
            Arc::new(StubMapper),
        )
        .expect("construction should succeed");

        assert_eq!(mgr.contexts.lock().len(), 2);
        assert_eq!(mgr.stop_flags.len(), 2);
    }

    #[test]
    fn start_then_stop_is_idempotent_and_joins_threads() {
        let account = Account {
            id: "a".into(),
            positions: vec![krw(1_000_000.0)],
        };
        let api: Box<dyn OrderApi> = Box::new(StubApi { account });
        let mgr = MarketEngineManager::new(
            vec!["KRW-BTC".to_string()],
            "strat",
            StrategyParams {
                rsi_length: 14,
                oversold: 30.0,
                overbought: 70.0,
                trend_look_window: 5,
                max_trend_strength: 1.0,
                volatility_window: 10,
                min_volatility: 0.0,
                risk_percent: 10.0,
                stop_loss_pct: 2.0,
                profit_target_pct: 4.0,
            },
            StrategyConfig::default(),
            EngineConfig::default(),
            AccountConfig::default(),
            MarketManagerConfig::default(),
            RecoveryConfig::default(),
            api,
            Arc::new(StubMapper),
        )
        .unwrap();

        mgr.start();
        mgr.start();
        mgr.stop();
        mgr.stop();
    }

    fn bare_context(market: &str) -> WorkerContext {
        let account = AccountManager::new(
            &[market.to_string()],
            &Account { id: "a".into(), positions: vec![krw(1_000_000.0)] },
            AccountConfig::default(),
        );
        let api: Arc<SharedOrderApi> = Arc::new(SharedOrderApi::new(Box::new(StubApi {
            account: Account { id: "a".into(), positions: vec![] },
        })));
        let mut engine = MarketEngine::new(
            market.to_string(),
            Arc::clone(&api),
            Arc::new(OrderStore::default()),
            account.clone(),
            EngineConfig::default(),
        );
        engine.bind_to_current_thread();
        let (_tx, private_order_queue) = private_order_channel();
        WorkerContext {
            market: market.to_string(),
            market_data_queue: Arc::new(MarketDataQueue::new(10)),
            private_order_queue,
            engine,
            strategy: RsiMeanReversionStrategy::new(
                "strat",
                market.to_string(),
                StrategyParams {
                    rsi_length: 2,
                    oversold: 30.0,
                    overbought: 70.0,
                    trend_look_window: 1,
                    max_trend_strength: 1.0,
                    volatility_window: 2,
                    min_volatility: 0.0,
                    risk_percent: 10.0,
                    stop_loss_pct: 2.0,
                    profit_target_pct: 4.0,
                },
                StrategyConfig::default(),
            ),
            account,
            mapper: Arc::new(StubMapper),
            stop: Arc::new(AtomicBool::new(false)),
            pending_candle: None,
        }
    }

    #[test]
    fn bar_boundary_withholds_same_timestamp_updates() {
        let mut ctx = bare_context("KRW-BTC");
        let c1 = Candle::new("KRW-BTC", 1.0, 1.0, 1.0, 1.0, 1.0, "t1");
        assert!(apply_bar_boundary(&mut ctx, c1.clone()).is_none());

        let c1_update = Candle::new("KRW-BTC", 1.0, 2.0, 1.0, 1.5, 2.0, "t1");
        assert!(apply_bar_boundary(&mut ctx, c1_update.clone()).is_none());
        assert_eq!(ctx.pending_candle.as_ref().unwrap().close_price, 1.5);
    }

    #[test]
    fn bar_boundary_finalizes_previous_bar_on_new_timestamp() {
        let mut ctx = bare_context("KRW-BTC");
        let c1 = Candle::new("KRW-BTC", 1.0, 1.0, 1.0, 1.0, 1.0, "t1");
        apply_bar_boundary(&mut ctx, c1.clone());

        let c2 = Candle::new("KRW-BTC", 2.0, 2.0, 2.0, 2.0, 1.0, "t2");
        let finalized = apply_bar_boundary(&mut ctx, c2).unwrap();
        assert_eq!(finalized.start_timestamp, "t1");
        assert_eq!(ctx.pending_candle.as_ref().unwrap().start_timestamp, "t2");
    }
}
