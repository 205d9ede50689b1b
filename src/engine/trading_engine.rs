//! Trading Engine: the per-stream cooperative worker. Each instance owns one
//! `StreamConfig` and cycles fetch -> evaluate -> size -> place -> reconcile
//! -> record, suspending only at broker/persistence I/O and the poll wait.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, RwLock as AsyncRwLock};
use tracing::{error, info, warn};

use crate::domain::candle::{Candle, Granularity};
use crate::domain::equity::EquitySnapshot;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{BrokerClient, BrokerPosition, EquitySnapshotRepository, TradeRepository};
use crate::domain::signal::{Direction, EntrySignal, StrategyResult};
use crate::domain::stream_config::StreamConfig;
use crate::domain::trade::{ExitReason, RunMode, Trade};
use crate::engine::retry;
use crate::risk::sizing::size_position;
use crate::risk::trailing;
use crate::risk::DrawdownSupervisor;
use crate::session;
use crate::status::{EngineState, SignalHistoryEntry, StatusProjection};
use crate::strategies::{StrategyContext, TradingStrategy};

const FETCH_COUNT: usize = 200;

/// Broker-specific units a strategy's Decimal price levels must be converted
/// through to size a position. Supplied per instrument at engine construction
/// since the core has no broker-metadata lookup of its own.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentSpec {
    pub pip: Decimal,
    pub pip_value: Decimal,
    pub unit_step: Decimal,
}

impl InstrumentSpec {
    pub fn fx_default() -> Self {
        Self {
            pip: dec!(0.0001),
            pip_value: dec!(0.0001),
            unit_step: dec!(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Pause,
    Resume,
    Stop,
    EmergencyStop,
}

fn granularity_rank(g: Granularity) -> u8 {
    match g {
        Granularity::M1 => 0,
        Granularity::M5 => 1,
        Granularity::M15 => 2,
        Granularity::H1 => 3,
        Granularity::H4 => 4,
        Granularity::D1 => 5,
    }
}

fn finest(granularities: &[Granularity]) -> Option<Granularity> {
    granularities.iter().min_by_key(|g| granularity_rank(**g)).copied()
}

fn position_matches(position: &BrokerPosition, trade: &Trade) -> bool {
    position.instrument == trade.instrument
        && position.direction == trade.direction
        && position.avg_price == trade.entry_price
}

/// Decide what a vanished broker position was closed by, from the last
/// observed close and a one-pip tolerance against the stop/target levels.
fn attribute_exit(trade: &Trade, last_close: Decimal, pip: Decimal) -> (Decimal, ExitReason) {
    if (last_close - trade.take_profit).abs() <= pip {
        (trade.take_profit, ExitReason::TakeProfit)
    } else if (last_close - trade.stop_loss).abs() <= pip {
        (trade.stop_loss, ExitReason::StopLoss)
    } else {
        (last_close, ExitReason::Manual)
    }
}

fn compute_pnl(direction: Direction, entry: Decimal, exit: Decimal, units: Decimal) -> Decimal {
    match direction {
        Direction::Buy => (exit - entry) * units,
        Direction::Sell => (entry - exit) * units,
    }
}

pub struct TradingEngine {
    name: String,
    mode: RunMode,
    config: Arc<AsyncRwLock<StreamConfig>>,
    instrument: InstrumentSpec,
    broker: Arc<dyn BrokerClient>,
    strategy: Arc<dyn TradingStrategy>,
    trade_repo: Arc<dyn TradeRepository>,
    equity_repo: Arc<dyn EquitySnapshotRepository>,
    drawdown: DrawdownSupervisor,
    status: Arc<StatusProjection>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    state: EngineState,
    order_ids: HashMap<i64, String>,
    initial_stop_distances: HashMap<i64, Decimal>,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: RunMode,
        config: Arc<AsyncRwLock<StreamConfig>>,
        instrument: InstrumentSpec,
        broker: Arc<dyn BrokerClient>,
        strategy: Arc<dyn TradingStrategy>,
        trade_repo: Arc<dyn TradeRepository>,
        equity_repo: Arc<dyn EquitySnapshotRepository>,
        drawdown: DrawdownSupervisor,
        status: Arc<StatusProjection>,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        name: String,
    ) -> Self {
        Self {
            name,
            mode,
            config,
            instrument,
            broker,
            strategy,
            trade_repo,
            equity_repo,
            drawdown,
            status,
            cmd_rx,
            state: EngineState::Idle,
            order_ids: HashMap::new(),
            initial_stop_distances: HashMap::new(),
        }
    }

    /// Runs until `stop()`/`emergency_stop()` is observed. A cycle error
    /// never terminates the worker; only a control command does.
    pub async fn run(mut self) {
        self.state = EngineState::Polling;
        self.status.publish_state(&self.name, self.state, Utc::now()).await;

        loop {
            let poll_interval = self.config.read().await.poll_interval;
            let sleep = tokio::time::sleep(poll_interval);
            tokio::pin!(sleep);

            tokio::select! {
                _ = &mut sleep, if self.state == EngineState::Polling => {
                    self.run_cycle().await;
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_command(cmd).await;
                }
            }

            if self.state == EngineState::Stopped {
                break;
            }
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Pause => {
                self.state = EngineState::Paused;
                info!(stream = %self.name, "engine paused");
            }
            EngineCommand::Resume => {
                self.state = EngineState::Polling;
                info!(stream = %self.name, "engine resumed");
            }
            EngineCommand::Stop => {
                self.state = EngineState::Stopped;
                info!(stream = %self.name, "engine stopped");
            }
            EngineCommand::EmergencyStop => {
                self.flatten_all().await;
                self.state = EngineState::Stopped;
                warn!(stream = %self.name, "engine emergency-stopped, positions flattened");
            }
        }
        self.status.publish_state(&self.name, self.state, Utc::now()).await;
    }

    /// Closes every position this engine instance opened, via the broker's
    /// order ids it still holds. Positions opened by a prior process
    /// lifetime are outside this map and are left to reconcile normally.
    async fn flatten_all(&mut self) {
        let drained: Vec<(i64, String)> = self.order_ids.drain().collect();
        for (trade_id, order_id) in drained {
            match self.broker.close_order(&order_id).await {
                Ok(ack) => {
                    if let Ok(Some(trade)) = self.find_trade(trade_id).await {
                        let pnl = compute_pnl(trade.direction, trade.entry_price, ack.exit_price, trade.units);
                        if let Err(err) = self
                            .trade_repo
                            .close(trade_id, ack.exit_price, ExitReason::Manual, pnl, ack.close_time)
                            .await
                        {
                            error!(stream = %self.name, trade_id, error = %err, "failed to record emergency close");
                        }
                    }
                }
                Err(err) => {
                    error!(stream = %self.name, trade_id, error = %err, "failed to flatten position");
                }
            }
        }
        self.initial_stop_distances.clear();
    }

    async fn find_trade(&self, trade_id: i64) -> Result<Option<Trade>, crate::domain::errors::PersistenceError> {
        let open = self.trade_repo.find_open(&self.name).await?;
        Ok(open.into_iter().find(|t| t.id == trade_id))
    }

    async fn fetch_series(
        &self,
        config: &StreamConfig,
    ) -> Result<HashMap<Granularity, Vec<Candle>>, BrokerError> {
        let mut out = HashMap::new();
        for &granularity in &config.granularities {
            let instrument = config.instrument.clone();
            let mut series = retry::with_backoff(|| {
                self.broker.fetch_candles(&instrument, granularity, FETCH_COUNT)
            })
            .await?;
            series.pop();
            out.insert(granularity, series);
        }
        Ok(out)
    }

    async fn run_cycle(&mut self) {
        let config = self.config.read().await.clone();
        let now = Utc::now();

        if !session::admits(config.session, now) {
            self.status
                .publish_result(&self.name, SignalHistoryEntry::veto(now, "outside session window"), None)
                .await;
            self.finish_cycle(&config, now).await;
            return;
        }

        let candles = match self.fetch_series(&config).await {
            Ok(c) => c,
            Err(err) => {
                warn!(stream = %self.name, error = %err, "cycle aborted: candle fetch failed");
                self.finish_cycle(&config, now).await;
                return;
            }
        };

        self.state = EngineState::Evaluating;
        let last_close = finest(&config.granularities).and_then(|g| candles.get(&g)).and_then(|s| s.last()).map(|c| c.close);

        let ctx = StrategyContext {
            config: config.clone(),
            candles,
            evaluated_at: now,
        };
        let result = self.strategy.evaluate(&ctx);

        match result {
            StrategyResult::Veto { reason, diagnostics } => {
                self.status
                    .publish_result(&self.name, SignalHistoryEntry::veto(now, reason), Some(diagnostics))
                    .await;
                self.state = EngineState::Polling;
            }
            StrategyResult::Signal(signal) => {
                self.handle_signal(&config, signal, now).await;
            }
        }

        self.reconcile(&config, now, last_close).await;
        self.apply_trailing(&config, now, last_close).await;
        self.record_equity_snapshot(&config, now).await;
        self.finish_cycle(&config, now).await;
    }

    async fn finish_cycle(&mut self, _config: &StreamConfig, now: DateTime<Utc>) {
        if self.state != EngineState::Stopped && self.state != EngineState::Paused {
            self.state = EngineState::Polling;
        }
        self.status.publish_state(&self.name, self.state, now).await;
    }

    async fn handle_signal(&mut self, config: &StreamConfig, signal: EntrySignal, now: DateTime<Utc>) {
        self.state = EngineState::Sizing;

        if self.drawdown.breaker_active().await {
            self.status
                .publish_result(&self.name, SignalHistoryEntry::veto(now, "circuit breaker active"), None)
                .await;
            self.state = EngineState::Polling;
            return;
        }

        let open_trades = match self.trade_repo.find_open(&self.name).await {
            Ok(trades) => trades,
            Err(err) => {
                error!(stream = %self.name, error = %err, "failed to read open trades");
                self.state = EngineState::Polling;
                return;
            }
        };
        if open_trades.len() as u32 >= config.max_concurrent_positions {
            self.status
                .publish_result(&self.name, SignalHistoryEntry::veto(now, "max concurrent positions reached"), None)
                .await;
            self.state = EngineState::Polling;
            return;
        }

        let account = match retry::with_backoff(|| self.broker.get_account()).await {
            Ok(account) => account,
            Err(err) => {
                warn!(stream = %self.name, error = %err, "cycle aborted: account fetch failed");
                self.state = EngineState::Polling;
                return;
            }
        };

        let units = match size_position(
            account.equity,
            config.risk_percent_per_trade,
            signal.entry_price,
            signal.stop_loss,
            self.instrument.pip,
            self.instrument.pip_value,
            self.instrument.unit_step,
        ) {
            Ok(units) => units,
            Err(veto) => {
                self.status
                    .publish_result(&self.name, SignalHistoryEntry::veto(now, veto.to_string()), None)
                    .await;
                self.state = EngineState::Polling;
                return;
            }
        };

        self.state = EngineState::Placing;
        let units_signed = match signal.direction {
            Direction::Buy => units,
            Direction::Sell => -units,
        };

        let instrument = config.instrument.clone();
        let stop_loss = signal.stop_loss;
        let take_profit = signal.take_profit;
        match retry::with_backoff(|| self.broker.place_order(&instrument, units_signed, stop_loss, take_profit)).await {
            Ok(ack) => {
                let trade = Trade::open(
                    0,
                    self.name.clone(),
                    self.mode,
                    signal.direction,
                    config.instrument.clone(),
                    ack.fill_price,
                    signal.stop_loss,
                    signal.take_profit,
                    units,
                    signal.zone.as_ref().map(|z| z.level),
                    signal.zone.as_ref().map(|z| z.role),
                    signal.reason.clone(),
                    ack.open_time,
                );
                match self.trade_repo.insert_open(&trade).await {
                    Ok(id) => {
                        self.order_ids.insert(id, ack.order_id);
                        self.initial_stop_distances
                            .insert(id, (signal.entry_price - signal.stop_loss).abs());
                        self.status
                            .publish_result(&self.name, SignalHistoryEntry::signal(now, signal.reason.clone()), None)
                            .await;
                        self.state = EngineState::OrderOpen;
                        info!(stream = %self.name, trade_id = id, direction = %signal.direction, "order placed");
                    }
                    Err(err) => {
                        error!(stream = %self.name, error = %err, "failed to persist opened trade");
                        self.state = EngineState::Polling;
                    }
                }
            }
            Err(err) if err.is_transient() => {
                warn!(stream = %self.name, error = %err, "order placement failed, retryable");
                self.state = EngineState::Polling;
            }
            Err(err) => {
                warn!(stream = %self.name, error = %err, "order placement failed");
                self.state = EngineState::Polling;
            }
        }
    }

    /// The broker is the source of truth. Trade rows with no matching open
    /// broker position are closed locally, with exit price and reason
    /// attributed from the last observed close within one pip of a level.
    async fn reconcile(&mut self, config: &StreamConfig, now: DateTime<Utc>, last_close: Option<Decimal>) {
        let open_trades = match self.trade_repo.find_open(&self.name).await {
            Ok(trades) => trades,
            Err(err) => {
                error!(stream = %self.name, error = %err, "reconcile: failed to read open trades");
                return;
            }
        };
        if open_trades.is_empty() {
            return;
        }

        let positions = match self.broker.get_positions().await {
            Ok(positions) => positions,
            Err(err) => {
                warn!(stream = %self.name, error = %err, "reconcile: failed to read broker positions");
                return;
            }
        };

        for trade in &open_trades {
            if positions.iter().any(|p| position_matches(p, trade)) {
                continue;
            }

            let (exit_price, exit_reason) = match last_close {
                Some(close) => attribute_exit(trade, close, self.instrument.pip),
                None => (trade.take_profit, ExitReason::Manual),
            };
            let pnl = compute_pnl(trade.direction, trade.entry_price, exit_price, trade.units);

            if let Err(err) = self
                .trade_repo
                .close(trade.id, exit_price, exit_reason, pnl, now)
                .await
            {
                error!(stream = %self.name, trade_id = trade.id, error = %err, "reconcile: failed to close trade");
                continue;
            }
            self.order_ids.remove(&trade.id);
            self.initial_stop_distances.remove(&trade.id);
            info!(stream = %self.name, trade_id = trade.id, reason = %exit_reason, "trade closed on reconcile");
        }

        let _ = config;
    }

    /// Trails the stop for trades this engine instance opened. Positions
    /// carried over from a previous process are outside `order_ids` and are
    /// left at their broker-side stop until this process opened them.
    async fn apply_trailing(&mut self, _config: &StreamConfig, _now: DateTime<Utc>, last_close: Option<Decimal>) {
        let Some(current_price) = last_close else { return };
        if self.order_ids.is_empty() {
            return;
        }

        let open_trades = match self.trade_repo.find_open(&self.name).await {
            Ok(trades) => trades,
            Err(_) => return,
        };
        let positions = match self.broker.get_positions().await {
            Ok(positions) => positions,
            Err(_) => return,
        };

        for trade in &open_trades {
            let Some(order_id) = self.order_ids.get(&trade.id).cloned() else { continue };
            let Some(position) = positions.iter().find(|p| position_matches(p, trade)) else { continue };
            let current_stop = position.stop.unwrap_or(trade.stop_loss);
            let initial_distance = *self
                .initial_stop_distances
                .entry(trade.id)
                .or_insert_with(|| (trade.entry_price - trade.stop_loss).abs());

            let new_stop = trailing::advance(trade.direction, trade.entry_price, initial_distance, current_stop, current_price);
            if new_stop != current_stop {
                if let Err(err) = self.broker.modify_order(&order_id, new_stop).await {
                    warn!(stream = %self.name, trade_id = trade.id, error = %err, "failed to update trailing stop");
                }
            }
        }
    }

    async fn record_equity_snapshot(&mut self, _config: &StreamConfig, now: DateTime<Utc>) {
        let account = match self.broker.get_account().await {
            Ok(account) => account,
            Err(err) => {
                warn!(stream = %self.name, error = %err, "failed to read account for equity snapshot");
                return;
            }
        };

        self.drawdown.record_equity(account.equity, account.open_position_count).await;
        let peak_equity = self.drawdown.peak_equity().await;
        let drawdown_pct = if peak_equity.is_zero() {
            Decimal::ZERO
        } else {
            (peak_equity - account.equity) / peak_equity * Decimal::from(100)
        };

        let snapshot = EquitySnapshot {
            mode: self.mode,
            equity: account.equity,
            balance: account.balance,
            peak_equity,
            drawdown_pct,
            open_position_count: account.open_position_count,
            recorded_at: now,
        };
        if let Err(err) = self.equity_repo.append(&snapshot).await {
            error!(stream = %self.name, error = %err, "failed to persist equity snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream_config::SessionWindow;
    use crate::domain::trade::TradeStatus;
    use crate::testing::{InMemoryEquitySnapshotRepository, InMemoryTradeRepository, MockBroker};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn candle(close: f64, idx: i64) -> Candle {
        Candle {
            instrument: "EUR_USD".to_string(),
            granularity: Granularity::M5,
            timestamp: Utc.timestamp_opt(idx * 300, 0).unwrap(),
            open: Decimal::from_f64_retain(close).unwrap(),
            high: Decimal::from_f64_retain(close + 0.0005).unwrap(),
            low: Decimal::from_f64_retain(close - 0.0005).unwrap(),
            close: Decimal::from_f64_retain(close).unwrap(),
            volume: dec!(1000),
        }
    }

    struct NullStrategy;
    impl TradingStrategy for NullStrategy {
        fn id(&self) -> &'static str {
            "null"
        }
        fn gates(&self) -> &'static [&'static str] {
            &[]
        }
        fn evaluate(&self, _ctx: &StrategyContext) -> StrategyResult {
            StrategyResult::veto("no-op strategy", Default::default())
        }
    }

    fn test_config() -> StreamConfig {
        StreamConfig {
            name: "eur_usd_test".to_string(),
            instrument: "EUR_USD".to_string(),
            strategy_id: "null".to_string(),
            granularities: vec![Granularity::M5],
            poll_interval: Duration::from_millis(10),
            risk_percent_per_trade: dec!(1),
            max_concurrent_positions: 1,
            target_rr: None,
            session: SessionWindow::all_day(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn a_full_cycle_with_a_vetoing_strategy_records_a_veto_and_an_equity_snapshot() {
        let config = test_config();
        let broker = Arc::new(
            MockBroker::new(dec!(10000)).with_candles("EUR_USD", Granularity::M5, (0..10).map(|i| candle(1.1000, i)).collect()),
        );
        let trade_repo = Arc::new(InMemoryTradeRepository::default());
        let equity_repo = Arc::new(InMemoryEquitySnapshotRepository::default());
        let status = Arc::new(StatusProjection::new());
        let drawdown = DrawdownSupervisor::new(dec!(10000), dec!(10));
        let (_tx, rx) = mpsc::channel(4);

        let mut engine = TradingEngine::new(
            RunMode::Paper,
            Arc::new(AsyncRwLock::new(config)),
            InstrumentSpec::fx_default(),
            broker,
            Arc::new(NullStrategy),
            trade_repo,
            equity_repo.clone(),
            drawdown,
            status.clone(),
            rx,
            "eur_usd_test".to_string(),
        );

        engine.run_cycle().await;

        let snapshots = equity_repo.recent(10).await.unwrap();
        assert_eq!(snapshots.len(), 1);

        let history = status.history("eur_usd_test", 10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, "veto");
    }

    #[tokio::test]
    async fn reconcile_closes_a_trade_no_longer_present_at_the_broker() {
        let config = test_config();
        let broker = Arc::new(MockBroker::new(dec!(10000)));
        let trade_repo = Arc::new(InMemoryTradeRepository::default());
        let equity_repo = Arc::new(InMemoryEquitySnapshotRepository::default());
        let status = Arc::new(StatusProjection::new());
        let drawdown = DrawdownSupervisor::new(dec!(10000), dec!(10));
        let (_tx, rx) = mpsc::channel(4);

        let trade = Trade::open(
            0,
            "eur_usd_test".to_string(),
            RunMode::Paper,
            Direction::Buy,
            "EUR_USD".to_string(),
            dec!(1.10000),
            dec!(1.09800),
            dec!(1.10400),
            dec!(1000),
            None,
            None,
            "test".to_string(),
            Utc::now(),
        );
        let id = trade_repo.insert_open(&trade).await.unwrap();

        let mut engine = TradingEngine::new(
            RunMode::Paper,
            Arc::new(AsyncRwLock::new(config.clone())),
            InstrumentSpec::fx_default(),
            broker,
            Arc::new(NullStrategy),
            trade_repo.clone(),
            equity_repo,
            drawdown,
            status,
            rx,
            "eur_usd_test".to_string(),
        );

        engine.reconcile(&config, Utc::now(), Some(dec!(1.10405))).await;

        let open = trade_repo.find_open("eur_usd_test").await.unwrap();
        assert!(open.is_empty());
        let closed = trade_repo.find_recent_closed(10).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, id);
        assert_eq!(closed[0].status, TradeStatus::Closed);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::TakeProfit));
    }
}
