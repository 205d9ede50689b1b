//! Engine Manager: owns one `TradingEngine` per enabled stream and exposes
//! the fleet-level control surface the Status API drives.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;
use tracing::error;

use crate::domain::ports::{BrokerClient, EquitySnapshotRepository, TradeRepository};
use crate::domain::stream_config::{StreamConfig, StreamConfigSet};
use crate::domain::trade::RunMode;
use crate::engine::trading_engine::{EngineCommand, InstrumentSpec, TradingEngine};
use crate::risk::DrawdownSupervisor;
use crate::status::{StatusProjection, StreamStatus};
use crate::strategies::StrategyFactory;

const COMMAND_CHANNEL_CAPACITY: usize = 16;

pub struct EngineManager {
    mode: RunMode,
    broker: Arc<dyn BrokerClient>,
    trade_repo: Arc<dyn TradeRepository>,
    equity_repo: Arc<dyn EquitySnapshotRepository>,
    drawdown: DrawdownSupervisor,
    status: Arc<StatusProjection>,
    cmd_txs: HashMap<String, mpsc::Sender<EngineCommand>>,
    configs: HashMap<String, Arc<AsyncRwLock<StreamConfig>>>,
    handles: HashMap<String, JoinHandle<()>>,
}

impl EngineManager {
    pub fn new(
        mode: RunMode,
        broker: Arc<dyn BrokerClient>,
        trade_repo: Arc<dyn TradeRepository>,
        equity_repo: Arc<dyn EquitySnapshotRepository>,
        drawdown: DrawdownSupervisor,
        status: Arc<StatusProjection>,
    ) -> Self {
        Self {
            mode,
            broker,
            trade_repo,
            equity_repo,
            drawdown,
            status,
            cmd_txs: HashMap::new(),
            configs: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    /// Spawns one cooperative worker per enabled stream. A stream whose
    /// `strategy_id` has no registered factory entry is skipped and logged —
    /// boot-time validation of `StreamConfigSet` should have already caught
    /// this, so reaching it here is itself worth a loud log line.
    pub fn start_all(&mut self, streams: &StreamConfigSet, instrument_specs: &HashMap<String, InstrumentSpec>) {
        for stream in &streams.streams {
            if !stream.enabled {
                continue;
            }
            let Some(strategy) = StrategyFactory::create(&stream.strategy_id) else {
                error!(stream = %stream.name, strategy_id = %stream.strategy_id, "unregistered strategy id at spawn time");
                continue;
            };
            let instrument_spec = instrument_specs
                .get(&stream.instrument)
                .copied()
                .unwrap_or_else(InstrumentSpec::fx_default);

            let config = Arc::new(AsyncRwLock::new(stream.clone()));
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

            let engine = TradingEngine::new(
                self.mode,
                config.clone(),
                instrument_spec,
                self.broker.clone(),
                strategy,
                self.trade_repo.clone(),
                self.equity_repo.clone(),
                self.drawdown.clone(),
                self.status.clone(),
                rx,
                stream.name.clone(),
            );
            let handle = tokio::spawn(engine.run());

            self.cmd_txs.insert(stream.name.clone(), tx);
            self.configs.insert(stream.name.clone(), config);
            self.handles.insert(stream.name.clone(), handle);
        }
    }

    pub async fn pause(&self, name: &str) -> bool {
        self.send(name, EngineCommand::Pause).await
    }

    pub async fn resume(&self, name: &str) -> bool {
        self.send(name, EngineCommand::Resume).await
    }

    pub async fn pause_all(&self) {
        self.broadcast(EngineCommand::Pause).await;
    }

    pub async fn resume_all(&self) {
        self.broadcast(EngineCommand::Resume).await;
    }

    /// Signals every worker's cancel channel, then waits for each to finish
    /// its in-flight cycle and transition to `Stopped`.
    pub async fn stop_all(&mut self) {
        self.broadcast(EngineCommand::Stop).await;
        self.join_all().await;
    }

    /// Like `stop_all`, but each worker additionally flattens the positions
    /// it opened this process lifetime before transitioning.
    pub async fn emergency_stop(&mut self) {
        self.broadcast(EngineCommand::EmergencyStop).await;
        self.join_all().await;
    }

    /// Replaces a stream's configuration snapshot. Takes effect at the
    /// affected engine's next cycle boundary; an in-flight cycle finishes
    /// under the configuration it started with.
    pub async fn apply_settings(&self, settings: StreamConfig) -> bool {
        match self.configs.get(&settings.name) {
            Some(config) => {
                *config.write().await = settings;
                true
            }
            None => false,
        }
    }

    pub async fn snapshot(&self) -> Vec<StreamStatus> {
        self.status.snapshot().await
    }

    async fn send(&self, name: &str, cmd: EngineCommand) -> bool {
        match self.cmd_txs.get(name) {
            Some(tx) => tx.send(cmd).await.is_ok(),
            None => false,
        }
    }

    async fn broadcast(&self, cmd: EngineCommand) {
        for tx in self.cmd_txs.values() {
            let _ = tx.send(cmd).await;
        }
    }

    async fn join_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Granularity;
    use crate::domain::stream_config::SessionWindow;
    use crate::testing::{InMemoryEquitySnapshotRepository, InMemoryTradeRepository, MockBroker};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn one_stream(name: &str) -> StreamConfigSet {
        StreamConfigSet {
            streams: vec![StreamConfig {
                name: name.to_string(),
                instrument: "EUR_USD".to_string(),
                strategy_id: "sr_rejection".to_string(),
                granularities: vec![Granularity::D1, Granularity::H4],
                poll_interval: Duration::from_millis(20),
                risk_percent_per_trade: dec!(1),
                max_concurrent_positions: 1,
                target_rr: None,
                session: SessionWindow::all_day(),
                enabled: true,
            }],
        }
    }

    fn manager() -> EngineManager {
        EngineManager::new(
            RunMode::Paper,
            Arc::new(MockBroker::new(dec!(10000))),
            Arc::new(InMemoryTradeRepository::default()),
            Arc::new(InMemoryEquitySnapshotRepository::default()),
            DrawdownSupervisor::new(dec!(10000), dec!(10)),
            Arc::new(StatusProjection::new()),
        )
    }

    #[tokio::test]
    async fn start_all_spawns_a_worker_per_enabled_stream_and_it_reaches_polling() {
        let mut manager = manager();
        manager.start_all(&one_stream("eur_usd_swing"), &HashMap::new());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].stream_name, "eur_usd_swing");

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn apply_settings_updates_an_unknown_stream_returns_false() {
        let manager = manager();
        let settings = one_stream("nonexistent").streams.remove(0);
        assert!(!manager.apply_settings(settings).await);
    }

    #[tokio::test]
    async fn pause_resume_round_trip_on_a_running_stream() {
        let mut manager = manager();
        manager.start_all(&one_stream("eur_usd_swing"), &HashMap::new());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(manager.pause("eur_usd_swing").await);
        assert!(manager.resume("eur_usd_swing").await);
        assert!(!manager.pause("missing_stream").await);

        manager.stop_all().await;
    }
}
