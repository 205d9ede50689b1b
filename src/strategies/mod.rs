pub mod context;
pub mod mean_reversion;
pub mod momentum_scalp;
pub mod sr_rejection;
pub mod trend;

use std::sync::Arc;

pub use context::StrategyContext;
pub use mean_reversion::MeanReversionStrategy;
pub use momentum_scalp::MomentumScalpStrategy;
pub use sr_rejection::SrRejectionStrategy;

use crate::domain::signal::StrategyResult;

/// A strategy is a pure, non-suspending function of a `StrategyContext`.
/// Implementations MUST NOT perform I/O or hold state across cycles — the
/// engine builds a fresh context every cycle and discards the strategy's
/// working data when `evaluate` returns.
pub trait TradingStrategy: Send + Sync {
    /// Stable identifier used in `StreamConfig::strategy_id` and persisted rows.
    fn id(&self) -> &'static str;

    /// Ordered gate names this strategy evaluates, for status projection.
    fn gates(&self) -> &'static [&'static str];

    fn evaluate(&self, ctx: &StrategyContext) -> StrategyResult;
}

pub struct StrategyFactory;

impl StrategyFactory {
    pub fn create(strategy_id: &str) -> Option<Arc<dyn TradingStrategy>> {
        match strategy_id {
            "sr_rejection" => Some(Arc::new(SrRejectionStrategy::default())),
            "momentum_scalp" => Some(Arc::new(MomentumScalpStrategy::default())),
            "mean_reversion" => Some(Arc::new(MeanReversionStrategy::default())),
            _ => None,
        }
    }

    pub fn registered_ids() -> &'static [&'static str] {
        &["sr_rejection", "momentum_scalp", "mean_reversion"]
    }
}
