pub mod manager;
pub mod retry;
pub mod trading_engine;

pub use manager::EngineManager;
pub use trading_engine::{EngineCommand, InstrumentSpec, TradingEngine};
