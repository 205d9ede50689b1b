pub mod drawdown;
pub mod sizing;
pub mod stops;
pub mod trailing;

pub use drawdown::DrawdownSupervisor;
