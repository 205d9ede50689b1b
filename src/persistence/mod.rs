pub mod backtest_repo;
pub mod database;
pub mod equity_repo;
pub mod trades_repo;
pub mod zones_repo;

pub use backtest_repo::SqliteBacktestRunRepository;
pub use database::Database;
pub use equity_repo::SqliteEquitySnapshotRepository;
pub use trades_repo::SqliteTradeRepository;
pub use zones_repo::SqliteZoneRepository;
