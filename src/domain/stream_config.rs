use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;

/// `[start_hour, end_hour)` admission window in UTC, `0 <= start <= end <= 24`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionWindow {
    pub fn all_day() -> Self {
        Self {
            start_hour: 0,
            end_hour: 24,
        }
    }
}

/// Immutable for the duration of a run except through `EngineManager::apply_settings`,
/// which takes effect on the next cycle boundary of the affected engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub instrument: String,
    pub strategy_id: String,
    pub granularities: Vec<crate::domain::candle::Granularity>,
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    pub risk_percent_per_trade: Decimal,
    pub max_concurrent_positions: u32,
    pub target_rr: Option<Decimal>,
    pub session: SessionWindow,
    pub enabled: bool,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A validated collection of stream configurations, loaded from the
/// persisted JSON array described in the broker-external-interfaces section.
#[derive(Debug, Clone)]
pub struct StreamConfigSet {
    pub streams: Vec<StreamConfig>,
}

impl StreamConfigSet {
    pub fn load_from_str(
        json: &str,
        registered_strategy_ids: &HashSet<&str>,
    ) -> Result<Self, ConfigError> {
        let streams: Vec<StreamConfig> =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Self::validate(streams, registered_strategy_ids)
    }

    fn validate(
        streams: Vec<StreamConfig>,
        registered_strategy_ids: &HashSet<&str>,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for stream in &streams {
            if !seen.insert(stream.name.clone()) {
                return Err(ConfigError::DuplicateStreamName(stream.name.clone()));
            }
            if !registered_strategy_ids.contains(stream.strategy_id.as_str()) {
                return Err(ConfigError::UnknownStrategy {
                    stream: stream.name.clone(),
                    strategy_id: stream.strategy_id.clone(),
                });
            }
            if stream.session.start_hour > stream.session.end_hour || stream.session.end_hour > 24
            {
                return Err(ConfigError::InvalidSessionWindow(stream.name.clone()));
            }
        }
        Ok(Self { streams })
    }
}
