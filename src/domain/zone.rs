use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneRole {
    Support,
    Resistance,
}

impl ZoneRole {
    pub fn opposite(self) -> ZoneRole {
        match self {
            ZoneRole::Support => ZoneRole::Resistance,
            ZoneRole::Resistance => ZoneRole::Support,
        }
    }
}

/// A clustered horizontal price level, regenerated fresh every evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub level: Decimal,
    pub role: ZoneRole,
    pub strength: u32,
    pub detected_at: DateTime<Utc>,
    pub invalidated_at: Option<DateTime<Utc>>,
}

impl Zone {
    /// The role this zone plays *this cycle*, which may differ from its
    /// original classification when `close` has moved to the other side of
    /// the level. Close strictly above -> acting support; strictly below ->
    /// acting resistance; exactly on the level keeps the original role.
    pub fn acting_role(&self, close: Decimal) -> (ZoneRole, bool) {
        if close > self.level {
            (ZoneRole::Support, ZoneRole::Support != self.role)
        } else if close < self.level {
            (ZoneRole::Resistance, ZoneRole::Resistance != self.role)
        } else {
            (self.role, false)
        }
    }
}
