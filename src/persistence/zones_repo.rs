use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::PersistenceError;
use crate::domain::ports::ZoneRepository;
use crate::domain::zone::{Zone, ZoneRole};
use crate::persistence::database::Database;

pub struct SqliteZoneRepository {
    database: Database,
}

impl SqliteZoneRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn zone_role_str(role: ZoneRole) -> &'static str {
    match role {
        ZoneRole::Support => "support",
        ZoneRole::Resistance => "resistance",
    }
}

#[async_trait]
impl ZoneRepository for SqliteZoneRepository {
    async fn append_many(
        &self,
        instrument: &str,
        zones: &[Zone],
        detected_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut tx = self.database.pool.begin().await?;
        for zone in zones {
            sqlx::query(
                r#"
                INSERT INTO sr_zones (pair, zone_type, price_level, strength, detected_at, invalidated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(instrument)
            .bind(zone_role_str(zone.role))
            .bind(sqlx::types::Text(zone.level))
            .bind(zone.strength as i64)
            .bind(detected_at)
            .bind(zone.invalidated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
