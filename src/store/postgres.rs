/// PostgreSQL store.
///
/// Series rows live in `icing.series_rows (site_id, series, reading_time,
/// fields JSONB)`; cooldowns in `icing.alert_cooldown`. Storing is a single
/// transaction covering every table passed in: delete each site/table, insert
/// every row.

use chrono::NaiveDateTime;
use postgres::types::Json;
use postgres::Client;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::db::{self, ICING_SCHEMA};
use crate::error::IcingError;
use crate::model::{AlertCooldownRecord, Row, Series};

use super::{CooldownStore, SeriesStore, SeriesTable};

pub struct PgStore {
    client: Mutex<Client>,
}

impl PgStore {
    /// Connects and checks the `icing` schema is usable.
    pub fn connect(db_url: &str) -> Result<Self, IcingError> {
        let client = db::connect_and_verify(db_url, &[ICING_SCHEMA])?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client: Mutex::new(client) }
    }

    fn client(&self) -> Result<MutexGuard<'_, Client>, IcingError> {
        self.client.lock().map_err(|_| IcingError::persistence("database client lock poisoned"))
    }
}

impl SeriesStore for PgStore {
    fn load(&self, site_id: &str, table: SeriesTable) -> Result<Option<Series>, IcingError> {
        let mut client = self.client()?;
        let rows = client
            .query(
                "SELECT reading_time, fields
                 FROM icing.series_rows
                 WHERE site_id = $1 AND series = $2
                 ORDER BY reading_time",
                &[&site_id, &table.name()],
            )
            .map_err(IcingError::persistence)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut series = Series::new();
        for row in rows {
            let ts: NaiveDateTime = row.get(0);
            let Json(fields): Json<Row> = row.get(1);
            series.insert(ts, fields)?;
        }
        Ok(Some(series))
    }

    fn store_all(&self, site_id: &str, tables: &[(SeriesTable, &Series)]) -> Result<(), IcingError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(IcingError::persistence)?;

        let delete = tx
            .prepare("DELETE FROM icing.series_rows WHERE site_id = $1 AND series = $2")
            .map_err(IcingError::persistence)?;
        let insert = tx
            .prepare(
                "INSERT INTO icing.series_rows (site_id, series, reading_time, fields)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (site_id, series, reading_time) DO UPDATE SET fields = EXCLUDED.fields",
            )
            .map_err(IcingError::persistence)?;

        for (table, series) in tables {
            tx.execute(&delete, &[&site_id, &table.name()])
                .map_err(IcingError::persistence)?;
            for (ts, row) in series.iter() {
                tx.execute(&insert, &[&site_id, &table.name(), ts, &Json(row)])
                    .map_err(IcingError::persistence)?;
            }
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit().map_err(IcingError::persistence)?;
        for (table, series) in tables {
            debug!(site = site_id, %table, rows = series.len(), "series stored in postgres");
        }
        Ok(())
    }
}

impl CooldownStore for PgStore {
    fn load_cooldown(&self, site_id: &str) -> Result<Option<AlertCooldownRecord>, IcingError> {
        let mut client = self.client()?;
        let row = client
            .query_opt("SELECT last_alert FROM icing.alert_cooldown WHERE site_id = $1", &[&site_id])
            .map_err(IcingError::persistence)?;
        Ok(row.map(|r| AlertCooldownRecord { site_id: site_id.to_string(), last_alert: r.get(0) }))
    }

    fn save_cooldown(&self, record: &AlertCooldownRecord) -> Result<(), IcingError> {
        let mut client = self.client()?;
        client
            .execute(
                "INSERT INTO icing.alert_cooldown (site_id, last_alert)
                 VALUES ($1, $2)
                 ON CONFLICT (site_id) DO UPDATE SET last_alert = EXCLUDED.last_alert",
                &[&record.site_id, &record.last_alert],
            )
            .map_err(IcingError::persistence)?;
        Ok(())
    }
}
