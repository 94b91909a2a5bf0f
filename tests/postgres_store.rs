/// Integration tests for the PostgreSQL store
///
/// Prerequisites:
/// - PostgreSQL running with sql/001_icing_schema.sql applied
/// - DATABASE_URL set in .env
///
/// Run with: cargo test --test postgres_store -- --ignored --test-threads=1

use chrono::{NaiveDate, NaiveDateTime};
use icemon_service::config::ForecastModel;
use icemon_service::db::{self, ICING_SCHEMA};
use icemon_service::model::{AlertCooldownRecord, Row, Series};
use icemon_service::store::{CooldownStore, PgStore, SeriesStore, SeriesTable};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const TEST_SITE: &str = "TEST_PG";

fn setup_store() -> PgStore {
    dotenv::dotenv().ok();
    let url = db::database_url_from_env().expect("DATABASE_URL must be set");
    let mut client = db::connect_and_verify(&url, &[ICING_SCHEMA]).expect("icing schema must exist");
    cleanup_test_data(&mut client);
    PgStore::from_client(client)
}

fn cleanup_test_data(client: &mut postgres::Client) {
    let _ = client.execute("DELETE FROM icing.series_rows WHERE site_id = $1", &[&TEST_SITE]);
    let _ = client.execute("DELETE FROM icing.alert_cooldown WHERE site_id = $1", &[&TEST_SITE]);
}

fn ts(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(h, 0, 0).unwrap()
}

fn sample_series() -> Series {
    Series::from_rows((6..=9).map(|h| {
        let mut row = Row::new();
        row.set_number("FCST_Temp", -4.0 - h as f64);
        row.set_label("FCST_Icing", "Hard Rime");
        (ts(h), row)
    }))
    .unwrap()
}

// ---------------------------------------------------------------------------
// Series tables
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires live PostgreSQL
fn test_missing_table_loads_as_none() {
    let store = setup_store();
    assert!(store.load(TEST_SITE, SeriesTable::Combined).unwrap().is_none());
}

#[test]
#[ignore] // Requires live PostgreSQL
fn test_store_then_load_preserves_rows_and_order() {
    let store = setup_store();
    let series = sample_series();
    store.store(TEST_SITE, SeriesTable::Combined, &series).unwrap();

    let loaded = store.load(TEST_SITE, SeriesTable::Combined).unwrap().expect("stored");
    assert_eq!(loaded, series);
    assert_eq!(loaded.first_timestamp(), Some(ts(6)));
}

#[test]
#[ignore] // Requires live PostgreSQL
fn test_store_replaces_previous_contents() {
    let store = setup_store();
    store.store(TEST_SITE, SeriesTable::Combined, &sample_series()).unwrap();

    let shorter = Series::from_rows(vec![(ts(9), Row::new())]).unwrap();
    store.store(TEST_SITE, SeriesTable::Combined, &shorter).unwrap();

    let loaded = store.load(TEST_SITE, SeriesTable::Combined).unwrap().unwrap();
    assert_eq!(loaded.len(), 1);
}

#[test]
#[ignore] // Requires live PostgreSQL
fn test_model_tables_are_separate() {
    let store = setup_store();
    store.store(TEST_SITE, SeriesTable::Model(ForecastModel::Nam), &sample_series()).unwrap();

    assert!(store.load(TEST_SITE, SeriesTable::Model(ForecastModel::Hrrr)).unwrap().is_none());
    assert!(store.load(TEST_SITE, SeriesTable::Model(ForecastModel::Nam)).unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Cooldowns
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires live PostgreSQL
fn test_cooldown_upsert_keeps_latest() {
    let store = setup_store();
    assert!(store.load_cooldown(TEST_SITE).unwrap().is_none());

    for h in [8, 14] {
        store
            .save_cooldown(&AlertCooldownRecord { site_id: TEST_SITE.to_string(), last_alert: ts(h) })
            .unwrap();
    }
    assert_eq!(store.load_cooldown(TEST_SITE).unwrap().unwrap().last_alert, ts(14));
}

#[test]
#[ignore] // Requires live PostgreSQL
fn test_store_all_writes_every_table_in_one_commit() {
    let store = setup_store();
    let series = sample_series();
    store
        .store_all(
            TEST_SITE,
            &[(SeriesTable::Model(ForecastModel::Hrrr), &series), (SeriesTable::Combined, &series)],
        )
        .unwrap();

    assert_eq!(store.load(TEST_SITE, SeriesTable::Combined).unwrap(), Some(series.clone()));
    assert_eq!(store.load(TEST_SITE, SeriesTable::Model(ForecastModel::Hrrr)).unwrap(), Some(series));
}
