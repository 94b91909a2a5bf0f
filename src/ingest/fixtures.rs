/// Test fixtures: representative payloads from SpotWx and Bazefield.
///
/// Truncated to the minimum needed to exercise the parsers, but shaped like
/// the real responses.
///
/// SpotWx CSV:
///   DATETIME,DATE,TIME,TMP,RH,WSPD,WD,SQP,PTYPE
///   - DATETIME is site-local in the requested `tz`
///   - WSPD is km/h at model height
///   - empty cells mean "not forecast"
///
/// Bazefield aggregates:
///   timeSeriesList[].measurementName / .timeSeries[].{t, t_local, v, q}
///   - `t` is epoch milliseconds UTC, `v` may be null

/// Test site: UTC-5, no DST, one sensor package `TST-MCMS`.
#[cfg(test)]
pub(crate) const SITE_TOML: &str = r#"
    [[site]]
    site_id = "TST"
    latitude = 45.0
    longitude = -75.0
    tz_offset_hours = -5
    hub_height_m = 80.0
    rh_thresholds = { glaze = 90.0, hard_rime = 92.0, soft_rime = 85.0 }
    wind_zones = [
        { label = "0-4", upper_ms = 4.0 },
        { label = "4-8", upper_ms = 8.0 },
        { label = "8-12", upper_ms = 12.0 },
        { label = "12+", upper_ms = 25.0 },
    ]
    pitch = { pitch_in_ms = 3.0, pitch_out_ms = 10.0 }

    [[site.sensors]]
    tag_prefix = "TST-MCMS"
"#;

/// HRRR run, four hours from 08:00 local. Hour 11 has no SQP.
#[cfg(test)]
pub(crate) fn spotwx_hrrr_csv() -> &'static str {
    "DATETIME,DATE,TIME,TMP,RH,WSPD,WD,SQP,PTYPE
2024/01/05 08:00,2024/01/05,08:00,-3.2,94,32,270,0.0,SN
2024/01/05 09:00,2024/01/05,09:00,-3.8,95,35,275,0.2,SN
2024/01/05 10:00,2024/01/05,10:00,-4.1,96,38,280,1.4,SN
2024/01/05 11:00,2024/01/05,11:00,-4.5,91,40,280,,
"
}

/// Asset list: two turbines at TST, a met mast at TST, a turbine elsewhere.
#[cfg(test)]
pub(crate) fn bazefield_assets_json() -> &'static str {
    r#"[
      { "title": "TST-T01", "itemType": { "itemTypeId": 44 }, "site": { "shortName": "TST" }, "model": { "name": "V110" } },
      { "title": "TST-T02", "itemType": { "itemTypeId": 44 }, "site": { "shortName": "TST" }, "model": { "name": "V110" } },
      { "title": "TST-MET1", "itemType": { "itemTypeId": 12 }, "site": { "shortName": "TST" } },
      { "title": "OTH-T01", "itemType": { "itemTypeId": 44 }, "site": { "shortName": "OTH" }, "model": { "name": "GE1.6" } }
    ]"#
}

/// Sensor aggregates for 12:00Z and 13:00Z (07:00 / 08:00 at UTC-5).
/// LWC at 13:00Z is null.
#[cfg(test)]
pub(crate) fn bazefield_sensor_json() -> &'static str {
    r#"{
      "timeSeriesList": [
        {
          "measurementName": "TST-MCMS-WindSpeed",
          "timeSeries": [
            { "t": 1704456000000, "t_local": "2024-01-05T07:00:00", "v": 8.1, "q": 192 },
            { "t": 1704459600000, "t_local": "2024-01-05T08:00:00", "v": 9.4, "q": 192 }
          ]
        },
        {
          "measurementName": "TST-MCMS-LWC",
          "timeSeries": [
            { "t": 1704456000000, "t_local": "2024-01-05T07:00:00", "v": 0.02, "q": 192 },
            { "t": 1704459600000, "t_local": "2024-01-05T08:00:00", "v": null, "q": 0 }
          ]
        },
        {
          "measurementName": "TST-MCMS-IcingSeverity",
          "timeSeries": [
            { "t": 1704456000000, "t_local": "2024-01-05T07:00:00", "v": 1.0, "q": 192 },
            { "t": 1704459600000, "t_local": "2024-01-05T08:00:00", "v": 0.0, "q": 192 }
          ]
        }
      ]
    }"#
}
