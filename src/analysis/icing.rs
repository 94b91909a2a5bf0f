/// Icing classification.
///
/// For every hour and every source group (the consolidated forecast and each
/// on-turbine sensor package) this derives:
///
/// - the glaze and hard-rime discriminant curves at the observed wind speed,
/// - the icing type zone (NO ICE / Glaze / Hard Rime / Soft Rime),
/// - the RH threshold for that icing type,
/// - the final icing verdict, gated by the group's trigger policy,
/// - wind, pitch and temperature operating zones.
///
/// Each row is classified by a pure function of its own fields and the
/// `SiteSpec`. Missing inputs never fail; they leave the dependent outputs
/// undefined, which is stored as the absence of the field.

use tracing::debug;

use crate::config::SiteSpec;
use crate::model::{
    FieldValue, GroupFields, IcingType, Row, Series, SourceGroup, TriggerPolicy, COL_GLAZE_CURVE,
    COL_HARD_RIME_CURVE, COL_ICING, COL_ICING_TYPE_ZONE, COL_PITCH_ZONE, COL_RH_THRESHOLD,
    COL_TEMP_ZONE, COL_WIND_ZONE,
};
use crate::zones::{self, PitchZone, TempZone};

// ---------------------------------------------------------------------------
// Discriminant curves
// ---------------------------------------------------------------------------

/// Cubic `a3·w³ + a2·w² + a1·w + a0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cubic {
    pub a3: f64,
    pub a2: f64,
    pub a1: f64,
    pub a0: f64,
}

impl Cubic {
    pub fn eval(&self, w: f64) -> f64 {
        ((self.a3 * w + self.a2) * w + self.a1) * w + self.a0
    }
}

/// Empirical glaze / hard-rime boundary (°C as a function of wind m/s).
pub const GLAZE_CURVE: Cubic = Cubic { a3: -0.0004, a2: 0.0215, a1: -0.6266, a0: 1.4396 };

/// Empirical hard-rime / soft-rime boundary.
pub const HARD_RIME_CURVE: Cubic = Cubic { a3: -0.0014, a2: 0.0705, a1: -1.5798, a0: 1.3887 };

/// The curve pair threaded through classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcingCurves {
    pub glaze: Cubic,
    pub hard_rime: Cubic,
}

impl Default for IcingCurves {
    fn default() -> Self {
        Self { glaze: GLAZE_CURVE, hard_rime: HARD_RIME_CURVE }
    }
}

// ---------------------------------------------------------------------------
// Per-row rules
// ---------------------------------------------------------------------------

/// Icing type from temperature and the two curve values at the same wind.
pub fn icing_type_zone(t: f64, glaze: f64, hard_rime: f64) -> IcingType {
    if t >= 0.0 {
        IcingType::NoIce
    } else if t > glaze {
        IcingType::Glaze
    } else if t > hard_rime {
        IcingType::HardRime
    } else {
        IcingType::SoftRime
    }
}

/// Inputs to the verdict gate for one row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriggerInputs {
    pub liquid_water: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub severity: Option<f64>,
    pub rh_threshold: Option<f64>,
}

/// Final icing verdict: the type zone when the trigger fires, NO ICE when it
/// does not, undefined when any input the policy needs is missing.
pub fn icing_verdict(
    policy: TriggerPolicy,
    zone: Option<IcingType>,
    inputs: &TriggerInputs,
) -> Option<IcingType> {
    let zone = zone?;
    let triggered = match policy {
        TriggerPolicy::SensorSeverity => {
            let severity = inputs.severity?;
            let lwc = inputs.liquid_water?;
            severity > 0.0 || lwc > 0.0
        }
        TriggerPolicy::ForecastHumidity => {
            let snow_water = inputs.liquid_water?;
            let rh = inputs.relative_humidity?;
            let threshold = inputs.rh_threshold?;
            snow_water > 1.0 || rh > threshold
        }
    };
    Some(if triggered { zone } else { IcingType::NoIce })
}

/// Everything derived for one group at one hour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupClassification {
    pub glaze_curve: Option<f64>,
    pub hard_rime_curve: Option<f64>,
    pub icing_type_zone: Option<IcingType>,
    pub rh_threshold: Option<f64>,
    pub icing: Option<IcingType>,
    pub wind_zone: Option<String>,
    pub pitch_zone: Option<PitchZone>,
    pub temp_zone: Option<TempZone>,
}

/// Classifies one row for one group.
pub fn classify_row(
    row: &Row,
    group: SourceGroup,
    fields: &GroupFields,
    spec: &SiteSpec,
    curves: &IcingCurves,
) -> GroupClassification {
    let ws = row.number(&fields.wind_speed);
    let temp = row.number(&fields.temperature);

    let glaze_curve = ws.map(|w| curves.glaze.eval(w));
    let hard_rime_curve = ws.map(|w| curves.hard_rime.eval(w));

    let icing_type_zone = match (temp, glaze_curve, hard_rime_curve) {
        (Some(t), Some(g), Some(h)) => Some(icing_type_zone(t, g, h)),
        _ => None,
    };

    let rh_threshold = icing_type_zone.map(|z| spec.rh_thresholds.for_type(z));

    let inputs = TriggerInputs {
        liquid_water: row.number(&fields.liquid_water),
        relative_humidity: row.number(&fields.relative_humidity),
        severity: fields.severity.as_deref().and_then(|s| row.number(s)),
        rh_threshold,
    };
    let icing = icing_verdict(group.trigger_policy(), icing_type_zone, &inputs);

    GroupClassification {
        glaze_curve,
        hard_rime_curve,
        icing_type_zone,
        rh_threshold,
        icing,
        wind_zone: ws.and_then(|w| zones::wind_zone(w, &spec.wind_zones)).map(String::from),
        pitch_zone: ws.map(|w| zones::pitch_zone(w, &spec.pitch)),
        temp_zone: temp.map(zones::temp_zone),
    }
}

impl GroupClassification {
    /// Writes the derived columns for `group` into `row`. Undefined outputs
    /// remove the column so a stale value from an earlier run cannot survive.
    pub fn apply(&self, group: SourceGroup, row: &mut Row) {
        let num = |v: Option<f64>| v.map(FieldValue::Number);
        let label = |v: Option<&str>| v.map(|s| FieldValue::Label(s.to_string()));

        row.set_opt(&group.column(COL_GLAZE_CURVE), num(self.glaze_curve));
        row.set_opt(&group.column(COL_HARD_RIME_CURVE), num(self.hard_rime_curve));
        row.set_opt(&group.column(COL_ICING_TYPE_ZONE), label(self.icing_type_zone.map(|z| z.label())));
        row.set_opt(&group.column(COL_RH_THRESHOLD), num(self.rh_threshold));
        row.set_opt(&group.column(COL_ICING), label(self.icing.map(|z| z.label())));
        row.set_opt(&group.column(COL_WIND_ZONE), label(self.wind_zone.as_deref()));
        row.set_opt(&group.column(COL_PITCH_ZONE), label(self.pitch_zone.map(|p| p.label())));
        row.set_opt(&group.column(COL_TEMP_ZONE), label(self.temp_zone.map(|t| t.label())));
    }
}

// ---------------------------------------------------------------------------
// Series-level classification
// ---------------------------------------------------------------------------

/// Groups whose every source field appears somewhere in the series.
pub fn present_groups(series: &Series, site_id: &str) -> Vec<SourceGroup> {
    SourceGroup::ALL
        .into_iter()
        .filter(|g| {
            let fields = g.source_fields(site_id);
            fields.all().iter().all(|f| series.has_field(f))
        })
        .collect()
}

/// Returns `series` with classification columns attached for each of
/// `groups` whose source fields are present. Source fields are untouched.
pub fn classify(series: &Series, spec: &SiteSpec, groups: &[SourceGroup]) -> Series {
    classify_with_curves(series, spec, groups, &IcingCurves::default())
}

pub fn classify_with_curves(
    series: &Series,
    spec: &SiteSpec,
    groups: &[SourceGroup],
    curves: &IcingCurves,
) -> Series {
    let available = present_groups(series, &spec.site_id);
    let mut out = series.clone();

    for &group in groups {
        if !available.contains(&group) {
            debug!(site = %spec.site_id, %group, "source fields missing, group not classified");
            continue;
        }
        let fields = group.source_fields(&spec.site_id);
        for (_, row) in out.rows_mut() {
            classify_row(row, group, &fields, spec, curves).apply(group, row);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
