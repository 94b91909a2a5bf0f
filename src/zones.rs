/// Operating zone banding: wind, pitch-control, and temperature.
///
/// Zones are independent of icing morphology. Each is a pure function of a
/// single field: wind and pitch bands come from the site registry, the
/// temperature bands are fixed.

use crate::config::{PitchBreakpoints, WindZoneBand};

// ============================================================================
// Wind zone
// ============================================================================

/// Wind zone label for `ws` (m/s). Upper bounds are inclusive; anything
/// above every configured bound lands in the last band.
pub fn wind_zone(ws: f64, bands: &[WindZoneBand]) -> Option<&str> {
    bands
        .iter()
        .find(|b| ws <= b.upper_ms)
        .or_else(|| bands.last())
        .map(|b| b.label.as_str())
}

// ============================================================================
// Pitch zone
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchZone {
    PitchIn,
    PitchStay,
    PitchOut,
}

impl PitchZone {
    pub fn label(&self) -> &'static str {
        match self {
            PitchZone::PitchIn => "Pitch In",
            PitchZone::PitchStay => "Pitch Stay",
            PitchZone::PitchOut => "Pitch Out",
        }
    }
}

pub fn pitch_zone(ws: f64, pitch: &PitchBreakpoints) -> PitchZone {
    if ws <= pitch.pitch_in_ms {
        PitchZone::PitchIn
    } else if ws <= pitch.pitch_out_ms {
        PitchZone::PitchStay
    } else {
        PitchZone::PitchOut
    }
}

// ============================================================================
// Temperature zone
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempZone {
    Below15,
    Minus15To10,
    Minus10To5,
    Minus5To0,
    Above0,
}

impl TempZone {
    pub fn label(&self) -> &'static str {
        match self {
            TempZone::Below15 => "Below -15",
            TempZone::Minus15To10 => "-10 to -15",
            TempZone::Minus10To5 => "-5 to -10",
            TempZone::Minus5To0 => "0 to -5",
            TempZone::Above0 => "Above 0",
        }
    }
}

/// Fixed bands, lower bound inclusive. 0 °C itself is "Above 0".
pub fn temp_zone(t: f64) -> TempZone {
    if t < -15.0 {
        TempZone::Below15
    } else if t < -10.0 {
        TempZone::Minus15To10
    } else if t < -5.0 {
        TempZone::Minus10To5
    } else if t < 0.0 {
        TempZone::Minus5To0
    } else {
        TempZone::Above0
    }
}

// ============================================================================
// Tests
// ============================================================================
