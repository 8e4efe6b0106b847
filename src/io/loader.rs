//! Light-curve CSV ingest.
//!
//! Input files carry a `#`-prefixed metadata block (`# Key: value` lines),
//! then a column header row naming the time and flux columns, then numeric
//! data rows. Design goals mirror the rest of the pipeline:
//!
//! - **Tolerant header matching**: recognized keys are matched by normalized
//!   substring against a fixed table; unrecognized lines are ignored, and an
//!   unparseable value for an optional key is a warning, not an error.
//! - **Strict data section**: a non-numeric field or fewer than 2 rows is a
//!   `MalformedData` error for that file.
//! - **Pure parse**: no side effects, no fitting logic here.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::domain::{
    DataKind, GroundTruth, LightCurve, OrbitalParameters, DEFAULT_DURATION_D, DEFAULT_ECC,
    DEFAULT_EXP_TIME_D, DEFAULT_INC_DEG, DEFAULT_SUPERSAMPLE, DEFAULT_U1, DEFAULT_U2,
    DEFAULT_W_DEG,
};
use crate::error::CurveError;

/// Which header field a recognized label maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Period,
    Epoch,
    Duration,
    StarRadius,
    Rp,
    SemiMajorAxis,
    U1,
    U2,
    Inclination,
    Eccentricity,
    Periastron,
    ExpTime,
    Supersample,
    NoiseSigma,
    Kind,
    ObjectName,
    Teff,
    Logg,
    GtNSpots,
    GtSpotSizeMin,
    GtSpotSizeMax,
    GtSpotContrast,
    GtMoonRadius,
    GtMoonPeriod,
    GtMoonSemiMajorAxis,
    GtTtvAmplitude,
    GtTtvPeriod,
    GtTtvPhase,
}

/// Recognized labels for simulated files. Matched by normalized substring,
/// first match wins.
const SIMULATED_FIELDS: &[(&str, Field)] = &[
    ("orbit period (days)", Field::Period),
    ("transit epoch (bjd)", Field::Epoch),
    ("calculated transit duration (days)", Field::Duration),
    ("star radius (r_star/r_solar)", Field::StarRadius),
    ("planet radius (r_planet/r_star)", Field::Rp),
    ("planet semi-major axis (a/r_star)", Field::SemiMajorAxis),
    ("limb darkening coeff (u1)", Field::U1),
    ("limb darkening coeff (u2)", Field::U2),
    ("planet inclination (deg)", Field::Inclination),
    ("orbital eccentricity", Field::Eccentricity),
    ("longitude of periastron (deg)", Field::Periastron),
    ("exposure time (days)", Field::ExpTime),
    ("supersample factor", Field::Supersample),
    ("noise sigma", Field::NoiseSigma),
    ("number of spots", Field::GtNSpots),
    ("spot size min (r_star)", Field::GtSpotSizeMin),
    ("spot size max (r_star)", Field::GtSpotSizeMax),
    ("spot contrast", Field::GtSpotContrast),
    ("satellite radius (r_satellite/r_star)", Field::GtMoonRadius),
    ("satellite orbital period (days)", Field::GtMoonPeriod),
    ("satellite semi-major axis (a_sat/r_star)", Field::GtMoonSemiMajorAxis),
    ("ttv amplitude (days)", Field::GtTtvAmplitude),
    ("ttv period (planet orbits)", Field::GtTtvPeriod),
    ("ttv phase (radians)", Field::GtTtvPhase),
    ("type", Field::Kind),
];

/// Recognized labels for real observation files.
const REAL_FIELDS: &[(&str, Field)] = &[
    ("orbit period (days)", Field::Period),
    ("transit duration (days)", Field::Duration),
    ("transit epoch (bjd)", Field::Epoch),
    ("star radius (r_star/r_solar)", Field::StarRadius),
    ("planet radius (r_planet/r_star)", Field::Rp),
    ("semi-major axis (a/r_star)", Field::SemiMajorAxis),
    ("limb darkening coefficient u1", Field::U1),
    ("limb darkening coefficient u2", Field::U2),
    ("orbital inclination (deg)", Field::Inclination),
    ("orbital eccentricity", Field::Eccentricity),
    ("longitude of periastron (deg)", Field::Periastron),
    ("exposure time (days)", Field::ExpTime),
    ("supersample factor", Field::Supersample),
    ("planet name", Field::ObjectName),
    ("star teff (k)", Field::Teff),
    ("star logg", Field::Logg),
    ("type", Field::Kind),
];

/// Load a light curve from disk.
pub fn load_light_curve(path: &Path) -> Result<LightCurve, CurveError> {
    let bytes = std::fs::read(path)
        .map_err(|e| CurveError::MalformedData(format!("cannot read file: {e}")))?;
    // Tolerate non-UTF-8 header bytes (legacy exports) rather than failing
    // the whole file.
    let text = String::from_utf8_lossy(&bytes);
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_light_curve(&file, &text)
}

/// Parse a light curve from in-memory text. Pure; no filesystem access.
pub fn parse_light_curve(file: &str, text: &str) -> Result<LightCurve, CurveError> {
    let lines: Vec<&str> = text.lines().collect();

    let kind = detect_kind(&lines);
    let table = match kind {
        DataKind::Simulated => SIMULATED_FIELDS,
        DataKind::Real => REAL_FIELDS,
    };

    let mut header = RawHeader::default();
    let mut header_end = lines.len();

    for (i, raw) in lines.iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('#') {
            let cleaned = rest.trim().trim_matches('"');
            let Some((key, value)) = cleaned.split_once(':') else {
                continue;
            };
            if let Some((_, field)) = lookup(key, table) {
                header.apply(field, value.trim().trim_matches('"'), file);
            }
            continue;
        }
        header_end = i;
        break;
    }

    if header_end >= lines.len() {
        return Err(CurveError::MalformedData(
            "no column header row after metadata block".to_string(),
        ));
    }

    let header_row = lines[header_end];
    let delimiter = if header_row.contains('\t') { b'\t' } else { b',' };
    let (time_col, flux_col) = locate_columns(header_row, delimiter).ok_or_else(|| {
        CurveError::MalformedData(format!(
            "column header row does not name time and flux columns: '{header_row}'"
        ))
    })?;

    let data_text = lines[header_end + 1..].join("\n");
    let (time, flux) = parse_data_rows(&data_text, delimiter, time_col, flux_col, header_end + 2)?;

    if time.len() < 2 {
        return Err(CurveError::MalformedData(format!(
            "data section has {} row(s); need at least 2",
            time.len()
        )));
    }

    let (params, ground_truth) = header.finish()?;

    Ok(LightCurve {
        file: file.to_string(),
        time,
        flux,
        params,
        ground_truth,
        kind,
    })
}

/// Resolve simulated vs real from the `Type` header line; defaults to real.
fn detect_kind(lines: &[&str]) -> DataKind {
    for raw in lines {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix('#') else {
            if !trimmed.is_empty() {
                break; // metadata block ended
            }
            continue;
        };
        let cleaned = rest.trim().trim_matches('"');
        let Some((key, value)) = cleaned.split_once(':') else {
            continue;
        };
        if normalize(key) != "type" {
            continue;
        }
        let value = value.trim().trim_matches('"').to_ascii_lowercase();
        if value.contains("simulacion") {
            return DataKind::Simulated;
        }
        if value.contains("real") {
            return DataKind::Real;
        }
    }
    DataKind::Real
}

/// Lowercase and collapse whitespace runs so label matching tolerates
/// spacing and case differences.
fn normalize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_space = true;
    for c in label.trim().chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.extend(c.to_lowercase());
            last_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

fn lookup(key: &str, table: &[(&'static str, Field)]) -> Option<(&'static str, Field)> {
    let key = normalize(key);
    table
        .iter()
        .find(|(pattern, _)| key.contains(pattern))
        .copied()
}

fn locate_columns(header_row: &str, delimiter: u8) -> Option<(usize, usize)> {
    let mut time_col = None;
    let mut flux_col = None;
    for (i, name) in header_row.split(delimiter as char).enumerate() {
        let name = normalize(name.trim_matches('"'));
        if time_col.is_none() && (name.contains("tiempo") || name.contains("time")) {
            time_col = Some(i);
        } else if flux_col.is_none() && (name.contains("flujo") || name.contains("flux")) {
            flux_col = Some(i);
        }
    }
    Some((time_col?, flux_col?))
}

fn parse_data_rows(
    data_text: &str,
    delimiter: u8,
    time_col: usize,
    flux_col: usize,
    first_line: usize,
) -> Result<(Vec<f64>, Vec<f64>), CurveError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data_text.as_bytes());

    let mut time = Vec::new();
    let mut flux = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = first_line + idx;
        let record = result
            .map_err(|e| CurveError::MalformedData(format!("line {line}: {e}")))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let t = parse_field(&record, time_col, "time", line)?;
        let f = parse_field(&record, flux_col, "flux", line)?;
        time.push(t);
        flux.push(f);
    }

    Ok((time, flux))
}

fn parse_field(
    record: &csv::StringRecord,
    col: usize,
    name: &str,
    line: usize,
) -> Result<f64, CurveError> {
    let raw = record.get(col).ok_or_else(|| {
        CurveError::MalformedData(format!("line {line}: missing {name} column"))
    })?;
    let value: f64 = raw.parse().map_err(|_| {
        CurveError::MalformedData(format!("line {line}: non-numeric {name} value '{raw}'"))
    })?;
    if !value.is_finite() {
        return Err(CurveError::MalformedData(format!(
            "line {line}: non-finite {name} value '{raw}'"
        )));
    }
    Ok(value)
}

/// Header fields accumulated during the scan; defaults applied in `finish`.
#[derive(Debug, Default)]
struct RawHeader {
    values: HashMap<Field, f64>,
    object_name: Option<String>,
}

impl RawHeader {
    fn apply(&mut self, field: Field, value: &str, file: &str) {
        match field {
            Field::Kind => {} // handled by detect_kind
            Field::ObjectName => {
                self.object_name = Some(value.to_string());
            }
            _ => {
                // Units are sometimes appended after the number; take the
                // first whitespace-separated token.
                let token = value.split_whitespace().next().unwrap_or("");
                match token.parse::<f64>() {
                    Ok(v) if v.is_finite() => {
                        self.values.insert(field, v);
                    }
                    _ => {
                        warn!(file, ?field, value, "could not convert header value");
                    }
                }
            }
        }
    }

    fn get(&self, field: Field) -> Option<f64> {
        self.values.get(&field).copied()
    }

    fn finish(self) -> Result<(OrbitalParameters, GroundTruth), CurveError> {
        let period_d = self
            .get(Field::Period)
            .ok_or_else(|| CurveError::MalformedHeader("missing orbit period".to_string()))?;
        let epoch_bjd = self
            .get(Field::Epoch)
            .ok_or_else(|| CurveError::MalformedHeader("missing transit epoch".to_string()))?;

        let ground_truth = GroundTruth {
            n_spots: self.get(Field::GtNSpots).map(|v| v.max(0.0) as u32),
            spot_size_min: self.get(Field::GtSpotSizeMin),
            spot_size_max: self.get(Field::GtSpotSizeMax),
            spot_contrast: self.get(Field::GtSpotContrast),
            moon_radius: self.get(Field::GtMoonRadius),
            moon_period_d: self.get(Field::GtMoonPeriod),
            moon_a: self.get(Field::GtMoonSemiMajorAxis),
            ttv_amplitude_d: self.get(Field::GtTtvAmplitude),
            ttv_period_orbits: self.get(Field::GtTtvPeriod),
            ttv_phase_rad: self.get(Field::GtTtvPhase),
        };

        // Built last: taking `object_name` moves out of `self`, so every
        // `get` lookup has to happen first.
        let params = OrbitalParameters {
            period_d,
            epoch_bjd,
            duration_d: self.get(Field::Duration).unwrap_or(DEFAULT_DURATION_D),
            rp: self.get(Field::Rp).unwrap_or(0.1),
            a: self.get(Field::SemiMajorAxis).unwrap_or(8.0),
            inc_deg: self.get(Field::Inclination).unwrap_or(DEFAULT_INC_DEG),
            u1: self.get(Field::U1).unwrap_or(DEFAULT_U1),
            u2: self.get(Field::U2).unwrap_or(DEFAULT_U2),
            ecc: self.get(Field::Eccentricity).unwrap_or(DEFAULT_ECC),
            w_deg: self.get(Field::Periastron).unwrap_or(DEFAULT_W_DEG),
            exp_time_d: self.get(Field::ExpTime).unwrap_or(DEFAULT_EXP_TIME_D),
            supersample: self
                .get(Field::Supersample)
                .map(|v| v.max(1.0) as u32)
                .unwrap_or(DEFAULT_SUPERSAMPLE),
            star_radius_rsol: self.get(Field::StarRadius),
            teff_k: self.get(Field::Teff),
            logg: self.get(Field::Logg),
            noise_sigma: self.get(Field::NoiseSigma),
            object_name: self.object_name,
        };

        Ok((params, ground_truth))
    }
}
