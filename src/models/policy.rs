// Bandwidth policy: label extraction and the typed tc rate value.

use crate::error::ShapingError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Label that selects a container for shaping (value must be "1").
pub const LABEL_ENABLED: &str = "org.label-schema.tc.enabled";
/// Guaranteed rate label.
pub const LABEL_RATE: &str = "org.label-schema.tc.rate";
/// Ceiling label.
pub const LABEL_CEIL: &str = "org.label-schema.tc.ceil";

/// Rate and ceiling used when a shaped container declares neither label.
pub const DEFAULT_BANDWIDTH: &str = "10000mbps";

/// Units accepted by tc's rate parser (matched case-insensitively).
const TC_RATE_UNITS: &[&str] = &[
    "bit", "kbit", "kibit", "mbit", "mibit", "gbit", "gibit", "tbit", "tibit", "bps", "kbps",
    "kibps", "mbps", "mibps", "gbps", "gibps", "tbps", "tibps",
];

/// Resolve (rate, ceil) from container labels.
///
/// Neither label: both default. One label: the other copies it. Both: verbatim.
pub fn resolve_policy(labels: &HashMap<String, String>) -> (String, String) {
    let rate = labels.get(LABEL_RATE);
    let ceil = labels.get(LABEL_CEIL);
    match (rate, ceil) {
        (None, None) => (DEFAULT_BANDWIDTH.to_string(), DEFAULT_BANDWIDTH.to_string()),
        (None, Some(c)) => (c.clone(), c.clone()),
        (Some(r), None) => (r.clone(), r.clone()),
        (Some(r), Some(c)) => (r.clone(), c.clone()),
    }
}

/// A tc rate string that passed format validation. Rendered verbatim on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Bandwidth(String);

impl Bandwidth {
    /// Validate `value` against tc's rate syntax: a decimal number (optionally with an exponent,
    /// as `strtod` reads it) followed by an optional unit, or a percentage of the link speed.
    pub fn parse(value: &str) -> Result<Self, String> {
        if value.is_empty() {
            return Err("empty value".into());
        }
        let split = numeric_prefix_len(value);
        let (number, unit) = value.split_at(split);
        let Ok(amount) = number.parse::<f64>() else {
            return Err("expected a number followed by an optional unit".into());
        };
        if unit == "%" {
            if !(0.0..=100.0).contains(&amount) {
                return Err(format!("percentage {number} is outside 0-100"));
            }
        } else if !unit.is_empty() && !TC_RATE_UNITS.iter().any(|u| u.eq_ignore_ascii_case(unit)) {
            return Err(format!("unknown unit {unit:?}"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Length of the unsigned decimal prefix `strtod` would consume: digits with an optional fraction,
/// then an exponent only when at least one exponent digit follows.
fn numeric_prefix_len(value: &str) -> usize {
    let b = value.as_bytes();
    let digits = |mut i: usize| {
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        i
    };
    let mut end = digits(0);
    if b.get(end) == Some(&b'.') {
        end = digits(end + 1);
    }
    if end == 0 || (end == 1 && b[0] == b'.') {
        return 0;
    }
    if matches!(b.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(b.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    end
}

/// Validated rate/ceiling pair. `ceil >= rate` is left to tc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub rate: Bandwidth,
    pub ceil: Bandwidth,
}

impl Policy {
    pub fn new(rate: &str, ceil: &str) -> Result<Self, ShapingError> {
        let rate = Bandwidth::parse(rate).map_err(|reason| ShapingError::InvalidPolicy {
            label: LABEL_RATE,
            value: rate.to_string(),
            reason,
        })?;
        let ceil = Bandwidth::parse(ceil).map_err(|reason| ShapingError::InvalidPolicy {
            label: LABEL_CEIL,
            value: ceil.to_string(),
            reason,
        })?;
        Ok(Self { rate, ceil })
    }

    /// `resolve_policy` followed by validation of both values.
    pub fn from_labels(labels: &HashMap<String, String>) -> Result<Self, ShapingError> {
        let (rate, ceil) = resolve_policy(labels);
        Self::new(&rate, &ceil)
    }
}
