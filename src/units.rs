use crate::{MigrateError, Result};
use std::str::FromStr;

/// Binary (base-1024) size units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Kibi,
    Mebi,
    Gibi,
    Tebi,
    Pebi,
    Exbi,
}

impl Unit {
    fn exponent(self) -> i32 {
        match self {
            Unit::Kibi => 1,
            Unit::Mebi => 2,
            Unit::Gibi => 3,
            Unit::Tebi => 4,
            Unit::Pebi => 5,
            Unit::Exbi => 6,
        }
    }
}

impl FromStr for Unit {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "k" => Ok(Unit::Kibi),
            "m" => Ok(Unit::Mebi),
            "g" => Ok(Unit::Gibi),
            "t" => Ok(Unit::Tebi),
            "p" => Ok(Unit::Pebi),
            "e" => Ok(Unit::Exbi),
            other => Err(MigrateError::InvalidArgument(format!(
                "unknown size unit '{}' (expected one of k, m, g, t, p, e)",
                other
            ))),
        }
    }
}

pub fn bytes_to(bytes: u64, unit: Unit) -> f64 {
    bytes as f64 / 1024f64.powi(unit.exponent())
}

/// Convert a byte count to the unit named by a single letter (`k` ... `e`).
pub fn convert(bytes: u64, unit: &str) -> Result<f64> {
    Ok(bytes_to(bytes, unit.parse()?))
}
