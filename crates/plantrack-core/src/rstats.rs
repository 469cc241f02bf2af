//! Numerically stable running statistics.
//!
//! `RStats` is a fixed 40-byte value maintaining count, mean, sum of squared
//! deviations (Welford's algorithm), and extrema over a stream of doubles.
//! The canonical empty state is `count == 0` with every other field exactly
//! `0.0`; any other all-but-count combination is treated as corruption, which
//! makes the check load-bearing for both wire formats.
//!
//! Two serialized forms exist:
//! - a text grammar `(count:N,mean:M,min:MIN,max:MAX,variance:V)` used by the
//!   inspection surface (note the text form carries *variance*, not `m2`);
//! - a big-endian 40-byte binary form, five fields in declared order.
//!
//! A third, native-endian raw form is used only inside the checkpoint file
//! and lives with the entry codec in the store crate's vocabulary; the
//! helpers here expose the field-order encode/decode both endiannesses share.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Serialized width of an `RStats`: one i64 plus four f64s.
pub const RSTATS_WIRE_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RStats {
    count: i64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RStats {
    fn default() -> Self {
        Self::empty()
    }
}

impl RStats {
    /// Canonical empty state.
    pub const fn empty() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }

    pub fn from_value(value: f64) -> Self {
        Self {
            count: 1,
            mean: value,
            m2: 0.0,
            min: value,
            max: value,
        }
    }

    /// Fold one observation in.
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self::from_value(value);
            return;
        }

        let new_count = self.count + 1;
        let delta = value - self.mean;

        self.count = new_count;
        self.mean += delta / new_count as f64;

        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    /// True when no value has been folded in yet.
    ///
    /// An empty value must be canonical; `count == 0` with any non-zero
    /// field is reported as corruption rather than silently treated as
    /// empty, so deserialization bugs surface instead of propagating.
    pub fn is_empty(&self) -> Result<bool> {
        if self.count > 0 {
            return Ok(false);
        }
        if self.mean != 0.0 || self.m2 != 0.0 || self.min != 0.0 || self.max != 0.0 {
            return Err(Error::Corruption(format!(
                "RStats with count=0 has non-zero fields: mean={}, m2={}, min={}, max={}",
                self.mean, self.m2, self.min, self.max
            )));
        }
        Ok(true)
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Sample variance, `m2 / (count - 1)`; zero below two observations.
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            0.0
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Field lookup by name, for the `->`-style accessor of the inspection
    /// surface. Valid names: count, mean, variance, stddev, min, max.
    pub fn get_field(&self, name: &str) -> Result<f64> {
        match name {
            "count" => Ok(self.count as f64),
            "mean" => Ok(self.mean),
            "variance" => Ok(self.variance()),
            "stddev" => Ok(self.stddev()),
            "min" => Ok(self.min),
            "max" => Ok(self.max),
            other => Err(Error::BadInput(format!(
                "invalid field name for running statistics: \"{other}\" \
                 (valid names are: count, mean, variance, stddev, min, max)"
            ))),
        }
    }

    /// Shared semantic validation for every decode path.
    fn validate(count: i64, mean: f64, m2: f64, min: f64, max: f64) -> Result<()> {
        if count < 0 {
            return Err(Error::Corruption(format!(
                "RStats count must be non-negative, got {count}"
            )));
        }
        if count == 0 && (mean != 0.0 || m2 != 0.0 || min != 0.0 || max != 0.0) {
            return Err(Error::Corruption(format!(
                "RStats with count=0 must have all zero fields, got mean={mean}, m2={m2}, \
                 min={min}, max={max}"
            )));
        }
        if count > 0 {
            if m2 < 0.0 {
                return Err(Error::Corruption(format!(
                    "RStats variance must be non-negative, got m2={m2}"
                )));
            }
            if min > max {
                return Err(Error::Corruption(format!(
                    "RStats min ({min}) cannot exceed max ({max})"
                )));
            }
        }
        Ok(())
    }

    fn from_fields(count: i64, mean: f64, m2: f64, min: f64, max: f64) -> Result<Self> {
        Self::validate(count, mean, m2, min, max)?;
        Ok(Self {
            count,
            mean,
            m2,
            min,
            max,
        })
    }

    /// Big-endian binary form: five fields in declared order.
    pub fn to_be_bytes(&self) -> Result<[u8; RSTATS_WIRE_LEN]> {
        Self::validate(self.count, self.mean, self.m2, self.min, self.max)?;
        let mut out = [0u8; RSTATS_WIRE_LEN];
        out[0..8].copy_from_slice(&self.count.to_be_bytes());
        out[8..16].copy_from_slice(&self.mean.to_be_bytes());
        out[16..24].copy_from_slice(&self.m2.to_be_bytes());
        out[24..32].copy_from_slice(&self.min.to_be_bytes());
        out[32..40].copy_from_slice(&self.max.to_be_bytes());
        Ok(out)
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RSTATS_WIRE_LEN {
            return Err(Error::Corruption(format!(
                "short RStats binary value: {} bytes, expected {RSTATS_WIRE_LEN}",
                bytes.len()
            )));
        }
        let count = i64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let mean = f64::from_be_bytes(bytes[8..16].try_into().unwrap());
        let m2 = f64::from_be_bytes(bytes[16..24].try_into().unwrap());
        let min = f64::from_be_bytes(bytes[24..32].try_into().unwrap());
        let max = f64::from_be_bytes(bytes[32..40].try_into().unwrap());
        Self::from_fields(count, mean, m2, min, max)
    }

    /// Native-endian raw form used inside checkpoint entries. Same field
    /// order and validation as the big-endian path.
    pub fn write_ne(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.count.to_ne_bytes());
        out.extend_from_slice(&self.mean.to_ne_bytes());
        out.extend_from_slice(&self.m2.to_ne_bytes());
        out.extend_from_slice(&self.min.to_ne_bytes());
        out.extend_from_slice(&self.max.to_ne_bytes());
    }

    pub fn from_ne_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RSTATS_WIRE_LEN {
            return Err(Error::Corruption(format!(
                "short RStats raw value: {} bytes, expected {RSTATS_WIRE_LEN}",
                bytes.len()
            )));
        }
        let count = i64::from_ne_bytes(bytes[0..8].try_into().unwrap());
        let mean = f64::from_ne_bytes(bytes[8..16].try_into().unwrap());
        let m2 = f64::from_ne_bytes(bytes[16..24].try_into().unwrap());
        let min = f64::from_ne_bytes(bytes[24..32].try_into().unwrap());
        let max = f64::from_ne_bytes(bytes[32..40].try_into().unwrap());
        Self::from_fields(count, mean, m2, min, max)
    }
}

impl fmt::Display for RStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(count:{},mean:{},min:{},max:{},variance:{})",
            self.count,
            self.mean,
            self.min,
            self.max,
            self.variance()
        )
    }
}

impl FromStr for RStats {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        fn syntax(s: &str) -> Error {
            Error::BadInput(format!(
                "invalid input syntax for running statistics: \"{s}\" \
                 (expected (count:N,mean:M,min:MIN,max:MAX,variance:V))"
            ))
        }

        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| syntax(s))?;

        fn next_field<'a>(
            parts: &mut std::str::Split<'a, char>,
            name: &str,
        ) -> Option<&'a str> {
            parts.next()?.strip_prefix(name)?.strip_prefix(':')
        }

        let mut parts = inner.split(',');
        let mut field = |name: &str| next_field(&mut parts, name).ok_or_else(|| syntax(s));

        let count: i64 = field("count")?.parse().map_err(|_| syntax(s))?;
        let mean: f64 = field("mean")?.parse().map_err(|_| syntax(s))?;
        let min: f64 = field("min")?.parse().map_err(|_| syntax(s))?;
        let max: f64 = field("max")?.parse().map_err(|_| syntax(s))?;
        let variance: f64 = field("variance")?.parse().map_err(|_| syntax(s))?;
        if parts.next().is_some() {
            return Err(syntax(s));
        }

        if variance < 0.0 {
            return Err(Error::Corruption(format!(
                "RStats variance must be non-negative, got {variance}"
            )));
        }

        // The text form carries variance; recover m2 from it.
        let m2 = if count > 1 {
            variance * (count - 1) as f64
        } else {
            0.0
        };
        // count <= 1 drops the variance on the floor, so the canonical-empty
        // rule must still see the parsed value.
        if count == 0 && variance != 0.0 {
            return Err(Error::Corruption(
                "RStats with count=0 must have all zero fields".into(),
            ));
        }

        Self::from_fields(count, mean, m2, min, max)
    }
}
