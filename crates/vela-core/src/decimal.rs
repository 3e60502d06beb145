//! Fixed-point decimal arithmetic for prices, quantities, and money.
//!
//! The source system represents every price, quantity, and money amount as
//! a `Decimal` quantized to a declared precision using half-up rounding.
//! Binary floating point cannot represent `0.1` exactly, so every scalar in
//! this crate is instead a scaled `i128` plus the number of fractional
//! digits it was scaled by — the same approach the teacher crate used for
//! a single fixed 1e-6 scale, generalized here to an arbitrary
//! caller-declared precision per value.
//!
//! There is intentionally no `From<i128>` or `From<f64>` impl. Construct a
//! `Decimal` from an integer-and-precision pair ([`Decimal::from_raw`]) or
//! by parsing a decimal string ([`Decimal::parse`]); convert to `f64` only
//! at a reporting boundary via [`Decimal::to_f64`].

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Upper bound on declared precision; keeps `10^precision` inside `i128`
/// with generous headroom for the multiplications `mul_rescale` performs.
pub const MAX_PRECISION: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    PrecisionTooLarge { precision: u8 },
    Malformed { input: String },
    Negative { input: String },
}

impl fmt::Display for DecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalError::PrecisionTooLarge { precision } => {
                write!(f, "precision {precision} exceeds maximum of {MAX_PRECISION}")
            }
            DecimalError::Malformed { input } => write!(f, "malformed decimal string: {input:?}"),
            DecimalError::Negative { input } => {
                write!(f, "decimal must be non-negative: {input:?}")
            }
        }
    }
}

impl std::error::Error for DecimalError {}

/// A fixed-point decimal value: `raw / 10^precision`.
#[derive(Copy, Clone, Debug)]
pub struct Decimal {
    raw: i128,
    precision: u8,
}

impl Decimal {
    /// Strip trailing zero fractional digits so that two `Decimal`s
    /// representing the same numeric value (e.g. `1.50` at precision 2 and
    /// `1.5` at precision 1) compare and hash equal.
    fn canonical(self) -> (i128, u8) {
        let mut raw = self.raw;
        let mut precision = self.precision;
        while precision > 0 && raw % 10 == 0 {
            raw /= 10;
            precision -= 1;
        }
        (raw, precision)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Decimal {}

impl std::hash::Hash for Decimal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl Decimal {
    /// Construct directly from a scaled integer and its precision.
    ///
    /// `raw` is assumed to already represent `value * 10^precision`; this
    /// is the escape hatch for callers that already have a scaled integer
    /// (e.g. deserializing a persisted value). Prefer [`Decimal::parse`]
    /// when starting from user-facing text.
    pub fn from_raw(raw: i128, precision: u8) -> Result<Self, DecimalError> {
        if precision > MAX_PRECISION {
            return Err(DecimalError::PrecisionTooLarge { precision });
        }
        Ok(Decimal { raw, precision })
    }

    /// Zero at the given precision.
    pub fn zero(precision: u8) -> Self {
        Decimal { raw: 0, precision }
    }

    /// Parse a decimal string (`"123"`, `"-4.50"`, `"0.001"`) and quantize
    /// it to `precision` fractional digits using half-up rounding.
    pub fn parse(input: &str, precision: u8) -> Result<Self, DecimalError> {
        if precision > MAX_PRECISION {
            return Err(DecimalError::PrecisionTooLarge { precision });
        }
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DecimalError::Malformed { input: input.to_string() });
        }
        let (sign, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (-1i128, rest),
            None => (1i128, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let mut parts = body.splitn(2, '.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("");
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecimalError::Malformed { input: input.to_string() });
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(DecimalError::Malformed { input: input.to_string() });
        }
        let int_val: i128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| DecimalError::Malformed { input: input.to_string() })?
        };

        let frac_len = frac_part.len() as i64;
        let target = precision as i64;
        let frac_digits: i128 = if frac_part.is_empty() {
            0
        } else {
            frac_part
                .parse()
                .map_err(|_| DecimalError::Malformed { input: input.to_string() })?
        };

        let scaled_int = int_val
            .checked_mul(pow10(precision as u32))
            .ok_or(DecimalError::Malformed { input: input.to_string() })?;

        let scaled_frac = if frac_len <= target {
            frac_digits * pow10((target - frac_len) as u32)
        } else {
            round_half_up_div_pow10(frac_digits, (frac_len - target) as u32)
        };

        let raw = sign * (scaled_int + scaled_frac);
        Ok(Decimal { raw, precision })
    }

    /// The underlying scaled integer (`value * 10^precision`).
    pub fn raw(self) -> i128 {
        self.raw
    }

    pub fn precision(self) -> u8 {
        self.precision
    }

    pub fn is_negative(self) -> bool {
        self.raw < 0
    }

    pub fn is_non_negative(self) -> bool {
        self.raw >= 0
    }

    pub fn is_zero(self) -> bool {
        self.raw == 0
    }

    pub fn signum(self) -> i32 {
        self.raw.signum() as i32
    }

    pub fn abs(self) -> Self {
        Decimal { raw: self.raw.abs(), precision: self.precision }
    }

    /// Re-express this value at a different precision, rounding half-up
    /// when narrowing.
    pub fn rescale(self, precision: u8) -> Self {
        if precision == self.precision {
            return self;
        }
        if precision > self.precision {
            let raw = self.raw * pow10((precision - self.precision) as u32);
            Decimal { raw, precision }
        } else {
            let raw = round_half_up_div_pow10(self.raw, (self.precision - precision) as u32);
            Decimal { raw, precision }
        }
    }

    /// Multiply two decimals and quantize the exact product to
    /// `out_precision` with half-up rounding. Used for notional and
    /// commission calculations (`qty * price`, `notional * fee_rate`).
    pub fn mul_rescale(self, rhs: Decimal, out_precision: u8) -> Self {
        let product_precision = self.precision as u32 + rhs.precision as u32;
        let product_raw = self.raw * rhs.raw;
        let product = Decimal { raw: product_raw, precision: product_precision as u8 };
        product.rescale(out_precision)
    }

    pub fn to_f64(self) -> f64 {
        self.raw as f64 / pow10(self.precision as u32) as f64
    }

    fn common_precision(self, rhs: Decimal) -> u8 {
        self.precision.max(rhs.precision)
    }
}

fn pow10(n: u32) -> i128 {
    10i128.pow(n)
}

fn round_half_up_div_pow10(raw: i128, n: u32) -> i128 {
    if n == 0 {
        return raw;
    }
    let divisor = pow10(n);
    let sign = if raw < 0 { -1i128 } else { 1i128 };
    let magnitude = raw.abs();
    let quotient = magnitude / divisor;
    let remainder = magnitude % divisor;
    let rounded = if remainder * 2 >= divisor { quotient + 1 } else { quotient };
    sign * rounded
}

impl Add for Decimal {
    type Output = Decimal;
    fn add(self, rhs: Decimal) -> Decimal {
        let p = self.common_precision(rhs);
        let a = self.rescale(p);
        let b = rhs.rescale(p);
        Decimal { raw: a.raw + b.raw, precision: p }
    }
}

impl Sub for Decimal {
    type Output = Decimal;
    fn sub(self, rhs: Decimal) -> Decimal {
        let p = self.common_precision(rhs);
        let a = self.rescale(p);
        let b = rhs.rescale(p);
        Decimal { raw: a.raw - b.raw, precision: p }
    }
}

impl Neg for Decimal {
    type Output = Decimal;
    fn neg(self) -> Decimal {
        Decimal { raw: -self.raw, precision: self.precision }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let p = self.common_precision(*other);
        self.rescale(p).raw.cmp(&other.rescale(p).raw)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.precision == 0 {
            return write!(f, "{}", self.raw);
        }
        let divisor = pow10(self.precision as u32);
        let sign = if self.raw < 0 { "-" } else { "" };
        let magnitude = self.raw.abs();
        let int_part = magnitude / divisor;
        let frac_part = magnitude % divisor;
        write!(f, "{sign}{int_part}.{frac_part:0width$}", width = self.precision as usize)
    }
}
