//! Minor-unit money conversion.
//!
//! The storefront API delivers amounts as decimal strings (e.g. `"25.00"`).
//! This module converts them to integer cents deterministically so no stage
//! of the pipeline touches floating point. Two decimal places is the
//! ceiling; anything finer cannot be represented without rounding and is
//! rejected at the boundary.

use std::fmt;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while converting a decimal amount string to cents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    /// The amount string was empty or whitespace-only.
    Empty,
    /// The amount string contained non-numeric content or multiple `.`
    /// separators.
    Invalid { raw: String },
    /// The amount string carried more than 2 decimal places.
    TooManyDecimalPlaces { raw: String },
    /// The amount overflows an `i64` cent count.
    Overflow { raw: String },
}

impl fmt::Display for MoneyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoneyParseError::Empty => write!(f, "amount string is empty"),
            MoneyParseError::Invalid { raw } => {
                write!(f, "amount could not be parsed: '{raw}'")
            }
            MoneyParseError::TooManyDecimalPlaces { raw } => {
                write!(f, "amount has more than 2 decimal places: '{raw}'")
            }
            MoneyParseError::Overflow { raw } => {
                write!(f, "amount overflows cents: '{raw}'")
            }
        }
    }
}

impl std::error::Error for MoneyParseError {}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert a decimal amount string to integer cents.
///
/// Rules:
/// - Accepts an optional leading `+` or `-`.
/// - Accepts an optional fractional part separated by `.` (at most 2 digits).
/// - Rejects empty strings, non-digit characters, and multiple separators.
/// - Integer math only; no floating point at any stage.
pub fn parse_money_cents(s: &str) -> Result<i64, MoneyParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(MoneyParseError::Empty);
    }

    let (negative, digits) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(MoneyParseError::Invalid { raw: s.to_string() });
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(MoneyParseError::Invalid { raw: s.to_string() });
    }
    if frac_part.len() > 2 {
        return Err(MoneyParseError::TooManyDecimalPlaces { raw: s.to_string() });
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse::<i64>()
            .map_err(|_| MoneyParseError::Overflow { raw: s.to_string() })?
    };

    // Pad the fractional part to exactly 2 digits before parsing.
    let mut frac_padded = frac_part.to_string();
    while frac_padded.len() < 2 {
        frac_padded.push('0');
    }
    let frac_val: i64 = frac_padded
        .parse::<i64>()
        .map_err(|_| MoneyParseError::Invalid { raw: s.to_string() })?;

    let cents = int_val
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(|| MoneyParseError::Overflow { raw: s.to_string() })?;

    Ok(if negative { -cents } else { cents })
}

/// Render a cent count back to a decimal string (e.g. `-1050` -> `"-10.50"`).
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
