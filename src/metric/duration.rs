//! Duration literals, as found in access logs once a unit has been glued on.
//!
//! A literal is an optionally signed sequence of decimal numbers, each with an
//! optional fraction and a mandatory unit suffix, such as `"10s"`, `"1.5ms"`
//! or `"1h30m"`. Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.
//! A lone `"0"` needs no unit.

const NANOS_PER_MILLI: i64 = 1_000_000;
// fraction digits beyond this denominator are dropped
const MAX_FRACTION_SCALE: u64 = 1_000_000_000_000_000_000;

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(60 * 60 * 1_000_000_000),
        _ => None,
    }
}

/// Determine if `unit` is one of the duration unit suffixes.
pub fn is_unit(unit: &str) -> bool {
    unit_nanos(unit).is_some()
}

fn digits_end(s: &str) -> usize {
    s.find(|c: char| !c.is_ascii_digit()).unwrap_or_else(|| s.len())
}

/// Parse a duration literal into nanoseconds.
pub fn parse_nanos(literal: &str) -> Result<i64, String> {
    let invalid = || format!("invalid duration {:?}", literal);
    let overflow = || format!("duration {:?} overflows", literal);

    let mut rest = literal;
    let negative = rest.starts_with('-');
    if negative || rest.starts_with('+') {
        rest = &rest[1..];
    }
    if rest == "0" {
        return Ok(0);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !rest.is_empty() {
        let (whole, after) = rest.split_at(digits_end(rest));
        let (fraction, after) = if after.starts_with('.') {
            let after = &after[1..];
            after.split_at(digits_end(after))
        } else {
            ("", after)
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let unit_end = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or_else(|| after.len());
        let (unit, after) = after.split_at(unit_end);
        let scale = match unit_nanos(unit) {
            Some(scale) => scale,
            None if unit.is_empty() => {
                return Err(format!("missing unit in duration {:?}", literal))
            }
            None => return Err(format!("unknown unit {:?} in duration {:?}", unit, literal)),
        };

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        let mut numerator: u64 = 0;
        let mut denominator: u64 = 1;
        for digit in fraction.bytes() {
            if denominator >= MAX_FRACTION_SCALE {
                break;
            }
            numerator = numerator * 10 + u64::from(digit - b'0');
            denominator *= 10;
        }
        let fractional = (u128::from(numerator) * u128::from(scale)) / u128::from(denominator);
        nanos = nanos
            .checked_add(fractional as u64)
            .ok_or_else(overflow)?;

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        rest = after;
    }

    if total > i64::max_value() as u64 {
        return Err(overflow());
    }
    let total = total as i64;
    Ok(if negative { -total } else { total })
}

/// Parse a duration literal and truncate it to whole milliseconds.
pub fn parse_millis(literal: &str) -> Result<i64, String> {
    parse_nanos(literal).map(|nanos| nanos / NANOS_PER_MILLI)
}
