//! Kubernetes resource quantity parsing
//!
//! `k8s_openapi` carries quantities as opaque strings. Values that end up
//! in pod specs are checked here against the apimachinery grammar:
//!
//! ```text
//! <quantity> ::= <sign><number><suffix>
//! <number>   ::= <digits> | <digits>.<digits> | <digits>. | .<digits>
//! <suffix>   ::= Ki | Mi | Gi | Ti | Pi | Ei
//!              | n | u | m | "" | k | M | G | T | P | E
//!              | e<sign><digits> | E<sign><digits>
//! ```
//!
//! The canonical form drops a leading `+`, redundant leading zeros of the
//! integer part and trailing zeros of the fraction. The suffix is kept
//! as written.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::Error;

const BINARY_SI: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SI: [&str; 10] = ["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

/// Parse a quantity string, returning it in canonical form
pub fn parse_quantity(input: &str) -> Result<Quantity, Error> {
    let value = input.trim();
    if value.is_empty() {
        return Err(Error::invalid_quantity(input, "empty quantity"));
    }

    let (negative, unsigned) = match value.as_bytes()[0] {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    let (integer, fraction) = match number.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (number, None),
    };
    if integer.is_empty() && fraction.map_or(true, str::is_empty) {
        return Err(Error::invalid_quantity(input, "missing numeric part"));
    }
    if fraction.is_some_and(|f| f.contains('.')) {
        return Err(Error::invalid_quantity(input, "more than one decimal point"));
    }

    if !is_valid_suffix(suffix) {
        return Err(Error::invalid_quantity(
            input,
            format!("unknown suffix '{}'", suffix),
        ));
    }

    Ok(Quantity(canonical(negative, integer, fraction, suffix)))
}

fn is_valid_suffix(suffix: &str) -> bool {
    if BINARY_SI.contains(&suffix) || DECIMAL_SI.contains(&suffix) {
        return true;
    }
    match suffix.strip_prefix(['e', 'E']) {
        Some(exponent) => {
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn canonical(negative: bool, integer: &str, fraction: Option<&str>, suffix: &str) -> String {
    let integer = integer.trim_start_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    let fraction = fraction.map(|f| f.trim_end_matches('0')).unwrap_or("");

    let is_zero = integer == "0" && fraction.is_empty();
    let sign = if negative && !is_zero { "-" } else { "" };

    if fraction.is_empty() {
        format!("{}{}{}", sign, integer, suffix)
    } else {
        format!("{}{}.{}{}", sign, integer, fraction, suffix)
    }
}
