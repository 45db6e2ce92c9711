//! Order-independent result digest
//!
//! Every value contributes `(column + 1) * hash(value)` to a running sum kept
//! modulo [`DIGEST_MODULUS`]. Addition commutes, so row order does not matter;
//! column position still does.

use sha2::{Digest as _, Sha256};

use crate::session::Value;

/// Stand-in hash for NULL
pub const NULL_SENTINEL: u64 = 38463209;

/// Bound the running digest is reduced by after every value
pub const DIGEST_MODULUS: u64 = i64::MAX as u64;

/// Significant digits kept from floating-point values
const FLOAT_SIGNIFICANT_DIGITS: i32 = 6;

/// Largest magnitude at which every integral f64 is exactly an i64
const EXACT_INTEGRAL_F64: f64 = 9_007_199_254_740_992.0;

/// Round to six digits counted from the decimal point's position in the
/// fixed-point rendering. Engines return floats whose trailing digits vary
/// from run to run.
pub fn round_float(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let text = format!("{:.6}", value);
    let Some(dot) = text.find('.') else {
        return value;
    };
    let digits = FLOAT_SIGNIFICANT_DIGITS - dot as i32;
    let rounded = if digits >= 0 {
        let scale = 10f64.powi(digits);
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(-digits);
        (value / scale).round() * scale
    };
    // -0.0 and 0.0 must hash the same
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// The value that actually gets hashed: NULL becomes the sentinel, floats are rounded
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Null => Value::Int(NULL_SENTINEL as i64),
        Value::Float(v) => Value::Float(round_float(*v)),
        other => other.clone(),
    }
}

fn int_hash(value: i64) -> u64 {
    (value as i128).rem_euclid(DIGEST_MODULUS as i128) as u64
}

fn bytes_hash(tag: u8, bytes: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update([tag]);
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % DIGEST_MODULUS
}

/// Hash that is stable across processes, platforms and toolchains
///
/// Integers hash to themselves, so integral floats and booleans collide with
/// the equal integer.
pub fn stable_hash(value: &Value) -> u64 {
    match normalize(value) {
        Value::Null => NULL_SENTINEL,
        Value::Bool(b) => b as u64,
        Value::Int(i) => int_hash(i),
        Value::Float(v) => {
            if v.fract() == 0.0 && v.abs() < EXACT_INTEGRAL_F64 {
                int_hash(v as i64)
            } else {
                bytes_hash(b'f', &v.to_bits().to_be_bytes())
            }
        }
        Value::Text(s) => bytes_hash(b's', s.as_bytes()),
    }
}

/// Running digest over a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultDigest {
    value: u64,
}

impl Default for ResultDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultDigest {
    pub fn new() -> Self {
        Self { value: 1 }
    }

    /// Fold in one value at `column` (0-based); returns the running digest
    pub fn add(&mut self, column: usize, value: &Value) -> u64 {
        let weighted = (column as u128 + 1) * stable_hash(value) as u128;
        self.value = ((self.value as u128 + weighted) % DIGEST_MODULUS as u128) as u64;
        self.value
    }

    pub fn add_row(&mut self, row: &[Value]) -> u64 {
        for (column, value) in row.iter().enumerate() {
            self.add(column, value);
        }
        self.value
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Digest of a complete in-memory result set
pub fn digest_rows<'a, I>(rows: I) -> u64
where
    I: IntoIterator<Item = &'a Vec<Value>>,
{
    let mut digest = ResultDigest::new();
    for row in rows {
        digest.add_row(row);
    }
    digest.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_float_keeps_six_digits_from_point() {
        assert_eq!(round_float(3.14159265), 3.14159);
        assert_eq!(round_float(-3.14159265), -3.1416);
        assert_eq!(round_float(12345678.9), 12345700.0);
        assert_eq!(round_float(0.000123456789), 0.00012);
        assert_eq!(round_float(-0.0000001), 0.0);
    }

    #[test]
    fn test_round_float_non_finite_unchanged() {
        assert!(round_float(f64::NAN).is_nan());
        assert_eq!(round_float(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn test_float_noise_is_ignored() {
        assert_eq!(
            stable_hash(&Value::Float(2.718281828459)),
            stable_hash(&Value::Float(2.718281828461))
        );
        assert_ne!(
            stable_hash(&Value::Float(2.71828)),
            stable_hash(&Value::Float(2.71838))
        );
    }

    #[test]
    fn test_null_uses_sentinel() {
        assert_eq!(stable_hash(&Value::Null), NULL_SENTINEL);
        let mut digest = ResultDigest::new();
        digest.add(2, &Value::Null);
        assert_eq!(digest.value(), 1 + 3 * NULL_SENTINEL);
    }

    #[test]
    fn test_integers_hash_to_themselves() {
        assert_eq!(stable_hash(&Value::Int(42)), 42);
        assert_eq!(stable_hash(&Value::Int(-1)), DIGEST_MODULUS - 1);
        assert_eq!(stable_hash(&Value::Float(42.0)), 42);
        assert_eq!(stable_hash(&Value::Bool(true)), 1);
    }

    #[test]
    fn test_text_hash_is_stable_and_distinct() {
        let a = stable_hash(&Value::Text("impala".into()));
        assert_eq!(a, stable_hash(&Value::Text("impala".into())));
        assert_ne!(a, stable_hash(&Value::Text("Impala".into())));
        assert!(a < DIGEST_MODULUS);
    }

    #[test]
    fn test_row_order_does_not_matter() {
        let rows = vec![
            vec![Value::Int(1), Value::Null, Value::Text("a".into())],
            vec![Value::Int(2), Value::Float(3.14159265), Value::Text("b".into())],
            vec![Value::Int(3), Value::Float(-0.5), Value::Null],
        ];
        let mut reversed = rows.clone();
        reversed.reverse();
        let mut rotated = rows.clone();
        rotated.rotate_left(1);

        let expected = digest_rows(&rows);
        assert_eq!(digest_rows(&reversed), expected);
        assert_eq!(digest_rows(&rotated), expected);
    }

    #[test]
    fn test_column_position_matters() {
        let a = vec![vec![Value::Int(1), Value::Int(2)]];
        let b = vec![vec![Value::Int(2), Value::Int(1)]];
        assert_ne!(digest_rows(&a), digest_rows(&b));
    }

    #[test]
    fn test_digest_stays_below_modulus() {
        let mut digest = ResultDigest::new();
        for column in 0..64 {
            digest.add(column, &Value::Int(i64::MAX - 1));
            assert!(digest.value() < DIGEST_MODULUS);
        }
    }

    #[test]
    fn test_empty_result_digest() {
        let rows: Vec<Vec<Value>> = Vec::new();
        assert_eq!(digest_rows(&rows), 1);
    }
}
