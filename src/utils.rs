use crate::errors::ConcunoError;

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), ConcunoError> {
    validate_float_parameter(value, 0.0, f64::INFINITY, parameter)
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), ConcunoError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(ConcunoError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_positive_count(value: usize, parameter: &str) -> Result<(), ConcunoError> {
    if value == 0 {
        Err(ConcunoError::InvalidParameter(
            parameter.to_string(),
            "a count of at least 1".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Fraction of positives, 0 for an empty set.
#[inline]
pub fn positive_fraction(positive: usize, negative: usize) -> f64 {
    let total = positive + negative;
    if total == 0 {
        0.0
    } else {
        positive as f64 / total as f64
    }
}

/// Gini impurity of a two class count.
#[inline]
pub fn gini(positive: usize, negative: usize) -> f64 {
    if positive + negative == 0 {
        return 0.0;
    }
    let p = positive_fraction(positive, negative);
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

/// Entropy in bits of a two class count.
#[inline]
pub fn entropy(positive: usize, negative: usize) -> f64 {
    let p = positive_fraction(positive, negative);
    let h = |q: f64| if q <= 0.0 { 0.0 } else { -q * q.log2() };
    if positive + negative == 0 {
        0.0
    } else {
        h(p) + h(1.0 - p)
    }
}

/// `n ln p`, taking `0 ln 0` as 0 and clamping `p` away from 0.
#[inline]
pub fn count_log(n: usize, p: f64) -> f64 {
    if n == 0 {
        0.0
    } else {
        n as f64 * p.max(f64::EPSILON).ln()
    }
}

/// Thresholds halfway between consecutive distinct values. The input must be
/// sorted. Each threshold `t` between `a < b` satisfies `a < t <= b`.
pub fn midpoints(sorted: &[f64]) -> Vec<f64> {
    let mut thresholds = Vec::new();
    for w in sorted.windows(2) {
        let (a, b) = (w[0], w[1]);
        if a < b {
            let mid = a + (b - a) / 2.0;
            thresholds.push(if mid > a { mid } else { b });
        }
    }
    thresholds
}
