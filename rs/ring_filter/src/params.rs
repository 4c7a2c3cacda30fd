use std::f64::consts::LN_2;

use crate::error::{Result, RingError};

/// Dimensions of a ring filter: `bit_count` (m) and `round_count` (k).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    pub bit_count: u64,
    pub round_count: u64,
}

impl FilterParams {
    /// Computes the optimal dimensions for `expected_elements` at the target false
    /// positive rate:
    ///
    /// `m = ceil(-n * ln(p) / ln(2)^2)`, `k = ceil(m / n * ln(2))`
    ///
    /// Both are rounded up, so the filter never comes out smaller than the requested
    /// error bound needs. `k` is derived from the unrounded `m`.
    pub fn calculate(expected_elements: i64, false_positive_rate: f64) -> Result<Self> {
        if expected_elements <= 0 {
            return Err(RingError::InvalidArgument(format!(
                "expected_elements must be greater than 0, got {expected_elements}"
            )));
        }
        // Negated comparison so that NaN is rejected too.
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(RingError::InvalidArgument(format!(
                "false_positive_rate must be in (0, 1), got {false_positive_rate}"
            )));
        }

        let n = expected_elements as f64;
        let m = -n * false_positive_rate.ln() / (LN_2 * LN_2);
        let k = m / n * LN_2;

        Ok(Self {
            bit_count: m.ceil() as u64,
            round_count: k.ceil() as u64,
        })
    }

    /// Length of the backing byte buffer. One byte more than strictly needed when
    /// `bit_count` is a multiple of 8, kept for wire compatibility.
    pub fn byte_len(&self) -> usize {
        (self.bit_count / 8 + 1) as usize
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.bit_count == 0 {
            return Err(RingError::InvalidArgument(
                "bit_count must be greater than 0".to_string(),
            ));
        }
        if self.round_count == 0 {
            return Err(RingError::InvalidArgument(
                "round_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_million_elements() {
        let params = FilterParams::calculate(1_000_000, 0.0001).unwrap();
        assert_eq!(params.bit_count, 19_170_117);
        // ceil(19_170_116.75 / 1_000_000 * ln 2) = ceil(13.29)
        assert_eq!(params.round_count, 14);
        assert_eq!(params.byte_len(), 2_396_265);
    }

    #[test]
    fn test_calculate_matches_formula() {
        for (n, p) in [(1000i64, 0.01f64), (1, 0.5), (10_000, 0.001), (42, 0.3)] {
            let params = FilterParams::calculate(n, p).unwrap();
            let m = -(n as f64) * p.ln() / (LN_2 * LN_2);
            assert_eq!(params.bit_count, m.ceil() as u64);
            assert_eq!(params.round_count, (m / n as f64 * LN_2).ceil() as u64);
            assert!(params.bit_count >= 1);
            assert!(params.round_count >= 1);
        }
    }

    #[test]
    fn test_calculate_small_filter() {
        let params = FilterParams::calculate(1000, 0.01).unwrap();
        assert_eq!(params.bit_count, 9586);
        assert_eq!(params.round_count, 7);
    }

    #[test]
    fn test_calculate_rejects_bad_elements() {
        assert!(matches!(
            FilterParams::calculate(0, 0.01),
            Err(RingError::InvalidArgument(_))
        ));
        assert!(matches!(
            FilterParams::calculate(-5, 0.01),
            Err(RingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_calculate_rejects_bad_rate() {
        for p in [0.0, 1.0, -0.1, 1.5, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(
                    FilterParams::calculate(100, p),
                    Err(RingError::InvalidArgument(_))
                ),
                "rate {p} should be rejected"
            );
        }
    }

    #[test]
    fn test_byte_len_has_spare_byte() {
        let params = FilterParams {
            bit_count: 16,
            round_count: 1,
        };
        assert_eq!(params.byte_len(), 3);
        let params = FilterParams {
            bit_count: 17,
            round_count: 1,
        };
        assert_eq!(params.byte_len(), 3);
    }
}
