//! Discrete load levels and accuracy-aware rounding.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{GatError, GatResult};

/// Tolerance under which two floating point knob values are the same point.
pub const DOUBLE_EPSILON: f64 = 1e-9;

/// Ordered load levels `0, a, 2a, ... < 100` plus the mandatory `100` endpoint.
///
/// Levels are addressed by their index (`var_id`); indices grow with value and
/// [`DiscreteLevels::var_id_100`] is always the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteLevels {
    values: Vec<f64>,
}

impl DiscreteLevels {
    /// Builds the levels for an integer accuracy (percent step) in `[1, 100]`.
    pub fn new(accuracy: u32) -> GatResult<Self> {
        if accuracy == 0 || accuracy > 100 {
            return Err(GatError::IncoherentAccuracy(accuracy));
        }
        let values = (0..100)
            .step_by(accuracy as usize)
            .map(f64::from)
            .chain(std::iter::once(100.0))
            .collect();
        Ok(DiscreteLevels { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, var_id: usize) -> f64 {
        self.values[var_id]
    }

    pub fn var_id_100(&self) -> usize {
        self.values.len() - 1
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Index of the level equal to `value` within [`DOUBLE_EPSILON`].
    pub fn position(&self, value: f64) -> Option<usize> {
        self.values
            .iter()
            .position(|level| (level - value).abs() < DOUBLE_EPSILON)
    }
}

/// Decimal multiplier matching the precision of an accuracy (`0.01` gives `100`).
pub fn accuracy_multiplier(accuracy: f64) -> f64 {
    let digits = (-accuracy.log10() - DOUBLE_EPSILON).ceil().max(0.0);
    10f64.powi(digits as i32)
}

/// Rounds `value` to the decimal precision of `accuracy`, ties going down.
///
/// `round_to_accuracy(6.5, 1.0)` is `6`, `round_to_accuracy(0.125, 0.01)` is `0.12`.
pub fn round_to_accuracy(value: f64, accuracy: f64) -> f64 {
    let multiplier = accuracy_multiplier(accuracy);
    round_half_down(value * multiplier) / multiplier
}

/// Rounds to the nearest integer, ties toward negative infinity.
///
/// The epsilon absorbs representation noise such as `0.15 * 10 = 1.5000000000000002`
/// so that those values still count as ties.
pub fn round_half_down(value: f64) -> f64 {
    (value - 0.5 - DOUBLE_EPSILON).ceil()
}

/// Float key whose equality is "closer than [`DOUBLE_EPSILON`]".
///
/// Only meaningful for keys that are either equal or well separated, which is
/// the case for rounded knob values.
#[derive(Debug, Clone, Copy)]
pub struct ApproxKey(pub f64);

impl PartialEq for ApproxKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ApproxKey {}

impl PartialOrd for ApproxKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ApproxKey {
    fn cmp(&self, other: &Self) -> Ordering {
        if (self.0 - other.0).abs() < DOUBLE_EPSILON {
            Ordering::Equal
        } else {
            self.0.total_cmp(&other.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_include_the_100_endpoint() {
        let levels = DiscreteLevels::new(30).unwrap();
        assert_eq!(levels.values(), &[0.0, 30.0, 60.0, 90.0, 100.0]);
        assert_eq!(levels.var_id_100(), 4);

        let levels = DiscreteLevels::new(50).unwrap();
        assert_eq!(levels.values(), &[0.0, 50.0, 100.0]);

        let levels = DiscreteLevels::new(100).unwrap();
        assert_eq!(levels.values(), &[0.0, 100.0]);
    }

    #[test]
    fn levels_reject_incoherent_accuracy() {
        assert!(matches!(
            DiscreteLevels::new(0),
            Err(GatError::IncoherentAccuracy(0))
        ));
        assert!(DiscreteLevels::new(101).is_err());
    }

    #[test]
    fn position_is_tolerant() {
        let levels = DiscreteLevels::new(5).unwrap();
        assert_eq!(levels.position(10.0 + 1e-12), Some(2));
        assert_eq!(levels.position(12.0), None);
    }

    #[test]
    fn ties_round_down() {
        assert_eq!(round_to_accuracy(6.5, 1.0), 6.0);
        assert_eq!(round_to_accuracy(6.51, 1.0), 7.0);
        assert_eq!(round_to_accuracy(0.15, 0.1), 0.1);
        assert_eq!(round_to_accuracy(0.125, 0.01), 0.12);
        assert_eq!(round_to_accuracy(-0.5, 1.0), -1.0);
    }

    #[test]
    fn rounding_is_idempotent() {
        for raw in [0.0, 1.234, 2.5, 7.75, 9.999] {
            for accuracy in [1.0, 0.1, 0.05, 0.01] {
                let once = round_to_accuracy(raw, accuracy);
                assert_eq!(round_to_accuracy(once, accuracy), once);
            }
        }
    }

    #[test]
    fn approx_keys_collapse_close_values() {
        use std::collections::BTreeMap;
        let mut map = BTreeMap::new();
        map.insert(ApproxKey(1.0), "a");
        map.insert(ApproxKey(1.0 + 1e-12), "b");
        map.insert(ApproxKey(2.0), "c");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&ApproxKey(1.0)), Some(&"b"));
    }
}
