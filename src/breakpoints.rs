//! Breakpoint scales
//!
//! A breakpoint scale pairs an ascending list of concentration thresholds with an
//! ascending list of index thresholds of the same length. Converting between the two
//! is piecewise-linear interpolation between neighbouring breakpoints, with a linear
//! extrapolation through the origin beyond the last one.
//!
//! All arithmetic is done in `f64`. Narrowing any intermediate value to `f32`
//! changes the rounded index for some inputs.

/// Two parallel ascending threshold sequences
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakpointScale {
    concentrations: &'static [f64],
    indexes: &'static [f64],
}

impl BreakpointScale {
    pub const fn new(concentrations: &'static [f64], indexes: &'static [f64]) -> Self {
        Self {
            concentrations,
            indexes,
        }
    }

    /// Concentration thresholds, first one is zero
    pub fn concentrations(&self) -> &'static [f64] {
        self.concentrations
    }

    /// Index thresholds, first one is zero
    pub fn indexes(&self) -> &'static [f64] {
        self.indexes
    }

    /// Both sequences strictly ascending and of equal, non-zero length
    pub fn is_well_formed(&self) -> bool {
        fn ascending(values: &[f64]) -> bool {
            values.windows(2).all(|w| w[0] < w[1])
        }

        !self.concentrations.is_empty()
            && self.concentrations.len() == self.indexes.len()
            && ascending(self.concentrations)
            && ascending(self.indexes)
    }

    /// Level of a concentration on this scale
    ///
    /// A concentration of exactly zero sits on level 0. Missing, negative or
    /// non-finite concentrations have no level.
    pub fn concentration_level(&self, concentration: Option<f64>) -> Option<usize> {
        let cp = concentration?;
        if cp < 0.0 || !cp.is_finite() {
            return None;
        }
        if cp > 0.0 {
            last_exceeded(cp, self.concentrations)
        } else {
            Some(0)
        }
    }

    /// Convert a concentration into an index on this scale
    ///
    /// # Returns
    /// `None` when the concentration is missing, negative, non-finite or would
    /// index beyond `u32::MAX`, otherwise a non-negative integer index.
    pub fn index(&self, concentration: Option<f64>) -> Option<u32> {
        let level = self.concentration_level(concentration)?;
        let cp = concentration?;
        let last = self.concentrations.len() - 1;

        let index = if level < last {
            interpolate_index(
                cp,
                self.concentrations[level],
                self.concentrations[level + 1],
                self.indexes[level],
                self.indexes[level + 1],
            )
        } else {
            // Keep producing a linear index above the last breakpoint
            cp * self.indexes[last] / self.concentrations[last]
        };

        let index = index.round().max(0.0);
        if index > f64::from(u32::MAX) {
            return None;
        }
        Some(index as u32)
    }

    /// Convert an index back into a concentration on this scale
    ///
    /// Only strictly positive, finite indexes are accepted.
    pub fn concentration(&self, index: Option<f64>) -> Option<f64> {
        let aqi = index?;
        if aqi <= 0.0 || !aqi.is_finite() {
            return None;
        }
        let level = last_exceeded(aqi, self.indexes)?;
        let last = self.indexes.len() - 1;

        if level < last {
            Some(interpolate_concentration(
                aqi,
                self.concentrations[level],
                self.concentrations[level + 1],
                self.indexes[level],
                self.indexes[level + 1],
            ))
        } else {
            Some(aqi * self.concentrations[last] / self.indexes[last])
        }
    }
}

fn interpolate_index(cp: f64, bp_lo: f64, bp_hi: f64, in_lo: f64, in_hi: f64) -> f64 {
    (in_hi - in_lo) / (bp_hi - bp_lo) * (cp - bp_lo) + in_lo
}

fn interpolate_concentration(aqi: f64, bp_lo: f64, bp_hi: f64, in_lo: f64, in_hi: f64) -> f64 {
    (aqi - in_lo) * (bp_hi - bp_lo) / (in_hi - in_lo) + bp_lo
}

/// Position of the last threshold strictly below `value`
fn last_exceeded(value: f64, thresholds: &[f64]) -> Option<usize> {
    thresholds.iter().rposition(|&threshold| value > threshold)
}

/// Zero-based level of `value` against an ascending threshold list
///
/// Returns the position of the highest threshold strictly exceeded by `value`.
/// Missing values and values that exceed no threshold (zero or negative against a
/// zero-based list) have no level.
pub fn level_of(value: Option<f64>, thresholds: &[f64]) -> Option<usize> {
    last_exceeded(value?, thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINEAR: BreakpointScale =
        BreakpointScale::new(&[0.0, 10.0, 20.0, 40.0], &[0.0, 50.0, 100.0, 200.0]);

    #[test]
    fn test_well_formed() {
        assert!(LINEAR.is_well_formed());
        assert!(!BreakpointScale::new(&[0.0, 10.0], &[0.0, 50.0, 100.0]).is_well_formed());
        assert!(!BreakpointScale::new(&[0.0, 10.0, 10.0], &[0.0, 50.0, 100.0]).is_well_formed());
        assert!(!BreakpointScale::new(&[], &[]).is_well_formed());
    }

    #[test]
    fn test_index_interpolation() {
        assert_eq!(LINEAR.index(Some(0.0)), Some(0));
        assert_eq!(LINEAR.index(Some(5.0)), Some(25));
        assert_eq!(LINEAR.index(Some(10.0)), Some(50));
        assert_eq!(LINEAR.index(Some(15.0)), Some(75));
        assert_eq!(LINEAR.index(Some(30.0)), Some(150));
    }

    #[test]
    fn test_index_extrapolation() {
        assert_eq!(LINEAR.index(Some(40.0)), Some(200));
        assert_eq!(LINEAR.index(Some(80.0)), Some(400));
    }

    #[test]
    fn test_index_out_of_range() {
        assert_eq!(LINEAR.index(Some(f64::INFINITY)), None);
        assert_eq!(LINEAR.concentration_level(Some(f64::INFINITY)), None);
        // 5e9 does not fit in u32
        assert_eq!(LINEAR.index(Some(1e9)), None);
        assert_eq!(LINEAR.index(Some(1e12)), None);
        assert_eq!(LINEAR.index(Some(800_000_000.0)), Some(4_000_000_000));

        assert_eq!(LINEAR.concentration(Some(f64::INFINITY)), None);
        assert_eq!(LINEAR.concentration(Some(f64::NAN)), None);
    }

    #[test]
    fn test_index_rejects_missing_and_negative() {
        assert_eq!(LINEAR.index(None), None);
        assert_eq!(LINEAR.index(Some(-0.1)), None);
        assert_eq!(LINEAR.index(Some(f64::NAN)), None);
    }

    #[test]
    fn test_concentration_level() {
        assert_eq!(LINEAR.concentration_level(Some(0.0)), Some(0));
        assert_eq!(LINEAR.concentration_level(Some(10.0)), Some(0));
        assert_eq!(LINEAR.concentration_level(Some(10.1)), Some(1));
        assert_eq!(LINEAR.concentration_level(Some(100.0)), Some(3));
        assert_eq!(LINEAR.concentration_level(Some(-1.0)), None);
    }

    #[test]
    fn test_concentration_reverse() {
        assert_eq!(LINEAR.concentration(None), None);
        assert_eq!(LINEAR.concentration(Some(0.0)), None);
        assert_eq!(LINEAR.concentration(Some(-3.0)), None);
        assert!((LINEAR.concentration(Some(25.0)).unwrap() - 5.0).abs() < 1e-9);
        assert!((LINEAR.concentration(Some(150.0)).unwrap() - 30.0).abs() < 1e-9);
        assert!((LINEAR.concentration(Some(400.0)).unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_of() {
        let thresholds = [0.0, 50.0, 100.0];
        assert_eq!(level_of(None, &thresholds), None);
        assert_eq!(level_of(Some(-5.0), &thresholds), None);
        assert_eq!(level_of(Some(0.0), &thresholds), None);
        assert_eq!(level_of(Some(1.0), &thresholds), Some(0));
        assert_eq!(level_of(Some(50.0), &thresholds), Some(0));
        assert_eq!(level_of(Some(50.5), &thresholds), Some(1));
        assert_eq!(level_of(Some(1000.0), &thresholds), Some(2));
    }
}
