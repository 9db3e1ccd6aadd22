use crate::UnitValue;

/// A closed interval between a minimum and a maximum value.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Interval<T> {
    min: T,
    max: T,
}

impl<T: PartialOrd + Copy> Interval<T> {
    /// Panics if `min > max`. Use [`Interval::try_new`] for unvalidated input.
    pub fn new(min: T, max: T) -> Interval<T> {
        assert!(min <= max, "interval min must not be greater than max");
        Interval { min, max }
    }

    /// Fails if `min > max`. Intended for construction from configuration
    /// data, where violated ranges must be rejected at load time.
    pub fn try_new(min: T, max: T) -> Result<Interval<T>, &'static str> {
        if min > max {
            return Err("interval min is greater than max");
        }
        Ok(Interval { min, max })
    }

    pub fn min_val(&self) -> T {
        self.min
    }

    pub fn max_val(&self) -> T {
        self.max
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }
}

impl Interval<UnitValue> {
    /// Distance between the bounds.
    pub fn span(&self) -> f64 {
        self.max.get() - self.min.get()
    }

    pub fn is_degenerate(&self) -> bool {
        self.span() == 0.0
    }
}

pub fn full_unit_interval() -> Interval<UnitValue> {
    Interval::new(UnitValue::MIN, UnitValue::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_new_rejects_inverted_bounds() {
        assert!(Interval::try_new(UnitValue::new(0.6), UnitValue::new(0.4)).is_err());
        assert!(Interval::try_new(UnitValue::new(0.4), UnitValue::new(0.4)).is_ok());
    }

    #[test]
    fn contains() {
        let interval = Interval::new(UnitValue::new(0.25), UnitValue::new(0.75));
        assert!(interval.contains(UnitValue::new(0.25)));
        assert!(interval.contains(UnitValue::new(0.5)));
        assert!(!interval.contains(UnitValue::new(0.76)));
    }
}
