use serde::{Deserialize, Serialize};

/// Largest price we hand out: every whole number up to here is exact in
/// an `f64` and in a JSON number read by a JavaScript client
pub const MAX_PRICE: u64 = 1 << 53;

/// How a computed selling price is snapped to a retail-friendly value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRounding {
    /// Nearest whole number, halves away from zero
    #[default]
    Whole,
    /// Nearest multiple of the step (10 -> 600, 25 -> 600, ...)
    Nearest(u32),
}

impl PriceRounding {
    /// Amounts at or below zero are 0. `None` when the amount is not finite
    /// or rounds past `MAX_PRICE`.
    pub fn round(self, amount: f64) -> Option<u64> {
        if !amount.is_finite() {
            return None;
        }
        if amount <= 0.0 {
            return Some(0);
        }

        let rounded = match self {
            PriceRounding::Nearest(step) if step > 1 => {
                let step = step as f64;
                (amount / step).round() * step
            }
            _ => amount.round(),
        };

        (rounded <= MAX_PRICE as f64).then_some(rounded as u64)
    }
}

/// `cost * (1 + margin / 100)`, rounded. `None` when the result is out of range.
pub fn selling_price(cost: f64, margin: f64, rounding: PriceRounding) -> Option<u64> {
    rounding.round(cost * (1.0 + margin / 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whole(cost: f64, margin: f64) -> u64 {
        selling_price(cost, margin, PriceRounding::Whole).unwrap()
    }

    #[test]
    fn test_whole_rounding() {
        assert_eq!(whole(499.0, 20.0), 599);
        assert_eq!(whole(100.0, 0.0), 100);
        assert_eq!(whole(399.0, 25.0), 499); // 498.75
        assert_eq!(whole(45.0, 10.0), 50); // 49.5
        assert_eq!(whole(0.0, 50.0), 0);
    }

    #[test]
    fn test_formula_holds_across_inputs() {
        for cost in [0.0_f64, 1.0, 9.99, 120.0, 499.0, 1250.5, 87_000.0] {
            for margin in [-100.0_f64, -12.5, 0.0, 7.0, 20.0, 33.3, 150.0] {
                let expected = (cost * (1.0 + margin / 100.0)).round().max(0.0) as u64;
                assert_eq!(whole(cost, margin), expected);
            }
        }
    }

    #[test]
    fn test_step_rounding() {
        assert_eq!(selling_price(499.0, 20.0, PriceRounding::Nearest(10)), Some(600));
        assert_eq!(selling_price(499.0, 20.0, PriceRounding::Nearest(50)), Some(600));
        assert_eq!(PriceRounding::Nearest(10).round(1234.0), Some(1230));
        // steps of 0 or 1 behave like whole rounding
        assert_eq!(PriceRounding::Nearest(0).round(598.8), Some(599));
        assert_eq!(PriceRounding::Nearest(1).round(598.8), Some(599));
    }

    #[test]
    fn test_never_negative() {
        assert_eq!(selling_price(100.0, -150.0, PriceRounding::Whole), Some(0));
        assert_eq!(PriceRounding::Whole.round(-0.4), Some(0));
    }

    #[test]
    fn test_out_of_range_amounts() {
        assert_eq!(PriceRounding::Whole.round(f64::NAN), None);
        assert_eq!(PriceRounding::Whole.round(f64::INFINITY), None);
        assert_eq!(selling_price(1e308, 100.0, PriceRounding::Whole), None);
        assert_eq!(selling_price(1e20, 100.0, PriceRounding::Whole), None);

        assert_eq!(PriceRounding::Whole.round(MAX_PRICE as f64), Some(MAX_PRICE));
        assert_eq!(PriceRounding::Whole.round(MAX_PRICE as f64 * 2.0), None);
    }
}
