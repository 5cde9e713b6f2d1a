use serde::{Deserialize, Serialize};

pub const UNDERWEIGHT_BELOW: f64 = 18.5;
pub const OVERWEIGHT_FROM: f64 = 25.0;
pub const OBESE_FROM: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BmiCategory {
    Underweight,
    #[serde(rename = "Normal weight")]
    NormalWeight,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Underweight => "Underweight",
            Self::NormalWeight => "Normal weight",
            Self::Overweight => "Overweight",
            Self::Obese => "Obese",
        }
    }

    /// Display color for the category. Purely cosmetic.
    pub fn color(self) -> &'static str {
        match self {
            Self::Underweight => "#3B82F6",
            Self::NormalWeight => "#22C55E",
            Self::Overweight => "#F59E0B",
            Self::Obese => "#EF4444",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BmiCategoryInfo {
    pub category: BmiCategory,
    pub color: &'static str,
}

/// Body Mass Index, `weight(kg) / height(m)^2`.
///
/// Returns `0.0` when either input is not strictly positive (NaN included);
/// this function never fails.
pub fn compute_bmi(height_cm: f64, weight_kg: f64) -> f64 {
    if height_cm.is_nan() || weight_kg.is_nan() || height_cm <= 0.0 || weight_kg <= 0.0 {
        return 0.0;
    }
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

/// Half-open intervals, lower bound inclusive. Anything that is not at least
/// 18.5 (negative values and NaN included) is `Underweight`.
pub fn categorize(bmi: f64) -> BmiCategoryInfo {
    let category = if bmi >= OBESE_FROM {
        BmiCategory::Obese
    } else if bmi >= OVERWEIGHT_FROM {
        BmiCategory::Overweight
    } else if bmi >= UNDERWEIGHT_BELOW {
        BmiCategory::NormalWeight
    } else {
        BmiCategory::Underweight
    };
    BmiCategoryInfo {
        category,
        color: category.color(),
    }
}

pub fn format_bmi(bmi: f64) -> String {
    format!("{bmi:.1}")
}

#[cfg(test)]
mod tests {
    use super::{categorize, compute_bmi, format_bmi, BmiCategory};

    #[test]
    fn compute_bmi_returns_zero_for_non_positive_inputs() {
        for (height, weight) in [
            (0.0, 70.0),
            (-175.0, 70.0),
            (175.0, 0.0),
            (175.0, -1.0),
            (0.0, 0.0),
            (f64::NAN, 70.0),
            (175.0, f64::NAN),
        ] {
            assert_eq!(compute_bmi(height, weight), 0.0, "h={height} w={weight}");
        }
    }

    #[test]
    fn compute_bmi_matches_reference_value() {
        let bmi = compute_bmi(175.0, 70.0);
        assert!((bmi - 22.857).abs() < 0.001, "bmi was {bmi}");
        assert_eq!(format_bmi(bmi), "22.9");
    }

    #[test]
    fn categorize_boundaries_are_lower_inclusive() {
        let cases = [
            (0.0, BmiCategory::Underweight),
            (18.49, BmiCategory::Underweight),
            (18.5, BmiCategory::NormalWeight),
            (24.99, BmiCategory::NormalWeight),
            (25.0, BmiCategory::Overweight),
            (29.99, BmiCategory::Overweight),
            (30.0, BmiCategory::Obese),
            (55.0, BmiCategory::Obese),
        ];
        for (bmi, expected) in cases {
            assert_eq!(categorize(bmi).category, expected, "bmi={bmi}");
        }
    }

    #[test]
    fn categorize_is_total_over_odd_inputs() {
        assert_eq!(categorize(-3.0).category, BmiCategory::Underweight);
        assert_eq!(categorize(f64::NAN).category, BmiCategory::Underweight);
        assert_eq!(categorize(f64::INFINITY).category, BmiCategory::Obese);
    }

    #[test]
    fn derivation_is_bit_identical_across_calls() {
        let first = compute_bmi(181.3, 92.7);
        let second = compute_bmi(181.3, 92.7);
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(categorize(first), categorize(second));
    }

    #[test]
    fn category_serializes_with_display_label() -> anyhow::Result<()> {
        let info = categorize(22.0);
        let value = serde_json::to_value(info)?;
        assert_eq!(value["category"], serde_json::json!("Normal weight"));
        assert_eq!(value["color"], serde_json::json!("#22C55E"));
        assert_eq!(info.category.label(), "Normal weight");
        Ok(())
    }
}
