//! Upper limits used to normalize raw readings into comparable fractions.

use std::fmt;
use std::str::FromStr;

use crate::error::TwinError;

/// Measured quantity a sensor slot reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Temperature,
    Co,
    No2,
    VehicleCount,
    TruckCount,
    Vibration,
    Deflection,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Temperature,
        Category::Co,
        Category::No2,
        Category::VehicleCount,
        Category::TruckCount,
        Category::Vibration,
        Category::Deflection,
    ];

    /// Reading at which the category counts as 100% of its limit.
    pub const fn upper_limit(self) -> f64 {
        match self {
            Category::Temperature => 100.0,
            Category::Co => 4.5,
            Category::No2 => 50.0,
            Category::VehicleCount => 800.0,
            Category::TruckCount => 160.0,
            Category::Vibration => 0.3,
            Category::Deflection => 12.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Temperature => "Temperature",
            Category::Co => "CO",
            Category::No2 => "NO2",
            Category::VehicleCount => "VehicleCount",
            Category::TruckCount => "TruckCount",
            Category::Vibration => "Vibration",
            Category::Deflection => "Deflection",
        }
    }

    /// `reading / upper_limit`. Not clamped.
    pub fn normalize(self, reading: f64) -> f64 {
        reading / self.upper_limit()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TwinError::UnknownCategory(s.to_string()))
    }
}

/// Limit lookup by category name.
pub fn upper_limit(category: &str) -> Result<f64, TwinError> {
    category.parse::<Category>().map(Category::upper_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_match_table() {
        assert_eq!(upper_limit("Temperature").unwrap(), 100.0);
        assert_eq!(upper_limit("CO").unwrap(), 4.5);
        assert_eq!(upper_limit("NO2").unwrap(), 50.0);
        assert_eq!(upper_limit("VehicleCount").unwrap(), 800.0);
        assert_eq!(upper_limit("TruckCount").unwrap(), 160.0);
        assert_eq!(upper_limit("Vibration").unwrap(), 0.3);
        assert_eq!(upper_limit("Deflection").unwrap(), 12.0);
    }

    #[test]
    fn unmapped_category_is_an_error() {
        assert_eq!(
            upper_limit("Humidity"),
            Err(TwinError::UnknownCategory("Humidity".to_string()))
        );
    }

    #[test]
    fn normalize_divides_by_limit() {
        assert!((Category::Co.normalize(3.6) - 0.8).abs() < 1e-12);
        assert_eq!(Category::Deflection.normalize(24.0), 2.0);
    }
}
