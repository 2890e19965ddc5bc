use serde::{Deserialize, Serialize};

/// Summary of every temperature recorded for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityStatistics {
    pub average_temperature: f64,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub number_of_records: usize,
}

impl CityStatistics {
    /// Returns `None` when there are no readings.
    pub fn from_temperatures(temperatures: &[f64]) -> Option<Self> {
        if temperatures.is_empty() {
            return None;
        }

        let sum: f64 = temperatures.iter().sum();
        let max = temperatures.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = temperatures.iter().copied().fold(f64::INFINITY, f64::min);

        Some(Self {
            average_temperature: sum / temperatures.len() as f64,
            max_temperature: max,
            min_temperature: min,
            number_of_records: temperatures.len(),
        })
    }
}
