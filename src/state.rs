use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Measurement time of the last reading confirmed uploaded, per station.
///
/// Lives for the process only. Written by the uploader after a confirmed
/// success and read by the normalizer for duplicate suppression.
#[derive(Debug, Clone, Default)]
pub struct LastSentState {
    entries: HashMap<String, DateTime<Utc>>,
}

impl LastSentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, station_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(station_id).copied()
    }

    pub fn record(&mut self, station_id: &str, measurement_time: DateTime<Utc>) {
        self.entries.insert(station_id.to_string(), measurement_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_starts_empty_and_records_per_station() {
        let mut state = LastSentState::new();
        assert_eq!(state.get("fejnto"), None);

        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        state.record("fejnto", t);
        assert_eq!(state.get("fejnto"), Some(t));
        assert_eq!(state.get("Velence"), None);
    }
}
