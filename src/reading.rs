use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Field names a scraper may put into a [`RawFields`] mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Temperature,
    LakeTemperature,
    DewPoint,
    Humidity,
    Precipitation24h,
    PrecipitationIntensity,
    MeasurementTime,
    Pressure,
    WindSpeed,
    WindDirection,
    Condition,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::LakeTemperature => "lake_temperature",
            Field::DewPoint => "dew_point",
            Field::Humidity => "humidity",
            Field::Precipitation24h => "precipitation_24h",
            Field::PrecipitationIntensity => "precipitation_intensity",
            Field::MeasurementTime => "measurement_time",
            Field::Pressure => "pressure",
            Field::WindSpeed => "wind_speed",
            Field::WindDirection => "wind_direction",
            Field::Condition => "condition",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An un-normalized value straight from markup or recognition.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
    Time(DateTime<Utc>),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Text(s) => write!(f, "{:?}", s),
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Raw field mapping produced by one scrape.
///
/// Absent keys mean the page did not carry the field; that is not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    values: BTreeMap<Field, RawValue>,
    estimated: Vec<Field>,
    failures: Vec<(Field, String)>,
}

impl RawFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, value: RawValue) {
        self.values.insert(field, value);
    }

    pub fn insert_text(&mut self, field: Field, value: impl Into<String>) {
        self.insert(field, RawValue::Text(value.into()));
    }

    /// Insert a value derived from other fields rather than read from the page.
    pub fn insert_estimate(&mut self, field: Field, value: RawValue) {
        self.values.insert(field, value);
        if !self.estimated.contains(&field) {
            self.estimated.push(field);
        }
    }

    /// Note a field that was present on the page but could not be read.
    pub fn record_failure(&mut self, field: Field, reason: impl Into<String>) {
        self.failures.push((field, reason.into()));
    }

    pub fn failures(&self) -> &[(Field, String)] {
        &self.failures
    }

    pub fn get(&self, field: Field) -> Option<&RawValue> {
        self.values.get(&field)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match self.values.get(&field) {
            Some(RawValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn contains(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    pub fn is_estimated(&self, field: Field) -> bool {
        self.estimated.contains(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Canonical, validated observation for one station at one point in time.
///
/// Only [`crate::normalizer::Normalizer`] constructs these, so every value
/// has already passed range validation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub(crate) station_id: String,
    pub(crate) measurement_time: DateTime<Utc>,
    pub(crate) temperature_c: f64,
    pub(crate) dew_point_c: Option<f64>,
    pub(crate) humidity_pct: u8,
    pub(crate) humidity_estimated: bool,
    pub(crate) precipitation_24h_mm: Option<f64>,
    pub(crate) precipitation_intensity_mm_per_h: Option<f64>,
    pub(crate) pressure_hpa: Option<f64>,
    pub(crate) wind_speed_kmh: Option<f64>,
    pub(crate) wind_direction_deg: Option<u16>,
}

impl WeatherReading {
    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn measurement_time(&self) -> DateTime<Utc> {
        self.measurement_time
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn dew_point_c(&self) -> Option<f64> {
        self.dew_point_c
    }

    pub fn humidity_pct(&self) -> u8 {
        self.humidity_pct
    }

    /// Humidity was derived from the condition text rather than measured.
    pub fn humidity_estimated(&self) -> bool {
        self.humidity_estimated
    }

    pub fn precipitation_24h_mm(&self) -> Option<f64> {
        self.precipitation_24h_mm
    }

    pub fn precipitation_intensity_mm_per_h(&self) -> Option<f64> {
        self.precipitation_intensity_mm_per_h
    }

    pub fn pressure_hpa(&self) -> Option<f64> {
        self.pressure_hpa
    }

    pub fn wind_speed_kmh(&self) -> Option<f64> {
        self.wind_speed_kmh
    }

    pub fn wind_direction_deg(&self) -> Option<u16> {
        self.wind_direction_deg
    }
}
