use crate::error::{AppError, Result};
use crate::reading::{Field, RawFields, RawValue, WeatherReading};
use crate::state::LastSentState;
use crate::timestamp;
use crate::units;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex_lite::Regex;
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use tracing::{debug, info};

pub const TEMPERATURE_RANGE_C: RangeInclusive<f64> = -90.0..=60.0;
pub const HUMIDITY_RANGE_PCT: RangeInclusive<f64> = 0.0..=100.0;
pub const PRECIPITATION_RANGE_MM: RangeInclusive<f64> = 0.0..=f64::MAX;
pub const PRESSURE_RANGE_HPA: RangeInclusive<f64> = 800.0..=1100.0;
pub const WIND_SPEED_RANGE_KMH: RangeInclusive<f64> = 0.0..=500.0;
pub const WIND_DIRECTION_RANGE_DEG: RangeInclusive<f64> = 0.0..=360.0;

/// Result of normalizing one scrape.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Reading(WeatherReading),
    /// Same measurement time as the last forwarded reading.
    Skip {
        station_id: String,
        measurement_time: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    timezone: Tz,
}

impl Normalizer {
    /// `timezone` interprets upstream timestamps that carry no offset.
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn normalize(
        &self,
        station_id: &str,
        raw: &RawFields,
        last_sent: &LastSentState,
    ) -> Result<Normalized> {
        let temperature_field = if raw.contains(Field::Temperature) {
            Some(Field::Temperature)
        } else if raw.contains(Field::LakeTemperature) {
            info!("No air temperature for {}, using lake temperature", station_id);
            Some(Field::LakeTemperature)
        } else {
            None
        };

        let mut missing = Vec::new();
        if temperature_field.is_none() {
            missing.push(Field::Temperature.as_str());
        }
        if !raw.contains(Field::Humidity) {
            missing.push(Field::Humidity.as_str());
        }
        if !raw.contains(Field::MeasurementTime) {
            missing.push(Field::MeasurementTime.as_str());
        }
        let (Some((temperature_field, temperature)), Some(humidity), Some(time)) = (
            temperature_field.and_then(|f| raw.get(f).map(|v| (f, v))),
            raw.get(Field::Humidity),
            raw.get(Field::MeasurementTime),
        ) else {
            return Err(AppError::IncompleteReading {
                station: station_id.to_string(),
                missing: missing.join(", "),
            });
        };

        let measurement_time = self.measurement_time(time)?;
        let temperature_c = celsius(temperature_field, temperature)?;
        check_range(temperature_field, temperature_c, &TEMPERATURE_RANGE_C)?;
        let humidity_pct = number(Field::Humidity, humidity)?;
        check_range(Field::Humidity, humidity_pct, &HUMIDITY_RANGE_PCT)?;
        let humidity_estimated = raw.is_estimated(Field::Humidity);
        if humidity_estimated {
            info!(
                "Humidity for {} is estimated from the condition: {}%",
                station_id, humidity_pct
            );
        }

        let dew_point_c = optional(raw, Field::DewPoint, |v| {
            let c = celsius(Field::DewPoint, v)?;
            check_range(Field::DewPoint, c, &TEMPERATURE_RANGE_C)?;
            Ok(c)
        })?;
        let precipitation_24h_mm =
            optional_in_range(raw, Field::Precipitation24h, &PRECIPITATION_RANGE_MM)?;
        let precipitation_intensity_mm_per_h =
            optional_in_range(raw, Field::PrecipitationIntensity, &PRECIPITATION_RANGE_MM)?;
        let pressure_hpa = optional_in_range(raw, Field::Pressure, &PRESSURE_RANGE_HPA)?;
        let wind_speed_kmh = optional_in_range(raw, Field::WindSpeed, &WIND_SPEED_RANGE_KMH)?;
        let wind_direction_deg = wind_direction(raw)?;

        if let Some(last) = last_sent.get(station_id) {
            if measurement_time == last {
                debug!(
                    "Reading for {} at {} already forwarded",
                    station_id, measurement_time
                );
                return Ok(Normalized::Skip {
                    station_id: station_id.to_string(),
                    measurement_time,
                });
            }
            if measurement_time < last {
                return Err(AppError::Validation {
                    field: Field::MeasurementTime.to_string(),
                    value: measurement_time.to_rfc3339(),
                    reason: format!("older than last forwarded reading at {}", last.to_rfc3339()),
                });
            }
        }

        Ok(Normalized::Reading(WeatherReading {
            station_id: station_id.to_string(),
            measurement_time,
            temperature_c,
            dew_point_c,
            humidity_pct: humidity_pct.round() as u8,
            humidity_estimated,
            precipitation_24h_mm,
            precipitation_intensity_mm_per_h,
            pressure_hpa,
            wind_speed_kmh,
            wind_direction_deg,
        }))
    }

    fn measurement_time(&self, value: &RawValue) -> Result<DateTime<Utc>> {
        let parsed = match value {
            RawValue::Time(t) => timestamp::truncate_to_minute(*t),
            RawValue::Text(s) => timestamp::parse_timestamp(s, self.timezone),
            RawValue::Number(_) => None,
        };
        parsed.ok_or_else(|| invalid(Field::MeasurementTime, value, "not a calendar time"))
    }
}

fn invalid(field: Field, value: &RawValue, reason: impl Into<String>) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn check_range(field: Field, value: f64, range: &RangeInclusive<f64>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(AppError::Validation {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("outside {}..={}", range.start(), range.end()),
        })
    }
}

/// First decimal number in markup text; accepts a decimal comma.
fn parse_decimal(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"-?\d+(?:[.,]\d+)?").expect("valid regex"));
    let normalized = text.replace(['−', '–'], "-");
    number
        .find(&normalized)
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
}

fn number(field: Field, value: &RawValue) -> Result<f64> {
    match value {
        RawValue::Number(n) => Ok(*n),
        RawValue::Text(s) => parse_decimal(s).ok_or_else(|| invalid(field, value, "not a number")),
        RawValue::Time(_) => Err(invalid(field, value, "expected a number")),
    }
}

/// Temperature in °C; text marked °F is converted.
fn celsius(field: Field, value: &RawValue) -> Result<f64> {
    let n = number(field, value)?;
    match value {
        RawValue::Text(s) if s.contains("°F") || s.contains("˚F") => {
            Ok(units::fahrenheit_to_celsius(n))
        }
        _ => Ok(n),
    }
}

fn optional<T>(
    raw: &RawFields,
    field: Field,
    convert: impl FnOnce(&RawValue) -> Result<T>,
) -> Result<Option<T>> {
    raw.get(field).map(convert).transpose()
}

fn optional_in_range(
    raw: &RawFields,
    field: Field,
    range: &RangeInclusive<f64>,
) -> Result<Option<f64>> {
    optional(raw, field, |v| {
        let n = number(field, v)?;
        check_range(field, n, range)?;
        Ok(n)
    })
}

fn wind_direction(raw: &RawFields) -> Result<Option<u16>> {
    match raw.get(Field::WindDirection) {
        None => Ok(None),
        Some(RawValue::Text(s)) if parse_decimal(s).is_none() => {
            let degrees = units::wind_direction_degrees(s);
            if degrees.is_none() {
                debug!("Dropping unknown wind direction {:?}", s);
            }
            Ok(degrees)
        }
        Some(value) => {
            let n = number(Field::WindDirection, value)?;
            check_range(Field::WindDirection, n, &WIND_DIRECTION_RANGE_DEG)?;
            Ok(Some((n.round() as u16) % 360))
        }
    }
}
