//! Metric to imperial conversions used by the upload encoding, with their
//! inverses for decoding.

const MM_PER_INCH: f64 = 25.4;
const HPA_PER_INHG: f64 = 33.863_886_666_666_67;
const KM_PER_MILE: f64 = 1.609_344;

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

pub fn inches_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa / HPA_PER_INHG
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * HPA_PER_INHG
}

pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh / KM_PER_MILE
}

pub fn mph_to_kmh(mph: f64) -> f64 {
    mph * KM_PER_MILE
}

/// Hungarian compass abbreviation to degrees.
pub fn wind_direction_degrees(direction: &str) -> Option<u16> {
    match direction.trim() {
        "É" => Some(0),
        "ÉK" => Some(45),
        "K" => Some(90),
        "DK" => Some(135),
        "D" => Some(180),
        "DNy" => Some(225),
        "Ny" => Some(270),
        "ÉNy" => Some(315),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_points() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
        assert!((mm_to_inches(25.4) - 1.0).abs() < 1e-12);
        assert!((hpa_to_inhg(1013.25) - 29.921).abs() < 1e-3);
        assert!((kmh_to_mph(100.0) - 62.137).abs() < 1e-3);
    }

    #[test]
    fn test_wind_direction_degrees() {
        assert_eq!(wind_direction_degrees("ÉNy"), Some(315));
        assert_eq!(wind_direction_degrees(" DK "), Some(135));
        assert_eq!(wind_direction_degrees("változó"), None);
    }
}
