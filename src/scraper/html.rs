use super::field_for_label;
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use crate::reading::{Field, RawFields, RawValue};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

const LAKE_MARKER: &str = "Velencei-tó:";

/// Scrapes the regular IdőKép weather page of a location.
#[derive(Debug)]
pub struct HtmlScraper {
    fetcher: Fetcher,
    location: String,
}

impl HtmlScraper {
    pub fn new(fetcher: Fetcher, location: impl Into<String>) -> Self {
        Self {
            fetcher,
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub async fn scrape(&self) -> Result<RawFields> {
        let url = self.fetcher.resolve(&format!("idojaras/{}", self.location))?;
        info!("Scraping weather page {}", url);

        let html = self.fetcher.fetch_text(&url).await?;
        let fields = parse_weather_page(&html)?;

        info!(
            "Scraped {} fields for location {}",
            fields.len(),
            self.location
        );
        Ok(fields)
    }
}

/// Parse a weather page into raw text values.
///
/// Fails only when none of the known markers (current temperature, current
/// condition, labeled data rows) are on the page.
pub fn parse_weather_page(html: &str) -> Result<RawFields> {
    let document = Html::parse_document(html);
    let mut fields = RawFields::new();
    let mut markers = 0;

    if let Some(temp) = select_text(&document, ".current-temperature")? {
        markers += 1;
        fields.insert_text(Field::Temperature, temp);
    }

    if let Some(condition) = select_text(&document, ".current-weather")? {
        markers += 1;
        fields.insert_text(Field::Condition, condition);
    }

    markers += read_labeled_rows(&document, &mut fields)?;

    if markers == 0 {
        return Err(AppError::Parse(
            "Weather page has none of the expected field markers".to_string(),
        ));
    }

    if let Some(time) = measurement_time(&document)? {
        fields.insert_text(Field::MeasurementTime, time);
    }

    if let Some(lake) = lake_temperature(&document) {
        fields.insert_text(Field::LakeTemperature, lake);
    }

    if let Some(alert) = select_text(&document, "#topalertbar > a:nth-child(1)")? {
        info!("Weather alert in effect: {}", alert);
    }

    if !fields.contains(Field::Humidity) {
        if let Some(estimate) = fields.text(Field::Condition).and_then(estimate_humidity) {
            debug!("No humidity on page, estimating {}% from condition", estimate);
            fields.insert_estimate(Field::Humidity, RawValue::Number(estimate as f64));
        }
    }

    Ok(fields)
}

/// Rough humidity from the condition text, for pages that do not publish it.
pub fn estimate_humidity(condition: &str) -> Option<u8> {
    let condition = condition.to_lowercase();
    if condition.contains("eső") || condition.contains("zivatar") {
        Some(80)
    } else if condition.contains("felhős") {
        Some(60)
    } else if condition.contains("napos") {
        Some(40)
    } else {
        None
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Parse(format!("Selector error: {:?}", e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_text(document: &Html, css: &str) -> Result<Option<String>> {
    let selector = selector(css)?;
    Ok(document
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty()))
}

fn read_labeled_rows(document: &Html, fields: &mut RawFields) -> Result<usize> {
    let row_selector = selector("tr")?;
    let th_selector = selector("th")?;
    let td_selector = selector("td")?;
    let mut found = 0;

    for row in document.select(&row_selector) {
        let (Some(header), Some(cell)) = (
            row.select(&th_selector).next(),
            row.select(&td_selector).next(),
        ) else {
            continue;
        };

        let Some(field) = field_for_label(&element_text(header)) else {
            continue;
        };

        let value = element_text(cell);
        if value.is_empty() || fields.contains(field) {
            continue;
        }
        found += 1;
        fields.insert_text(field, value);
    }

    Ok(found)
}

fn measurement_time(document: &Html) -> Result<Option<String>> {
    let time_selector = selector("time")?;
    Ok(document.select(&time_selector).next().and_then(|el| {
        el.value()
            .attr("datetime")
            .map(|s| s.trim().to_string())
            .or_else(|| Some(element_text(el)))
            .filter(|s| !s.is_empty())
    }))
}

fn lake_temperature(document: &Html) -> Option<String> {
    document
        .root_element()
        .text()
        .find(|text| text.contains(LAKE_MARKER))
        .and_then(|text| text.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <div id="topalertbar"><a href="/figyelmeztetes">Zivatar miatt figyelmeztetés</a></div>
  <div class="current-temperature">21˚C</div>
  <div class="current-weather">Gyengén felhős</div>
  <p>Velencei-tó: 19°C</p>
  <time datetime="2024-05-01 14:00">14:00</time>
</body></html>"#;

    #[test]
    fn test_parse_current_conditions() {
        let fields = parse_weather_page(PAGE).unwrap();
        assert_eq!(fields.text(Field::Temperature), Some("21˚C"));
        assert_eq!(fields.text(Field::Condition), Some("Gyengén felhős"));
        assert_eq!(fields.text(Field::LakeTemperature), Some("19°C"));
        assert_eq!(fields.text(Field::MeasurementTime), Some("2024-05-01 14:00"));
    }

    #[test]
    fn test_humidity_estimated_from_condition() {
        let fields = parse_weather_page(PAGE).unwrap();
        assert_eq!(fields.get(Field::Humidity), Some(&RawValue::Number(60.0)));
        assert!(fields.is_estimated(Field::Humidity));
    }

    #[test]
    fn test_labeled_rows_win_over_estimate() {
        let page = r#"<div class="current-weather">Esős</div>
            <table><tr><th>Páratartalom</th><td>71 %</td></tr>
            <tr><th>Szélirány</th><td>ÉNy</td></tr></table>"#;
        let fields = parse_weather_page(page).unwrap();
        assert_eq!(fields.text(Field::Humidity), Some("71 %"));
        assert!(!fields.is_estimated(Field::Humidity));
        assert_eq!(fields.text(Field::WindDirection), Some("ÉNy"));
    }

    #[test]
    fn test_gust_row_is_not_wind_speed() {
        let page = r#"<div class="current-temperature">18˚C</div>
            <table><tr><th>Széllökés</th><td>41 km/h</td></tr>
            <tr><th>Szél</th><td>12 km/h</td></tr></table>"#;
        let fields = parse_weather_page(page).unwrap();
        assert_eq!(fields.text(Field::WindSpeed), Some("12 km/h"));
    }

    #[test]
    fn test_page_without_markers_is_parse_error() {
        let err =
            parse_weather_page("<html><body><h1>Karbantartás</h1></body></html>").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_missing_optional_fields_are_absent() {
        let fields = parse_weather_page(r#"<div class="current-temperature">-3˚C</div>"#).unwrap();
        assert_eq!(fields.text(Field::Temperature), Some("-3˚C"));
        assert!(!fields.contains(Field::DewPoint));
        assert!(!fields.contains(Field::Humidity));
        assert!(!fields.contains(Field::MeasurementTime));
    }

    #[test]
    fn test_estimate_humidity() {
        assert_eq!(estimate_humidity("Zivatar"), Some(80));
        assert_eq!(estimate_humidity("Napos idő"), Some(40));
        assert_eq!(estimate_humidity("Köd"), None);
    }
}
