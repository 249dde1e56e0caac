//! The two acquisition strategies. Both produce a [`RawFields`] mapping or
//! fail; the active one is chosen once at startup.

mod automata;
mod html;

pub use automata::{parse_automata_page, AutomataPage, AutomataScraper, FieldAnchor};
pub use html::{estimate_humidity, parse_weather_page, HtmlScraper};

use crate::config::{Config, Strategy};
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::ocr::{FieldExtractor, Recognizer};
use crate::reading::{Field, RawFields};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum Scraper {
    Html(HtmlScraper),
    Automata(AutomataScraper),
}

impl Scraper {
    pub fn from_config(config: &Config, recognizer: Arc<dyn Recognizer>) -> Result<Self> {
        let fetcher = Fetcher::new(
            &config.source.base_url,
            Duration::from_secs(config.source.request_timeout_seconds),
        )?;
        let timezone = config.source.timezone()?;

        match config.source.strategy()? {
            Strategy::Html(location) => Ok(Scraper::Html(HtmlScraper::new(fetcher, location))),
            Strategy::Automata(automata_id) => {
                let extractor = FieldExtractor::new(
                    recognizer,
                    fetcher.clone(),
                    config.ocr.language.clone(),
                    config.ocr.min_height_px,
                    timezone,
                );
                Ok(Scraper::Automata(AutomataScraper::new(
                    fetcher,
                    extractor,
                    automata_id,
                    timezone,
                )))
            }
        }
    }

    /// Identifier of the upstream location or station being scraped.
    pub fn station_id(&self) -> &str {
        match self {
            Scraper::Html(s) => s.location(),
            Scraper::Automata(s) => s.automata_id(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scraper::Html(_) => "html",
            Scraper::Automata(_) => "automata",
        }
    }

    pub async fn scrape(&self) -> Result<RawFields> {
        match self {
            Scraper::Html(s) => s.scrape().await,
            Scraper::Automata(s) => s.scrape().await,
        }
    }
}

/// Map a Hungarian row label to the field it carries.
pub(crate) fn field_for_label(label: &str) -> Option<Field> {
    let label = label.trim();
    // Gusts and daily extremes are not the current value of any field.
    const EXCLUDED: &[&str] = &["lökés", "max", "min"];
    let lower = label.to_lowercase();
    if EXCLUDED.iter().any(|word| lower.contains(word)) {
        return None;
    }

    // Longer labels first: "Szélirány" also contains "Szél".
    const LABELS: &[(&str, Field)] = &[
        ("Hőmérséklet", Field::Temperature),
        ("Harmatpont", Field::DewPoint),
        ("Páratartalom", Field::Humidity),
        ("24 órás csapadék", Field::Precipitation24h),
        ("Csapadékintenzitás", Field::PrecipitationIntensity),
        ("Légnyomás", Field::Pressure),
        ("Szélirány", Field::WindDirection),
        ("Szélsebesség", Field::WindSpeed),
        ("Szél", Field::WindSpeed),
        ("Mérés ideje", Field::MeasurementTime),
        ("Időpont", Field::MeasurementTime),
    ];
    LABELS
        .iter()
        .find(|(needle, _)| label.contains(needle))
        .map(|(_, field)| *field)
}
