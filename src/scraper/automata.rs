use super::field_for_label;
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use crate::ocr::{FieldExtractor, FieldKind, ImageRef};
use crate::reading::{Field, RawFields, RawValue};
use crate::timestamp;
use chrono::Utc;
use chrono_tz::Tz;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

/// One data row of the station table: which field it holds and where its
/// image is. `image` is an error when the `src` could not be interpreted.
#[derive(Debug)]
pub struct FieldAnchor {
    pub field: Field,
    pub kind: FieldKind,
    pub image: Result<ImageRef>,
}

/// Structural content of an automata page, extracted before any await so the
/// non-`Send` HTML document never crosses one.
#[derive(Debug, Default)]
pub struct AutomataPage {
    pub measurement_time: Option<String>,
    pub anchors: Vec<FieldAnchor>,
}

/// Scrapes an automated station page whose values are published as images.
#[derive(Debug)]
pub struct AutomataScraper {
    fetcher: Fetcher,
    extractor: FieldExtractor,
    automata_id: String,
    timezone: Tz,
}

impl AutomataScraper {
    pub fn new(
        fetcher: Fetcher,
        extractor: FieldExtractor,
        automata_id: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            automata_id: automata_id.into(),
            timezone,
        }
    }

    pub fn automata_id(&self) -> &str {
        &self.automata_id
    }

    pub async fn scrape(&self) -> Result<RawFields> {
        let url = self.fetcher.resolve(&format!("automata/{}", self.automata_id))?;
        info!("Fetching automata data from {}", url);

        let html = self.fetcher.fetch_text(&url).await?;
        let page = parse_automata_page(&html, &self.fetcher)?;

        if page.anchors.is_empty() {
            return Err(AppError::Parse(format!(
                "Automata page for {} has no field images",
                self.automata_id
            )));
        }

        let mut fields = RawFields::new();
        let now = Utc::now();

        // An unreadable page time leaves the field to the time image row.
        if let Some(text) = &page.measurement_time {
            match timestamp::parse_timestamp(text, self.timezone) {
                Some(time) => fields.insert(Field::MeasurementTime, RawValue::Time(time)),
                None => debug!("Ignoring unparseable page time {:?}", text),
            }
        }

        // Sequential on purpose: each field may need its own fetch and engine run.
        for anchor in page.anchors {
            if fields.contains(anchor.field) {
                debug!("Field {} already known, skipping image", anchor.field);
                continue;
            }

            let result = match &anchor.image {
                Ok(image) => {
                    self.extractor
                        .extract(anchor.field, anchor.kind, image, now)
                        .await
                }
                Err(e) => Err(AppError::Ocr {
                    field: anchor.field.to_string(),
                    raw: String::new(),
                    reason: e.to_string(),
                }),
            };

            match result {
                Ok(value) => {
                    debug!("Field {} = {}", anchor.field, value);
                    fields.insert(anchor.field, value);
                }
                Err(e) => {
                    warn!(
                        "Omitting field {} for automata {}: {}",
                        anchor.field, self.automata_id, e
                    );
                    fields.record_failure(anchor.field, e.to_string());
                }
            }
        }

        info!(
            "Scraped automata {}: {} fields, {} failed",
            self.automata_id,
            fields.len(),
            fields.failures().len()
        );
        Ok(fields)
    }
}

/// Locate the measurement time and every known field image on the page.
pub fn parse_automata_page(html: &str, fetcher: &Fetcher) -> Result<AutomataPage> {
    let document = Html::parse_document(html);
    let parse = |css: &str| {
        Selector::parse(css).map_err(|e| AppError::Parse(format!("Selector error: {:?}", e)))
    };
    let time_selector = parse("time")?;
    let row_selector = parse("table.table tr")?;
    let th_selector = parse("th")?;
    let img_selector = parse("td img")?;

    let measurement_time = document
        .select(&time_selector)
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut anchors = Vec::new();
    for row in document.select(&row_selector) {
        let Some(header) = row.select(&th_selector).next() else {
            continue;
        };
        let Some(img) = row.select(&img_selector).next() else {
            continue;
        };

        let label = header.text().collect::<String>();
        let Some(field) = field_for_label(&label) else {
            debug!("Ignoring unknown automata row {:?}", label.trim());
            continue;
        };

        let kind = match field {
            Field::MeasurementTime => FieldKind::Time,
            _ => FieldKind::Numeric,
        };

        let image = img
            .value()
            .attr("src")
            .ok_or_else(|| AppError::Parse(format!("Image for {} has no src", field)))
            .and_then(|src| ImageRef::from_src(src, fetcher));

        anchors.push(FieldAnchor { field, kind, image });
    }

    Ok(AutomataPage {
        measurement_time,
        anchors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fetcher() -> Fetcher {
        Fetcher::new("https://www.idokep.hu", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_page_finds_anchors() {
        let html = r#"
<time datetime="2024-05-01T12:00:00Z">14:00</time>
<table class="table">
  <tr><th>Hőmérséklet</th><td><img src="data:image/png;base64,AAEC"></td></tr>
  <tr><th>Páratartalom</th><td><img src="/automata/img/rh.png"></td></tr>
  <tr><th>Napsugárzás</th><td><img src="data:image/png;base64,AAEC"></td></tr>
  <tr><th>Harmatpont</th><td>nincs adat</td></tr>
</table>"#;

        let page = parse_automata_page(html, &fetcher()).unwrap();
        assert_eq!(page.measurement_time.as_deref(), Some("2024-05-01T12:00:00Z"));
        assert_eq!(page.anchors.len(), 2);
        assert_eq!(page.anchors[0].field, Field::Temperature);
        assert!(matches!(page.anchors[0].image, Ok(ImageRef::Inline(_))));
        assert_eq!(page.anchors[1].field, Field::Humidity);
        assert!(matches!(page.anchors[1].image, Ok(ImageRef::Remote(_))));
    }

    #[test]
    fn test_time_row_uses_time_grammar() {
        let html = r#"<table class="table">
  <tr><th>Mérés ideje</th><td><img src="data:image/png;base64,AAEC"></td></tr>
</table>"#;
        let page = parse_automata_page(html, &fetcher()).unwrap();
        assert_eq!(page.anchors[0].kind, FieldKind::Time);
        assert!(page.measurement_time.is_none());
    }

    #[test]
    fn test_bad_src_is_kept_as_anchor_error() {
        let html = r#"<table class="table">
  <tr><th>Hőmérséklet</th><td><img src="data:image/png;base64,!!!"></td></tr>
  <tr><th>Harmatpont</th><td><img></td></tr>
</table>"#;
        let page = parse_automata_page(html, &fetcher()).unwrap();
        assert_eq!(page.anchors.len(), 2);
        assert!(page.anchors.iter().all(|a| a.image.is_err()));
    }

    #[test]
    fn test_page_without_table_has_no_anchors() {
        let page = parse_automata_page("<html><body>Nincs adat</body></html>", &fetcher()).unwrap();
        assert!(page.anchors.is_empty());
    }
}
