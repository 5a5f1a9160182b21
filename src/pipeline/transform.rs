//! Cleaning rules for raw population rows.

use anyhow::Result;
use tracing::{info, warn};

use super::{CountryRow, Dataset, Record, Transformer};

/// Turns scraped text cells into typed, sorted [`CountryRow`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PopulationCleaner;

#[async_trait::async_trait]
impl Transformer for PopulationCleaner {
    async fn transform(&self, records: Vec<Record>) -> Result<Dataset> {
        let loaded = records.len();
        let dataset = clean_records(&records);

        let dropped = loaded - dataset.len();
        let retention = if loaded > 0 {
            dataset.len() as f64 / loaded as f64 * 100.0
        } else {
            0.0
        };
        info!(loaded, kept = dataset.len(), dropped, retention_pct = retention, "Cleaned population rows");
        if dataset.is_empty() {
            warn!("No valid rows survived cleaning");
        }

        Ok(dataset)
    }
}

/// Apply the cleaning rules; rows without a parseable 2024 population are dropped.
pub fn clean_records(records: &[Record]) -> Dataset {
    let rows = records
        .iter()
        .filter_map(|record| {
            let population_2024 = parse_population(text(record, "population_2024"))?;
            Some(CountryRow {
                country: text(record, "country").to_string(),
                continent: text(record, "continent").to_string(),
                region: text(record, "region").to_string(),
                population_2023: parse_population(text(record, "population_2023")),
                population_2024,
                change_percent: parse_change(text(record, "change_percent")),
            })
        })
        .collect();

    Dataset::new(rows)
}

fn text<'a>(record: &'a Record, field: &str) -> &'a str {
    record.get(field).and_then(|v| v.as_str()).unwrap_or_default().trim()
}

/// `"1,428,627,663"` -> `1428627663`. Anything else that is not an integer -> `None`.
pub fn parse_population(raw: &str) -> Option<i64> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}'))
        .collect();
    digits.parse().ok()
}

/// `"+0.88%"` -> `0.88`, `"\u{2212}0.03%"` -> `-0.03`.
pub fn parse_change(raw: &str) -> Option<f64> {
    let normalized: String = raw
        .chars()
        .filter(|c| !matches!(c, '%' | '+'))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();
    normalized.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(country: &str, pop_2024: &str, change: &str) -> Record {
        let value = json!({
            "country": country,
            "population_2023": "1,000",
            "population_2024": pop_2024,
            "change_percent": change,
            "continent": "Europe",
            "region": "Western Europe",
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_population() {
        assert_eq!(parse_population("1,428,627,663"), Some(1_428_627_663));
        assert_eq!(parse_population("803"), Some(803));
        assert_eq!(parse_population("N/A"), None);
        assert_eq!(parse_population(""), None);
    }

    #[test]
    fn test_parse_change_handles_signs() {
        assert_eq!(parse_change("+0.88%"), Some(0.88));
        assert_eq!(parse_change("\u{2212}0.03%"), Some(-0.03));
        assert_eq!(parse_change("-1.5%"), Some(-1.5));
        assert_eq!(parse_change("—"), None);
    }

    #[test]
    fn test_clean_drops_rows_without_population_and_sorts() {
        let records = vec![
            record("Small", "500", "+1%"),
            record("Unknown", "n/a", "+1%"),
            record("Large", "2,000", "\u{2212}0.5%"),
        ];
        let dataset = clean_records(&records);

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[0].country, "Large");
        assert_eq!(dataset.rows()[0].population_2024, 2000);
        assert_eq!(dataset.rows()[0].change_percent, Some(-0.5));
        assert_eq!(dataset.rows()[1].population_2023, Some(1000));
    }

    #[tokio::test]
    async fn test_transform_all_invalid_yields_empty_dataset() {
        let dataset = PopulationCleaner
            .transform(vec![record("X", "?", "?")])
            .await
            .unwrap();
        assert!(dataset.is_empty());
    }
}
