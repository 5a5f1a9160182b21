//! Population table extraction from the Wikipedia country list.

use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use super::{Extractor, Record};
use crate::config::SourceConfig;

/// Column names, in table order, for the first six cells of each row.
pub const FIELDS: [&str; 6] = [
    "country",
    "population_2023",
    "population_2024",
    "change_percent",
    "continent",
    "region",
];

/// Fetches the population page over HTTP and scrapes its first `wikitable`.
pub struct WikipediaExtractor {
    client: Client,
    url: String,
}

impl WikipediaExtractor {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Extractor for WikipediaExtractor {
    async fn extract(&self) -> Result<Vec<Record>> {
        info!(url = %self.url, "Fetching population table");

        let html = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", self.url))?
            .text()
            .await
            .context("failed to read response body")?;

        let records = parse_population_table(&html)?;
        if records.is_empty() {
            anyhow::bail!("no country rows found in {}", self.url);
        }
        info!(countries = records.len(), "Population table extracted");
        Ok(records)
    }
}

/// Parse the first `wikitable` in `html` into one [`Record`] per country row.
///
/// Rows without `<td>` cells (headers) are skipped silently; rows with fewer
/// than six cells are skipped with a warning.
pub fn parse_population_table(html: &str) -> Result<Vec<Record>> {
    let parser = TableParser::new()?;

    let Some(table) = parser.table.captures(html).and_then(|c| c.get(1)) else {
        anyhow::bail!("no wikitable found in page");
    };

    let mut records = Vec::new();
    let mut malformed = 0usize;

    for (index, row) in parser.row.captures_iter(table.as_str()).enumerate() {
        let cells: Vec<String> = parser
            .cell
            .captures_iter(&row[1])
            .map(|c| parser.cell_text(&c[1]))
            .collect();

        if cells.is_empty() {
            continue;
        }
        if cells.len() < FIELDS.len() {
            malformed += 1;
            warn!(row = index, cells = cells.len(), "Skipping row with too few cells");
            continue;
        }

        let record: Record = FIELDS
            .iter()
            .zip(cells)
            .map(|(name, text)| (name.to_string(), Value::String(text)))
            .collect();
        records.push(record);
    }

    info!(rows = records.len(), malformed, "Parsed population table");
    Ok(records)
}

struct TableParser {
    table: Regex,
    row: Regex,
    cell: Regex,
    footnote: Regex,
    tag: Regex,
    space: Regex,
}

impl TableParser {
    fn new() -> Result<Self> {
        Ok(Self {
            table: Regex::new(r#"(?is)<table[^>]*class="[^"]*\bwikitable\b[^"]*"[^>]*>(.*?)</table>"#)?,
            row: Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>")?,
            cell: Regex::new(r"(?is)<td[^>]*>(.*?)</td>")?,
            footnote: Regex::new(r"(?is)<sup[^>]*>.*?</sup>")?,
            tag: Regex::new(r"(?s)<[^>]+>")?,
            space: Regex::new(r"\s+")?,
        })
    }

    /// Visible text of a cell: footnotes and tags removed, entities decoded.
    fn cell_text(&self, inner: &str) -> String {
        let text = self.footnote.replace_all(inner, "");
        let text = self.tag.replace_all(&text, "");
        let text = decode_entities(&text);
        self.space.replace_all(text.trim(), " ").into_owned()
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&minus;", "\u{2212}")
        .replace("&#8722;", "\u{2212}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table class="infobox"><tr><td>ignore me</td></tr></table>
        <table class="wikitable sortable">
          <tbody>
            <tr><th>Location</th><th>2023</th><th>2024</th><th>Change</th><th>Continent</th><th>Region</th></tr>
            <tr>
              <td><span class="flag"></span><a href="/wiki/India">India</a><sup class="reference">[b]</sup></td>
              <td>1,438,069,596</td><td>1,450,935,791</td><td>+0.89%</td>
              <td>Asia</td><td>Southern Asia</td>
            </tr>
            <tr>
              <td><a href="/wiki/China">China</a></td>
              <td>1,422,584,933</td><td>1,419,321,278</td><td>&minus;0.23%</td>
              <td>Asia</td><td>Eastern&nbsp;Asia</td>
            </tr>
            <tr><td>Broken</td><td>1</td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_extracts_country_rows() {
        let records = parse_population_table(PAGE).unwrap();
        assert_eq!(records.len(), 2);

        let india = &records[0];
        assert_eq!(india["country"], "India");
        assert_eq!(india["population_2024"], "1,450,935,791");
        assert_eq!(india["change_percent"], "+0.89%");
        assert_eq!(india["region"], "Southern Asia");
    }

    #[test]
    fn test_parse_decodes_entities() {
        let records = parse_population_table(PAGE).unwrap();
        let china = &records[1];
        assert_eq!(china["change_percent"], "\u{2212}0.23%");
        assert_eq!(china["region"], "Eastern Asia");
    }

    #[test]
    fn test_parse_without_wikitable_fails() {
        let err = parse_population_table("<table><tr><td>x</td></tr></table>").unwrap_err();
        assert!(err.to_string().contains("no wikitable"));
    }

    #[test]
    fn test_parse_header_only_table_is_empty() {
        let html = r#"<table class="wikitable"><tr><th>Location</th></tr></table>"#;
        assert!(parse_population_table(html).unwrap().is_empty());
    }
}
