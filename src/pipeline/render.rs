//! HTML report rendering.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use askama::Template;
use tracing::info;

use super::{Dataset, Renderer};
use crate::clock::{Clock, SystemClock};

/// Number of countries listed in the ranking table.
pub const TOP_N: usize = 10;

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate<'a> {
    generated_at: String,
    total_population: String,
    average_population: String,
    country_count: usize,
    top: Vec<TopRow<'a>>,
}

struct TopRow<'a> {
    country: &'a str,
    population: String,
    change: String,
    continent: &'a str,
}

/// Writes `population_report_<date>.html` into the configured output directory.
pub struct HtmlReportRenderer {
    output_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl HtmlReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn render_html(&self, dataset: &Dataset) -> Result<String> {
        let now = self.clock.now();
        let template = ReportTemplate {
            generated_at: now.format("%d/%m/%Y %H:%M UTC").to_string(),
            total_population: group_thousands(dataset.total_population()),
            average_population: group_thousands(dataset.average_population() as i64),
            country_count: dataset.len(),
            top: dataset
                .top(TOP_N)
                .iter()
                .map(|row| TopRow {
                    country: &row.country,
                    population: group_thousands(row.population_2024),
                    change: row
                        .change_percent
                        .map(|c| format!("{c:.2}"))
                        .unwrap_or_else(|| "n/a".to_string()),
                    continent: &row.continent,
                })
                .collect(),
        };
        template.render().context("failed to render report template")
    }
}

#[async_trait::async_trait]
impl Renderer for HtmlReportRenderer {
    async fn render(&self, dataset: &Dataset) -> Result<PathBuf> {
        if dataset.is_empty() {
            anyhow::bail!("refusing to render an empty dataset");
        }

        let html = self.render_html(dataset)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        let file_name = format!(
            "population_report_{}.html",
            self.clock.now().format("%Y-%m-%d_%H-%M")
        );
        let path = self.output_dir.join(file_name);
        tokio::fs::write(&path, html.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!(
            path = %path.display(),
            size_kb = html.len() as f64 / 1024.0,
            countries = dataset.len(),
            "Report written"
        );
        Ok(path)
    }
}

/// `1428627663` -> `"1,428,627,663"`.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
