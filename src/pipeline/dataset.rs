//! Cleaned population dataset handed from the transformer to the renderer.

use serde::Serialize;

/// One country after cleaning. `population_2024` is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRow {
    pub country: String,
    pub continent: String,
    pub region: String,
    pub population_2023: Option<i64>,
    pub population_2024: i64,
    pub change_percent: Option<f64>,
}

/// Cleaned rows, sorted by 2024 population, largest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    rows: Vec<CountryRow>,
}

impl Dataset {
    /// Build a dataset, ordering rows by `population_2024` descending.
    pub fn new(mut rows: Vec<CountryRow>) -> Self {
        rows.sort_by(|a, b| b.population_2024.cmp(&a.population_2024));
        Self { rows }
    }

    pub fn rows(&self) -> &[CountryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn top(&self, n: usize) -> &[CountryRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Sum of 2024 populations, saturating at `i64::MAX`.
    pub fn total_population(&self) -> i64 {
        self.rows
            .iter()
            .fold(0i64, |acc, r| acc.saturating_add(r.population_2024))
    }

    pub fn average_population(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.total_population() as f64 / self.rows.len() as f64
    }
}
