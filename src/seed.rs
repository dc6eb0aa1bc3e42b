//! Seeding the semantic index with core series.
//!
//! A fresh index resolves nothing from the semantic stage, so every early
//! query pays for live discovery. [`seed_index`] pushes a small curated set
//! through the same idempotent enrichment path; series already present are
//! skipped and a failure on one series never stops the others.

use tracing::{info, warn};

use crate::enrich::{EnrichmentOutcome, EnrichmentRequest, SeriesEnricher};

/// A curated series with the hints its enrichment starts from.
#[derive(Debug, Clone, Copy)]
pub struct CoreSeries {
    pub series_id: &'static str,
    pub context: &'static str,
    pub keywords: &'static [&'static str],
    pub category: &'static str,
}

impl CoreSeries {
    fn request(&self) -> EnrichmentRequest {
        EnrichmentRequest {
            series_id: self.series_id.to_string(),
            context: self.context.to_string(),
            category: Some(self.category.to_string()),
            keywords: self.keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

pub const CORE_SERIES: &[CoreSeries] = &[
    CoreSeries {
        series_id: "GDP",
        context: "Gross Domestic Product, which measures total economic output",
        keywords: &["gdp", "economic growth", "output"],
        category: "GDP",
    },
    CoreSeries {
        series_id: "CPIAUCSL",
        context: "Consumer Price Index, which measures inflation and price changes",
        keywords: &["inflation", "prices", "cpi", "consumer price index"],
        category: "Inflation",
    },
    CoreSeries {
        series_id: "FPCPITOTLZGEUU",
        context: "Consumer Price Index, which measures inflation and price changes in the European Union",
        keywords: &[
            "inflation",
            "prices",
            "cpi",
            "eurozone",
            "european union",
            "eu",
            "europe",
            "euro",
            "consumer price index",
        ],
        category: "Inflation",
    },
    CoreSeries {
        series_id: "UNRATE",
        context: "Unemployment Rate, measuring joblessness in the labor force",
        keywords: &["unemployment", "jobless", "jobs"],
        category: "Unemployment",
    },
    CoreSeries {
        series_id: "DFF",
        context: "Federal Funds Rate, the key interest rate set by the Federal Reserve",
        keywords: &["interest", "rate", "federal funds rate", "monetary policy"],
        category: "Interest Rates",
    },
];

/// Per-run tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub stored: Vec<String>,
    pub skipped: Vec<String>,
    /// `(series_id, error)` pairs.
    pub failed: Vec<(String, String)>,
}

impl SeedReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Enrich and store every series in `series`, sequentially.
pub async fn seed_index(enricher: &SeriesEnricher, series: &[CoreSeries]) -> SeedReport {
    let mut report = SeedReport::default();
    info!(count = series.len(), "seeding semantic index");

    for core in series {
        match enricher.enrich_and_store(&core.request()).await {
            Ok(EnrichmentOutcome::Stored) => {
                info!(series_id = core.series_id, "seeded");
                report.stored.push(core.series_id.to_string());
            }
            Ok(EnrichmentOutcome::AlreadyStored) => {
                info!(series_id = core.series_id, "already indexed, skipping");
                report.skipped.push(core.series_id.to_string());
            }
            Err(e) => {
                warn!(series_id = core.series_id, error = %e, "seeding failed");
                report.failed.push((core.series_id.to_string(), e.to_string()));
            }
        }
    }

    info!(
        stored = report.stored.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "seeding finished"
    );
    report
}
