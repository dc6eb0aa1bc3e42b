//! Enrichment-and-store of newly discovered series.
//!
//! The index is append-only per series id: [`SeriesEnricher::enrich_and_store`]
//! checks existence first and never re-enriches or overwrites. For an absent
//! id it fetches the full catalog record, asks the oracle for a
//! [`SeriesEnhancement`], merges both into a fully-populated
//! [`CandidateRecord`] and stores it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::catalog::CatalogSearchClient;
use crate::error::ResolveResult;
use crate::index::SemanticIndexClient;
use crate::models::{CandidateRecord, CatalogHit, SeriesEnhancement};
use crate::oracle::{ask, ReasoningOracle};

/// What to enrich, with optional curated hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    pub series_id: String,
    /// Free-text context shown to the oracle (the concept that led here, or
    /// a curated description).
    pub context: String,
    pub category: Option<String>,
    /// Keywords that must survive into the stored record.
    pub keywords: Vec<String>,
}

impl EnrichmentRequest {
    /// A series found by live discovery for `concept`.
    pub fn discovered(series_id: impl Into<String>, concept: impl Into<String>) -> Self {
        Self {
            series_id: series_id.into(),
            context: concept.into(),
            category: None,
            keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// The index already held the series; nothing was written.
    AlreadyStored,
    Stored,
}

pub struct SeriesEnricher {
    index: Arc<SemanticIndexClient>,
    catalog: Arc<CatalogSearchClient>,
    oracle: Arc<dyn ReasoningOracle>,
    oracle_timeout: Duration,
}

impl SeriesEnricher {
    pub fn new(
        index: Arc<SemanticIndexClient>,
        catalog: Arc<CatalogSearchClient>,
        oracle: Arc<dyn ReasoningOracle>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            index,
            catalog,
            oracle,
            oracle_timeout,
        }
    }

    /// Enrich and store `request.series_id` unless the index already has it.
    pub async fn enrich_and_store(&self, request: &EnrichmentRequest) -> ResolveResult<EnrichmentOutcome> {
        if self.index.series_exists(&request.series_id).await? {
            debug!(series_id = %request.series_id, "series already indexed, skipping enrichment");
            return Ok(EnrichmentOutcome::AlreadyStored);
        }

        let info = self.catalog.series_info(&request.series_id).await?;
        let enhancement: SeriesEnhancement = ask(
            self.oracle.as_ref(),
            &enhancement_instructions(&info, request),
            "Analyze the series",
            self.oracle_timeout,
        )
        .await?;

        let record = CandidateRecord::enriched(&info, enhancement, &request.keywords);
        self.index.store_series(&record).await?;
        info!(
            series_id = %record.series_id,
            region = %record.region,
            category = %record.category,
            "stored enriched series"
        );
        Ok(EnrichmentOutcome::Stored)
    }
}

fn enhancement_instructions(info: &CatalogHit, request: &EnrichmentRequest) -> String {
    let mut prompt = format!(
        "Analyze this economic data series and provide structured information:\n\n\
         Title: {}\n\
         Series ID: {}\n\
         Original Description: {}\n\
         Units: {}\n\
         Frequency: {}\n\
         Context: {}\n",
        info.title,
        info.id,
        info.notes.as_deref().unwrap_or_default(),
        info.units.as_deref().unwrap_or_default(),
        info.frequency.as_deref().unwrap_or_default(),
        request.context,
    );
    if let Some(category) = &request.category {
        prompt.push_str(&format!("Category: {}\n", category));
    }
    if !request.keywords.is_empty() {
        prompt.push_str(&format!("Existing keywords: {}\n", request.keywords.join(", ")));
    }
    prompt.push_str(
        "\nProvide a comprehensive analysis including:\n\
         1. A clear description of what this series measures\n\
         2. Common use cases in economic analysis\n\
         3. Related economic concepts\n\
         4. Relevant search keywords\n\
         5. The primary economic category\n\
         6. The geographic region it covers, as a standard proper name",
    );
    prompt
}
