//! Series resolution: concept + region to a [`SeriesSelection`].
//!
//! One call runs each stage at most once, strictly in order:
//!
//! 1. **Semantic stage**: embed `"user query: .., concept: .., region: .."`,
//!    take the top-K stored records, let the oracle rank them. A valid
//!    selection is returned immediately.
//! 2. **Catalog stage**: have the oracle rewrite the request into a catalog
//!    search string, search the catalog, mint candidates from the leading
//!    hits, let the oracle rank them. The result is returned as-is.
//! 3. **Enrichment**: a valid catalog-stage selection is enriched and stored
//!    (see [`crate::enrich`]) before returning, or on a spawned task when
//!    `background_enrichment` is set. Its failures are logged only.
//!
//! [`SeriesResolutionEngine::resolve`] never fails. Every internal error
//! degrades to the next stage or to a no-match selection whose `reasoning`
//! says what went wrong.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::catalog::CatalogSearchClient;
use crate::config::Config;
use crate::enrich::{EnrichmentOutcome, EnrichmentRequest, SeriesEnricher};
use crate::error::ResolveResult;
use crate::index::SemanticIndexClient;
use crate::models::{CandidateRecord, SearchQuery, SeriesSelection};
use crate::oracle::{ask, ReasoningOracle};

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub top_k: usize,
    /// Outer bound on each oracle call, retries included.
    pub oracle_timeout: Duration,
    pub background_enrichment: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            oracle_timeout: Duration::from_secs(60),
            background_enrichment: false,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.resolution.top_k,
            oracle_timeout: config.oracle.call_budget(),
            background_enrichment: config.resolution.background_enrichment,
        }
    }
}

pub struct SeriesResolutionEngine {
    index: Arc<SemanticIndexClient>,
    catalog: Arc<CatalogSearchClient>,
    oracle: Arc<dyn ReasoningOracle>,
    enricher: Arc<SeriesEnricher>,
    settings: EngineSettings,
}

impl SeriesResolutionEngine {
    pub fn new(
        index: Arc<SemanticIndexClient>,
        catalog: Arc<CatalogSearchClient>,
        oracle: Arc<dyn ReasoningOracle>,
        settings: EngineSettings,
    ) -> Self {
        let enricher = Arc::new(SeriesEnricher::new(
            index.clone(),
            catalog.clone(),
            oracle.clone(),
            settings.oracle_timeout,
        ));
        Self {
            index,
            catalog,
            oracle,
            enricher,
            settings,
        }
    }

    /// The enricher this engine stores discoveries with.
    pub fn enricher(&self) -> Arc<SeriesEnricher> {
        self.enricher.clone()
    }

    /// Resolve `concept` in `region` to a series.
    #[instrument(skip(self, user_query))]
    pub async fn resolve(&self, user_query: &str, concept: &str, region: &str) -> SeriesSelection {
        if let Some(selection) = self.semantic_stage(user_query, concept, region).await {
            return selection;
        }
        self.catalog_stage(user_query, concept, region).await
    }

    async fn semantic_stage(&self, user_query: &str, concept: &str, region: &str) -> Option<SeriesSelection> {
        let text = format!(
            "user query: {}, concept: {}, region: {}",
            user_query, concept, region
        );
        let candidates = match self.index.search_series(&text, self.settings.top_k).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "semantic index search failed, falling back to catalog");
                return None;
            }
        };
        if candidates.is_empty() {
            info!("semantic index has no candidates, falling back to catalog");
            return None;
        }

        for candidate in &candidates {
            debug!(
                series_id = %candidate.record.series_id,
                score = candidate.score,
                "semantic candidate"
            );
        }
        let records: Vec<CandidateRecord> = candidates.into_iter().map(|c| c.record).collect();
        match self.rank(user_query, concept, region, &records).await {
            Ok(selection) if selection.is_valid() => {
                info!(
                    series_id = ?selection.series_id,
                    confidence = selection.confidence,
                    "resolved from semantic index"
                );
                Some(selection)
            }
            Ok(selection) => {
                info!(
                    series_id = ?selection.series_id,
                    confidence = selection.confidence,
                    region_match = selection.region_match,
                    "semantic candidates rejected, falling back to catalog"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "ranking semantic candidates failed, falling back to catalog");
                None
            }
        }
    }

    async fn catalog_stage(&self, user_query: &str, concept: &str, region: &str) -> SeriesSelection {
        let query = self.search_query(user_query, concept, region).await;

        let candidates = match self.catalog.search_candidates(&query).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, query = %query, "catalog search failed");
                return SeriesSelection::no_match(format!(
                    "catalog search for {} in {} failed: {}",
                    concept, region, e
                ));
            }
        };
        if candidates.is_empty() {
            info!(query = %query, "catalog returned no hits");
            return SeriesSelection::no_candidates(concept, region);
        }

        let selection = match self.rank(user_query, concept, region, &candidates).await {
            Ok(selection) => selection,
            Err(e) => {
                warn!(error = %e, "ranking catalog candidates failed");
                return SeriesSelection::no_match(format!(
                    "could not rank catalog candidates for {} in {}: {}",
                    concept, region, e
                ));
            }
        };

        info!(
            series_id = ?selection.series_id,
            confidence = selection.confidence,
            valid = selection.is_valid(),
            "resolved from catalog"
        );
        if let (true, Some(series_id)) = (selection.is_valid(), &selection.series_id) {
            self.enrich(EnrichmentRequest::discovered(series_id.clone(), concept))
                .await;
        }
        selection
    }

    /// Oracle-optimized catalog search string, or `"<concept> <region>"`.
    async fn search_query(&self, user_query: &str, concept: &str, region: &str) -> String {
        let instructions = format!(
            "Given:\n\
             Original Query: {}\n\
             Economic Concept: {}\n\
             Region: {}\n\n\
             Create a search query optimized for an economic data series catalog.\n\
             Consider:\n\
             1. Technical economic terms\n\
             2. Unpack standard abbreviations (e.g. 'CPI' to 'Consumer Price Index')\n\
             3. Regional identifiers, using standard names (e.g. 'United States' instead of 'US')\n\
             4. Category terms\n\
             5. Combine alternate phrasings, for example 'unemployment rate / jobless rate'\n\
             6. Combine regional identifiers (e.g. 'US / United States / USA')\n\n\
             Return only the optimized search terms, no explanation.",
            user_query, concept, region
        );

        let rewritten: ResolveResult<SearchQuery> = ask(
            self.oracle.as_ref(),
            &instructions,
            "Write the search query",
            self.settings.oracle_timeout,
        )
        .await;
        match rewritten {
            Ok(q) => q.query.trim().to_string(),
            Err(e) => {
                let fallback = format!("{} {}", concept, region).trim().to_string();
                warn!(error = %e, fallback = %fallback, "search query rewrite failed");
                fallback
            }
        }
    }

    async fn rank(
        &self,
        user_query: &str,
        concept: &str,
        region: &str,
        candidates: &[CandidateRecord],
    ) -> ResolveResult<SeriesSelection> {
        let listing: Vec<String> = candidates.iter().map(CandidateRecord::summary_line).collect();
        let instructions = format!(
            "Analyze these economic data series for the concept '{}' in {}:\n{}\n\n\
             Pick the single series that best answers the user query, or none if no \
             series fits. Give a confidence between 0 and 1, and set region_match only \
             if the series covers {}.",
            concept,
            region,
            listing.join("\n"),
            region
        );
        let input = format!("Select the best matching series for this user query: {}", user_query);

        let selection: SeriesSelection = ask(
            self.oracle.as_ref(),
            &instructions,
            &input,
            self.settings.oracle_timeout,
        )
        .await?;
        Ok(guard_candidates(selection, candidates))
    }

    async fn enrich(&self, request: EnrichmentRequest) {
        if self.settings.background_enrichment {
            let enricher = self.enricher.clone();
            tokio::spawn(async move {
                let result = enricher.enrich_and_store(&request).await;
                log_enrichment(&request.series_id, result);
            });
        } else {
            let result = self.enricher.enrich_and_store(&request).await;
            log_enrichment(&request.series_id, result);
        }
    }
}

/// Keep the selection only if it names one of the candidates shown.
/// A blank id counts as no id.
fn guard_candidates(mut selection: SeriesSelection, candidates: &[CandidateRecord]) -> SeriesSelection {
    match selection.series_id.as_deref().map(str::trim) {
        None => selection,
        Some("") => {
            selection.series_id = None;
            selection
        }
        Some(id) if candidates.iter().any(|c| c.series_id == id) => {
            selection.series_id = Some(id.to_string());
            selection
        }
        Some(id) => {
            warn!(series_id = %id, "oracle selected a series outside the candidate set");
            SeriesSelection::no_match(format!(
                "selected series {} was not among the candidates",
                id
            ))
        }
    }
}

fn log_enrichment(series_id: &str, result: ResolveResult<EnrichmentOutcome>) {
    match result {
        Ok(EnrichmentOutcome::Stored) => info!(series_id, "new series stored in semantic index"),
        Ok(EnrichmentOutcome::AlreadyStored) => info!(series_id, "series already in semantic index"),
        Err(e) => warn!(series_id, error = %e, "enrichment failed"),
    }
}
