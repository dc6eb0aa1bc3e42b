//! End-to-end tests for series resolution and knowledge-base population.
//!
//! Every collaborator is a deterministic stub; the semantic index is the real
//! in-memory backend wrapped in a call counter.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use series_resolver::config::Config;
use series_resolver::dates::FixedClock;
use series_resolver::embedding::DisabledProvider;
use series_resolver::enrich::{EnrichmentOutcome, EnrichmentRequest};
use series_resolver::models::{CandidateRecord, SeriesEnhancement};
use series_resolver::pipeline::{Collaborators, SeriesResolver};
use series_resolver::resolve::EngineSettings;
use series_resolver::seed::{seed_index, CORE_SERIES};

fn unemployment_catalog() -> StubCatalog {
    StubCatalog::with_hits(vec![
        hit("UNRATE", "Unemployment Rate"),
        hit("LNU04000000", "Unemployment Rate (Not Seasonally Adjusted)"),
        hit("U6RATE", "Total Unemployed, Plus Marginally Attached"),
    ])
}

async fn store_enriched(h: &Harness, catalog_hit: &series_resolver::models::CatalogHit, category: &str) {
    let enhancement: SeriesEnhancement =
        serde_json::from_value(enhancement(category, &["gdp"])).unwrap();
    let record = CandidateRecord::enriched(catalog_hit, enhancement, &[]);
    h.index_client.store_series(&record).await.unwrap();
}

#[tokio::test]
async fn test_empty_index_falls_back_to_catalog_and_stores_discovery() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment rate / jobless rate United States"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.92, true))
        .answer("SeriesEnhancement", enhancement("Unemployment", &["jobless"]));
    let h = harness(unemployment_catalog(), oracle);

    let result = h
        .engine
        .resolve("US unemployment last 5 years", "unemployment", "United States")
        .await;

    assert!(result.is_valid());
    assert_eq!(result.series_id.as_deref(), Some("UNRATE"));
    assert_eq!(
        h.catalog.searches(),
        vec!["unemployment rate / jobless rate United States"]
    );
    // no ranking call for the empty semantic stage
    assert_eq!(
        h.oracle.calls(),
        vec!["SearchQuery", "SeriesSelection", "SeriesEnhancement"]
    );
    assert_eq!(h.index.upserts(), 1);
    assert!(h.index_client.series_exists("UNRATE").await.unwrap());
}

#[tokio::test]
async fn test_stored_discovery_round_trips_enriched_fields() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment rate"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.92, true))
        .answer("SeriesEnhancement", enhancement("Unemployment", &["jobless"]));
    let h = harness(unemployment_catalog(), oracle);
    h.engine.resolve("unemployment", "unemployment", "United States").await;

    let found = h.index_client.search_series("unemployment", 5).await.unwrap();
    assert_eq!(found.len(), 1);
    let record = &found[0].record;
    assert_eq!(record.series_id, "UNRATE");
    assert_eq!(record.region, "United States");
    assert_eq!(record.category, "Unemployment");
    assert_eq!(record.keywords, vec!["jobless"]);
    assert_eq!(record.seasonal_adjustment.as_deref(), Some("Seasonally Adjusted"));
}

#[tokio::test]
async fn test_catalog_without_hits_short_circuits() {
    let oracle = ScriptedOracle::new().answer("SearchQuery", search_query("housing starts Canada"));
    let h = harness(StubCatalog::default(), oracle);

    let result = h
        .engine
        .resolve("canadian housing starts", "housing starts", "Canada")
        .await;

    assert_eq!(result.series_id, None);
    assert_eq!(result.confidence, 0.0);
    assert!(!result.region_match);
    assert_eq!(result.reasoning, "no candidates for housing starts in Canada");
    assert_eq!(h.oracle.calls(), vec!["SearchQuery"]);
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_valid_semantic_match_skips_catalog() {
    let oracle = ScriptedOracle::new().answer("SeriesSelection", selection(Some("GDP"), 0.95, true));
    let h = harness(StubCatalog::default(), oracle);
    store_enriched(&h, &hit("GDP", "Gross Domestic Product"), "GDP").await;

    let result = h.engine.resolve("US GDP", "GDP", "United States").await;

    assert!(result.is_valid());
    assert_eq!(result.series_id.as_deref(), Some("GDP"));
    assert!(h.catalog.searches().is_empty());
    assert_eq!(h.oracle.calls(), vec!["SeriesSelection"]);
    // only the pre-stored record was written
    assert_eq!(h.index.upserts(), 1);
}

#[tokio::test]
async fn test_ranking_prompt_lists_semantic_candidates() {
    let oracle = ScriptedOracle::new().answer("SeriesSelection", selection(Some("GDP"), 0.95, true));
    let h = harness(StubCatalog::default(), oracle);
    store_enriched(&h, &hit("GDP", "Gross Domestic Product"), "GDP").await;

    h.engine.resolve("US GDP", "GDP", "United States").await;

    let instructions = h.oracle.instructions.lock().unwrap().clone();
    assert!(instructions[0].contains("concept 'GDP' in United States"));
    assert!(instructions[0].contains("Gross Domestic Product (GDP)"));
}

#[tokio::test]
async fn test_rejected_semantic_match_falls_through_once() {
    let oracle = ScriptedOracle::new()
        .answer("SeriesSelection", selection(Some("GDP"), 0.95, false))
        .answer("SearchQuery", search_query("gross domestic product Canada"))
        .answer("SeriesSelection", selection(Some("NGDPRSAXDCCAQ"), 0.88, true))
        .answer("SeriesEnhancement", enhancement("GDP", &["canada gdp"]));
    let catalog = StubCatalog::with_hits(vec![hit("NGDPRSAXDCCAQ", "Real GDP for Canada")]);
    let h = harness(catalog, oracle);
    store_enriched(&h, &hit("GDP", "Gross Domestic Product"), "GDP").await;

    let result = h.engine.resolve("Canada GDP", "GDP", "Canada").await;

    assert_eq!(result.series_id.as_deref(), Some("NGDPRSAXDCCAQ"));
    assert_eq!(h.catalog.searches().len(), 1);
    assert_eq!(
        h.oracle.calls(),
        vec!["SeriesSelection", "SearchQuery", "SeriesSelection", "SeriesEnhancement"]
    );
}

#[tokio::test]
async fn test_low_confidence_catalog_selection_is_returned_as_is() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.6, true));
    let h = harness(unemployment_catalog(), oracle);

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert_eq!(result.series_id.as_deref(), Some("UNRATE"));
    assert_eq!(result.confidence, 0.6);
    assert!(!result.is_valid());
    assert_eq!(h.catalog.searches().len(), 1);
    assert!(h.catalog.lookups().is_empty());
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_boundary_confidence_is_not_enriched() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.7, true));
    let h = harness(unemployment_catalog(), oracle);

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert!(!result.is_valid());
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_repeated_discovery_stores_one_entry() {
    let oracle = ScriptedOracle::new()
        // first call: catalog stage
        .answer("SearchQuery", search_query("unemployment rate"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true))
        .answer("SeriesEnhancement", enhancement("Unemployment", &["jobless"]))
        // second call: semantic candidates rejected, catalog picks the same id
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.5, true))
        .answer("SearchQuery", search_query("unemployment rate"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true));
    let h = harness(unemployment_catalog(), oracle);

    let first = h.engine.resolve("unemployment", "unemployment", "United States").await;
    let second = h.engine.resolve("jobless rate", "unemployment", "United States").await;

    assert_eq!(first.series_id, second.series_id);
    assert_eq!(h.index.upserts(), 1);
    assert_eq!(h.index.inner.len(), 1);
    // the second enrichment stopped at the existence check
    assert_eq!(h.catalog.lookups(), vec!["UNRATE"]);
    assert_eq!(
        h.oracle.calls().iter().filter(|c| *c == "SeriesEnhancement").count(),
        1
    );
}

#[tokio::test]
async fn test_enrichment_is_idempotent_per_series() {
    let oracle = ScriptedOracle::new().answer("SeriesEnhancement", enhancement("Unemployment", &[]));
    let h = harness(unemployment_catalog(), oracle);
    let enricher = h.engine.enricher();
    let request = EnrichmentRequest::discovered("UNRATE", "unemployment");

    assert_eq!(
        enricher.enrich_and_store(&request).await.unwrap(),
        EnrichmentOutcome::Stored
    );
    assert_eq!(
        enricher.enrich_and_store(&request).await.unwrap(),
        EnrichmentOutcome::AlreadyStored
    );
    assert_eq!(h.index.upserts(), 1);
}

#[tokio::test]
async fn test_oracle_outage_degrades_to_no_match() {
    let h = harness(unemployment_catalog(), ScriptedOracle::new());

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert_eq!(result.series_id, None);
    assert_eq!(result.confidence, 0.0);
    assert!(result.reasoning.contains("could not rank"));
    // rewrite failed, so the catalog was searched with concept and region
    assert_eq!(h.catalog.searches(), vec!["unemployment United States"]);
}

#[tokio::test]
async fn test_catalog_failure_degrades_to_no_match() {
    let catalog = StubCatalog {
        fail_search: true,
        ..Default::default()
    };
    let oracle = ScriptedOracle::new().answer("SearchQuery", search_query("unemployment"));
    let h = harness(catalog, oracle);

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert_eq!(result.series_id, None);
    assert!(!result.region_match);
    assert!(result.reasoning.contains("catalog search"));
    assert_eq!(h.oracle.calls(), vec!["SearchQuery"]);
}

#[tokio::test]
async fn test_selection_outside_candidates_is_rejected() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment"))
        .answer("SeriesSelection", selection(Some("NOT_A_CANDIDATE"), 0.99, true));
    let h = harness(unemployment_catalog(), oracle);

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert_eq!(result.series_id, None);
    assert!(result.reasoning.contains("NOT_A_CANDIDATE"));
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_enrichment_failure_does_not_change_selection() {
    // no enhancement is scripted, so enrichment fails at the oracle
    let catalog = StubCatalog::with_hits(vec![hit("UNRATE", "Unemployment Rate")]);
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true));
    let h = harness(catalog, oracle);

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert!(result.is_valid());
    assert_eq!(result.series_id.as_deref(), Some("UNRATE"));
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_embedding_outage_skips_semantic_stage() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true))
        .answer("SeriesEnhancement", enhancement("Unemployment", &[]));
    let h = harness_with(
        Arc::new(DisabledProvider),
        unemployment_catalog(),
        oracle,
        EngineSettings::default(),
    );

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert!(result.is_valid());
    assert_eq!(h.index.queries(), 0);
    assert_eq!(h.catalog.searches().len(), 1);
    // storing needs an embedding too
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_stalled_oracle_is_bounded_and_degrades_to_no_match() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment rate"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true))
        .delayed(Duration::from_secs(30));
    let settings = EngineSettings {
        oracle_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    };
    let h = harness_with(Arc::new(HashEmbedder), unemployment_catalog(), oracle, settings);

    let started = Instant::now();
    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.series_id, None);
    assert!(result.reasoning.contains("timed out"));
    // the timed-out rewrite falls back to concept and region
    assert_eq!(h.catalog.searches(), vec!["unemployment United States"]);
    assert_eq!(h.oracle.calls(), vec!["SearchQuery", "SeriesSelection"]);
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_stalled_embedder_is_bounded_and_falls_through_to_catalog() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true))
        .answer("SeriesEnhancement", enhancement("Unemployment", &[]));
    let h = harness_bounded(
        Arc::new(StalledEmbedder),
        unemployment_catalog(),
        oracle,
        EngineSettings::default(),
        Duration::from_millis(50),
    );

    let started = Instant::now();
    let result = h.engine.resolve("jobs", "unemployment", "United States").await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.series_id.as_deref(), Some("UNRATE"));
    assert_eq!(h.index.queries(), 0);
    assert_eq!(h.catalog.searches().len(), 1);
    // storing times out on the same embedder
    assert_eq!(h.index.upserts(), 0);
}

#[tokio::test]
async fn test_background_enrichment_eventually_stores() {
    let oracle = ScriptedOracle::new()
        .answer("SearchQuery", search_query("unemployment"))
        .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true))
        .answer("SeriesEnhancement", enhancement("Unemployment", &[]));
    let settings = EngineSettings {
        background_enrichment: true,
        ..EngineSettings::default()
    };
    let h = harness_with(Arc::new(HashEmbedder), unemployment_catalog(), oracle, settings);

    let result = h.engine.resolve("jobs", "unemployment", "United States").await;
    assert!(result.is_valid());

    for _ in 0..200 {
        if h.index.upserts() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.index.upserts(), 1);
}

#[tokio::test]
async fn test_seeding_skips_present_and_reports_failures() {
    let catalog = StubCatalog::with_hits(vec![
        hit("GDP", "Gross Domestic Product"),
        hit("UNRATE", "Unemployment Rate"),
    ]);
    let oracle = ScriptedOracle::new().answer("SeriesEnhancement", enhancement("Unemployment", &["labor"]));
    let h = harness(catalog, oracle);
    store_enriched(&h, &hit("GDP", "Gross Domestic Product"), "GDP").await;

    let report = seed_index(&h.engine.enricher(), CORE_SERIES).await;

    assert_eq!(report.skipped, vec!["GDP"]);
    assert_eq!(report.stored, vec!["UNRATE"]);
    let failed: Vec<&str> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(failed, vec!["CPIAUCSL", "FPCPITOTLZGEUU", "DFF"]);
    assert!(!report.is_complete());

    let stored = h.index_client.search_series("unemployment", 5).await.unwrap();
    let unrate = stored
        .iter()
        .find(|c| c.record.series_id == "UNRATE")
        .unwrap();
    // curated keywords come first
    assert_eq!(
        unrate.record.keywords,
        vec!["unemployment", "jobless", "jobs", "labor"]
    );
}

#[tokio::test]
async fn test_pipeline_resolves_raw_query() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .answer(
                "DateRequests",
                serde_json::json!({
                    "start_date": { "period": "year", "duration": 10 },
                    "end_date": { "period": "current" }
                }),
            )
            .answer(
                "ConceptExtraction",
                serde_json::json!({ "region": "USA", "economic_concept": "Unemployment" }),
            )
            .answer("SearchQuery", search_query("unemployment rate United States"))
            .answer("SeriesSelection", selection(Some("UNRATE"), 0.9, true))
            .answer("SeriesEnhancement", enhancement("Unemployment", &[])),
    );
    let catalog = Arc::new(unemployment_catalog());
    let resolver = SeriesResolver::with_collaborators(
        &Config::default(),
        Collaborators {
            embedder: Arc::new(HashEmbedder),
            index: Arc::new(CountingIndex::default()),
            catalog: catalog.clone(),
            oracle: oracle.clone(),
            clock: Arc::new(FixedClock(
                chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            )),
        },
    );

    let resolution = resolver
        .resolve_query("US unemployment over the last 10 years")
        .await;

    assert_eq!(resolution.metadata.region, "United States");
    assert_eq!(resolution.metadata.economic_concept, "Unemployment");
    assert_eq!(resolution.metadata.start_date.as_deref(), Some("2014-06-15"));
    assert_eq!(resolution.metadata.end_date.as_deref(), Some("2024-06-15"));
    assert_eq!(resolution.selection.series_id.as_deref(), Some("UNRATE"));
    assert_eq!(catalog.searches(), vec!["unemployment rate United States"]);

    let json = serde_json::to_value(&resolution).unwrap();
    assert_eq!(json["selection"]["series_id"], "UNRATE");
    assert_eq!(json["metadata"]["start_date"], "2014-06-15");
}
