//! Core data models used throughout the resolver.
//!
//! [`CandidateRecord`] is the canonical representation of a resolvable
//! series. It is minted either from a catalog search hit (descriptive fields
//! only) or reconstructed from the semantic index (fully enriched).
//! [`SeriesSelection`] is the outcome of resolution, and the remaining types
//! are the structured outputs requested from the reasoning oracle.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ResolveError, ResolveResult};
use crate::oracle::OracleOutput;
use crate::region::{normalize_region, DEFAULT_REGION};

/// Prefix of the semantic index key derived from a series id.
pub const EMBEDDING_ID_PREFIX: &str = "series_";

/// Minimum confidence (exclusive) for a selection to be usable.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Placeholder for descriptive fields the catalog did not provide.
pub const UNKNOWN: &str = "Unknown";

const METADATA_KEY_PREFIX: &str = "metadata_";

/// Flat metadata map in the shape vector stores accept: primitives and
/// string lists only.
pub type IndexMetadata = serde_json::Map<String, Value>;

/// Semantic index key for a series id.
pub fn embedding_id_for(series_id: &str) -> String {
    format!("{}{}", EMBEDDING_ID_PREFIX, series_id)
}

/// A primitive passthrough value preserved from the source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl MetadataValue {
    fn to_json(&self) -> Value {
        match self {
            MetadataValue::Flag(b) => Value::Bool(*b),
            MetadataValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetadataValue::Text(s) => Value::String(s.clone()),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MetadataValue::Flag(*b)),
            Value::Number(n) => n.as_f64().map(MetadataValue::Number),
            Value::String(s) => Some(MetadataValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Flag(b) => write!(f, "{}", b),
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

/// A raw record returned by the catalog search service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogHit {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub seasonal_adjustment: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl CatalogHit {
    /// Passthrough metadata kept for citation and formatting.
    fn passthrough_metadata(&self) -> BTreeMap<String, MetadataValue> {
        let mut metadata = BTreeMap::new();
        metadata.insert("title".to_string(), MetadataValue::from(self.title.as_str()));
        let optional = [
            ("notes", &self.notes),
            ("units", &self.units),
            ("frequency", &self.frequency),
            ("seasonal_adjustment", &self.seasonal_adjustment),
            ("last_updated", &self.last_updated),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                metadata.insert(key.to_string(), MetadataValue::from(v.as_str()));
            }
        }
        metadata
    }
}

fn or_unknown(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// One economic data series known to the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub series_id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub region: String,
    pub category: String,
    pub description: String,
    pub frequency: String,
    pub units: String,
    pub seasonal_adjustment: Option<String>,
    pub common_uses: Vec<String>,
    pub related_concepts: Vec<String>,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl CandidateRecord {
    /// Mint a minimally-populated record from a catalog hit.
    ///
    /// Keywords and region stay empty until enrichment; missing descriptive
    /// fields default to `"Unknown"`.
    pub fn from_catalog_hit(hit: &CatalogHit) -> Self {
        Self {
            series_id: hit.id.clone(),
            title: hit.title.clone(),
            keywords: Vec::new(),
            region: String::new(),
            category: or_unknown(&hit.group_id),
            description: or_unknown(&hit.notes),
            frequency: or_unknown(&hit.frequency),
            units: or_unknown(&hit.units),
            seasonal_adjustment: hit.seasonal_adjustment.clone(),
            common_uses: Vec::new(),
            related_concepts: Vec::new(),
            metadata: hit.passthrough_metadata(),
        }
    }

    /// Build a fully-populated record from the full catalog record and an
    /// oracle enhancement. `extra_keywords` come first in the merged list.
    pub fn enriched(info: &CatalogHit, enhancement: SeriesEnhancement, extra_keywords: &[String]) -> Self {
        Self {
            series_id: info.id.clone(),
            title: info.title.clone(),
            keywords: merge_keywords(extra_keywords, &enhancement.keywords),
            region: normalize_region(&enhancement.region),
            category: enhancement.category,
            description: enhancement.description,
            frequency: or_unknown(&info.frequency),
            units: or_unknown(&info.units),
            seasonal_adjustment: info.seasonal_adjustment.clone(),
            common_uses: enhancement.common_uses,
            related_concepts: enhancement.related_concepts,
            metadata: info.passthrough_metadata(),
        }
    }

    /// Semantic index key; a pure function of `series_id`.
    pub fn embedding_id(&self) -> String {
        embedding_id_for(&self.series_id)
    }

    /// Canonical text that gets embedded when the record is stored.
    pub fn to_embedding_text(&self) -> String {
        let mut text = format!(
            "Series: {} ({})\nRegion: {}\nCategory: {}\nFrequency: {}\nUnits: {}\n",
            self.title, self.series_id, self.region, self.category, self.frequency, self.units
        );
        if let Some(adj) = &self.seasonal_adjustment {
            text.push_str(&format!("Seasonal adjustment: {}\n", adj));
        }
        text.push_str(&format!("Description: {}\n", self.description));
        if !self.keywords.is_empty() {
            text.push_str(&format!("Keywords: {}\n", self.keywords.join(", ")));
        }
        if !self.common_uses.is_empty() {
            text.push_str(&format!("Common uses: {}\n", self.common_uses.join("; ")));
        }
        if !self.related_concepts.is_empty() {
            text.push_str(&format!(
                "Related concepts: {}\n",
                self.related_concepts.join(", ")
            ));
        }
        text
    }

    /// One line used when presenting candidates to the oracle.
    pub fn summary_line(&self) -> String {
        let mut line = format!("- {} ({}): {}", self.title, self.series_id, self.description);
        if !self.region.is_empty() {
            line.push_str(&format!(" [region: {}]", self.region));
        }
        line.push_str(&format!(" [frequency: {}, units: {}]", self.frequency, self.units));
        line
    }

    /// Flatten into the semantic index's storage representation.
    ///
    /// Passthrough metadata entries are stored under `metadata_<key>`;
    /// `seasonal_adjustment` is omitted when absent.
    pub fn to_index_metadata(&self) -> IndexMetadata {
        let mut map = IndexMetadata::new();
        map.insert("series_id".into(), Value::String(self.series_id.clone()));
        map.insert("title".into(), Value::String(self.title.clone()));
        map.insert("keywords".into(), string_list(&self.keywords));
        map.insert("region".into(), Value::String(self.region.clone()));
        map.insert("category".into(), Value::String(self.category.clone()));
        map.insert("description".into(), Value::String(self.description.clone()));
        map.insert("frequency".into(), Value::String(self.frequency.clone()));
        map.insert("units".into(), Value::String(self.units.clone()));
        if let Some(adj) = &self.seasonal_adjustment {
            map.insert("seasonal_adjustment".into(), Value::String(adj.clone()));
        }
        map.insert("common_uses".into(), string_list(&self.common_uses));
        map.insert("related_concepts".into(), string_list(&self.related_concepts));
        for (key, value) in &self.metadata {
            // vector stores reject nulls; non-finite numbers have no JSON form
            let value = value.to_json();
            if !value.is_null() {
                map.insert(format!("{}{}", METADATA_KEY_PREFIX, key), value);
            }
        }
        map
    }

    /// Reconstruct a record from [`to_index_metadata`](Self::to_index_metadata) output.
    pub fn from_index_metadata(map: &IndexMetadata) -> ResolveResult<Self> {
        let metadata = map
            .iter()
            .filter_map(|(key, value)| {
                let key = key.strip_prefix(METADATA_KEY_PREFIX)?;
                MetadataValue::from_json(value).map(|v| (key.to_string(), v))
            })
            .collect();

        Ok(Self {
            series_id: required_str(map, "series_id")?,
            title: required_str(map, "title")?,
            keywords: str_list(map, "keywords")?,
            region: required_str(map, "region")?,
            category: required_str(map, "category")?,
            description: required_str(map, "description")?,
            frequency: required_str(map, "frequency")?,
            units: required_str(map, "units")?,
            seasonal_adjustment: map
                .get("seasonal_adjustment")
                .and_then(Value::as_str)
                .map(str::to_string),
            common_uses: str_list(map, "common_uses")?,
            related_concepts: str_list(map, "related_concepts")?,
            metadata,
        })
    }
}

fn string_list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn required_str(map: &IndexMetadata, key: &str) -> ResolveResult<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ResolveError::validation(format!("index metadata missing '{}'", key)))
}

fn str_list(map: &IndexMetadata, key: &str) -> ResolveResult<Vec<String>> {
    match map.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ResolveError::validation(format!("index metadata '{}' holds a non-string", key))
                })
            })
            .collect(),
        Some(_) => Err(ResolveError::validation(format!(
            "index metadata '{}' is not a list",
            key
        ))),
    }
}

/// Merge keyword lists, dropping case-insensitive duplicates and blanks.
/// The first occurrence wins.
pub fn merge_keywords(first: &[String], second: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    first
        .iter()
        .chain(second.iter())
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Outcome of series resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesSelection {
    /// Catalog series id of the selected series, or null if no candidate fits.
    #[serde(default)]
    pub series_id: Option<String>,
    /// Confidence score for the selection (0-1). Selections at or below 0.7
    /// are declined.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
    /// Explanation for why this series was selected or why no match was found.
    pub reasoning: String,
    /// Whether the series matches the requested region.
    pub region_match: bool,
}

impl SeriesSelection {
    /// A "no acceptable match" selection carrying `reasoning`.
    pub fn no_match(reasoning: impl Into<String>) -> Self {
        Self {
            series_id: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            region_match: false,
        }
    }

    /// The selection returned when the catalog has nothing for the request.
    pub fn no_candidates(concept: &str, region: &str) -> Self {
        Self::no_match(format!("no candidates for {} in {}", concept, region))
    }

    /// `series_id` present, `confidence > 0.7` and `region_match`.
    pub fn is_valid(&self) -> bool {
        self.series_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
            && self.confidence > CONFIDENCE_THRESHOLD
            && self.region_match
    }
}

impl OracleOutput for SeriesSelection {
    fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} is outside [0, 1]", self.confidence));
        }
        Ok(())
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Oracle-generated description of a newly discovered series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesEnhancement {
    /// Clear, detailed description of what the series measures.
    pub description: String,
    /// Common use cases for this data in economic analysis.
    pub common_uses: Vec<String>,
    /// Related economic concepts.
    pub related_concepts: Vec<String>,
    /// Relevant keywords for searching this series.
    pub keywords: Vec<String>,
    /// Primary economic category this series belongs to.
    pub category: String,
    /// Geographic region this series pertains to, as a standard proper name.
    /// Defaults to 'United States' when it cannot be determined.
    #[serde(default = "default_region")]
    pub region: String,
}

impl OracleOutput for SeriesEnhancement {
    fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("category must not be empty".to_string());
        }
        Ok(())
    }
}

/// Oracle-optimized catalog search string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchQuery {
    /// Optimized search terms only, no explanation.
    pub query: String,
}

impl OracleOutput for SearchQuery {
    fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        Ok(())
    }
}

/// Region and economic concept extracted from a raw query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConceptExtraction {
    /// Geographic region as a standard proper name, e.g. 'US' -> 'United
    /// States', 'Eurozone' -> 'European Union'. Absent when the query names
    /// no region.
    #[serde(default)]
    pub region: Option<String>,
    /// Main economic concept (e.g. GDP, Inflation, Unemployment).
    pub economic_concept: String,
}

impl OracleOutput for ConceptExtraction {
    fn validate(&self) -> Result<(), String> {
        if self.economic_concept.trim().is_empty() {
            return Err("economic_concept must not be empty".to_string());
        }
        Ok(())
    }
}

/// Structured representation of a user's query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub region: String,
    pub economic_concept: String,
    /// ISO start date; `None` means earliest available.
    pub start_date: Option<String>,
    /// ISO end date; `None` means latest available.
    pub end_date: Option<String>,
}

impl QueryMetadata {
    /// Degraded metadata: the raw query as the concept, no dates.
    pub fn fallback(raw_query: &str, default_region: &str) -> Self {
        Self {
            region: default_region.to_string(),
            economic_concept: raw_query.to_string(),
            start_date: None,
            end_date: None,
        }
    }
}

impl fmt::Display for QueryMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} data for {} from {} to {}",
            self.economic_concept,
            self.region,
            self.start_date.as_deref().unwrap_or("earliest"),
            self.end_date.as_deref().unwrap_or("latest")
        )
    }
}
