//! Raw query to [`QueryMetadata`].
//!
//! The date range is extracted first and on its own: a date failure leaves
//! both bounds `None` and concept extraction still runs. A concept/region
//! failure yields [`QueryMetadata::fallback`] (the raw query as the concept,
//! the default region, no dates). [`QueryMetadataExtractor::extract`] never
//! fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::dates::{resolve_date_range, Clock, DateRange, DateRequests};
use crate::error::ResolveResult;
use crate::models::{ConceptExtraction, QueryMetadata};
use crate::oracle::{ask, ReasoningOracle};
use crate::region::normalize_region;

const DATE_INSTRUCTIONS: &str = "\
Extract start and end dates from the query. Follow these rules:

1. For relative periods (e.g. \"last 10 years\"):
   - Start date: use the matching period (day/week/month/year) with a duration
   - End date: use period=\"current\"

2. For exact date ranges (e.g. \"between Oct 12 2020 and Nov 19 2023\"):
   - Both dates: use period=\"exact\" with exact_date in MM-DD-YYYY format

3. For single point references (e.g. \"as of January 2023\"):
   - Both dates: use period=\"exact\" with the same exact_date

4. When the query names no time range, use period=\"current\" for both dates.

5. Exact dates are always MM-DD-YYYY.";

pub struct QueryMetadataExtractor {
    oracle: Arc<dyn ReasoningOracle>,
    clock: Arc<dyn Clock>,
    default_region: String,
    oracle_timeout: Duration,
}

impl QueryMetadataExtractor {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        clock: Arc<dyn Clock>,
        default_region: impl Into<String>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            clock,
            default_region: default_region.into(),
            oracle_timeout,
        }
    }

    #[instrument(skip(self))]
    pub async fn extract(&self, raw_query: &str) -> QueryMetadata {
        let dates = match self.extract_dates(raw_query).await {
            Ok(range) => Some(range),
            Err(e) => {
                warn!(error = %e, "date extraction failed, leaving range unbounded");
                None
            }
        };

        let instructions = format!(
            "Analyze this economic data query: '{}'\n\
             Extract the region and main economic concept.\n\
             Convert the region to a standard proper name. For example, 'US' should be \
             converted to 'United States', 'Eurozone' to 'European Union'.\n\
             If the region isn't specified, default to '{}'.",
            raw_query, self.default_region
        );
        let extraction: ResolveResult<ConceptExtraction> = ask(
            self.oracle.as_ref(),
            &instructions,
            "Extract query metadata",
            self.oracle_timeout,
        )
        .await;

        match extraction {
            Ok(found) => {
                let region = match found.region.as_deref().map(str::trim) {
                    Some(named) if !named.is_empty() => normalize_region(named),
                    _ => self.default_region.clone(),
                };
                let (start_date, end_date) = match dates {
                    Some(range) => (range.start, Some(range.end)),
                    None => (None, None),
                };
                let metadata = QueryMetadata {
                    region,
                    economic_concept: found.economic_concept.trim().to_string(),
                    start_date,
                    end_date,
                };
                debug!(%metadata, "extracted query metadata");
                metadata
            }
            Err(e) => {
                warn!(error = %e, "concept extraction failed, using raw query");
                QueryMetadata::fallback(raw_query, &self.default_region)
            }
        }
    }

    async fn extract_dates(&self, raw_query: &str) -> ResolveResult<DateRange> {
        let today = self.clock.today();
        let requests: DateRequests = ask(
            self.oracle.as_ref(),
            DATE_INSTRUCTIONS,
            raw_query,
            self.oracle_timeout,
        )
        .await?;
        resolve_date_range(&requests.start_date, &requests.end_date, today)
    }
}
