//! Reasoning oracle abstraction.
//!
//! The oracle is an injected capability with a single contract: given
//! instructions, an input and an output schema, produce a JSON value that
//! conforms to the schema, or fail. Concept extraction, candidate ranking,
//! search-query rewriting and metadata enrichment all go through it.
//!
//! Callers use [`ask`], which derives the schema from a Rust type, bounds the
//! call with a timeout, deserializes the answer and runs
//! [`OracleOutput::validate`] for constraints JSON schema cannot express.
//! Any mismatch is a [`ResolveError::Validation`].
//!
//! # Backends
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"disabled"` | [`DisabledOracle`] — every call fails |
//! | `"openai"` | [`OpenAIOracle`] — chat completions with `json_schema` response format |

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::OracleConfig;
use crate::error::{with_timeout, ResolveError, ResolveResult};
use crate::http;

/// Name and JSON schema of a structured oracle response.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    /// Derive the schema of `T`.
    pub fn of<T: JsonSchema>() -> Self {
        let mut schema = schemars::schema_for!(T).to_value();
        if let Value::Object(map) = &mut schema {
            map.remove("$schema");
        }
        Self {
            name: T::schema_name().to_string(),
            schema,
        }
    }
}

/// A structured type the oracle can be asked to produce.
pub trait OracleOutput: DeserializeOwned + JsonSchema {
    /// Semantic checks beyond the JSON schema.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Function from (instructions, input, output schema) to a conforming JSON value.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn invoke(
        &self,
        instructions: &str,
        input: &str,
        schema: &OutputSchema,
    ) -> ResolveResult<Value>;
}

/// Ask the oracle for a `T`.
///
/// # Errors
///
/// - [`ResolveError::Transport`] if the call fails or exceeds `timeout`.
/// - [`ResolveError::Validation`] if the answer does not deserialize into
///   `T` or fails [`OracleOutput::validate`].
pub async fn ask<T: OracleOutput>(
    oracle: &dyn ReasoningOracle,
    instructions: &str,
    input: &str,
    timeout: Duration,
) -> ResolveResult<T> {
    let schema = OutputSchema::of::<T>();
    let value = with_timeout(
        timeout,
        "reasoning oracle",
        oracle.invoke(instructions, input, &schema),
    )
    .await?;

    let parsed: T = serde_json::from_value(value).map_err(|e| {
        ResolveError::validation(format!("{} output does not match schema: {}", schema.name, e))
    })?;
    parsed
        .validate()
        .map_err(|e| ResolveError::validation(format!("{}: {}", schema.name, e)))?;
    Ok(parsed)
}

// ============ Disabled Oracle ============

/// An oracle that fails every call.
///
/// Used when `oracle.provider = "disabled"`. The resolution pipeline still
/// answers, with degraded results.
pub struct DisabledOracle;

#[async_trait]
impl ReasoningOracle for DisabledOracle {
    async fn invoke(&self, _: &str, _: &str, schema: &OutputSchema) -> ResolveResult<Value> {
        Err(ResolveError::transport(format!(
            "reasoning oracle is disabled; cannot produce {}",
            schema.name
        )))
    }
}

// ============ OpenAI Oracle ============

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Oracle backed by the OpenAI chat completions API.
///
/// Instructions go in the system message, the input in the user message,
/// and the schema in `response_format`. Requires `OPENAI_API_KEY`.
pub struct OpenAIOracle {
    model: String,
    temperature: f64,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIOracle {
    pub fn new(config: &OracleConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            api_key,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ReasoningOracle for OpenAIOracle {
    async fn invoke(
        &self,
        instructions: &str,
        input: &str,
        schema: &OutputSchema,
    ) -> ResolveResult<Value> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": input },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": false,
                },
            },
        });

        let response = http::send_json("OpenAI chat completion", self.max_retries, || {
            self.client
                .post(OPENAI_CHAT_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        parse_chat_content(&response)
    }
}

/// Extract and decode the JSON object in `choices[0].message.content`.
fn parse_chat_content(response: &Value) -> ResolveResult<Value> {
    let message = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ResolveError::validation("chat response has no message"))?;

    if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
        return Err(ResolveError::validation(format!("oracle refused: {}", refusal)));
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| ResolveError::validation("chat response has no content"))?;

    // Some models wrap JSON in a fenced block even in structured mode
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(trimmed)
        .map_err(|e| ResolveError::validation(format!("oracle content is not JSON: {}", e)))
}

/// Create the configured [`ReasoningOracle`].
pub fn create_oracle(config: &OracleConfig) -> anyhow::Result<Arc<dyn ReasoningOracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledOracle)),
        "openai" => Ok(Arc::new(OpenAIOracle::new(config)?)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}
