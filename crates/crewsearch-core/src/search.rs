//! Web search capability backed by the LinkUp search API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tracing::{debug, instrument, warn};

use crate::capability::{Capability, CapabilityError, RAW_INPUT_ARGUMENT};
use crate::config::SearchConfig;
use crate::redaction::error_text;
use crate::{CredentialSource, CrewSearchError, SecretValue};

pub const SEARCH_TOOL_NAME: &str = "linkup_search";

/// How hard the provider should look. Unknown values are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchDepth {
    #[default]
    Standard,
    Deep,
    Other(String),
}

impl SearchDepth {
    pub fn parse(value: &str) -> Self {
        match value {
            "standard" => Self::Standard,
            "deep" => Self::Deep,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Standard => "standard",
            Self::Deep => "deep",
            Self::Other(raw) => raw,
        }
    }
}

impl Serialize for SearchDepth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Shape of the provider response. Unknown values are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputType {
    #[default]
    SearchResults,
    SourcedAnswer,
    Structured,
    Other(String),
}

impl OutputType {
    pub fn parse(value: &str) -> Self {
        match value {
            "searchResults" => Self::SearchResults,
            "sourcedAnswer" => Self::SourcedAnswer,
            "structured" => Self::Structured,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SearchResults => "searchResults",
            Self::SourcedAnswer => "sourcedAnswer",
            Self::Structured => "structured",
            Self::Other(raw) => raw,
        }
    }
}

impl Serialize for OutputType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub depth: SearchDepth,
    pub output_type: OutputType,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            depth: SearchDepth::default(),
            output_type: OutputType::default(),
        }
    }

    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }
}

/// A web-search backend reached through a fixed request/response contract.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        credential: &SecretValue,
        query: &SearchQuery,
    ) -> Result<serde_json::Value, CapabilityError>;
}

#[derive(Serialize)]
struct LinkupRequest<'a> {
    q: &'a str,
    depth: &'a SearchDepth,
    #[serde(rename = "outputType")]
    output_type: &'a OutputType,
}

/// HTTP client for `POST /v1/search` on the LinkUp API.
pub struct LinkupProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl LinkupProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CrewSearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                CrewSearchError::InvalidConfiguration(format!("search client: {err}"))
            })?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, CrewSearchError> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl SearchProvider for LinkupProvider {
    fn name(&self) -> &str {
        "linkup"
    }

    async fn search(
        &self,
        credential: &SecretValue,
        query: &SearchQuery,
    ) -> Result<serde_json::Value, CapabilityError> {
        let body = LinkupRequest {
            q: &query.query,
            depth: &query.depth,
            output_type: &query.output_type,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| CapabilityError::Network(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let message = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Authentication(if message.is_empty() {
                status.to_string()
            } else {
                message
            }));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "search provider returned error");
            return Err(CapabilityError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| CapabilityError::Decode(err.to_string()))
    }
}

/// The web-search capability handed to agents.
///
/// The credential is resolved on every call, never at construction.
pub struct SearchCapability {
    provider: Arc<dyn SearchProvider>,
    credential: CredentialSource,
    default_depth: SearchDepth,
    default_output_type: OutputType,
}

impl SearchCapability {
    pub fn new(provider: Arc<dyn SearchProvider>, credential: CredentialSource) -> Self {
        Self {
            provider,
            credential,
            default_depth: SearchDepth::default(),
            default_output_type: OutputType::default(),
        }
    }

    pub fn with_defaults(mut self, depth: SearchDepth, output_type: OutputType) -> Self {
        self.default_depth = depth;
        self.default_output_type = output_type;
        self
    }

    pub fn credential(&self) -> &CredentialSource {
        &self.credential
    }

    /// Typed search: the stringified provider payload or the failure.
    #[instrument(
        name = "capability.search",
        skip(self, query),
        fields(provider = self.provider.name(), depth = query.depth.as_str())
    )]
    pub async fn search(&self, query: &SearchQuery) -> Result<String, CapabilityError> {
        if query.query.trim().is_empty() {
            return Err(CapabilityError::InvalidArguments(
                "query must not be empty".into(),
            ));
        }

        let credential = self.credential.resolve().map_err(|err| match err {
            CrewSearchError::MissingSecret(var) => CapabilityError::MissingCredential(var),
            other => CapabilityError::MissingCredential(other.to_string()),
        })?;

        let payload = self.provider.search(&credential, query).await?;
        debug!("search provider responded");

        Ok(match payload {
            serde_json::Value::String(text) => text,
            other => serde_json::to_string_pretty(&other)
                .map_err(|err| CapabilityError::Decode(err.to_string()))?,
        })
    }

    /// String contract: the payload on success, `"Error: <message>"` otherwise.
    pub async fn run(&self, query: &str, depth: Option<&str>, output_type: Option<&str>) -> String {
        let request = SearchQuery::new(query)
            .with_depth(depth.map_or_else(|| self.default_depth.clone(), SearchDepth::parse))
            .with_output_type(
                output_type.map_or_else(|| self.default_output_type.clone(), OutputType::parse),
            );

        match self.search(&request).await {
            Ok(text) => text,
            Err(err) => error_text(err),
        }
    }
}

#[async_trait]
impl Capability for SearchCapability {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for information using LinkUp and return comprehensive results"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to perform"
                },
                "depth": {
                    "type": "string",
                    "description": "Depth of search: 'standard' or 'deep'",
                    "default": "standard"
                },
                "output_type": {
                    "type": "string",
                    "description": "Output type: 'searchResults', 'sourcedAnswer', or 'structured'",
                    "default": "searchResults"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, CapabilityError> {
        let query = arguments["query"]
            .as_str()
            .or_else(|| arguments[RAW_INPUT_ARGUMENT].as_str())
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| CapabilityError::InvalidArguments("missing 'query' argument".into()))?;

        let depth = arguments["depth"]
            .as_str()
            .map_or_else(|| self.default_depth.clone(), SearchDepth::parse);
        let output_type = arguments["output_type"]
            .as_str()
            .map_or_else(|| self.default_output_type.clone(), OutputType::parse);

        self.search(
            &SearchQuery::new(query)
                .with_depth(depth)
                .with_output_type(output_type),
        )
        .await
    }
}
