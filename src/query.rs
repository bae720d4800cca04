//! Knowledge-base query client.
//!
//! [`RetrieveAndGenerate`] is the seam to the managed retrieval-and-generation
//! service; [`BedrockClient`] implements it against the Bedrock Agent Runtime
//! `RetrieveAndGenerate` REST operation. [`QueryClient`] is the boundary the
//! chat path uses: it makes a single attempt and turns every failure into an
//! apology answer with no citations.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::aws::{split_endpoint, AwsCredentials, CanonicalRequest, Signer};
use crate::citations::RetrievedReference;
use crate::config::KnowledgeBaseConfig;

/// Answer shown when the service call fails.
pub const APOLOGY: &str =
    "Sorry, I couldn't reach the regulations knowledge base just now. Please try again.";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("AWS credentials are not configured")]
    MissingCredentials,
    #[error("request to knowledge base failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("knowledge base returned HTTP {status}: {message}")]
    Service { status: u16, message: String },
    #[error("unexpected knowledge base response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Raw result of one retrieve-and-generate call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RagResponse {
    pub answer: String,
    /// Retrieved references across all citations, in citation order.
    pub references: Vec<RetrievedReference>,
}

#[async_trait]
pub trait RetrieveAndGenerate: Send + Sync {
    async fn retrieve_and_generate(&self, question: &str) -> Result<RagResponse, QueryError>;
}

// ============ Wire types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RagRequest<'a> {
    input: RagInput<'a>,
    retrieve_and_generate_configuration: RagConfiguration<'a>,
}

#[derive(Serialize)]
struct RagInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RagConfiguration<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    knowledge_base_configuration: KnowledgeBaseRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseRef<'a> {
    knowledge_base_id: &'a str,
    model_arn: &'a str,
}

#[derive(Deserialize)]
struct RagWireResponse {
    output: RagOutput,
    #[serde(default)]
    citations: Vec<RagCitation>,
}

#[derive(Deserialize)]
struct RagOutput {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RagCitation {
    #[serde(default)]
    retrieved_references: Vec<RetrievedReference>,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Parse a `RetrieveAndGenerate` response body.
pub fn parse_response(body: &str) -> Result<RagResponse, QueryError> {
    let wire: RagWireResponse = serde_json::from_str(body)?;
    Ok(RagResponse {
        answer: wire.output.text,
        references: wire
            .citations
            .into_iter()
            .flat_map(|c| c.retrieved_references)
            .collect(),
    })
}

// ============ Bedrock client ============

pub struct BedrockClient {
    http: reqwest::Client,
    credentials: Option<AwsCredentials>,
    region: String,
    knowledge_base_id: String,
    model_arn: String,
    scheme: String,
    host: String,
}

impl BedrockClient {
    pub fn new(
        config: &KnowledgeBaseConfig,
        credentials: Option<AwsCredentials>,
    ) -> Result<Self, QueryError> {
        let (scheme, host) = match config.endpoint_url {
            Some(ref endpoint) => {
                let (scheme, host) = split_endpoint(endpoint);
                (scheme.to_string(), host.to_string())
            }
            None => (
                "https".to_string(),
                format!("bedrock-agent-runtime.{}.amazonaws.com", config.region),
            ),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            credentials,
            region: config.region.clone(),
            knowledge_base_id: config.id.clone(),
            model_arn: config.model_arn(),
            scheme,
            host,
        })
    }

    /// Build a client with credentials from the environment.
    ///
    /// Missing credentials are not fatal here: the chat UI still starts and
    /// every query answers with an apology until they are provided.
    pub fn from_env(config: &KnowledgeBaseConfig) -> Result<Self, QueryError> {
        let credentials = match AwsCredentials::from_env() {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("{:#}; knowledge base queries will fail", e);
                None
            }
        };
        Self::new(config, credentials)
    }
}

#[async_trait]
impl RetrieveAndGenerate for BedrockClient {
    async fn retrieve_and_generate(&self, question: &str) -> Result<RagResponse, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(QueryError::MissingCredentials)?;

        let body = serde_json::to_vec(&RagRequest {
            input: RagInput { text: question },
            retrieve_and_generate_configuration: RagConfiguration {
                kind: "KNOWLEDGE_BASE",
                knowledge_base_configuration: KnowledgeBaseRef {
                    knowledge_base_id: &self.knowledge_base_id,
                    model_arn: &self.model_arn,
                },
            },
        })?;

        let path = "/retrieveAndGenerate";
        let headers = vec![("content-type".to_string(), "application/json".to_string())];
        let signed = Signer::new(credentials, &self.region, "bedrock").sign(
            &CanonicalRequest {
                method: "POST",
                host: &self.host,
                path,
                query: &[],
                headers: &headers,
                payload: &body,
            },
            Utc::now(),
        );

        let url = format!("{}://{}{}", self.scheme, self.host, path);
        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .body(body);
        for (name, value) in &signed {
            req = req.header(name.as_str(), value.as_str());
        }

        tracing::debug!(kb = %self.knowledge_base_id, "retrieveAndGenerate");
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ServiceErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| text.chars().take(500).collect());
            return Err(QueryError::Service {
                status: status.as_u16(),
                message,
            });
        }

        parse_response(&text)
    }
}

// ============ Query boundary ============

/// Single-attempt query boundary used by the chat path.
pub struct QueryClient {
    backend: Box<dyn RetrieveAndGenerate>,
}

impl QueryClient {
    pub fn new(backend: Box<dyn RetrieveAndGenerate>) -> Self {
        Self { backend }
    }

    /// Ask `question`; never fails.
    ///
    /// Service failures are logged and answered with [`APOLOGY`] and no
    /// references.
    pub async fn ask(&self, question: &str) -> RagResponse {
        match self.backend.retrieve_and_generate(question).await {
            Ok(resp) => {
                tracing::info!(references = resp.references.len(), "answer received");
                resp
            }
            Err(e) => {
                tracing::error!(error = %e, "knowledge base query failed");
                RagResponse {
                    answer: APOLOGY.to_string(),
                    references: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl RetrieveAndGenerate for Failing {
        async fn retrieve_and_generate(&self, _question: &str) -> Result<RagResponse, QueryError> {
            Err(QueryError::Service {
                status: 429,
                message: "ThrottlingException".to_string(),
            })
        }
    }

    #[test]
    fn parses_citations_in_order() {
        let body = r#"{
            "sessionId": "abc",
            "output": {"text": "Permits are required"},
            "citations": [
                {"generatedResponsePart": {}, "retrievedReferences": [
                    {"content": {"text": "..."}, "location": {"type": "S3", "s3Location": {"uri": "s3://b/T/A/one.pdf"}},
                     "metadata": {"agency": "A", "title": "T"}}
                ]},
                {"retrievedReferences": [
                    {"location": {"s3Location": {"uri": "s3://b/T/two.pdf"}}},
                    {"location": {"s3Location": {"uri": "s3://b/T/one.pdf"}}}
                ]}
            ]
        }"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.answer, "Permits are required");
        let uris: Vec<_> = resp.references.iter().map(|r| r.uri().unwrap()).collect();
        assert_eq!(uris, vec!["s3://b/T/A/one.pdf", "s3://b/T/two.pdf", "s3://b/T/one.pdf"]);
    }

    #[test]
    fn missing_citations_means_no_references() {
        let resp = parse_response(r#"{"output": {"text": "No idea"}}"#).unwrap();
        assert!(resp.references.is_empty());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        assert!(matches!(parse_response("<html>"), Err(QueryError::Decode(_))));
    }

    #[tokio::test]
    async fn failure_becomes_apology() {
        let client = QueryClient::new(Box::new(Failing));
        let resp = client.ask("Do I need a permit?").await;
        assert_eq!(resp.answer, APOLOGY);
        assert!(resp.references.is_empty());
    }

    #[test]
    fn endpoint_override_selects_scheme_and_host() {
        let kb = KnowledgeBaseConfig {
            endpoint_url: Some("http://127.0.0.1:9000/".to_string()),
            timeout_secs: 5,
            ..KnowledgeBaseConfig::default()
        };
        let client = BedrockClient::new(&kb, None).unwrap();
        assert_eq!(client.scheme, "http");
        assert_eq!(client.host, "127.0.0.1:9000");

        let hosted = BedrockClient::new(&KnowledgeBaseConfig::default(), None).unwrap();
        assert_eq!(hosted.host, "bedrock-agent-runtime.us-east-1.amazonaws.com");
    }

    #[tokio::test]
    async fn missing_credentials_is_reported() {
        let client = BedrockClient::new(&KnowledgeBaseConfig::default(), None).unwrap();
        let err = client.retrieve_and_generate("q").await.unwrap_err();
        assert!(matches!(err, QueryError::MissingCredentials));
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(RagRequest {
            input: RagInput { text: "q" },
            retrieve_and_generate_configuration: RagConfiguration {
                kind: "KNOWLEDGE_BASE",
                knowledge_base_configuration: KnowledgeBaseRef {
                    knowledge_base_id: "KB",
                    model_arn: "arn",
                },
            },
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "input": {"text": "q"},
                "retrieveAndGenerateConfiguration": {
                    "type": "KNOWLEDGE_BASE",
                    "knowledgeBaseConfiguration": {"knowledgeBaseId": "KB", "modelArn": "arn"}
                }
            })
        );
    }
}
