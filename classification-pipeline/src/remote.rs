use std::time::Duration;

use async_trait::async_trait;
use common::{
    error::AppError, storage::types::document::CategoryAssignment, utils::config::AppConfig,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Inputs forwarded to a remote classification service.
#[derive(Debug, Clone, Copy)]
pub struct RemoteClassificationRequest<'a> {
    pub document_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub content: &'a str,
}

/// An external classifier. Any error means the caller falls through to local classifiers.
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify(
        &self,
        request: RemoteClassificationRequest<'_>,
    ) -> Result<Vec<CategoryAssignment>, AppError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<P> {
    jsonrpc: &'static str,
    id: String,
    method: &'static str,
    params: P,
}

#[derive(Debug, Serialize)]
struct ToolCall<'a> {
    name: &'a str,
    arguments: ClassifyArguments<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyArguments<'a> {
    document_id: &'a str,
    title: &'a str,
    description: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct JsonRpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoteClassification {
    #[serde(default)]
    pub categories: Vec<RemotePrediction>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RemotePrediction {
    pub name: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl RemoteClassification {
    pub fn into_assignments(self) -> Vec<CategoryAssignment> {
        let source = format!("mcp-{}", self.model.as_deref().unwrap_or("ai"));
        self.categories
            .into_iter()
            .map(|prediction| {
                CategoryAssignment::new(prediction.name, prediction.confidence, source.as_str())
            })
            .collect()
    }
}

/// JSON-RPC client for an MCP classification server.
#[derive(Debug, Clone)]
pub struct McpClient {
    http: reqwest::Client,
    endpoint: String,
    tool_name: String,
}

impl McpClient {
    pub fn new(
        endpoint: impl Into<String>,
        tool_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            tool_name: tool_name.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.mcp_server_url.clone(),
            config.mcp_tool_name.clone(),
            Duration::from_millis(config.mcp_timeout_ms),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `ping`, retrying with `tools/list` for servers that do not implement it.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn ping(&self) -> Result<(), AppError> {
        let empty = serde_json::Map::new();
        match self.call::<_, serde_json::Value>("ping", &empty).await {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(error = %err, "ping failed, trying tools/list");
                self.call::<_, serde_json::Value>("tools/list", &empty)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn call<P, T>(&self, method: &'static str, params: P) -> Result<T, AppError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Uuid::new_v4().to_string(),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| communication("request failed", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Communication(format!(
                "MCP server returned HTTP {status}"
            )));
        }

        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| communication("malformed response", &e))?;

        if let Some(error) = body.error {
            return Err(AppError::Communication(format!(
                "MCP server error {}: {}",
                error.code, error.message
            )));
        }

        body.result
            .ok_or_else(|| AppError::Communication("MCP response carried no result".to_string()))
    }
}

fn communication(context: &str, err: &reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Communication(format!("{context}: timed out"))
    } else {
        AppError::Communication(format!("{context}: {err}"))
    }
}

#[async_trait]
impl RemoteClassifier for McpClient {
    #[instrument(skip_all, fields(document_id = %request.document_id))]
    async fn classify(
        &self,
        request: RemoteClassificationRequest<'_>,
    ) -> Result<Vec<CategoryAssignment>, AppError> {
        let params = ToolCall {
            name: &self.tool_name,
            arguments: ClassifyArguments {
                document_id: request.document_id,
                title: request.title,
                description: request.description,
                content: request.content,
            },
        };

        let result: RemoteClassification = self.call("tools/call", params).await?;
        debug!(
            categories = result.categories.len(),
            overall = result.confidence.unwrap_or_default(),
            "Remote classification received"
        );
        Ok(result.into_assignments())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method},
        Mock, MockServer, ResponseTemplate,
    };

    fn request() -> RemoteClassificationRequest<'static> {
        RemoteClassificationRequest {
            document_id: "doc-1",
            title: "Rust 2.0",
            description: "Release notes",
            content: "rust release notes",
        }
    }

    async fn client(server: &MockServer, timeout: Duration) -> McpClient {
        McpClient::new(server.uri(), "classify_document", timeout).expect("client")
    }

    #[tokio::test]
    async fn classify_sends_tool_call_and_maps_categories() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": {
                    "name": "classify_document",
                    "arguments": { "documentId": "doc-1", "title": "Rust 2.0" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "x",
                "result": {
                    "categories": [
                        { "name": "Technology", "confidence": 0.92, "reasoning": "mentions rust" },
                        { "name": "Technology Update", "confidence": 0.71, "reasoning": "release" }
                    ],
                    "model": "claude",
                    "confidence": 0.9
                }
            })))
            .mount(&server)
            .await;

        let assignments = client(&server, Duration::from_secs(5))
            .await
            .classify(request())
            .await
            .expect("classification");

        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].name, "Technology");
        assert_eq!(assignments[0].classifier, "mcp-claude");
    }

    #[tokio::test]
    async fn missing_model_defaults_source_tag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "categories": [ { "name": "Unknown", "confidence": 0.4 } ] }
            })))
            .mount(&server)
            .await;

        let assignments = client(&server, Duration::from_secs(5))
            .await
            .classify(request())
            .await
            .expect("classification");
        assert_eq!(assignments[0].classifier, "mcp-ai");
    }

    #[tokio::test]
    async fn rpc_error_is_communication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "code": -32601, "message": "Method not found" }
            })))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .await
            .classify(request())
            .await
            .expect_err("rpc error");
        assert!(matches!(err, AppError::Communication(ref m) if m.contains("Method not found")));
    }

    #[tokio::test]
    async fn non_success_status_is_communication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .await
            .classify(request())
            .await
            .expect_err("503");
        assert!(matches!(err, AppError::Communication(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "result": { "categories": [] } }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_millis(50))
            .await
            .classify(request())
            .await
            .expect_err("timeout");
        assert!(matches!(err, AppError::Communication(_)));
    }

    #[tokio::test]
    async fn ping_falls_back_to_tools_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "ping" })))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "tools/list" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "result": { "tools": [] } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server, Duration::from_secs(5))
            .await
            .ping()
            .await
            .expect("fallback succeeds");
    }
}
