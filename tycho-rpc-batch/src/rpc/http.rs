//! # JSON-RPC over HTTP
//!
//! [`HttpBatchTransport`] speaks JSON-RPC 2.0 to a node over HTTP. Batches are sent as a JSON
//! array whose request ids are the call positions, which lets responses come back in any order.
use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{header, Client, ClientBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{instrument, trace};
use url::Url;

use crate::{
    errors::RequestError,
    rpc::{BatchTransport, CallOutcome, RpcCall},
    RPCError,
};

const JSONRPC_VERSION: &str = "2.0";

#[derive(Serialize, Debug)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

impl<'a> JsonRpcRequest<'a> {
    fn new(id: u64, call: &'a RpcCall) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, method: &call.method, params: &call.params }
    }
}

#[derive(Deserialize, Debug)]
struct JsonRpcErrorPayload {
    code: i64,
    message: String,
}

/// A single JSON-RPC response object.
///
/// `jsonrpc` and `id` are mandatory, so bodies that merely happen to be JSON objects (e.g. an
/// error page from a gateway) are not mistaken for replies.
#[derive(Deserialize, Debug)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(default, deserialize_with = "deserialize_present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorPayload>,
}

/// Maps a present `result` field to `Some`, even when it is `null`. A missing field stays `None`
/// through `#[serde(default)]`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    fn into_outcome(self) -> CallOutcome {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(RPCError::other(format!(
                "Unsupported JSON-RPC version {version}",
                version = self.jsonrpc
            )));
        }
        match (self.error, self.result) {
            (Some(JsonRpcErrorPayload { code, message }), _) => {
                Err(RPCError::RequestError(RequestError::JsonRpc { code, message }))
            }
            // A `null` result is a valid answer, e.g. for an unknown block
            (None, Some(result)) => Ok(result),
            (None, None) => Err(RPCError::other(format!(
                "JSON-RPC response {id} carries neither result nor error",
                id = self.id
            ))),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum JsonRpcReply {
    Batch(Vec<JsonRpcResponse>),
    Single(JsonRpcResponse),
}

/// JSON-RPC 2.0 transport over HTTP.
///
/// It is cheap to clone, as `reqwest::Client` internally uses an Arc.
#[derive(Clone, Debug)]
pub struct HttpBatchTransport {
    http_client: Client,
    url: Url,
}

impl HttpBatchTransport {
    pub fn new(rpc_url: &str) -> Result<Self, RPCError> {
        let url = rpc_url
            .parse::<Url>()
            .map_err(|e| RPCError::SetupError(format!("Failed to parse URL {rpc_url}: {e}")))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let user_agent = format!("tycho-rpc-batch-{version}", version = env!("CARGO_PKG_VERSION"));
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&user_agent)
                .map_err(|e| RPCError::SetupError(format!("Invalid user agent format: {e}")))?,
        );

        let http_client = ClientBuilder::new()
            .default_headers(headers)
            .build()
            .map_err(|e| RPCError::SetupError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http_client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<JsonRpcReply, RPCError> {
        let response = self
            .http_client
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| RPCError::from_reqwest("Failed to send request", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| {
                    RPCError::from_reqwest(
                        format!("Failed to read body of HTTP {status} response"),
                        e,
                    )
                })?;
            return Err(RPCError::RequestError(RequestError::Http {
                status: status.as_u16(),
                body,
            }));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RPCError::from_reqwest("Failed to read response body", e))?;
        trace!(response = %text, "Received JSON-RPC response");

        serde_json::from_str(&text)
            .map_err(|e| RPCError::from_serde("Failed to parse JSON-RPC response", e))
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    #[instrument(skip(self, call), fields(method = %call.method))]
    async fn send(&self, call: &RpcCall) -> Result<Value, RPCError> {
        match self
            .post(&JsonRpcRequest::new(0, call))
            .await?
        {
            JsonRpcReply::Single(response) => response.into_outcome(),
            JsonRpcReply::Batch(_) => Err(RPCError::UnknownError(
                "Received a batch response for a single call".to_string(),
            )),
        }
    }

    #[instrument(skip_all, fields(calls = calls.len()))]
    async fn send_batch(&self, calls: &[RpcCall]) -> Result<Vec<CallOutcome>, RPCError> {
        let requests: Vec<JsonRpcRequest> = calls
            .iter()
            .enumerate()
            .map(|(id, call)| JsonRpcRequest::new(id as u64, call))
            .collect();

        let responses = match self.post(&requests).await? {
            JsonRpcReply::Batch(responses) => responses,
            // Some nodes reject a whole batch with a single error object
            JsonRpcReply::Single(response) => {
                return Err(match response.into_outcome() {
                    Err(e) => e,
                    Ok(_) => RPCError::UnknownError(
                        "Received a single response for a batch".to_string(),
                    ),
                })
            }
        };

        let mut by_id: HashMap<u64, JsonRpcResponse> = responses
            .into_iter()
            .filter_map(|response| {
                response
                    .id
                    .as_u64()
                    .map(|id| (id, response))
            })
            .collect();

        Ok((0..calls.len() as u64)
            .map(|id| match by_id.remove(&id) {
                Some(response) => response.into_outcome(),
                None => Err(RPCError::other(format!("Missing response for request id {id}"))),
            })
            .collect())
    }
}
