use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde_json::Value;

use crate::RPCError;

pub mod batch;
pub mod config;
pub mod http;
pub mod retry;

/// A single JSON-RPC call: the method name and its already serialized positional params.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Value,
}

impl RpcCall {
    pub fn new<P: Serialize + ?Sized>(method: &str, params: &P) -> Result<Self, RPCError> {
        let params = serde_json::to_value(params).map_err(|e| {
            RPCError::from_serde(format!("Failed to serialize params for {method}"), e)
        })?;
        Ok(Self { method: method.to_string(), params })
    }
}

/// The outcome of one call inside a dispatched batch.
pub type CallOutcome = Result<Value, RPCError>;

/// Transport capable of sending JSON-RPC calls individually or as one batch.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Sends a single call and returns its result.
    async fn send(&self, call: &RpcCall) -> Result<Value, RPCError>;

    /// Sends all calls as one batch.
    ///
    /// On success the returned vector holds one outcome per call, in the order of `calls`. An
    /// `Err` means the batch as a whole could not be delivered.
    async fn send_batch(&self, calls: &[RpcCall]) -> Result<Vec<CallOutcome>, RPCError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_rpc_call_serializes_tuple_params() {
        let call = RpcCall::new("eth_getBlockByNumber", &("0x10", false)).unwrap();
        assert_eq!(call.method, "eth_getBlockByNumber");
        assert_eq!(call.params, json!(["0x10", false]));
    }

    #[test]
    fn test_rpc_call_rejects_unserializable_params() {
        use std::collections::HashMap;

        // JSON object keys must be strings
        let params: HashMap<Vec<u8>, u64> = [(vec![1u8], 1)].into_iter().collect();
        let err = RpcCall::new("eth_call", &params).unwrap_err();
        assert!(matches!(err, RPCError::SerializeError(_)));
    }
}
