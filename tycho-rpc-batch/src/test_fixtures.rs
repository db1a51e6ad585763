//! Common test fixtures and utilities for tycho-rpc-batch tests
//!
//! `ScriptedTransport` answers batches and single calls from closures and can delay single
//! calls, which lets tests control the order in which calls settle.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    rpc::{BatchTransport, CallOutcome, RpcCall},
    RPCError,
};

type BatchScript = Box<dyn Fn(&RpcCall) -> CallOutcome + Send + Sync>;
type SingleScript = Box<dyn Fn(&RpcCall) -> (Duration, CallOutcome) + Send + Sync>;

pub(crate) struct ScriptedTransport {
    batch_script: BatchScript,
    single_script: SingleScript,
    batches_sent: Mutex<usize>,
    completed: Mutex<Vec<RpcCall>>,
}

impl ScriptedTransport {
    /// `batch` decides the in-batch outcome of every call, `single` decides the delay and
    /// outcome of each individually sent call.
    pub(crate) fn new(
        batch: impl Fn(&RpcCall) -> CallOutcome + Send + Sync + 'static,
        single: impl Fn(&RpcCall) -> (Duration, CallOutcome) + Send + Sync + 'static,
    ) -> Self {
        Self {
            batch_script: Box::new(batch),
            single_script: Box::new(single),
            batches_sent: Mutex::new(0),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn batches_sent(&self) -> usize {
        *self.batches_sent.lock().unwrap()
    }

    /// Individually sent calls, in the order they completed.
    pub(crate) fn completed(&self) -> Vec<RpcCall> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn send(&self, call: &RpcCall) -> Result<Value, RPCError> {
        let (delay, outcome) = (self.single_script)(call);
        sleep(delay).await;
        self.completed
            .lock()
            .unwrap()
            .push(call.clone());
        outcome
    }

    async fn send_batch(&self, calls: &[RpcCall]) -> Result<Vec<CallOutcome>, RPCError> {
        *self.batches_sent.lock().unwrap() += 1;
        Ok(calls
            .iter()
            .map(|call| (self.batch_script)(call))
            .collect())
    }
}

/// Reads the block number from calls built with `(block,)` params.
pub(crate) fn block_of(call: &RpcCall) -> u64 {
    call.params[0]
        .as_u64()
        .expect("test calls carry a block number")
}
