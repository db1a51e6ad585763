use std::marker::PhantomData;

use futures03::{stream::FuturesOrdered, StreamExt, TryStreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::{
    errors::extract_error_chain,
    rpc::{retry::RetryPolicy, BatchTransport, CallOutcome, RpcCall},
    RPCError,
};

/// A successfully settled call: the params it was registered with and its decoded result.
#[derive(Clone, Debug, PartialEq)]
pub struct Settled<P, R> {
    pub params: P,
    pub data: R,
}

/// Groups calls into a single batch dispatch, retrying each failed call on its own.
///
/// All calls are first sent together with [`BatchTransport::send_batch`]. A call that fails in
/// the batch is retried individually through [`BatchTransport::send`] following the
/// [`RetryPolicy`]. Results are returned in registration order no matter which call settles
/// first.
///
/// The batch is single use: [`execute`](Self::execute) consumes it.
pub struct RetryingBatch<'a, T: ?Sized, P, R> {
    transport: &'a T,
    retry_policy: RetryPolicy,
    calls: Vec<RpcCall>,
    params: Vec<P>,
    _marker: PhantomData<fn() -> R>,
}

impl<'a, T, P, R> RetryingBatch<'a, T, P, R>
where
    T: BatchTransport + ?Sized,
    P: Serialize,
    R: DeserializeOwned,
{
    /// Creates a batch retrying each call up to 10 times.
    pub fn new(transport: &'a T) -> Self {
        Self::with_retry_policy(transport, RetryPolicy::default())
    }

    pub fn with_retry_policy(transport: &'a T, retry_policy: RetryPolicy) -> Self {
        Self { transport, retry_policy, calls: Vec::new(), params: Vec::new(), _marker: PhantomData }
    }

    /// Registers a call. Fails only if `params` cannot be serialized to JSON.
    pub fn add(&mut self, method: &str, params: P) -> Result<(), RPCError> {
        let call = RpcCall::new(method, &params)?;
        self.calls.push(call);
        self.params.push(params);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    // ==================== Execution ====================

    /// Dispatches all calls and returns their results in registration order.
    ///
    /// Fails with the error of the first call, in registration order, that could not be
    /// completed.
    ///
    /// Returning the error cancels the calls that are still retrying: their pending backoff
    /// waits and in-flight requests are dropped together with this future, so no further
    /// requests reach the node once `execute` has failed. Use
    /// [`execute_settled`](Self::execute_settled) to let every call run to completion.
    #[instrument(skip(self), fields(calls = self.calls.len()))]
    pub async fn execute(self) -> Result<Vec<Settled<P, R>>, RPCError> {
        let (transport, retry_policy, pending) = self.dispatch().await;
        let retry_policy = &retry_policy;

        pending
            .into_iter()
            .map(|(call, params, first_outcome)| {
                Self::settle(transport, retry_policy, call, params, first_outcome)
            })
            .collect::<FuturesOrdered<_>>()
            .try_collect()
            .await
    }

    /// Dispatches all calls and waits for every one of them, reporting each outcome.
    #[instrument(skip(self), fields(calls = self.calls.len()))]
    pub async fn execute_settled(self) -> Vec<Result<Settled<P, R>, RPCError>> {
        let (transport, retry_policy, pending) = self.dispatch().await;
        let retry_policy = &retry_policy;

        pending
            .into_iter()
            .map(|(call, params, first_outcome)| {
                Self::settle(transport, retry_policy, call, params, first_outcome)
            })
            .collect::<FuturesOrdered<_>>()
            .collect()
            .await
    }

    /// Sends the batch and pairs every call with the outcome of its first attempt.
    async fn dispatch(self) -> (&'a T, RetryPolicy, Vec<(RpcCall, P, CallOutcome)>) {
        let RetryingBatch { transport, retry_policy, calls, params, .. } = self;

        if calls.is_empty() {
            return (transport, retry_policy, Vec::new());
        }

        let outcomes = match transport.send_batch(&calls).await {
            Ok(mut outcomes) => {
                if outcomes.len() != calls.len() {
                    debug!(
                        expected = calls.len(),
                        received = outcomes.len(),
                        "Batch response size mismatch"
                    );
                }
                outcomes.truncate(calls.len());
                outcomes.resize_with(calls.len(), || {
                    Err(RPCError::other("Missing response in batch"))
                });
                outcomes
            }
            Err(e) => {
                // Every call counts the failed dispatch as its first attempt.
                let msg = format!("Batch send failed: {}", extract_error_chain(&e));
                debug!(error = %msg, "Batch dispatch failed");
                calls
                    .iter()
                    .map(|_| Err(RPCError::other(&msg)))
                    .collect()
            }
        };

        let pending = calls
            .into_iter()
            .zip(params)
            .zip(outcomes)
            .map(|((call, params), outcome)| (call, params, outcome))
            .collect();

        (transport, retry_policy, pending)
    }

    /// Drives one call to settlement, starting from its in-batch outcome.
    async fn settle(
        transport: &T,
        retry_policy: &RetryPolicy,
        call: RpcCall,
        params: P,
        first_outcome: CallOutcome,
    ) -> Result<Settled<P, R>, RPCError> {
        let call_ref = &call;
        let value = retry_policy
            .retry_after(first_outcome, || transport.send(call_ref))
            .await?;

        let data = serde_json::from_value(value).map_err(|e| {
            RPCError::from_serde(format!("Failed to deserialize result of {}", call.method), e)
        })?;

        Ok(Settled { params, data })
    }
}
