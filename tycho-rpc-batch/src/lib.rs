//! Batched JSON-RPC calls with per-call retry, and block range partitioning for scanning a
//! node's history in chunks.
#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod errors;
pub mod range;
pub mod rpc;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use errors::{RPCError, RangeError, RequestError, ScanError};
pub use range::{block_number_batches, BlockBatches};
pub use rpc::{
    batch::{RetryingBatch, Settled},
    config::{RPCRetryConfig, ScanConfig},
    http::HttpBatchTransport,
    retry::RetryPolicy,
    BatchTransport, CallOutcome, RpcCall,
};
pub use scan::BlockScanner;
