//! Typed message bus adapter.
//!
//! Wraps byte-oriented transports into `Producer<T>` / `Consumer<T>` with
//! JSON encoding. Messages are keyed by the IPv4 string so transports that
//! partition by key preserve per-host ordering. Two transports are provided:
//! an in-process FIFO broker ([`memory`]) and an NDJSON line codec over any
//! byte stream ([`ndjson`]) — the scanner's stdout and the worker's stdin
//! form the wire between the two binaries.

pub mod memory;
pub mod ndjson;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error_handling::BusError;

/// A decoded message fetched from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    pub key: Vec<u8>,
    pub value: T,
}

/// Typed publisher. Serialization failure fails the call, never the process.
#[async_trait]
pub trait Producer<T: Serialize + Send + Sync>: Send + Sync {
    async fn publish(&self, key: &[u8], value: &T) -> Result<(), BusError>;
}

/// Typed fetcher for a single consumer loop.
///
/// `Ok(None)` is a benign empty poll. Decode failures surface as errors and
/// are the caller's policy decision. [`BusError::Closed`] means the stream
/// ended and is treated as clean shutdown.
#[async_trait]
pub trait Consumer<T: DeserializeOwned + Send>: Send {
    async fn fetch(&mut self) -> Result<Option<Message<T>>, BusError>;
}
