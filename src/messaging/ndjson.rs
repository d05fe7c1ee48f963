//! NDJSON codec over byte streams.
//!
//! One JSON document per line. This is both the scanner's stdout format and
//! the transport the persistence worker consumes on stdin, which makes a
//! shell pipe the simplest possible broker.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error_handling::BusError;

use super::{Consumer, Message, Producer};

/// Writes one JSON line per published value.
///
/// The key is accepted for interface compatibility; a single ordered stream
/// needs no partitioning.
pub struct NdjsonProducer<T, W> {
    writer: Mutex<W>,
    _marker: PhantomData<fn(T)>,
}

impl<T, W: AsyncWrite + Unpin + Send> NdjsonProducer<T, W> {
    pub fn new(writer: W) -> Self {
        NdjsonProducer {
            writer: Mutex::new(writer),
            _marker: PhantomData,
        }
    }

    /// Consumes the producer and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<T, W> Producer<T> for NdjsonProducer<T, W>
where
    T: Serialize + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn publish(&self, _key: &[u8], value: &T) -> Result<(), BusError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Reads one JSON document per line; EOF surfaces as [`BusError::Closed`].
pub struct NdjsonConsumer<T, R> {
    reader: R,
    line: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, R: AsyncBufRead + Unpin + Send> NdjsonConsumer<T, R> {
    pub fn new(reader: R) -> Self {
        NdjsonConsumer {
            reader,
            line: String::new(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, R> Consumer<T> for NdjsonConsumer<T, R>
where
    T: DeserializeOwned + Send,
    R: AsyncBufRead + Unpin + Send,
{
    async fn fetch(&mut self) -> Result<Option<Message<T>>, BusError> {
        self.line.clear();
        let read = self.reader.read_line(&mut self.line).await?;
        if read == 0 {
            return Err(BusError::Closed);
        }
        let trimmed = self.line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let value: T = serde_json::from_str(trimmed)?;
        Ok(Some(Message {
            key: Vec::new(),
            value,
        }))
    }
}
