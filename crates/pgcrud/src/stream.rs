//! Streaming reads.
//!
//! Two ways to consume a SELECT without buffering the result set:
//!
//! - [`RecordStream`]: a `Stream<Item = CrudResult<Record>>` that owns its pooled connection.
//! - The signal protocol used by `Crud::get_*`: rows are written into caller-owned
//!   [`FieldSinks`] and announced by index on a [`SignalSender`]; the receiver acknowledges each
//!   row by calling [`SignalReceiver::recv`] again and sees a negative index once the stream ends.

use crate::error::{CrudError, CrudResult};
use crate::row::{Record, column_names, decode_row};
use crate::value::FieldValue;
use deadpool_postgres::Object;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{Notify, mpsc};

/// Index sent after the last row.
pub const END_OF_STREAM: i64 = -1;

/// Decoded rows of a streaming SELECT.
///
/// Holds its pooled connection until dropped; dropping the stream early cancels the read.
#[must_use]
pub struct RecordStream {
    inner: Pin<Box<tokio_postgres::RowStream>>,
    columns: Option<Arc<[String]>>,
    _client: Object,
}

impl RecordStream {
    pub(crate) fn new(client: Object, rows: tokio_postgres::RowStream) -> Self {
        Self {
            inner: Box::pin(rows),
            columns: None,
            _client: client,
        }
    }

    /// Rows affected, available once the stream is exhausted.
    pub fn rows_affected(&self) -> Option<u64> {
        self.inner.rows_affected()
    }
}

impl Stream for RecordStream {
    type Item = CrudResult<Record>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => {
                let columns = self
                    .columns
                    .get_or_insert_with(|| column_names(&row))
                    .clone();
                Poll::Ready(Some(decode_row(&row, columns)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(CrudError::from_db_error(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a connected single-slot signal channel.
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let ack = Arc::new(Notify::new());
    (
        SignalSender {
            tx,
            ack: Arc::clone(&ack),
        },
        SignalReceiver { rx, ack },
    )
}

/// Producer half, handed to `Crud::get_*`. Dropping it closes the channel.
///
/// # Deadlocks
///
/// No row is produced until the paired [`SignalReceiver`] calls [`recv`](SignalReceiver::recv).
/// Awaiting a `get_*` future to completion before draining the receiver on another task
/// therefore never returns. Poll both together (`tokio::join!`) or spawn the drain loop first.
#[derive(Debug)]
pub struct SignalSender {
    tx: mpsc::Sender<i64>,
    ack: Arc<Notify>,
}

impl SignalSender {
    /// Wait until the receiver asks for the next row. `false` once it is gone.
    async fn acknowledged(&self) -> bool {
        tokio::select! {
            _ = self.ack.notified() => true,
            _ = self.tx.closed() => false,
        }
    }

    async fn send(&self, index: i64) -> bool {
        self.tx.send(index).await.is_ok()
    }
}

/// Consumer half. Dropping it cancels the read at the next row.
#[derive(Debug)]
pub struct SignalReceiver {
    rx: mpsc::Receiver<i64>,
    ack: Arc<Notify>,
}

impl SignalReceiver {
    /// Release the previous row and wait for the next one.
    ///
    /// Returns the 0-based row index, or a negative value once the stream has ended (including
    /// when it ended with an error).
    pub async fn recv(&mut self) -> i64 {
        self.ack.notify_one();
        self.rx.recv().await.unwrap_or(END_OF_STREAM)
    }
}

/// Caller-owned slots receiving the current row, one per requested field.
///
/// Cheap to clone; clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct FieldSinks {
    slots: Arc<Mutex<Vec<FieldValue>>>,
}

impl FieldSinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the `index`-th field of the current row.
    pub fn get(&self, index: usize) -> Option<FieldValue> {
        self.lock().get(index).cloned()
    }

    /// All field values of the current row.
    pub fn values(&self) -> Vec<FieldValue> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite every slot from `record`; fields the record lacks become `Null`.
    fn fill(&self, fields: &[String], record: &Record) {
        let mut slots = self.lock();
        slots.clear();
        slots.extend(
            fields
                .iter()
                .map(|f| record.get(f).cloned().unwrap_or(FieldValue::Null)),
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FieldValue>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of pumping a stream through the signal protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub rows: u64,
    /// The receiver went away before the stream ended.
    pub cancelled: bool,
}

/// Drive `rows` through the signal protocol.
///
/// Each row waits for the receiver's acknowledgement, is written into `sinks` in `fields`
/// order and is then announced by index. The end sentinel follows the last row. The sender is
/// consumed, so the channel is closed on every return path.
pub(crate) async fn pump<S>(
    rows: S,
    signal: SignalSender,
    sinks: &FieldSinks,
    fields: &[String],
) -> CrudResult<Delivery>
where
    S: Stream<Item = CrudResult<Record>>,
{
    let mut rows = std::pin::pin!(rows);
    let mut delivered = 0_u64;

    while let Some(record) = rows.next().await {
        let record = record?;
        if !signal.acknowledged().await {
            return Ok(Delivery {
                rows: delivered,
                cancelled: true,
            });
        }
        sinks.fill(fields, &record);
        if !signal.send(delivered as i64).await {
            return Ok(Delivery {
                rows: delivered,
                cancelled: true,
            });
        }
        delivered += 1;
    }

    let cancelled = !(signal.acknowledged().await && signal.send(END_OF_STREAM).await);
    Ok(Delivery {
        rows: delivered,
        cancelled,
    })
}
