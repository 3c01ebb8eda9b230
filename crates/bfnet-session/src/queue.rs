//! Inbound queue: the FIFO between the connection driver and the handler.
//!
//! The queue is unbounded. Once closed it is replaced by a sentinel that
//! answers every `pop` with `None` and silently discards pushes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// Creates a connected sender/queue pair.
pub fn inbound_queue<T>() -> (QueueSender<T>, InboundQueue<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        QueueSender {
            tx,
            closed: Arc::clone(&closed),
        },
        InboundQueue {
            inner: Inner::Open(rx),
            closed,
        },
    )
}

/// Producer side, owned by the connection driver.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T> QueueSender<T> {
    /// Appends `item`. Returns `false` if the queue was closed, in which
    /// case the item is dropped.
    pub fn push(&self, item: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(item).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

#[derive(Debug)]
enum Inner<T> {
    Open(mpsc::UnboundedReceiver<T>),
    Closed,
}

/// Consumer side, owned by the session.
#[derive(Debug)]
pub struct InboundQueue<T> {
    inner: Inner<T>,
    closed: Arc<AtomicBool>,
}

impl<T> InboundQueue<T> {
    /// Waits for the next item.
    ///
    /// Returns `None` once the queue is closed, or once it is empty and
    /// every sender is gone.
    pub async fn pop(&mut self) -> Option<T> {
        match &mut self.inner {
            Inner::Open(rx) => rx.recv().await,
            Inner::Closed => None,
        }
    }

    /// Takes the next item without waiting.
    pub fn try_pop(&mut self) -> Option<T> {
        match &mut self.inner {
            Inner::Open(rx) => rx.try_recv().ok(),
            Inner::Closed => None,
        }
    }

    /// Swaps in the closed sentinel. Items still buffered are dropped.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        if let Inner::Open(mut rx) = std::mem::replace(&mut self.inner, Inner::Closed) {
            rx.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.inner, Inner::Closed)
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Open(rx) => rx.len(),
            Inner::Closed => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
