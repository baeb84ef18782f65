//! Outbound side of a real-time channel
//!
//! Each WebSocket gets a bounded queue drained by a single writer task. Relay
//! code only ever holds a [`ChannelHandle`]; the socket itself stays with the
//! connection's tasks. One queue per channel keeps per-channel ordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::RelayError;
use crate::messages::{SignalFrame, SignalMessage};

/// Cloneable sender half of a channel
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    tx: mpsc::Sender<String>,
    closed: Arc<watch::Sender<bool>>,
    send_timeout: Duration,
}

/// Receiver half, owned by the writer task
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::Receiver<String>,
    closed: watch::Receiver<bool>,
}

/// Create a channel with `capacity` queued frames
pub fn channel(capacity: usize, send_timeout: Duration) -> (ChannelHandle, ChannelReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (closed_tx, closed_rx) = watch::channel(false);
    (
        ChannelHandle {
            tx,
            closed: Arc::new(closed_tx),
            send_timeout,
        },
        ChannelReceiver {
            rx,
            closed: closed_rx,
        },
    )
}

impl ChannelHandle {
    /// Encode and send a message, waiting at most the send timeout
    pub async fn send(&self, message: SignalMessage) -> Result<(), RelayError> {
        let frame = SignalFrame::encode(message)?;
        self.send_text(frame.into_text()).await
    }

    /// Forward a received frame exactly as it arrived
    pub async fn forward(&self, frame: SignalFrame) -> Result<(), RelayError> {
        self.send_text(frame.into_text()).await
    }

    async fn send_text(&self, text: String) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::ChannelClosed);
        }
        match tokio::time::timeout(self.send_timeout, self.tx.send(text)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RelayError::ChannelClosed),
            Err(_) => Err(RelayError::SendTimeout),
        }
    }

    /// Queue a message without waiting; fails if the queue is full
    pub fn try_send(&self, message: SignalMessage) -> Result<(), RelayError> {
        let text = message.to_json()?;
        self.try_send_text(text)
    }

    /// Forward a received frame without waiting; fails if the queue is full
    pub fn try_forward(&self, frame: SignalFrame) -> Result<(), RelayError> {
        self.try_send_text(frame.into_text())
    }

    fn try_send_text(&self, text: String) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::ChannelClosed);
        }
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RelayError::ChannelClosed,
        })
    }

    /// Ask the writer to flush what is queued and shut the socket
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.tx.is_closed()
    }
}

impl ChannelReceiver {
    /// Next frame to write, or `None` once the channel is closed and drained
    pub async fn recv(&mut self) -> Option<String> {
        if *self.closed.borrow() {
            return self.rx.try_recv().ok();
        }
        tokio::select! {
            biased;
            text = self.rx.recv() => text,
            _ = self.closed.changed() => self.rx.try_recv().ok(),
        }
    }
}
