//! Duplex, ordered, in-process message channel between execution contexts.
//!
//! A [`pair`] produces two [`Endpoint`]s, one per context. Delivery is FIFO
//! per sender and best-effort: sending to a context that has gone away is
//! logged and dropped, never an error to the caller. There is no
//! acknowledgement, no retry, and no ordering relationship between the two
//! directions.

use tokio::sync::mpsc;
use tracing::debug;

/// Cloneable sending half of an [`Endpoint`].
pub struct MessageSender<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for MessageSender<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> MessageSender<M> {
    /// Deliver `message` to the peer context. Best-effort: a closed peer is
    /// logged at debug and the message dropped.
    pub fn send(&self, message: M) {
        if self.tx.send(message).is_err() {
            debug!("peer context gone; dropping message");
        }
    }

    /// Whether the peer endpoint still exists.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// One side of a duplex in-process channel.
pub struct Endpoint<M> {
    tx: mpsc::UnboundedSender<M>,
    rx: mpsc::UnboundedReceiver<M>,
}

impl<M> Endpoint<M> {
    /// Deliver `message` to the peer context, best-effort.
    pub fn send(&self, message: M) {
        if self.tx.send(message).is_err() {
            debug!("peer context gone; dropping message");
        }
    }

    /// Receive the next message from the peer context, `None` once the peer
    /// endpoint has been dropped and the queue drained.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// A cloneable sender for this endpoint's outbound direction, for
    /// components that need to send while another owns the receive loop.
    pub fn sender(&self) -> MessageSender<M> {
        MessageSender {
            tx: self.tx.clone(),
        }
    }
}

/// Create a connected pair of endpoints, one per execution context.
pub fn pair<M>() -> (Endpoint<M>, Endpoint<M>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Endpoint { tx: a_tx, rx: b_rx },
        Endpoint { tx: b_tx, rx: a_rx },
    )
}
