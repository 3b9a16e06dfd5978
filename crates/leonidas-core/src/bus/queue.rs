//! Async event bus between the chat gateway and the dispatcher.
//!
//! Uses a tokio::sync::mpsc bounded channel. The gateway is the producer;
//! the dispatcher is the only consumer.

use super::types::{BusEvent, InboundMessage, Interaction};
use tokio::sync::mpsc;

/// The event bus connecting the gateway → dispatcher.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<BusEvent>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<BusEvent>>,
}

impl MessageBus {
    /// Create a new bus with the given buffer capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);

        MessageBus {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

    /// Publish any event.
    pub async fn publish(&self, event: BusEvent) -> Result<(), mpsc::error::SendError<BusEvent>> {
        self.inbound_tx.send(event).await
    }

    /// Publish a chat message.
    pub async fn publish_message(
        &self,
        msg: InboundMessage,
    ) -> Result<(), mpsc::error::SendError<BusEvent>> {
        self.publish(BusEvent::Message(msg)).await
    }

    /// Publish a slash-command interaction.
    pub async fn publish_command(
        &self,
        interaction: Interaction,
    ) -> Result<(), mpsc::error::SendError<BusEvent>> {
        self.publish(BusEvent::Command(interaction)).await
    }

    /// Consume the next event (waits until available).
    /// Returns None if all senders are dropped.
    pub async fn consume(&self) -> Option<BusEvent> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await
    }
}
