//! Reply router — hands the next matching chat message to a waiting flow.
//!
//! The dispatcher is the only consumer of the bus, so flows running on
//! worker tasks cannot read chat messages themselves. Instead they hold a
//! [`ReplyHandle`], register a [`WaitRequest`] with the dispatcher, and get
//! the message back over a oneshot channel. The dispatcher keeps the pending
//! waits in a [`ReplyRouter`] and offers every inbound message to them.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use leonidas_core::bus::types::InboundMessage;
use leonidas_core::error::{BridgeError, BridgeResult};

/// Which messages satisfy a wait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyFilter {
    pub user_id: String,
    /// Channels the reply may come from. Empty accepts any channel.
    pub channel_ids: Vec<String>,
}

impl ReplyFilter {
    /// Accept the next message from `user_id`, wherever it is posted.
    pub fn from_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_ids: Vec::new(),
        }
    }

    /// Restrict the wait to `channel_id`; repeat to allow several channels.
    pub fn in_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_ids.push(channel_id.into());
        self
    }

    pub fn matches(&self, msg: &InboundMessage) -> bool {
        msg.sender_id == self.user_id
            && (self.channel_ids.is_empty() || self.channel_ids.iter().any(|c| *c == msg.chat_id))
    }
}

/// A pending wait registered by a flow.
#[derive(Debug)]
pub struct WaitRequest {
    pub filter: ReplyFilter,
    reply: oneshot::Sender<InboundMessage>,
}

impl WaitRequest {
    fn is_live(&self) -> bool {
        !self.reply.is_closed()
    }
}

/// Worker-side handle for waiting on the user's next message.
#[derive(Clone, Debug)]
pub struct ReplyHandle {
    tx: mpsc::Sender<WaitRequest>,
}

impl ReplyHandle {
    /// Queue a wait for the next message matching `filter`.
    ///
    /// Call this before prompting the user so the reply cannot slip past.
    pub async fn expect(&self, filter: ReplyFilter) -> BridgeResult<PendingReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WaitRequest { filter, reply })
            .await
            .map_err(|_| BridgeError::RouterClosed)?;
        Ok(PendingReply { rx })
    }

    /// Queue a wait and receive the reply in one step.
    pub async fn next_message(
        &self,
        filter: ReplyFilter,
        timeout: Option<Duration>,
    ) -> BridgeResult<InboundMessage> {
        self.expect(filter).await?.recv(timeout).await
    }
}

/// A queued wait, not yet answered.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<InboundMessage>,
}

impl PendingReply {
    /// Receive the reply. `None` waits without bound.
    ///
    /// On timeout the wait is abandoned and the router drops it the next
    /// time it looks at its pending list.
    pub async fn recv(self, timeout: Option<Duration>) -> BridgeResult<InboundMessage> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(received) => received.map_err(|_| BridgeError::RouterClosed),
                Err(_) => Err(BridgeError::Timeout {
                    secs: limit.as_secs(),
                }),
            },
            None => self.rx.await.map_err(|_| BridgeError::RouterClosed),
        }
    }
}

/// Dispatcher-side list of pending waits.
#[derive(Debug, Default)]
pub struct ReplyRouter {
    pending: Vec<WaitRequest>,
}

impl ReplyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the handle/receiver pair linking workers to the dispatcher.
    pub fn channel(buffer: usize) -> (ReplyHandle, mpsc::Receiver<WaitRequest>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ReplyHandle { tx }, rx)
    }

    pub fn register(&mut self, request: WaitRequest) {
        debug!(user = %request.filter.user_id, channels = ?request.filter.channel_ids, "reply wait registered");
        self.pending.push(request);
    }

    /// Offer a message to the pending waits in registration order.
    ///
    /// Returns the message back when no live wait took it.
    pub fn offer(&mut self, msg: InboundMessage) -> Option<InboundMessage> {
        self.pending.retain(WaitRequest::is_live);

        let mut msg = msg;
        while let Some(pos) = self.pending.iter().position(|w| w.filter.matches(&msg)) {
            let wait = self.pending.remove(pos);
            match wait.reply.send(msg) {
                Ok(()) => return None,
                // Receiver went away between the prune and the send.
                Err(returned) => msg = returned,
            }
        }
        Some(msg)
    }

    /// Number of live waits.
    pub fn pending(&mut self) -> usize {
        self.pending.retain(WaitRequest::is_live);
        self.pending.len()
    }
}
