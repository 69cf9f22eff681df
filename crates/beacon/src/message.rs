//! Entry point for inbound message requests.

use crate::{
    Error, Result,
    config::Settings,
    fanout::{FanoutDispatcher, FanoutReport, FanoutTarget, NotificationHeader},
    id::{MessageId, MessageKind, Root},
    sequence::SequenceAllocator,
    store::{ShardRegistry, Value},
    updates::{ReactionLog, UpdateOutcome},
};

/// Prefix of the queue payload announcing the first message of a new root.
pub const CREATION_PREFIX: char = 'm';

#[derive(Clone, Debug, PartialEq)]
pub enum MessageAction {
    /// Deliver an opaque payload as is.
    Push(String),
    /// Sequence a chat message under `root`.
    Chat { root: Root, body: Value },
    /// Sequence a snip under `root`.
    Snip { root: Root, body: Value },
    /// Store a new reaction on a message.
    Reaction {
        message_id: MessageId,
        reaction_key: String,
        sender_id: String,
        body: Value,
    },
    /// Add a reactor to an existing reaction.
    Increment {
        message_id: MessageId,
        reaction_id: String,
        reactor_id: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageRequest {
    pub action: MessageAction,
    pub targets: Vec<FanoutTarget>,
    /// When set, every target that wants a notification gets one.
    pub header: Option<NotificationHeader>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Id assigned to a chat or snip.
    pub message_id: Option<MessageId>,
    /// Payload written to the target queues, if any.
    pub pushed: Option<String>,
    pub fanout: Option<FanoutReport>,
    pub update: Option<UpdateOutcome>,
    /// Set when a chat or snip was stored but its fan-out failed. The message
    /// exists under `message_id`; resending it would store it twice.
    pub delivery_error: Option<Error>,
}

#[derive(Clone, Debug)]
pub struct MessageRouter {
    allocator: SequenceAllocator,
    reactions: ReactionLog,
    dispatcher: FanoutDispatcher,
}

impl MessageRouter {
    pub fn new(registry: ShardRegistry, settings: &Settings) -> Self {
        Self {
            allocator: SequenceAllocator::new(registry.clone(), settings),
            reactions: ReactionLog::new(registry.clone()),
            dispatcher: FanoutDispatcher::new(registry),
        }
    }

    /// Handles one request.
    ///
    /// Chats and snips are sequenced first. The first message of a root is
    /// announced to every target queue as `m<message id>`; later ones only
    /// notify.
    pub async fn process(&self, request: &MessageRequest) -> Result<RouteOutcome> {
        let header = request.header.as_ref();
        let mut outcome = RouteOutcome::default();

        match &request.action {
            MessageAction::Push(payload) => {
                outcome.fanout = Some(
                    self.dispatcher
                        .dispatch(&request.targets, payload, header)
                        .await?,
                );
                outcome.pushed = Some(payload.clone());
            }
            MessageAction::Chat { root, body } => {
                self.sequenced(request, root, MessageKind::Chat, body, &mut outcome)
                    .await?;
            }
            MessageAction::Snip { root, body } => {
                self.sequenced(request, root, MessageKind::Snip, body, &mut outcome)
                    .await?;
            }
            MessageAction::Reaction {
                message_id,
                reaction_key,
                sender_id,
                body,
            } => {
                outcome.update = Some(
                    self.reactions
                        .react(message_id, reaction_key, sender_id, body)
                        .await?,
                );
                outcome.fanout = self.notify_only(request).await?;
            }
            MessageAction::Increment {
                message_id,
                reaction_id,
                reactor_id,
            } => {
                outcome.update = Some(
                    self.reactions
                        .increment(message_id, reaction_id, reactor_id)
                        .await?,
                );
                outcome.fanout = self.notify_only(request).await?;
            }
        }
        Ok(outcome)
    }

    /// Handles every request independently; one failure does not stop the
    /// others.
    pub async fn process_all(&self, requests: &[MessageRequest]) -> Vec<Result<RouteOutcome>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.process(request).await;
            #[cfg(feature = "tracing")]
            if let Err(e) = &result {
                tracing::error!(error = %e, "message request failed");
            }
            results.push(result);
        }
        results
    }

    async fn sequenced(
        &self,
        request: &MessageRequest,
        root: &Root,
        kind: MessageKind,
        body: &Value,
        outcome: &mut RouteOutcome,
    ) -> Result<()> {
        let allocation = self.allocator.allocate(root, kind, body).await?;
        outcome.message_id = Some(allocation.message_id.clone());
        let delivered = if allocation.is_first() {
            let payload = format!("{CREATION_PREFIX}{}", allocation.message_id);
            let report = self
                .dispatcher
                .dispatch(&request.targets, &payload, request.header.as_ref())
                .await;
            outcome.pushed = Some(payload);
            report.map(Some)
        } else {
            self.notify_only(request).await
        };
        match delivered {
            Ok(report) => outcome.fanout = report,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    message_id = %allocation.message_id,
                    error = %e,
                    "stored message was not delivered"
                );
                outcome.delivery_error = Some(e);
            }
        }
        Ok(())
    }

    async fn notify_only(&self, request: &MessageRequest) -> Result<Option<FanoutReport>> {
        let Some(header) = request.header.as_ref() else {
            return Ok(None);
        };
        let targets: Vec<FanoutTarget> = request
            .targets
            .iter()
            .map(|t| FanoutTarget {
                wants_queue_write: false,
                ..t.clone()
            })
            .collect();
        self.dispatcher
            .dispatch(&targets, "", Some(header))
            .await
            .map(Some)
    }
}
