//! Concurrent delivery of one payload to many recipients.
//!
//! Queue writes run as one spawned task per target and are all awaited before
//! the notification batch is built, so the dispatcher returns only once every
//! task it started has reported back.

use crate::{
    Error, Result,
    id::{ComposedId, Root},
    store::{Notification, ShardRegistry, Value, join_path},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One recipient device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutTarget {
    /// Identifier of the recipient, `<token>-<region>-<shard>`. The root form
    /// of a single id (trailing `r`) is accepted too.
    #[serde(rename = "uid")]
    pub recipient_id: String,
    #[serde(rename = "dev")]
    pub device_id: String,
    #[serde(rename = "tkn")]
    pub push_token: String,
    #[serde(rename = "psh")]
    pub wants_queue_write: bool,
    #[serde(rename = "ntf")]
    pub wants_notification: bool,
}

/// Title and body of the notifications, plus the context every notification
/// carries in its data map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationHeader {
    pub title: String,
    pub body: String,
    /// Root the notification is about, if any.
    pub root: String,
    pub sender: String,
}

impl NotificationHeader {
    pub fn data(&self) -> HashMap<String, String> {
        HashMap::from([
            ("h".into(), self.title.clone()),
            ("b".into(), self.body.clone()),
            ("r".into(), self.root.clone()),
            ("s".into(), self.sender.clone()),
        ])
    }

    /// The notification addressed to `token`.
    pub fn notification(&self, token: &str) -> Notification {
        Notification {
            token: token.into(),
            data: self.data(),
            title: self.title.clone(),
            body: self.body.clone(),
        }
    }
}

/// A queue write that did not land, kept so the caller can replay it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replay {
    pub recipient_id: String,
    pub device_id: String,
    pub error: Error,
}

/// Accounting of one dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Queue writes started.
    pub queue_writes: usize,
    /// Failed queue writes, one per failing target.
    pub replays: Vec<Replay>,
    /// Notifications handed to the push provider.
    pub notifications: usize,
    /// Notifications the provider rejected, or all of them when the batch call
    /// itself failed.
    pub notification_failures: usize,
}

impl FanoutReport {
    pub fn queue_failures(&self) -> usize {
        self.replays.len()
    }
}

#[derive(Clone, Debug)]
pub struct FanoutDispatcher {
    registry: ShardRegistry,
}

impl FanoutDispatcher {
    pub fn new(registry: ShardRegistry) -> Self {
        Self { registry }
    }

    /// Appends `payload` to the queue of every target that wants it, then
    /// notifies every target that wants a notification when `header` is set.
    ///
    /// A failed queue write is reported in [`FanoutReport::replays`] and does
    /// not stop that target's notification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeliveryFailed`] only when at least one queue write was
    /// attempted and all of them failed. Notifications are sent regardless.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(targets = targets.len()))
    )]
    pub async fn dispatch(
        &self,
        targets: &[FanoutTarget],
        payload: &str,
        header: Option<&NotificationHeader>,
    ) -> Result<FanoutReport> {
        let handles: Vec<_> = targets
            .iter()
            .filter(|t| t.wants_queue_write)
            .map(|t| {
                let dispatcher = self.clone();
                let target = t.clone();
                let payload = payload.to_owned();
                tokio::spawn(async move {
                    let outcome = dispatcher
                        .queue_write(&target.recipient_id, &target.device_id, &payload)
                        .await;
                    (target, outcome)
                })
            })
            .collect();

        let mut report = FanoutReport {
            queue_writes: handles.len(),
            ..FanoutReport::default()
        };

        // One result per spawned task, in spawn order.
        for joined in join_all(handles).await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((target, Err(error))) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        recipient = %target.recipient_id,
                        device = %target.device_id,
                        %error,
                        "queue write failed"
                    );
                    report.replays.push(Replay {
                        recipient_id: target.recipient_id,
                        device_id: target.device_id,
                        error,
                    });
                }
                Err(join_error) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %join_error, "queue write task failed");
                    report.replays.push(Replay {
                        recipient_id: String::new(),
                        device_id: String::new(),
                        error: join_error.into(),
                    });
                }
            }
        }

        if let Some(header) = header {
            let notifications: Vec<Notification> = targets
                .iter()
                .filter(|t| t.wants_notification)
                .map(|t| header.notification(&t.push_token))
                .collect();
            report.notifications = notifications.len();
            report.notification_failures = self.notify(notifications).await;
        }

        if report.queue_writes > 0 && report.replays.len() == report.queue_writes {
            #[cfg(feature = "tracing")]
            tracing::error!(total = report.queue_writes, "every queue write failed");
            return Err(Error::DeliveryFailed {
                failed: report.replays.len(),
                total: report.queue_writes,
            });
        }
        Ok(report)
    }

    /// Appends `payload` to the queue of one recipient device and returns the
    /// generated child key.
    pub async fn queue_write(
        &self,
        recipient_id: &str,
        device_id: &str,
        payload: &str,
    ) -> Result<String> {
        let id = ComposedId::decode(recipient_id)
            .or_else(|e| Root::parse_single(recipient_id).map_err(|_| e))?;
        let shard = self.registry.shard_of(&id)?;
        let path = join_path(["nodes", id.token(), "queues", device_id]);
        shard
            .realtime
            .push(&path, Value::String(payload.into()))
            .await
    }

    /// Sends one batch and returns the number of failed notifications. Never
    /// fails: delivery problems are logged only.
    pub async fn notify(&self, notifications: Vec<Notification>) -> usize {
        if notifications.is_empty() {
            return 0;
        }
        let total = notifications.len();
        match self.registry.push().send_each(notifications).await {
            Ok(response) => {
                #[cfg(feature = "tracing")]
                for (i, r) in response.responses.iter().enumerate() {
                    if let Err(e) = r {
                        tracing::warn!(index = i, error = %e, "notification rejected");
                    }
                }
                response.failure_count()
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, total, "notification batch failed");
                total
            }
        }
    }
}
