//! Per-user notification channel
//!
//! Fire-and-forget progress pushes scoped to the owning user. The persisted
//! job record is the sole source of truth; this channel carries no delivery
//! guarantee, and publishing with no connected subscriber is a silent no-op.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use veritag_common::types::{JobProgress, JobStatus, RowError};

/// Progress event pushed after every batch flush
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: JobProgress,
    /// The job's capped error list at flush time
    pub errors: Vec<RowError>,
}

/// Sink for per-user progress events.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    /// Publish to the user's scope. Never fails; delivery is best-effort.
    async fn publish(&self, user_id: Uuid, event: ProgressEvent);
}

const CHANNEL_CAPACITY: usize = 64;

/// In-process notification hub keyed by user id.
///
/// Subscribers of a user scope receive every event published to it while
/// subscribed; slow subscribers lag and lose old events rather than blocking
/// publishers.
#[derive(Default)]
pub struct NotificationHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<ProgressEvent>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a user's event scope.
    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ProgressNotifier for NotificationHub {
    async fn publish(&self, user_id: Uuid, event: ProgressEvent) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = channels.get(&user_id) {
            let _ = sender.send(event);
        }
        // Dropped receivers leave dead senders behind, including in scopes
        // that never see another targeted publish; sweep them all here.
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(job_id: Uuid) -> ProgressEvent {
        ProgressEvent {
            job_id,
            status: JobStatus::Processing,
            progress: JobProgress::default(),
            errors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_noop() {
        let hub = NotificationHub::new();
        hub.publish(Uuid::new_v4(), event(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let hub = NotificationHub::new();
        let user_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        let mut rx = hub.subscribe(user_id);
        hub.publish(user_id, event(job_id)).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id, job_id);
        assert_eq!(received.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_events_scoped_per_user() {
        let hub = NotificationHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut alice_rx = hub.subscribe(alice);
        let mut bob_rx = hub.subscribe(bob);

        hub.publish(alice, event(Uuid::new_v4())).await;

        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_sweeps_abandoned_channels() {
        let hub = NotificationHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        drop(hub.subscribe(alice));
        drop(hub.subscribe(bob));
        assert_eq!(hub.channel_count(), 2);

        // A publish to one user reclaims every abandoned scope, including
        // ones never published to again.
        hub.publish(alice, event(Uuid::new_v4())).await;
        assert_eq!(hub.channel_count(), 0);
    }
}
