//! services/api/src/adapters/realtime.rs
//!
//! The realtime change feed. Database triggers publish row changes on a
//! `LISTEN/NOTIFY` channel; one listener task fans them out to every
//! subscriber through a broadcast channel.

use coaching_core::domain::{ChangeEvent, ChangeKind, ChangeTable};
use coaching_core::ports::ChangeFeed;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Channel name used by the `notify_coaching_change` trigger.
pub const CHANGE_CHANNEL: &str = "coaching_changes";

const BROADCAST_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct PgChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl PgChangeFeed {
    /// Connects a listener and spawns the fan-out task, which runs until
    /// `shutdown` is cancelled.
    pub async fn start(pool: &PgPool, shutdown: CancellationToken) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        info!(channel = CHANGE_CHANNEL, "Listening for row changes");

        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        let fan_out = sender.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Change feed listener stopped");
                        break;
                    }
                    received = listener.recv() => match received {
                        Ok(notification) => {
                            match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                                // No receivers is fine.
                                Ok(event) => { let _ = fan_out.send(event); }
                                Err(e) => warn!(payload = notification.payload(), error = %e, "Unreadable change notification"),
                            }
                        }
                        Err(e) => {
                            // The listener reconnects on the next recv.
                            error!(error = %e, "Change feed connection lost");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        });

        Ok(Self { sender })
    }
}

impl ChangeFeed for PgChangeFeed {
    fn subscribe(&self, report_id: Uuid) -> BoxStream<'static, ChangeEvent> {
        let mut receiver = self.sender.subscribe();
        let events = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.report_id == report_id => yield event,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        // Something was missed; a synthetic event forces a re-fetch.
                        warn!(%report_id, skipped, "Change feed subscriber lagged");
                        yield ChangeEvent {
                            table: ChangeTable::Packages,
                            kind: ChangeKind::Update,
                            report_id,
                        };
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };
        events.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_payload_parses() {
        let payload = r#"{"table":"package_queue","kind":"insert","report_id":"00000000-0000-0000-0000-000000000000"}"#;
        let event: ChangeEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.table, ChangeTable::PackageQueue);
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.report_id, Uuid::nil());
    }

    #[tokio::test]
    async fn subscribers_only_see_their_report() {
        let (sender, _) = broadcast::channel(8);
        let feed = PgChangeFeed { sender };
        let mine = Uuid::new_v4();
        let mut events = feed.subscribe(mine);

        let other = ChangeEvent {
            table: ChangeTable::Packages,
            kind: ChangeKind::Insert,
            report_id: Uuid::new_v4(),
        };
        let wanted = ChangeEvent { report_id: mine, ..other };
        feed.sender.send(other).unwrap();
        feed.sender.send(wanted).unwrap();

        assert_eq!(events.next().await, Some(wanted));
    }
}
