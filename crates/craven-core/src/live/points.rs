//! ============================================================================
//! Points Watcher - Live diamond-points balance with increase highlight
//! ============================================================================
//! The balance is owned by the delivery-completion workflow; this watcher
//! only mirrors it. Any increase shows immediately and is highlighted for
//! the configured duration (one second by default). Decreases update the
//! number without highlighting.
//! ============================================================================

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::WatchGuard;
use crate::backend::{ChangeKind, CravenClient, RowFilter, Subscription};

/// What the points widget renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PointsDisplay {
    pub points: u32,
    pub highlighted: bool,
}

impl PointsDisplay {
    /// Points with thousands separators ("12,345")
    pub fn formatted(&self) -> String {
        let digits = self.points.to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
        out
    }
}

/// Live view of one driver's points balance
pub struct PointsWatcher {
    display: watch::Receiver<PointsDisplay>,
    _guard: WatchGuard,
}

impl PointsWatcher {
    /// Subscribe to `driver_profiles` changes for `user_id`, fetch the
    /// current balance, then follow changes until the watcher or the client
    /// goes away
    pub async fn start(client: &CravenClient, user_id: Uuid) -> Result<Self> {
        // Subscribe first so a change landing during the fetch is queued
        let subscription = client
            .realtime()
            .subscribe(RowFilter::new("driver_profiles", "user_id", user_id))
            .await?;

        let initial = match client.store().driver_profile_for(user_id).await {
            Ok(Some(profile)) => profile.diamond_points,
            Ok(None) => {
                debug!("No driver profile for {}, showing 0 points", user_id);
                0
            }
            Err(e) => {
                warn!("Failed to load points for {}: {} - showing 0", user_id, e);
                0
            }
        };

        let (tx, display) = watch::channel(PointsDisplay {
            points: initial,
            highlighted: false,
        });
        let guard = WatchGuard::new(client.shutdown_token().child_token());

        tokio::spawn(follow_points(
            subscription,
            tx,
            guard.token(),
            client.config().points_highlight,
        ));
        info!("Watching points for {} (starting at {})", user_id, initial);

        Ok(Self {
            display,
            _guard: guard,
        })
    }

    pub fn current(&self) -> PointsDisplay {
        *self.display.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<PointsDisplay> {
        self.display.clone()
    }

    /// Stop following; same as dropping the watcher
    pub fn stop(self) {}
}

fn points_from(record: &Value) -> Option<u32> {
    record
        .get("diamond_points")
        .and_then(Value::as_u64)
        .map(|p| u32::try_from(p).unwrap_or(u32::MAX))
}

async fn follow_points(
    mut subscription: Subscription,
    tx: watch::Sender<PointsDisplay>,
    token: CancellationToken,
    highlight: Duration,
) {
    let mut clear_at: Option<Instant> = None;

    loop {
        let clear = async {
            match clear_at {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = clear => {
                clear_at = None;
                tx.send_modify(|d| d.highlighted = false);
            }
            change = subscription.next() => {
                let Some(event) = change else {
                    debug!("Points subscription closed");
                    break;
                };
                if event.kind == ChangeKind::Delete || token.is_cancelled() {
                    continue;
                }
                let Some(points) = points_from(&event.record) else {
                    debug!("Change without diamond_points ignored");
                    continue;
                };

                let previous = tx.borrow().points;
                if points > previous {
                    debug!("Points {} → {}", previous, points);
                    clear_at = Some(Instant::now() + highlight);
                    tx.send_replace(PointsDisplay {
                        points,
                        highlighted: true,
                    });
                } else if points != previous {
                    tx.send_modify(|d| d.points = points);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::CravenConfig;
    use crate::types::DriverProfile;
    use std::sync::Arc;

    fn profile(user_id: Uuid, points: u32) -> DriverProfile {
        DriverProfile {
            user_id,
            rating_tier: Default::default(),
            diamond_points: points,
            acceptance_rate: 0.0,
            completed_orders: 0,
            rating: 0.0,
        }
    }

    async fn setup(points: u32) -> (Arc<MemoryBackend>, CravenClient, Uuid) {
        let backend = Arc::new(MemoryBackend::new());
        let user_id = Uuid::new_v4();
        backend.put_driver_profile(profile(user_id, points)).await;
        let client = CravenClient::in_memory(backend.clone(), CravenConfig::default());
        (backend, client, user_id)
    }

    #[test]
    fn test_formatted_points() {
        let show = |points| PointsDisplay { points, highlighted: false }.formatted();
        assert_eq!(show(0), "0");
        assert_eq!(show(999), "999");
        assert_eq!(show(1_000), "1,000");
        assert_eq!(show(1_234_567), "1,234,567");
    }

    #[tokio::test(start_paused = true)]
    async fn test_increase_highlights_for_exactly_one_second() {
        let (backend, client, user_id) = setup(40).await;
        let watcher = PointsWatcher::start(&client, user_id).await.unwrap();
        assert_eq!(watcher.current(), PointsDisplay { points: 40, highlighted: false });

        let mut rx = watcher.watch();
        backend.update_driver_profile(profile(user_id, 55)).await.unwrap();

        rx.wait_for(|d| d.highlighted).await.unwrap();
        let started = Instant::now();
        assert_eq!(watcher.current().points, 55);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(watcher.current(), PointsDisplay { points: 55, highlighted: true });

        rx.wait_for(|d| !d.highlighted).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(watcher.current(), PointsDisplay { points: 55, highlighted: false });
    }

    #[tokio::test(start_paused = true)]
    async fn test_decrease_is_not_highlighted() {
        let (backend, client, user_id) = setup(100).await;
        let watcher = PointsWatcher::start(&client, user_id).await.unwrap();
        let mut rx = watcher.watch();

        backend.update_driver_profile(profile(user_id, 80)).await.unwrap();
        rx.wait_for(|d| d.points == 80).await.unwrap();
        assert!(!watcher.current().highlighted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_increase_restarts_highlight() {
        let (backend, client, user_id) = setup(10).await;
        let watcher = PointsWatcher::start(&client, user_id).await.unwrap();
        let mut rx = watcher.watch();

        backend.update_driver_profile(profile(user_id, 20)).await.unwrap();
        rx.wait_for(|d| d.points == 20).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        backend.update_driver_profile(profile(user_id, 30)).await.unwrap();
        rx.wait_for(|d| d.points == 30).await.unwrap();
        let second = Instant::now();

        rx.wait_for(|d| !d.highlighted).await.unwrap();
        assert_eq!(second.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stop_releases_subscription() {
        let (backend, client, user_id) = setup(5).await;
        let watcher = PointsWatcher::start(&client, user_id).await.unwrap();
        assert_eq!(backend.subscriber_count().await, 1);

        watcher.stop();
        // Let the follower task observe cancellation
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.subscriber_count().await, 0);
        assert_eq!(backend.update_driver_profile(profile(user_id, 99)).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_initial_fetch_is_kept() {
        let (backend, client, user_id) = setup(40).await;
        backend.set_lookup_delay(Some(Duration::from_millis(500))).await;

        let starting = tokio::spawn({
            let client = client.clone();
            async move { PointsWatcher::start(&client, user_id).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Already subscribed while the fetch is in flight
        assert_eq!(backend.update_driver_profile(profile(user_id, 55)).await.unwrap(), 1);

        let watcher = starting.await.unwrap().unwrap();
        let mut rx = watcher.watch();
        rx.wait_for(|d| d.points == 55).await.unwrap();
        assert_eq!(watcher.current().points, 55);
    }

    #[tokio::test]
    async fn test_missing_profile_starts_at_zero() {
        let backend = Arc::new(MemoryBackend::new());
        let client = CravenClient::in_memory(backend, CravenConfig::default());
        let watcher = PointsWatcher::start(&client, Uuid::new_v4()).await.unwrap();
        assert_eq!(watcher.current().points, 0);
    }
}
