//! Live feature flag: one `feature_flags` row observed through realtime

use anyhow::Result;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::WatchGuard;
use crate::backend::{ChangeKind, CravenClient, RowFilter, Subscription};

/// Current value of one feature flag; missing or unreadable flags are off
pub struct FlagWatcher {
    key: String,
    enabled: watch::Receiver<bool>,
    _guard: WatchGuard,
}

impl FlagWatcher {
    pub async fn start(client: &CravenClient, key: &str) -> Result<Self> {
        let subscription = client
            .realtime()
            .subscribe(RowFilter::new("feature_flags", "key", key))
            .await?;

        let initial = match client.store().feature_flag(key).await {
            Ok(flag) => flag.map(|f| f.enabled).unwrap_or(false),
            Err(e) => {
                warn!("Failed to load feature flag '{}': {} - treating as off", key, e);
                false
            }
        };

        let (tx, enabled) = watch::channel(initial);
        let guard = WatchGuard::new(client.shutdown_token().child_token());
        tokio::spawn(follow_flag(key.to_string(), subscription, tx, guard.token()));
        info!("Watching feature flag '{}' (enabled: {})", key, initial);

        Ok(Self {
            key: key.to_string(),
            enabled,
            _guard: guard,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.enabled.clone()
    }
}

async fn follow_flag(
    key: String,
    mut subscription: Subscription,
    tx: watch::Sender<bool>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            change = subscription.next() => {
                let Some(event) = change else { break };
                if token.is_cancelled() {
                    break;
                }
                let enabled = match event.kind {
                    ChangeKind::Delete => false,
                    _ => event.record.get("enabled").and_then(Value::as_bool).unwrap_or(false),
                };
                if tx.send_replace(enabled) != enabled {
                    info!("Feature flag '{}' is now {}", key, if enabled { "on" } else { "off" });
                }
            }
        }
    }
    debug!("Stopped watching feature flag '{}'", key);
}
