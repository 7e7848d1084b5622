//! Navigation side effects triggered by gates

use std::sync::Mutex;
use tracing::{info, warn};

/// Performs route changes on behalf of a gate
pub trait Navigator: Send + Sync {
    fn redirect(&self, route: &str);
}

/// Navigator that only logs; used where no router exists (CLI)
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, route: &str) {
        info!("Redirect to {}", route);
    }
}

/// Navigator that records every redirect, in order
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        match self.routes.lock() {
            Ok(routes) => routes.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn last(&self) -> Option<String> {
        self.routes().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: &str) {
        match self.routes.lock() {
            Ok(mut routes) => routes.push(route.to_string()),
            Err(e) => warn!("Dropping redirect to {}: {}", route, e),
        }
    }
}
