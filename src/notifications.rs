//! Desktop notifications for failed moves and watch problems
//!
//! Successful moves stay silent; only failures reach the desktop.

use notify_rust::{Notification, Timeout};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::mover::MoveError;

static NOTIFICATIONS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Last watch alert shown, so a failing backend does not flood the desktop
static LAST_WATCH_ALERT: Mutex<Option<Instant>> = Mutex::new(None);

/// Minimum gap between two watch alerts
const WATCH_ALERT_INTERVAL: Duration = Duration::from_secs(60);

/// Turn desktop notifications on or off for this process
pub fn init(enabled: bool) {
    NOTIFICATIONS_ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn is_enabled() -> bool {
    NOTIFICATIONS_ENABLED.load(Ordering::SeqCst)
}

/// Something the user should hear about
#[derive(Debug)]
pub enum Alert<'a> {
    /// A matched file stayed where it was
    MoveFailed {
        keyword: &'a str,
        error: &'a MoveError,
    },
    /// The watch subscription reported an error
    WatchFailed {
        target: &'a Path,
        error: &'a notify::Error,
    },
}

impl Alert<'_> {
    fn summary(&self) -> &'static str {
        match self {
            Alert::MoveFailed { .. } => "dropsort: Move Failed",
            Alert::WatchFailed { .. } => "dropsort: Watch Error",
        }
    }

    fn body(&self) -> String {
        match self {
            Alert::MoveFailed { keyword, error } => format!("Rule '{}': {}", keyword, error),
            Alert::WatchFailed { target, error } => {
                format!("Watching {}: {}", target.display(), error)
            }
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Alert::MoveFailed { .. } => "dialog-error",
            Alert::WatchFailed { .. } => "dialog-warning",
        }
    }
}

/// Show `alert` if notifications are enabled. Delivery errors are only logged.
pub fn send(alert: Alert<'_>) {
    if !is_enabled() {
        return;
    }

    if matches!(alert, Alert::WatchFailed { .. }) && !watch_alert_due(Instant::now()) {
        debug!("Suppressing repeated watch alert");
        return;
    }

    let result = Notification::new()
        .appname("dropsort")
        .summary(alert.summary())
        .body(&alert.body())
        .icon(alert.icon())
        .timeout(Timeout::Milliseconds(5000))
        .show();

    if let Err(e) = result {
        warn!("Failed to send notification: {}", e);
    }
}

fn watch_alert_due(now: Instant) -> bool {
    let mut last = LAST_WATCH_ALERT.lock().unwrap_or_else(|e| e.into_inner());
    match *last {
        Some(at) if now.duration_since(at) < WATCH_ALERT_INTERVAL => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}
