//! Long-running dispatcher service: owns the watcher and the in-flight handlers

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{Dispatcher, Outcome};
use crate::watcher::{WatchError, Watcher};

/// Lifecycle of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Started,
    Stopping,
    Stopped,
}

/// Counters reported when the service stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub moved: u64,
    pub failed: u64,
    pub abandoned: u64,
}

impl RunSummary {
    fn record(&mut self, result: Result<Outcome, JoinError>) {
        self.events += 1;
        match result {
            Ok(Outcome::Moved { .. }) => self.moved += 1,
            Ok(Outcome::MoveFailed { .. })
            | Ok(Outcome::StoreUnavailable(_))
            | Ok(Outcome::Crashed(_)) => self.failed += 1,
            Ok(Outcome::Abandoned) => self.abandoned += 1,
            Ok(Outcome::NoMatch) | Ok(Outcome::IgnoredDirectory) => {}
            Err(e) => {
                error!("Event handler panicked: {}", e);
                self.failed += 1;
            }
        }
    }
}

/// Watches one directory and dispatches every new file until cancelled
pub struct DispatcherService {
    dispatcher: Dispatcher,
    watch_target: PathBuf,
    dedupe_window: Duration,
    state: watch::Sender<ServiceState>,
}

impl DispatcherService {
    pub fn new(dispatcher: Dispatcher, watch_target: impl Into<PathBuf>, dedupe_window: Duration) -> Self {
        let (state, _) = watch::channel(ServiceState::Idle);
        Self {
            dispatcher,
            watch_target: watch_target.into(),
            dedupe_window,
            state,
        }
    }

    pub fn watch_target(&self) -> &Path {
        &self.watch_target
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// Follow lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Fails only if watching cannot start. On shutdown the subscription is
    /// dropped first, then every handler already in flight is awaited.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunSummary, WatchError> {
        let mut watcher = match Watcher::new(&self.watch_target, self.dedupe_window) {
            Ok(w) => w,
            Err(e) => {
                self.state.send_replace(ServiceState::Stopped);
                return Err(e);
            }
        };
        let mut events = match watcher.start() {
            Ok(rx) => rx,
            Err(e) => {
                self.state.send_replace(ServiceState::Stopped);
                return Err(e);
            }
        };

        self.state.send_replace(ServiceState::Started);
        info!(
            "Dispatching new files in {} (settle delay {:?})",
            watcher.target().display(),
            self.dispatcher.settings().settle_delay
        );

        let mut handlers = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        let dispatcher = self.dispatcher.clone();
                        let cancel = shutdown.clone();
                        handlers.spawn(async move { dispatcher.handle(event, &cancel).await });
                    }
                    None => {
                        warn!("Watcher channel closed unexpectedly");
                        break;
                    }
                },
                Some(done) = handlers.join_next(), if !handlers.is_empty() => summary.record(done),
            }
        }

        self.state.send_replace(ServiceState::Stopping);
        info!("Stopping; waiting for {} in-flight event(s)", handlers.len());
        watcher.stop();
        drop(events);

        while let Some(done) = handlers.join_next().await {
            summary.record(done);
        }

        self.state.send_replace(ServiceState::Stopped);
        info!(
            "Stopped: {} event(s), {} moved, {} failed, {} abandoned",
            summary.events, summary.moved, summary.failed, summary.abandoned
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchSettings;
    use crate::rules::{Rule, RuleStore, STORE_FILE_NAME};

    async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        check()
    }

    #[test]
    fn test_crashed_handler_counts_as_failed() {
        let mut summary = RunSummary::default();
        summary.record(Ok(Outcome::Crashed("boom".to_string())));
        summary.record(Ok(Outcome::Abandoned));

        assert_eq!(
            summary,
            RunSummary {
                events: 2,
                moved: 0,
                failed: 1,
                abandoned: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_watch_target_fails_startup() {
        let root = tempfile::tempdir().unwrap();
        let store = RuleStore::new(root.path().join(STORE_FILE_NAME));
        let service = DispatcherService::new(
            Dispatcher::new(store, DispatchSettings::default()),
            root.path().join("missing"),
            Duration::from_secs(1),
        );
        assert_eq!(service.state(), ServiceState::Idle);

        let result = service.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(WatchError::TargetMissing(_))));
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_service_moves_new_files_and_stops_cleanly() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("dl");
        let docs = root.path().join("docs");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::create_dir_all(&docs).unwrap();
        let store = RuleStore::new(root.path().join(STORE_FILE_NAME));
        store.add(Rule::new("invoice", &docs), false).unwrap();

        let service = std::sync::Arc::new(DispatcherService::new(
            Dispatcher::new(
                store,
                DispatchSettings {
                    settle_delay: Duration::from_millis(50),
                    ..Default::default()
                },
            ),
            &downloads,
            Duration::from_secs(1),
        ));
        let mut states = service.subscribe();
        let shutdown = CancellationToken::new();

        let running = {
            let service = service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { service.run(shutdown).await })
        };
        states
            .wait_for(|s| *s == ServiceState::Started)
            .await
            .unwrap();

        std::fs::create_dir(downloads.join("invoice_folder")).unwrap();
        std::fs::write(downloads.join("random.bin"), b"x").unwrap();
        std::fs::write(downloads.join("report_invoice.pdf"), b"pdf").unwrap();

        let moved = docs.join("report_invoice.pdf");
        assert!(wait_until(|| moved.exists()).await, "file was not moved");
        assert!(!downloads.join("report_invoice.pdf").exists());

        // Give the other two handlers time to finish their settle delay
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(downloads.join("random.bin").exists());
        assert!(downloads.join("invoice_folder").is_dir());

        shutdown.cancel();
        let summary = running.await.unwrap().unwrap();

        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(summary.moved, 1);
        assert_eq!(summary.failed, 0);
    }
}
