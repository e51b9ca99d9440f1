use crate::app::UiMessage;
use crate::config::{ENV_FILE_NAME, EnvOverlay, ProjectPaths};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Live reload of the env file. Dropping the watcher inside the task closes
/// the notification channel.
pub struct ConfigWatch {
    task: JoinHandle<()>,
}

impl ConfigWatch {
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Watches the env file's directory and swaps the overlay on every matching
/// create/write. `None` when notifications are unavailable; the startup parse
/// stays in effect.
pub fn spawn_env_watcher(
    paths: &ProjectPaths,
    overlay: EnvOverlay,
    ui_tx: mpsc::UnboundedSender<UiMessage>,
) -> Option<ConfigWatch> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = match notify::recommended_watcher(move |event: notify::Result<Event>| {
        let _ = event_tx.send(event);
    }) {
        Ok(watcher) => watcher,
        Err(error) => {
            warn!("env file watcher unavailable: {error}");
            return None;
        }
    };

    let dir = paths
        .env_file
        .parent()
        .unwrap_or(paths.work_dir.as_path())
        .to_path_buf();
    if let Err(error) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        warn!("failed to watch {}: {error}", dir.display());
        return None;
    }
    info!("watching {} for {ENV_FILE_NAME} changes", dir.display());

    let env_file = paths.env_file.clone();
    let task = tokio::spawn(async move {
        let _watcher: RecommendedWatcher = watcher;
        while let Some(event) = event_rx.recv().await {
            match event {
                Ok(event) if is_env_file_event(&event) => {
                    let keys = overlay.reload_from(&env_file);
                    debug!("reloaded {} ({keys} keys)", env_file.display());
                    if ui_tx.send(UiMessage::EnvironmentReloaded).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => warn!("env file watch error: {error}"),
            }
        }
    });

    Some(ConfigWatch { task })
}

pub fn is_env_file_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| is_env_file(path))
}

fn is_env_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name == std::ffi::OsStr::new(ENV_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::{is_env_file_event, spawn_env_watcher};
    use crate::app::UiMessage;
    use crate::config::{EnvOverlay, ProjectPaths};
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use notify::{Event, EventKind};
    use std::path::PathBuf;
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_env_file_writes_and_creates_match() {
        assert!(is_env_file_event(&event(
            EventKind::Create(CreateKind::File),
            "/proj/.env"
        )));
        assert!(is_env_file_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/proj/.env"
        )));
        assert!(!is_env_file_event(&event(
            EventKind::Remove(RemoveKind::File),
            "/proj/.env"
        )));
        assert!(!is_env_file_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/proj/.env.local"
        )));
        assert!(!is_env_file_event(&event(
            EventKind::Create(CreateKind::File),
            "/proj/atlas.hcl"
        )));
    }

    #[tokio::test]
    async fn writing_env_file_reloads_overlay_and_notifies_ui() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::in_dir(dir.path());
        let overlay = EnvOverlay::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let Some(watch) = spawn_env_watcher(&paths, overlay.clone(), tx) else {
            // No notification backend in this sandbox; the degraded path is valid.
            return;
        };
        std::fs::write(&paths.env_file, "ENVIRONMENT=staging\n").expect("write env");

        // A single write may surface as create + modify; wait for the final state.
        timeout(Duration::from_secs(5), async {
            while let Some(message) = rx.recv().await {
                assert!(matches!(message, UiMessage::EnvironmentReloaded));
                if overlay.get("ENVIRONMENT").as_deref() == Some("staging") {
                    break;
                }
            }
        })
        .await
        .expect("reload notification");
        assert_eq!(overlay.get("ENVIRONMENT").as_deref(), Some("staging"));
        watch.stop();
    }
}
