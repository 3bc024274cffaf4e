//! Hot reload: watches the config file (and the layout CSV it names)

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Reload notifications for the surface configuration
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
    watched: Vec<PathBuf>,
}

impl ConfigWatcher {
    /// Load the config at `config_path` and start watching it.
    ///
    /// The layout CSV referenced at startup is watched too; editing it
    /// re-sends the current config so the surface is rebuilt.
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;
        let initial_config = Arc::new(initial_config);

        // notify calls back on its own OS thread
        let runtime_handle = tokio::runtime::Handle::current();
        let reload_path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    debug!("Watched file changed: {:?}", event.paths);

                    let config_path = reload_path.clone();
                    let tx = tx.clone();
                    runtime_handle.spawn(async move {
                        tokio::time::sleep(DEBOUNCE).await;

                        match AppConfig::load(&config_path).await {
                            Ok(new_config) => {
                                info!("🔄 Configuration reloaded");
                                if let Err(e) = tx.send(new_config).await {
                                    error!("Failed to send config update: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("Failed to reload config (keeping old config): {:#}", e);
                            }
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => error!("Watch error: {}", e),
            }
        })?;

        let mut watched = vec![PathBuf::from(&config_path)];
        if let Some(layout) = &initial_config.layout {
            watched.push(PathBuf::from(layout));
        }
        for path in &watched {
            watcher
                .watch(Path::new(path), RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch file: {}", path.display()))?;
        }

        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
                watched,
            },
            initial_config,
        ))
    }

    /// Files being watched, config first
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Wait for the next successfully loaded config.
    /// Returns None once the watcher is gone.
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_reloads() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("surface.yaml");
        let layout_path = temp_dir.path().join("layout.csv");

        fs::write(&layout_path, "name,kind,channel,message\nplay,button,0,note=45\n")?;
        fs::write(
            &config_path,
            format!(
                "layout: {}\nruntime:\n  idle_interval_ms: 20\n",
                layout_path.display()
            ),
        )?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert_eq!(config.runtime.idle_interval_ms, 20);
        assert_eq!(watcher.watched().len(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            format!(
                "layout: {}\nruntime:\n  idle_interval_ms: 5\n",
                layout_path.display()
            ),
        )?;

        // File notifications are best effort on some filesystems
        if let Ok(Some(new_config)) =
            tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await
        {
            assert_eq!(new_config.runtime.idle_interval_ms, 5);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_config_fails() {
        let result = ConfigWatcher::new("/nonexistent/surface.yaml".to_string()).await;
        assert!(result.is_err());
    }
}
