//! Periodic removal of stale HLS output.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use streamforge_core::config::CleanupConfig;
use streamforge_core::StreamKey;
use streamforge_transcode::Supervisor;

/// Delete files under `root` older than `retention`, then prune empty
/// directories. Top-level directories named after a key in `live` are
/// left alone. Returns the number of files removed.
pub fn sweep(root: &Path, retention: Duration, live: &HashSet<StreamKey>) -> usize {
    if !root.is_dir() {
        return 0;
    }
    let cutoff = SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let is_live = |entry: &walkdir::DirEntry| {
        entry.depth() == 1
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| live.iter().any(|k| k.as_str() == name))
    };

    let mut removed = 0;
    let mut dirs = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_live(e))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "Error walking HLS root");
                None
            }
        })
    {
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
            continue;
        }

        let stale = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .is_some_and(|mtime| mtime < cutoff);
        if !stale {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %entry.path().display(), "Failed to remove stale file: {e}"),
        }
    }

    // Deepest first so parents empty out before they are checked.
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        let empty = std::fs::read_dir(&dir)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if empty {
            if let Err(e) = std::fs::remove_dir(&dir) {
                tracing::debug!(path = %dir.display(), "Could not remove directory: {e}");
            }
        }
    }

    removed
}

/// Run [`sweep`] every `interval_hours` until cancelled.
pub async fn run_retention(
    root: std::path::PathBuf,
    config: CleanupConfig,
    supervisor: Supervisor,
    cancel: CancellationToken,
) {
    let interval = Duration::from_secs(config.interval_hours.max(1) * 3600);
    let retention = Duration::from_secs(config.retention_hours * 3600);
    tracing::info!(
        interval_hours = config.interval_hours,
        retention_hours = config.retention_hours,
        "Retention sweep scheduled"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }

        let live = supervisor.live_keys();
        let root = root.clone();
        match tokio::task::spawn_blocking(move || sweep(&root, retention, &live)).await {
            Ok(0) => tracing::debug!("Retention sweep found nothing to remove"),
            Ok(n) => tracing::info!(removed = n, "Retention sweep removed stale files"),
            Err(e) => tracing::error!("Retention sweep panicked: {e}"),
        }
    }
    tracing::info!("Retention sweep stopped");
}
