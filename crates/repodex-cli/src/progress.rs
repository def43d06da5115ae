use std::{
    collections::HashMap,
    sync::{mpsc::Receiver, Arc, LazyLock},
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use repodex_events::{ManifestSource, SyncEvent};

use crate::utils::Colored;

/// Shared MultiProgress instance for suspend/stop from other modules.
static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

/// Owns the background thread rendering sync events.
///
/// The storage holding the channel sender must be dropped before
/// [`finish`](ProgressGuard::finish), otherwise the thread waits forever.
pub struct ProgressGuard {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ProgressGuard {
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn parse_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}  {wide_bar:.cyan/dim}  {pos}/{len}")
        .map(|style| style.progress_chars("━━─"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn create_spinner(msg: String) -> ProgressBar {
    let pb = MULTI.add(ProgressBar::new_spinner());
    pb.set_style(spinner_style());
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn finish_line(jobs: &mut HashMap<String, ProgressBar>, repo_id: &str, line: String) {
    if let Some(pb) = jobs.remove(repo_id) {
        pb.finish_and_clear();
    }
    MULTI.suspend(|| eprintln!("{line}"));
}

/// Renders sync events as one spinner per repository.
pub fn spawn_event_handler(receiver: Receiver<SyncEvent>) -> ProgressGuard {
    let handle = std::thread::spawn(move || {
        let mut jobs: HashMap<String, ProgressBar> = HashMap::new();

        while let Ok(event) = receiver.recv() {
            match event {
                SyncEvent::RepoStarting { repo_id } => {
                    let pb = create_spinner(format!("{repo_id}: reading manifest"));
                    jobs.insert(repo_id, pb);
                }
                SyncEvent::ManifestLoaded {
                    repo_id, source, ..
                } => {
                    if let Some(pb) = jobs.get(&repo_id) {
                        let from = match source {
                            ManifestSource::Cached => "cached",
                            ManifestSource::Downloaded => "downloaded",
                        };
                        pb.set_message(format!("{repo_id}: manifest {from}"));
                    }
                }
                SyncEvent::CacheStatus {
                    repo_id,
                    kind,
                    state,
                } => {
                    if let Some(pb) = jobs.get(&repo_id) {
                        pb.set_message(format!("{repo_id}: {kind} cache {state}"));
                    }
                }
                SyncEvent::Fetching { repo_id, kind, .. } => {
                    if let Some(pb) = jobs.get(&repo_id) {
                        let what = kind.map_or("repomd", |k| k.as_str());
                        pb.set_message(format!("{repo_id}: fetching {what}"));
                    }
                }
                SyncEvent::Progress {
                    repo_id,
                    kind,
                    current,
                    total,
                } => {
                    if let Some(pb) = jobs.get(&repo_id) {
                        if let Some(total) = total {
                            if pb.length() != Some(total) {
                                pb.set_style(parse_style());
                                pb.set_length(total);
                            }
                        }
                        pb.set_position(current);
                        pb.set_message(format!("{repo_id}: parsing {kind}"));
                    }
                }
                SyncEvent::MirrorFailed { repo_id, url, error } => {
                    MULTI.suspend(|| {
                        eprintln!(
                            " {} {}: {url}: {error}",
                            Colored(Yellow, "!"),
                            Colored(Cyan, &repo_id)
                        );
                    });
                }
                SyncEvent::Rebuilt { repo_id, kind, .. } => {
                    if let Some(pb) = jobs.get(&repo_id) {
                        pb.set_style(spinner_style());
                        pb.set_message(format!("{repo_id}: {kind} indexed"));
                    }
                }
                SyncEvent::KindFailed {
                    repo_id,
                    kind,
                    error,
                } => {
                    MULTI.suspend(|| {
                        eprintln!(
                            " {} {}: {kind}: {error}",
                            Colored(Yellow, "!"),
                            Colored(Cyan, &repo_id)
                        );
                    });
                }
                SyncEvent::RepoComplete {
                    repo_id,
                    package_count,
                } => {
                    let line = format!(
                        " {} {}: {package_count} packages",
                        Colored(Green, "✓"),
                        Colored(Cyan, &repo_id)
                    );
                    finish_line(&mut jobs, &repo_id, line);
                }
                SyncEvent::RepoFailed { repo_id, error } => {
                    let line = format!(
                        " {} {}: {error}",
                        Colored(Red, "✗"),
                        Colored(Cyan, &repo_id)
                    );
                    finish_line(&mut jobs, &repo_id, line);
                }
            }
        }

        for (_, pb) in jobs.drain() {
            pb.finish_and_clear();
        }
    });

    ProgressGuard {
        handle: Some(handle),
    }
}
