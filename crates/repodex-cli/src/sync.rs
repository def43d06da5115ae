use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use repodex_core::{RepoStatus, RepoStorage, SyncReport};
use repodex_events::ManifestSource;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::utils::{print_json, progress_enabled, Colored};

fn manifest_label(source: Option<ManifestSource>) -> &'static str {
    match source {
        Some(ManifestSource::Cached) => "cached",
        Some(ManifestSource::Downloaded) => "downloaded",
        None => "unavailable",
    }
}

pub fn report_json(report: &SyncReport) -> Value {
    let outcomes: serde_json::Map<String, Value> = report
        .outcomes
        .iter()
        .map(|(kind, outcome)| (kind.to_string(), Value::String(outcome.to_string())))
        .collect();
    json!({
        "repo": report.repo_id,
        "status": report.status.as_str(),
        "manifest": manifest_label(report.manifest),
        "revision": report.revision,
        "packages": report.package_count,
        "metadata": outcomes,
        "error": report.error,
        "finished_at": report.finished_at.to_rfc3339(),
    })
}

fn print_report(report: &SyncReport) {
    let status = match report.status {
        RepoStatus::Synced => Colored(Green, report.status.as_str()),
        RepoStatus::Degraded => Colored(Yellow, report.status.as_str()),
        RepoStatus::Failed => Colored(Red, report.status.as_str()),
    };
    info!(
        "{} {status}: {} packages, manifest {}",
        Colored(Cyan, &report.repo_id),
        report.package_count,
        manifest_label(report.manifest)
    );
    for (kind, outcome) in &report.outcomes {
        info!("    {kind}: {outcome}");
    }
}

pub fn sync_repositories(storage: &RepoStorage, force: bool, json: bool) -> miette::Result<()> {
    let reports = storage.sync_all(force)?;

    if json {
        print_json(&Value::Array(reports.iter().map(report_json).collect()));
        return Ok(());
    }

    if !progress_enabled() {
        for report in &reports {
            print_report(report);
        }
    }

    let failed = reports.iter().filter(|r| r.is_failed()).count();
    if failed > 0 {
        warn!("{failed} of {} repositories could not be synchronized", reports.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use repodex_config::MetadataType;
    use repodex_core::KindOutcome;

    use super::*;

    #[test]
    fn test_report_json() {
        let report = SyncReport {
            repo_id: "fedora".to_string(),
            manifest: Some(ManifestSource::Cached),
            revision: Some("1712345678".to_string()),
            outcomes: BTreeMap::from([
                (MetadataType::Primary, KindOutcome::Fresh),
                (MetadataType::Filelists, KindOutcome::Absent),
            ]),
            status: RepoStatus::Synced,
            error: None,
            package_count: 42,
            finished_at: Utc::now(),
        };

        let value = report_json(&report);
        assert_eq!(value["status"], "synced");
        assert_eq!(value["manifest"], "cached");
        assert_eq!(value["packages"], 42);
        assert_eq!(value["metadata"]["primary"], "fresh");
        assert_eq!(value["metadata"]["filelists"], "absent");
        assert!(value["error"].is_null());
    }
}
