use std::path::Path;

use nu_ansi_term::Color::{Cyan, Green, Red};
use repodex_config::Repository;
use repodex_core::RepoStorage;
use serde_json::{json, Value};
use tracing::info;

use crate::utils::{print_json, Colored};

fn repository_json(repo: &Repository, enabled: bool) -> Value {
    json!({
        "id": repo.id,
        "name": repo.display_name(),
        "enabled": enabled,
        "baseurls": repo.baseurls,
        "failover": repo.failover_method(),
        "skip_if_unavailable": repo.skip_if_unavailable(),
        "exclude": repo.excludes(),
    })
}

pub fn list_repositories(
    storage: &RepoStorage,
    config_path: &Path,
    json: bool,
) -> miette::Result<()> {
    if json {
        let repos = storage
            .repositories()
            .map(|(repo, enabled)| repository_json(repo, enabled))
            .collect();
        print_json(&Value::Array(repos));
        return Ok(());
    }

    let mut count = 0;
    for (repo, enabled) in storage.repositories() {
        count += 1;
        let state = if enabled {
            Colored(Green, "enabled")
        } else {
            Colored(Red, "disabled")
        };
        info!(
            "{:<24} {:<40} {state}",
            Colored(Cyan, &repo.id).to_string(),
            repo.display_name()
        );
    }
    if count == 0 {
        info!("No repositories configured in {}", config_path.display());
    }
    Ok(())
}
