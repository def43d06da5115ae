use miette::miette;
use nu_ansi_term::Color::{Blue, Cyan, Green};
use repodex_core::{
    query::{match_package_names, newest_by_name, newest_by_name_arch},
    PackageQuery, PackageView, RepoStorage,
};
use repodex_metadata::{DepFlag, DepKind, Evr, Nevra};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::utils::{
    format_bytes, format_timestamp, package_details_json, package_json, print_json, Colored,
};

/// Splits `name [op evr]` into a name and an optional version constraint.
///
/// The release may be omitted from the version.
pub fn parse_capability(input: &str) -> miette::Result<(String, Option<(DepFlag, Evr)>)> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    match parts.as_slice() {
        [name] => Ok((name.to_string(), None)),
        [name, op, evr] => {
            let flag: DepFlag = op.parse().map_err(|err: String| miette!(err))?;
            let evr = evr.parse::<Evr>().unwrap_or_else(|_| {
                match evr.split_once(':') {
                    Some((epoch, version)) => Evr::new(Some(epoch), version, ""),
                    None => Evr::new(None, *evr, ""),
                }
            });
            Ok((name.to_string(), Some((flag, evr))))
        }
        _ => {
            Err(miette!(
                help = "Use NAME or 'NAME OP VERSION', e.g. 'python3 >= 3.12'",
                "Invalid capability '{input}'"
            ))
        }
    }
}

fn sort_views(views: &mut [PackageView]) {
    views.sort_by(|a, b| {
        a.nevra()
            .cmp_version(b.nevra())
            .then_with(|| a.repo_id().cmp(b.repo_id()))
    });
}

fn print_views(views: &[PackageView], json: bool) {
    if json {
        print_json(&Value::Array(views.iter().map(package_json).collect()));
        return;
    }
    for view in views {
        info!(
            "{} {} {}",
            Colored(Cyan, view.nevra()),
            Colored(Blue, format!("@{}", view.repo_id())),
            view.summary().unwrap_or_default()
        );
    }
}

pub fn list_packages(
    storage: &RepoStorage,
    patterns: &[String],
    all: bool,
    json: bool,
) -> miette::Result<()> {
    let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
    let found = if patterns.is_empty() {
        storage.packages()?
    } else {
        storage.search_names(&patterns)?
    };

    if !patterns.is_empty() {
        let matches = match_package_names(found.iter().map(PackageView::name), &patterns);
        for pattern in &matches.unmatched {
            warn!("No package matches '{pattern}'");
        }
    }

    let mut views: Vec<PackageView> = if all {
        found
    } else {
        newest_by_name_arch(found).into_values().flatten().collect()
    };
    sort_views(&mut views);
    print_views(&views, json);
    if !json {
        info!("{} packages", Colored(Green, views.len()));
    }
    Ok(())
}

pub fn find_providers(storage: &RepoStorage, capability: &str, json: bool) -> miette::Result<()> {
    let (name, constraint) = parse_capability(capability)?;
    let mut views = match &constraint {
        Some((flag, evr)) => storage.find_providing_versioned(&name, *flag, evr)?,
        None => storage.find_providing(&name)?,
    };
    if views.is_empty() && !json {
        warn!("No package provides '{capability}'");
    }
    sort_views(&mut views);
    print_views(&views, json);
    Ok(())
}

pub fn find_requirers(storage: &RepoStorage, name: &str, json: bool) -> miette::Result<()> {
    let mut views = storage.find_requiring(name)?;
    if views.is_empty() && !json {
        warn!("No package requires '{name}'");
    }
    sort_views(&mut views);
    print_views(&views, json);
    Ok(())
}

/// Packages an `info` argument refers to: an exact NEVRA when it parses as
/// one and exists, otherwise the newest builds of that name.
fn resolve_target(storage: &RepoStorage, target: &str) -> miette::Result<Vec<PackageView>> {
    if let Ok(nevra) = target.parse::<Nevra>() {
        let exact = storage.find_by_identity(&nevra)?;
        if !exact.is_empty() {
            return Ok(exact);
        }
    }
    let named = storage.find_by_name_arch(target, None)?;
    Ok(newest_by_name(named).into_values().flatten().collect())
}

fn print_field(label: &str, value: impl std::fmt::Display) {
    info!("{:<13}: {value}", label);
}

fn print_details(view: &PackageView) {
    print_field("Name", Colored(Cyan, view.name()));
    print_field("Epoch", &view.nevra().epoch);
    print_field("Version", &view.nevra().version);
    print_field("Release", &view.nevra().release);
    print_field("Architecture", view.arch());
    print_field("Repository", view.repo_id());
    print_field("Size", format_bytes(view.size_package()));
    print_field("Installed size", format_bytes(view.size_installed()));
    if view.time_build() > 0 {
        print_field(
            "Build date",
            format_timestamp(i64::try_from(view.time_build()).unwrap_or(i64::MAX)),
        );
    }
    for (label, value) in [
        ("Summary", view.summary()),
        ("URL", view.url()),
        ("License", view.license()),
        ("Vendor", view.vendor()),
        ("Source", view.sourcerpm()),
    ] {
        if let Some(value) = value {
            print_field(label, value);
        }
    }
    for kind in [DepKind::Provides, DepKind::Requires] {
        if let Some(deps) = view.dependencies(kind).loaded() {
            if !deps.is_empty() {
                let deps: Vec<String> = deps.iter().map(ToString::to_string).collect();
                print_field(kind.as_str(), deps.join(", "));
            }
        }
    }
    if let Some(files) = view.files().loaded() {
        print_field("Files", files.len());
    }
    if let Some(description) = view.description() {
        info!("Description  :");
        for line in description.lines() {
            info!("  {line}");
        }
    }
}

pub fn package_info(
    storage: &RepoStorage,
    target: &str,
    changelog_entries: usize,
    json: bool,
) -> miette::Result<()> {
    let mut views = resolve_target(storage, target)?;
    if views.is_empty() {
        return Err(miette!(
            help = "Run 'repodex list PATTERN' to search package names",
            "No package matches '{target}'"
        ));
    }
    sort_views(&mut views);

    let mut output = Vec::with_capacity(views.len());
    for (i, view) in views.iter_mut().enumerate() {
        storage.load_details(view)?;
        let mut changelog = storage.changelog(view.pkg_id())?;
        changelog.sort_by(|a, b| b.date.cmp(&a.date));
        changelog.truncate(changelog_entries);

        if json {
            let mut value = package_details_json(view);
            if let Value::Object(map) = &mut value {
                map.insert(
                    "changelog".into(),
                    changelog
                        .iter()
                        .map(|entry| {
                            json!({
                                "author": entry.author,
                                "date": entry.date,
                                "text": entry.text,
                            })
                        })
                        .collect(),
                );
            }
            output.push(value);
            continue;
        }

        if i > 0 {
            info!("");
        }
        print_details(view);
        if !changelog.is_empty() {
            info!("Changelog    :");
            for entry in &changelog {
                info!("  * {} {}", format_timestamp(entry.date), entry.author);
                for line in entry.text.lines() {
                    info!("    {line}");
                }
            }
        }
    }

    if json {
        print_json(&Value::Array(output));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capability() {
        let (name, constraint) = parse_capability("libfoo").unwrap();
        assert_eq!(name, "libfoo");
        assert!(constraint.is_none());

        let (name, constraint) = parse_capability("python3 >= 3.12").unwrap();
        assert_eq!(name, "python3");
        let (flag, evr) = constraint.unwrap();
        assert_eq!(flag, DepFlag::GE);
        assert_eq!(evr.version, "3.12");
        assert_eq!(evr.release, "");

        let (_, constraint) = parse_capability("bash = 1:5.2-3").unwrap();
        let (_, evr) = constraint.unwrap();
        assert_eq!((evr.epoch.as_str(), evr.release.as_str()), ("1", "3"));

        assert!(parse_capability("foo >=").is_err());
        assert!(parse_capability("foo ~ 1").is_err());
    }
}
