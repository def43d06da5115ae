use std::{
    fmt::Display,
    sync::{LazyLock, RwLock},
};

use chrono::DateTime;
use nu_ansi_term::Color;
use repodex_core::{view::Loadable, PackageView};
use repodex_metadata::DepKind;
use serde_json::{json, Value};

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static PROGRESS: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));

pub fn progress_enabled() -> bool {
    PROGRESS.read().map(|p| *p).unwrap_or(false)
}

pub fn set_flag(flag: &RwLock<bool>, value: bool) {
    if let Ok(mut guard) = flag.write() {
        *guard = value;
    }
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let color = COLOR.read().map(|c| *c).unwrap_or(false);
        if color {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Formats a byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

pub fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Short JSON form of a package, used by the listing commands.
pub fn package_json(view: &PackageView) -> Value {
    json!({
        "name": view.name(),
        "epoch": view.nevra().epoch,
        "version": view.nevra().version,
        "release": view.nevra().release,
        "arch": view.arch(),
        "repo": view.repo_id(),
        "pkg_id": view.pkg_id(),
        "summary": view.summary(),
    })
}

/// Full JSON form of a package, including loaded relations and files.
pub fn package_details_json(view: &PackageView) -> Value {
    let mut value = package_json(view);
    let relations: serde_json::Map<String, Value> = DepKind::ALL
        .iter()
        .filter_map(|&kind| {
            match view.dependencies(kind) {
                Loadable::Loaded(deps) => {
                    Some((
                        kind.as_str().to_string(),
                        deps.iter()
                            .map(|d| Value::String(d.to_string()))
                            .collect::<Value>(),
                    ))
                }
                Loadable::Pending => None,
            }
        })
        .collect();
    let files = view
        .files()
        .loaded()
        .map(|files| files.keys().cloned().collect::<Vec<_>>());

    if let Value::Object(map) = &mut value {
        map.insert("description".into(), json!(view.description()));
        map.insert("url".into(), json!(view.url()));
        map.insert("license".into(), json!(view.license()));
        map.insert("vendor".into(), json!(view.vendor()));
        map.insert("group".into(), json!(view.group()));
        map.insert("sourcerpm".into(), json!(view.sourcerpm()));
        map.insert("size_package".into(), json!(view.size_package()));
        map.insert("size_installed".into(), json!(view.size_installed()));
        map.insert("time_build".into(), json!(view.time_build()));
        map.insert("location".into(), json!(view.location_href()));
        map.insert("relations".into(), Value::Object(relations));
        map.insert("files".into(), json!(files));
    }
    value
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(err) => tracing::error!("{err}"),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1536, "1.5 KiB")]
    #[case(5 * 1024 * 1024, "5.0 MiB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14");
    }
}
