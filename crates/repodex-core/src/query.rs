//! The query surface shared by in-memory and relational sacks.

use std::{collections::BTreeMap, sync::Arc};

use repodex_metadata::{ChangelogEntry, DepFlag, DepKind, Evr, Nevra, PackageRecord};

use crate::{error::Result, view::PackageView};

/// Anything carrying a package identity and a repository tag.
pub trait PackageLike {
    fn nevra(&self) -> &Nevra;
    fn repo_id(&self) -> &str;
}

impl PackageLike for Arc<PackageRecord> {
    fn nevra(&self) -> &Nevra {
        &self.nevra
    }

    fn repo_id(&self) -> &str {
        &self.repo_id
    }
}

impl PackageLike for PackageView {
    fn nevra(&self) -> &Nevra {
        PackageView::nevra(self)
    }

    fn repo_id(&self) -> &str {
        PackageView::repo_id(self)
    }
}

/// Lookups every sack answers. Unknown keys give an empty result, never an
/// error; errors only come from a failing store.
pub trait PackageQuery {
    /// Every package, in a stable order.
    fn packages(&self) -> Result<Vec<PackageView>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn find_by_identity(&self, nevra: &Nevra) -> Result<Vec<PackageView>>;

    /// Packages named `name`, restricted to `arch` when given.
    fn find_by_name_arch(&self, name: &str, arch: Option<&str>) -> Result<Vec<PackageView>>;

    fn find_by_id(&self, pkg_id: &str) -> Result<Vec<PackageView>>;

    /// Packages declaring a `kind` relation on `name`, whatever its version.
    fn find_by_relation(&self, kind: DepKind, name: &str) -> Result<Vec<PackageView>>;

    fn find_owning_file(&self, path: &str) -> Result<Vec<PackageView>>;

    /// Packages providing `name` in a range overlapping `flags evr`.
    fn find_providing_versioned(
        &self,
        name: &str,
        flags: DepFlag,
        evr: &Evr,
    ) -> Result<Vec<PackageView>>;

    /// Packages whose name matches any of the glob `patterns`.
    fn search_names(&self, patterns: &[&str]) -> Result<Vec<PackageView>>;

    fn changelog(&self, pkg_id: &str) -> Result<Vec<ChangelogEntry>>;

    /// Providers of `name`. File paths are implicitly provided by the
    /// packages owning them.
    fn find_providing(&self, name: &str) -> Result<Vec<PackageView>> {
        let mut found = self.find_by_relation(DepKind::Provides, name)?;
        if name.starts_with('/') {
            for owner in self.find_owning_file(name)? {
                if !found.iter().any(|f| f.same_package(&owner)) {
                    found.push(owner);
                }
            }
        }
        Ok(found)
    }

    fn find_requiring(&self, name: &str) -> Result<Vec<PackageView>> {
        self.find_by_relation(DepKind::Requires, name)
    }

    fn find_conflicting_with(&self, name: &str) -> Result<Vec<PackageView>> {
        self.find_by_relation(DepKind::Conflicts, name)
    }

    fn find_obsoleting(&self, name: &str) -> Result<Vec<PackageView>> {
        self.find_by_relation(DepKind::Obsoletes, name)
    }

    fn newest_by_name_arch(&self) -> Result<BTreeMap<(String, String), Vec<PackageView>>> {
        Ok(newest_by_name_arch(self.packages()?))
    }

    fn newest_by_name(&self) -> Result<BTreeMap<String, Vec<PackageView>>> {
        Ok(newest_by_name(self.packages()?))
    }
}

/// Keeps, per key, every item whose EVR equals the highest EVR seen.
///
/// Ties are ordered by arch, then repository, then the full identity.
fn newest_grouped<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> BTreeMap<K, Vec<T>>
where
    T: PackageLike,
    K: Ord,
    F: Fn(&Nevra) -> K,
{
    let mut newest: BTreeMap<K, (Evr, Vec<T>)> = BTreeMap::new();
    for item in items {
        let evr = item.nevra().evr();
        match newest.get_mut(&key(item.nevra())) {
            None => {
                newest.insert(key(item.nevra()), (evr, vec![item]));
            }
            Some((best, bucket)) => {
                match evr.cmp(best) {
                    std::cmp::Ordering::Greater => {
                        *best = evr;
                        bucket.clear();
                        bucket.push(item);
                    }
                    std::cmp::Ordering::Equal => bucket.push(item),
                    std::cmp::Ordering::Less => {}
                }
            }
        }
    }

    newest
        .into_iter()
        .map(|(key, (_, mut bucket))| {
            bucket.sort_by(|a, b| {
                a.nevra()
                    .arch
                    .cmp(&b.nevra().arch)
                    .then_with(|| a.repo_id().cmp(b.repo_id()))
                    .then_with(|| a.nevra().cmp(b.nevra()))
            });
            (key, bucket)
        })
        .collect()
}

/// Newest packages per (name, arch).
pub fn newest_by_name_arch<T: PackageLike>(
    items: impl IntoIterator<Item = T>,
) -> BTreeMap<(String, String), Vec<T>> {
    newest_grouped(items, |n| (n.name.clone(), n.arch.clone()))
}

/// Newest packages per name, across architectures.
pub fn newest_by_name<T: PackageLike>(
    items: impl IntoIterator<Item = T>,
) -> BTreeMap<String, Vec<T>> {
    newest_grouped(items, |n| n.name.clone())
}

/// Outcome of matching user supplied patterns against package names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMatches {
    /// Names equal to a pattern.
    pub exact: Vec<String>,
    /// Names matched only as a glob.
    pub matched: Vec<String>,
    /// Patterns that matched nothing.
    pub unmatched: Vec<String>,
}

/// Whether `pattern` contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Matches `patterns` against `names` the way command line package
/// arguments are resolved.
pub fn match_package_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    patterns: &[&str],
) -> NameMatches {
    let names: Vec<&str> = names.into_iter().collect();
    let mut result = NameMatches::default();

    for pattern in patterns {
        let mut hit = false;
        for name in &names {
            if name == pattern {
                hit = true;
                if !result.exact.iter().any(|e| e == name) {
                    result.exact.push(name.to_string());
                }
            } else if is_glob(pattern) && fast_glob::glob_match(pattern, name) {
                hit = true;
                if !result.matched.iter().any(|m| m == name) {
                    result.matched.push(name.to_string());
                }
            }
        }
        if !hit {
            result.unmatched.push(pattern.to_string());
        }
    }

    result.matched.retain(|m| !result.exact.contains(m));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(repo: &str, name: &str, version: &str, arch: &str) -> Arc<PackageRecord> {
        Arc::new(PackageRecord::new(
            repo,
            format!("{repo}-{name}-{version}-{arch}"),
            Nevra::new(name, None, version, "1", arch),
        ))
    }

    #[test]
    fn test_newest_by_name_arch_keeps_ties() {
        let items = vec![
            pkg("base", "glibc", "2.38", "x86_64"),
            pkg("updates", "glibc", "2.39", "x86_64"),
            pkg("mirror", "glibc", "2.39", "x86_64"),
            pkg("base", "glibc", "2.39", "i686"),
        ];
        let newest = newest_by_name_arch(items);

        let x86 = &newest[&("glibc".to_string(), "x86_64".to_string())];
        assert_eq!(x86.len(), 2);
        assert_eq!(x86[0].repo_id, "mirror");
        assert_eq!(x86[1].repo_id, "updates");

        let i686 = &newest[&("glibc".to_string(), "i686".to_string())];
        assert_eq!(i686.len(), 1);
    }

    #[test]
    fn test_newest_by_name_mixes_arches() {
        let items = vec![
            pkg("base", "kernel", "6.9", "x86_64"),
            pkg("base", "kernel", "6.9", "aarch64"),
            pkg("base", "kernel", "6.8", "x86_64"),
        ];
        let newest = newest_by_name(items);
        let arches: Vec<_> = newest["kernel"].iter().map(|p| p.arch().to_string()).collect();
        assert_eq!(arches, ["aarch64", "x86_64"]);
    }

    #[test]
    fn test_newest_uses_rpm_ordering() {
        let items = vec![
            pkg("base", "vim", "9.1.0~rc1", "x86_64"),
            pkg("base", "vim", "9.0.2190", "x86_64"),
            pkg("base", "vim", "9.1.0", "x86_64"),
        ];
        let newest = newest_by_name(items);
        assert_eq!(newest["vim"][0].nevra.version, "9.1.0");
    }

    #[test]
    fn test_match_package_names() {
        let names = ["bash", "bash-completion", "zsh", "python3"];
        let result = match_package_names(names, &["bash", "bash*", "py?hon3", "fish"]);

        assert_eq!(result.exact, ["bash"]);
        assert_eq!(result.matched, ["bash-completion", "python3"]);
        assert_eq!(result.unmatched, ["fish"]);
    }
}
