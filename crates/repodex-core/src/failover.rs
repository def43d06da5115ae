//! Mirror selection after failures.
//!
//! The policy never touches the network. The caller asks for a URL, tries
//! it, and reports a failure with [`FailoverPolicy::server_failed`] before
//! asking again. Once every mirror has failed the policy answers `None`.

use rand::Rng;
use repodex_config::FailoverMethod;
use url::Url;

#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    urls: Vec<Url>,
    method: FailoverMethod,
    offset: usize,
    failures: usize,
}

impl FailoverPolicy {
    /// Creates a policy over `urls`, in the order they were configured.
    ///
    /// Round-robin policies draw their starting offset here, once.
    pub fn new(urls: Vec<Url>, method: FailoverMethod) -> Self {
        let offset = match method {
            FailoverMethod::Roundrobin if !urls.is_empty() => {
                rand::thread_rng().gen_range(0..urls.len())
            }
            _ => 0,
        };
        Self::with_offset(urls, method, offset)
    }

    /// Creates a policy with a fixed round-robin offset.
    pub fn with_offset(urls: Vec<Url>, method: FailoverMethod, offset: usize) -> Self {
        let offset = if urls.is_empty() {
            0
        } else {
            offset % urls.len()
        };
        Self {
            urls,
            method,
            offset,
            failures: 0,
        }
    }

    pub fn method(&self) -> FailoverMethod {
        self.method
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Number of failures reported since the last reset.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// URL to try for attempt `index`, or for the current failure count
    /// when `index` is `None`.
    ///
    /// Returns `None` once `index` reaches the number of mirrors.
    pub fn get_server_url(&self, index: Option<usize>) -> Option<&Url> {
        let index = index.unwrap_or(self.failures);
        if index >= self.urls.len() {
            return None;
        }
        let position = match self.method {
            FailoverMethod::Priority => index,
            FailoverMethod::Roundrobin => (index + self.offset) % self.urls.len(),
        };
        self.urls.get(position)
    }

    /// Records that the current mirror failed.
    pub fn server_failed(&mut self) {
        self.failures += 1;
    }

    /// Rewinds the failure count to `index`.
    pub fn reset(&mut self, index: usize) {
        self.failures = index;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::*;

    fn urls() -> Vec<Url> {
        ["https://a.example/", "https://b.example/", "https://c.example/"]
            .iter()
            .map(|u| Url::parse(u).unwrap())
            .collect()
    }

    fn host(url: Option<&Url>) -> Option<&str> {
        url.and_then(Url::host_str)
    }

    #[test]
    fn test_priority_walks_in_order() {
        let mut policy = FailoverPolicy::new(urls(), FailoverMethod::Priority);
        assert_eq!(host(policy.get_server_url(None)), Some("a.example"));

        policy.server_failed();
        policy.server_failed();
        assert_eq!(host(policy.get_server_url(None)), Some("c.example"));

        policy.server_failed();
        assert_eq!(policy.get_server_url(None), None);

        policy.reset(0);
        assert_eq!(host(policy.get_server_url(None)), Some("a.example"));
    }

    #[rstest]
    #[case(0, ["a.example", "b.example", "c.example"])]
    #[case(1, ["b.example", "c.example", "a.example"])]
    #[case(5, ["c.example", "a.example", "b.example"])]
    fn test_roundrobin_rotates_by_offset(#[case] offset: usize, #[case] expected: [&str; 3]) {
        let policy = FailoverPolicy::with_offset(urls(), FailoverMethod::Roundrobin, offset);
        for (index, want) in expected.iter().enumerate() {
            assert_eq!(host(policy.get_server_url(Some(index))), Some(*want));
        }
        assert_eq!(policy.get_server_url(Some(3)), None);
    }

    #[test]
    fn test_roundrobin_visits_every_mirror_once() {
        let mut policy = FailoverPolicy::new(urls(), FailoverMethod::Roundrobin);
        let mut seen = HashSet::new();
        while let Some(url) = policy.get_server_url(None) {
            assert!(seen.insert(url.clone()));
            policy.server_failed();
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_empty_list_is_exhausted() {
        let policy = FailoverPolicy::new(Vec::new(), FailoverMethod::Roundrobin);
        assert!(policy.is_empty());
        assert_eq!(policy.get_server_url(None), None);
    }
}
