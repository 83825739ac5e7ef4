//! Hostname avoid-lists and global avoid-list resolution.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};
use url::Url;

/// File name of the global avoid-list that sits next to a schema file.
pub const SIDECAR_FILE_NAME: &str = "permanently_banned.json";

// ---------------------------------------------------------------------------
// DomainSet
// ---------------------------------------------------------------------------

/// A set of banned hostnames.
///
/// A host is banned when it equals an entry or is a subdomain of one
/// (`sub.banned.edu` matches `banned.edu`; `notbanned.edu.evil.com` does not).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet {
    domains: BTreeSet<String>,
}

impl DomainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a hostname, normalizing case, trailing dots, and URL-form entries.
    pub fn insert(&mut self, entry: &str) {
        if let Some(domain) = normalize_domain(entry) {
            self.domains.insert(domain);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }

    /// Returns `true` if `host` equals or is a subdomain of any entry.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }

    /// Returns `true` if the URL's host is banned. Unparseable URLs are not matched.
    pub fn matches_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.host_str().is_some_and(|h| self.matches_host(h)),
            Err(_) => false,
        }
    }
}

impl<S: AsRef<str>> FromIterator<S> for DomainSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for entry in iter {
            set.insert(entry.as_ref());
        }
        set
    }
}

fn normalize_domain(entry: &str) -> Option<String> {
    let trimmed = entry.trim();
    if trimmed.is_empty() {
        return None;
    }
    let host = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?.host_str()?.to_string()
    } else {
        trimmed.to_string()
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() { None } else { Some(host) }
}

// ---------------------------------------------------------------------------
// Global avoid-list resolution
// ---------------------------------------------------------------------------

/// Inputs for resolving the global avoid-list, in precedence order.
#[derive(Debug, Clone, Default)]
pub struct GlobalAvoidSource {
    /// Explicit list from the caller (e.g. a CLI flag). Wins over everything.
    pub inline: Option<Vec<String>>,
    /// Raw value of the avoid-list env var: a JSON array of hostnames.
    pub env_json: Option<String>,
}

impl GlobalAvoidSource {
    /// Read the env var named `var_name`, leaving `inline` unset.
    pub fn from_env(var_name: &str) -> Self {
        Self {
            inline: None,
            env_json: std::env::var(var_name).ok().filter(|v| !v.trim().is_empty()),
        }
    }

    /// Resolve to a domain set: inline, else env, else the sidecar next to
    /// `schema_path`, else empty. Parse failures degrade to empty with a warning.
    pub fn resolve(&self, schema_path: Option<&Path>) -> DomainSet {
        if let Some(inline) = &self.inline {
            return inline.iter().collect();
        }

        if let Some(raw) = &self.env_json {
            return match serde_json::from_str::<Vec<String>>(raw) {
                Ok(list) => list.iter().collect(),
                Err(e) => {
                    warn!(error = %e, "global avoid-list env var is not a JSON array of domains, ignoring");
                    DomainSet::new()
                }
            };
        }

        let Some(schema_path) = schema_path else {
            return DomainSet::new();
        };
        let sidecar = schema_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SIDECAR_FILE_NAME);

        let content = match std::fs::read_to_string(&sidecar) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %sidecar.display(), "no global avoid-list sidecar");
                return DomainSet::new();
            }
            Err(e) => {
                warn!(path = %sidecar.display(), error = %e, "could not read global avoid-list");
                return DomainSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(list) => {
                debug!(path = %sidecar.display(), domains = list.len(), "loaded global avoid-list");
                list.iter().collect()
            }
            Err(e) => {
                warn!(path = %sidecar.display(), error = %e, "global avoid-list is malformed, ignoring");
                DomainSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[&str]) -> DomainSet {
        entries.iter().collect()
    }

    #[test]
    fn exact_and_subdomain_match() {
        let banned = set(&["banned.edu"]);
        assert!(banned.matches_host("banned.edu"));
        assert!(banned.matches_host("sub.banned.edu"));
        assert!(banned.matches_host("deep.sub.BANNED.edu."));
    }

    #[test]
    fn substring_does_not_match() {
        let banned = set(&["banned.edu"]);
        assert!(!banned.matches_host("notbanned.edu.evil.com"));
        assert!(!banned.matches_host("notbanned.edu"));
        assert!(!banned.matches_host("edu"));
    }

    #[test]
    fn url_matching() {
        let banned = set(&["usnews.com"]);
        assert!(banned.matches_url("https://usnews.com/acme-profs"));
        assert!(banned.matches_url("https://www.usnews.com/best-colleges"));
        assert!(!banned.matches_url("https://acme.edu/faculty"));
        assert!(!banned.matches_url("not a url"));
    }

    #[test]
    fn entries_are_normalized() {
        let banned = set(&["  Niche.COM ", "https://www.reddit.com/r/college", "", "wiki.org."]);
        assert_eq!(banned.len(), 3);
        assert!(banned.matches_host("niche.com"));
        assert!(banned.matches_host("www.reddit.com"));
        assert!(!banned.matches_host("reddit.com"));
        assert!(banned.matches_host("en.wiki.org"));
    }

    #[test]
    fn inline_wins_over_env() {
        let source = GlobalAvoidSource {
            inline: Some(vec!["inline.com".into()]),
            env_json: Some(r#"["env.com"]"#.into()),
        };
        let resolved = source.resolve(None);
        assert!(resolved.matches_host("inline.com"));
        assert!(!resolved.matches_host("env.com"));
    }

    #[test]
    fn env_wins_over_sidecar() {
        let source = GlobalAvoidSource {
            inline: None,
            env_json: Some(r#"["env.com"]"#.into()),
        };
        let resolved = source.resolve(Some(Path::new("../../../fixtures/schema/university.json")));
        assert_eq!(resolved.iter().collect::<Vec<_>>(), vec!["env.com"]);
    }

    #[test]
    fn malformed_env_degrades_to_empty() {
        let source = GlobalAvoidSource {
            inline: None,
            env_json: Some("usnews.com, niche.com".into()),
        };
        let resolved = source.resolve(Some(Path::new("../../../fixtures/schema/university.json")));
        assert!(resolved.is_empty());
    }

    #[test]
    fn sidecar_is_read_next_to_schema() {
        let resolved = GlobalAvoidSource::default()
            .resolve(Some(Path::new("../../../fixtures/schema/university.json")));
        assert!(resolved.matches_host("usnews.com"));
        assert!(resolved.matches_host("en.wikipedia.org"));
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn missing_or_malformed_sidecar_degrades_to_empty() {
        let dir = std::env::temp_dir().join(format!("orgscout-avoid-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let schema_path = dir.join("schema.json");

        assert!(GlobalAvoidSource::default().resolve(Some(&schema_path)).is_empty());

        std::fs::write(dir.join(SIDECAR_FILE_NAME), "{\"not\": \"an array\"}").unwrap();
        assert!(GlobalAvoidSource::default().resolve(Some(&schema_path)).is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_schema_path_means_empty() {
        assert!(GlobalAvoidSource::default().resolve(None).is_empty());
    }
}
