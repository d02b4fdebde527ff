//! robots.txt checking.
//!
//! Rules are fetched once per origin and cached for the life of the process.
//! Anything that goes wrong while reading robots.txt means the origin is
//! treated as allowing everything.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::http_client::HttpClient;

/// Product token matched against `User-agent` lines.
const ROBOTS_AGENT: &str = "tablescout";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

/// Parsed rules of the group that applies to us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    rules: Vec<Rule>,
}

#[derive(Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

impl RobotsRules {
    /// Rules that allow every path.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt, keeping the group for our agent if there is one,
    /// otherwise the `*` group.
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_rules = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        groups.push(std::mem::take(&mut current));
                        in_rules = false;
                    }
                    current.agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // An empty Disallow allows everything and adds nothing.
                    if value.is_empty() {
                        continue;
                    }
                    current.rules.push(Rule {
                        allow: key == "allow",
                        pattern: value.to_string(),
                    });
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        let specific = groups
            .iter()
            .position(|g| g.agents.iter().any(|a| a != "*" && ROBOTS_AGENT.contains(a.as_str())));
        let wildcard = groups.iter().position(|g| g.agents.iter().any(|a| a == "*"));

        match specific.or(wildcard) {
            Some(idx) => Self {
                rules: std::mem::take(&mut groups[idx].rules),
            },
            None => Self::allow_all(),
        }
    }

    /// Longest matching rule wins; `Allow` wins a tie.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;
        for rule in &self.rules {
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let len = rule.pattern.len();
            best = match best {
                Some((best_len, best_allow))
                    if best_len > len || (best_len == len && best_allow) =>
                {
                    Some((best_len, best_allow))
                }
                _ => Some((len, rule.allow)),
            };
        }
        best.map(|(_, allow)| allow).unwrap_or(true)
    }
}

/// Prefix match with `*` wildcards and an optional `$` end anchor.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }
    let mut rest = &path[first.len()..];
    let remaining: Vec<&str> = parts.collect();

    if remaining.is_empty() {
        return !anchored || rest.is_empty();
    }

    for (i, part) in remaining.iter().enumerate() {
        let last = i == remaining.len() - 1;
        if last && anchored {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

/// Per-origin robots.txt cache. Clones share state.
#[derive(Clone, Default)]
pub struct RobotsCache {
    origins: Arc<RwLock<HashMap<String, Arc<RobotsRules>>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether our agent may fetch `url`.
    pub async fn is_allowed(&self, client: &HttpClient, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let origin = parsed.origin().ascii_serialization();

        let cached = self.origins.read().await.get(&origin).cloned();
        let rules = match cached {
            Some(rules) => rules,
            None => {
                let rules = Arc::new(Self::load(client, &origin).await);
                self.origins
                    .write()
                    .await
                    .insert(origin.clone(), rules.clone());
                rules
            }
        };

        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }
        rules.is_allowed(&path)
    }

    /// Seed rules for an origin without fetching.
    pub async fn insert(&self, origin: &str, rules: RobotsRules) {
        self.origins
            .write()
            .await
            .insert(origin.trim_end_matches('/').to_string(), Arc::new(rules));
    }

    async fn load(client: &HttpClient, origin: &str) -> RobotsRules {
        let robots_url = format!("{}/robots.txt", origin);
        match client.get_text(&robots_url).await {
            Ok(Some(text)) => RobotsRules::parse(&text),
            Ok(None) => {
                debug!("No robots.txt at {}", robots_url);
                RobotsRules::allow_all()
            }
            Err(e) => {
                debug!("Failed to fetch robots.txt from {}: {}", origin, e);
                RobotsRules::allow_all()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = r#"
# Example
User-agent: *
Disallow: /private/
Disallow: /reservations
Allow: /private/menu

User-agent: BadBot
Disallow: /
"#;

    #[test]
    fn test_wildcard_group_rules() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(rules.is_allowed("/"));
        assert!(rules.is_allowed("/menu"));
        assert!(!rules.is_allowed("/private/staff"));
        assert!(rules.is_allowed("/private/menu.html"));
        assert!(!rules.is_allowed("/reservations?date=today"));
    }

    #[test]
    fn test_specific_group_preferred() {
        let text = "User-agent: *\nDisallow: /\n\nUser-agent: tablescout\nDisallow: /admin\n";
        let rules = RobotsRules::parse(text);
        assert!(rules.is_allowed("/menu"));
        assert!(!rules.is_allowed("/admin/login"));
    }

    #[test]
    fn test_no_matching_group_allows_all() {
        let rules = RobotsRules::parse("User-agent: OtherBot\nDisallow: /\n");
        assert!(rules.is_allowed("/anything"));
        assert!(RobotsRules::parse("").is_allowed("/"));
    }

    #[test]
    fn test_empty_disallow_allows() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n");
        assert!(rules.is_allowed("/menu"));
    }

    #[test]
    fn test_allow_wins_tie() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /carte\nAllow: /carte\n");
        assert!(rules.is_allowed("/carte"));
    }

    #[test]
    fn test_wildcards_and_anchor() {
        assert!(pattern_matches("/*.pdf$", "/files/menu.pdf"));
        assert!(!pattern_matches("/*.pdf$", "/files/menu.pdf?x=1"));
        assert!(pattern_matches("/shop*/cart", "/shop-en/cart/items"));
        assert!(!pattern_matches("/shop*/cart", "/about"));
    }

    #[tokio::test]
    async fn test_cache_uses_seeded_rules() {
        let cache = RobotsCache::new();
        cache
            .insert("https://example.com", RobotsRules::parse("User-agent: *\nDisallow: /\n"))
            .await;
        let client = HttpClient::new(
            std::time::Duration::from_secs(1),
            std::time::Duration::ZERO,
            None,
        )
        .unwrap();
        assert!(!cache.is_allowed(&client, "https://example.com/menu").await);
    }
}
