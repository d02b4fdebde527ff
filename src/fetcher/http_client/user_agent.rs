//! User agent selection.

pub const USER_AGENT: &str = "tablescout/0.4 (restaurant data enrichment)";

/// Desktop browser agents used when a site rejects obvious crawlers.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

/// Pick an impersonation agent, rotating on the clock.
pub fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve the configured agent.
/// - None => the crawler's own agent
/// - "impersonate" => a desktop browser agent
/// - other => used verbatim
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None | Some("") => USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_default_and_custom() {
        assert!(resolve_user_agent(None).starts_with("tablescout/"));
        assert_eq!(resolve_user_agent(Some("GuideBot/2.0")), "GuideBot/2.0");
    }

    #[test]
    fn test_impersonate_looks_like_a_browser() {
        let ua = resolve_user_agent(Some("impersonate"));
        assert!(ua.starts_with("Mozilla/5.0"));
        assert!(!ua.contains("tablescout"));
    }
}
