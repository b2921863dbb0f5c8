/// Anchors picked on landing pages without a dedicated rule.
pub const GENERIC_SELECTOR: &str = r#"a[href*="article"], a[href*="news"], a[href*="story"]"#;

enum Rule {
    /// Article urls carry the publication year as a path segment.
    Dated,
    Path(&'static str),
}

const RULES: [(&str, Rule); 6] = [
    ("cnn.com", Rule::Dated),
    ("techcrunch.com", Rule::Dated),
    ("bbc.com", Rule::Path("/news/")),
    ("bbc.co.uk", Rule::Path("/news/")),
    ("bloomberg.com", Rule::Path("/news/")),
    ("reuters.com", Rule::Path("/article/")),
];

fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix
        || host
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// CSS selector for article links on the landing page of `host`.
pub fn link_selector(host: &str, year: i32) -> String {
    let host = host.to_ascii_lowercase();
    let rule = RULES
        .iter()
        .find(|(suffix, _)| host_matches(&host, suffix))
        .map(|(_, rule)| rule);

    match rule {
        Some(Rule::Dated) => format!(r#"a[href*="/{year}/"], a[href*="/{}/"]"#, year - 1),
        Some(Rule::Path(path)) => format!(r#"a[href*="{path}"]"#),
        None => GENERIC_SELECTOR.to_string(),
    }
}
