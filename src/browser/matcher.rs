//! Search result matcher
//!
//! Pure decision function: given the ordered candidate links scraped from a
//! results page and the target hostname, pick the link to click or fall
//! back to direct navigation.

use url::Url;

/// Hosts that belong to the search engine itself; links to these are never
/// valid results.
const SEARCH_ENGINE_MARKERS: &[&str] = &["google.com", "accounts.google"];

/// Outcome of matching candidates against the target host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// Click this candidate URL
    Clicked(String),
    /// No candidate matched; navigate to the target directly
    NotFound,
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn is_candidate(url: &str) -> bool {
    if url.starts_with('#') || url.starts_with("javascript:") {
        return false;
    }
    !SEARCH_ENGINE_MARKERS.iter().any(|marker| url.contains(marker))
}

/// Decide which candidate (if any) to click for `target_host`.
///
/// Two passes over the candidates in their original order: first exact
/// normalized-host equality, then raw substring containment. Earlier
/// candidates win within a pass, and an exact match anywhere in the list
/// beats a substring match anywhere else — the substring tier only exists
/// to catch redirect/tracking-decorated result URLs.
pub fn match_result(candidates: &[String], target_host: &str) -> MatchResult {
    let target = strip_www(target_host);
    let usable: Vec<&String> = candidates.iter().filter(|c| is_candidate(c)).collect();

    for candidate in &usable {
        if let Ok(parsed) = Url::parse(candidate) {
            if let Some(host) = parsed.host_str() {
                if strip_www(host) == target {
                    return MatchResult::Clicked((*candidate).clone());
                }
            }
        }
    }

    for candidate in &usable {
        if candidate.contains(target) {
            return MatchResult::Clicked((*candidate).clone());
        }
    }

    MatchResult::NotFound
}
