//! Author identity and badge extraction from a post's element subtree.
//!
//! A timeline cell may hold the outer post plus an embedded quoted post that
//! is rendered as its own nested article. Everything here is scoped to the
//! *outer* article's author header so the quoted author never leaks into the
//! outer post's classification.

use crate::dom::{closest, query_all, query_first, Dom, Selector};
use lazy_static::lazy_static;
use regex::Regex;

pub const POST_ARTICLE: Selector = Selector::tag("article").test_id("tweet");
pub const TIMELINE_CELL: Selector = Selector::tag("div").test_id("cellInnerDiv");
const AUTHOR_NAME: Selector = Selector::any().test_id("User-Name");
const VERIFIED_ICON: Selector = Selector::any().test_id("icon-verified");
const LABELED_ICON: Selector = Selector::tag("svg").has_attr("aria-label");
const PROFILE_LINK: Selector = Selector::tag("a").attr_starts_with("href", "/");

/// Path segments that look like handles but are application routes.
const RESERVED_SEGMENTS: &[&str] = &["home", "i", "settings"];

/// Lowercased fragments of the verified-account label across supported locales.
const VERIFIED_LABELS: &[&str] = &[
    "verified",    // en
    "認証",        // ja (認証済みアカウント)
    "verificad",   // es, pt
    "vérifié",     // fr
    "verifiziert", // de
];

lazy_static! {
    static ref HANDLE_TEXT: Regex = Regex::new(r"@([A-Za-z0-9_]{1,15})").unwrap();
    static ref HANDLE_HREF: Regex = Regex::new(r"^/([A-Za-z0-9_]{1,15})(?:\b|/|\?|$)").unwrap();
    static ref FOLLOWER_COUNT: Regex = Regex::new(r"(\d+(?:\.\d+)?)([KkMm万億])?$").unwrap();
}

/// Resolves a timeline cell to the article of the post it represents.
///
/// Prefers an article with no enclosing article (the outer post); falls back
/// to the first article in the cell.
pub fn outer_post_article<D: Dom>(dom: &D, cell: D::Node) -> Option<D::Node> {
    let articles = query_all(dom, cell, &POST_ARTICLE);
    let outer = articles.iter().copied().find(|&article| {
        dom.parent(article)
            .map(|parent| closest(dom, parent, &POST_ARTICLE).is_none())
            .unwrap_or(false)
    });
    outer.or_else(|| articles.first().copied())
}

/// The author-name block belonging to `article` itself, skipping blocks that
/// sit inside a nested article.
pub fn author_header<D: Dom>(dom: &D, article: D::Node) -> Option<D::Node> {
    query_all(dom, article, &AUTHOR_NAME)
        .into_iter()
        .find(|&block| closest(dom, block, &POST_ARTICLE) == Some(article))
}

/// Canonical (lowercase) handle of the post's author, or `None` when the
/// header is missing or carries nothing that parses as a handle.
pub fn author_id<D: Dom>(dom: &D, article: D::Node) -> Option<String> {
    let header = author_header(dom, article)?;

    let text = dom.text_content(header);
    if let Some(handle) = handle_from_text(text.trim()) {
        return Some(handle);
    }

    let link = query_first(dom, header, &PROFILE_LINK)?;
    handle_from_href(dom.attribute(link, "href").unwrap_or_default())
}

/// Whether the outer author header carries the verified badge.
pub fn is_verified<D: Dom>(dom: &D, article: D::Node) -> bool {
    let Some(header) = author_header(dom, article) else {
        return false;
    };

    if query_first(dom, header, &VERIFIED_ICON).is_some() {
        return true;
    }

    query_all(dom, header, &LABELED_ICON).into_iter().any(|icon| {
        let label = dom.attribute(icon, "aria-label").unwrap_or_default().to_lowercase();
        VERIFIED_LABELS.iter().any(|fragment| label.contains(fragment))
    })
}

/// First `@handle` token in `text`, lowercased.
pub fn handle_from_text(text: &str) -> Option<String> {
    HANDLE_TEXT
        .captures(text)
        .map(|caps| caps[1].to_lowercase())
}

/// Handle from a profile-style link path such as `/alice` or `/alice/with_replies`.
pub fn handle_from_href(href: &str) -> Option<String> {
    let caps = HANDLE_HREF.captures(href)?;
    let handle = caps[1].to_lowercase();
    if RESERVED_SEGMENTS.contains(&handle.as_str()) {
        return None;
    }
    Some(handle)
}

/// Parses a displayed follower count (`1,234`, `12.3K`, `1.2M`, `1.2万`, `3.4億`).
pub fn parse_follower_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let caps = FOLLOWER_COUNT.captures(&cleaned)?;
    let number: f64 = caps[1].parse().ok()?;

    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        None => 1.0,
        Some("K") | Some("k") => 1_000.0,
        Some("M") | Some("m") => 1_000_000.0,
        Some("万") => 10_000.0,
        Some("億") => 100_000_000.0,
        Some(_) => return None,
    };

    Some((number * multiplier).floor() as u64)
}
