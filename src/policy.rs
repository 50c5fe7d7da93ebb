//! Visibility decision for a single post.

use crate::config::FilterConfig;
use crate::trust::TrustCache;
use serde::Serialize;

/// Reason string stamped on containers the engine hides.
pub const HIDDEN_REASON: &str = "verified-reply";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Visibility {
    Show,
    Hide,
    /// Shown for now; decided again once the missing data arrives.
    Defer,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        !matches!(self, Visibility::Hide)
    }
}

/// One candidate post as classified during a scan.
#[derive(Debug, Clone)]
pub struct Post<N> {
    pub node: N,
    pub position: usize,
    pub author_id: Option<String>,
    pub is_verified: bool,
}

/// Decides whether `post` stays visible.
///
/// `root_author` is the resolved author of the conversation's root post.
pub fn decide<N>(
    post: &Post<N>,
    cache: &TrustCache,
    config: &FilterConfig,
    root_author: Option<&str>,
) -> Visibility {
    if post.position == 0 {
        return Visibility::Show;
    }

    let author = post.author_id.as_deref();
    if let (Some(author), Some(root)) = (author, root_author) {
        if author == root {
            return Visibility::Show;
        }
    }

    if !post.is_verified {
        return Visibility::Show;
    }

    let Some(author) = author else {
        // Without an identity no exception can be checked; only hide when
        // there are no exceptions to check.
        if config.show_if_following || config.show_if_follower_count_at_least_enabled {
            return Visibility::Defer;
        }
        return Visibility::Hide;
    };

    let record = cache.get(author);

    if config.show_if_following && record.and_then(|r| r.following) == Some(true) {
        return Visibility::Show;
    }

    if config.show_if_follower_count_at_least_enabled {
        match record.and_then(|r| r.followers_count) {
            Some(count) if count >= config.show_if_follower_count_at_least => {
                return Visibility::Show;
            }
            Some(_) => {}
            None => return Visibility::Defer,
        }
    }

    Visibility::Hide
}
