use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

/// Sub-paths of a conversation that open the media viewer instead.
const MEDIA_VIEWER_SEGMENTS: &[&str] = &["/photo/", "/video/"];

lazy_static! {
    static ref STATUS_AUTHOR: Regex = Regex::new(r"^/([A-Za-z0-9_]{1,15})/status/").unwrap();
}

/// Current navigation path of the host page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLocation {
    path: String,
}

impl PageLocation {
    /// Accepts either a bare path or a full URL.
    pub fn new(path_or_url: &str) -> Self {
        let path = match Url::parse(path_or_url) {
            Ok(url) => url.path().to_string(),
            Err(_) => path_or_url.split(['?', '#']).next().unwrap_or_default().to_string(),
        };
        Self { path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Conversation (`/{user}/status/{id}`) and quotes
    /// (`/{user}/status/{id}/quotes`) views qualify; the media viewer does not.
    pub fn is_conversation_view(&self) -> bool {
        let with_slash = format!("{}/", self.path.trim_end_matches('/'));
        self.path.contains("/status/")
            && !MEDIA_VIEWER_SEGMENTS
                .iter()
                .any(|segment| with_slash.contains(segment))
    }

    /// Author handle from `/{handle}/status/...`, lowercased.
    pub fn status_author(&self) -> Option<String> {
        let caps = STATUS_AUTHOR.captures(&self.path)?;
        let handle = caps[1].to_lowercase();
        if handle == "i" {
            return None;
        }
        Some(handle)
    }
}
