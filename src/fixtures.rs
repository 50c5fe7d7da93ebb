//! Builders for conversation markup in the host site's shape, used by the
//! unit tests.

use crate::dom::{Document, Dom, NodeId};

#[derive(Debug, Clone)]
enum Badge {
    None,
    TestId,
    Label(String),
}

/// One post cell: author header, body text and an optional quoted post.
#[derive(Debug, Clone)]
pub struct PostSpec {
    handle: String,
    badge: Badge,
    text: String,
    handle_text: bool,
    header: bool,
    quote: Option<Box<PostSpec>>,
}

impl PostSpec {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            badge: Badge::None,
            text: format!("post by {handle}"),
            handle_text: true,
            header: true,
            quote: None,
        }
    }

    /// Verified badge rendered as the `icon-verified` marker.
    pub fn verified(mut self) -> Self {
        self.badge = Badge::TestId;
        self
    }

    /// Badge rendered as an icon with the given accessible label.
    pub fn badge_label(mut self, label: &str) -> Self {
        self.badge = Badge::Label(label.to_string());
        self
    }

    /// Drop the `@handle` text so only the profile link identifies the author.
    pub fn without_handle_text(mut self) -> Self {
        self.handle_text = false;
        self
    }

    /// Drop the author header entirely.
    pub fn without_header(mut self) -> Self {
        self.header = false;
        self
    }

    pub fn quoting(mut self, quoted: PostSpec) -> Self {
        self.quote = Some(Box::new(quoted));
        self
    }
}

/// Builds `html > body > main > section` with one cell per post.
pub struct TimelineBuilder {
    doc: Document,
    timeline: NodeId,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        let mut doc = Document::new();
        let root = doc.document_element();
        let body = doc.append_element(root, "body", &[]);
        let main = doc.append_element(body, "main", &[("role", "main")]);
        let timeline = doc.append_element(main, "section", &[("aria-label", "Timeline")]);
        Self { doc, timeline }
    }

    /// Appends a post cell and returns its outer article.
    pub fn post(&mut self, spec: PostSpec) -> NodeId {
        Self::append_post(&mut self.doc, self.timeline, &spec)
    }

    /// The section new cells are appended to.
    pub fn timeline(&self) -> NodeId {
        self.timeline
    }

    /// Appends a post cell to a document that was already built, the way
    /// infinite scroll adds replies to a live page.
    pub fn append_post(doc: &mut Document, timeline: NodeId, spec: &PostSpec) -> NodeId {
        let cell = doc.append_element(timeline, "div", &[("data-testid", "cellInnerDiv")]);
        Self::render(doc, cell, spec)
    }

    /// Appends a cell that holds no article (ads, "show more" rows).
    pub fn filler(&mut self, text: &str) -> NodeId {
        let cell = self
            .doc
            .append_element(self.timeline, "div", &[("data-testid", "cellInnerDiv")]);
        self.doc.append_text(cell, text);
        cell
    }

    pub fn build(self) -> Document {
        self.doc
    }

    fn render(doc: &mut Document, parent: NodeId, spec: &PostSpec) -> NodeId {
        let article = doc.append_element(parent, "article", &[("data-testid", "tweet")]);
        let profile = format!("/{}", spec.handle);

        if spec.header {
            let header = doc.append_element(article, "div", &[("data-testid", "User-Name")]);
            let name_link = doc.append_element(header, "a", &[("href", profile.as_str())]);
            doc.append_text(name_link, &format!("{} ", spec.handle));
            match &spec.badge {
                Badge::None => {}
                Badge::TestId => {
                    doc.append_element(
                        name_link,
                        "svg",
                        &[("data-testid", "icon-verified"), ("aria-label", "Verified account")],
                    );
                }
                Badge::Label(label) => {
                    doc.append_element(name_link, "svg", &[("aria-label", label.as_str())]);
                }
            }
            if spec.handle_text {
                let handle_link = doc.append_element(header, "a", &[("href", profile.as_str())]);
                doc.append_text(handle_link, &format!("@{}", spec.handle));
            }
        }

        let body = doc.append_element(article, "div", &[("data-testid", "tweetText")]);
        doc.append_text(body, &spec.text);

        if let Some(quoted) = &spec.quote {
            let frame = doc.append_element(article, "div", &[("role", "link")]);
            Self::render(doc, frame, quoted);
        }

        article
    }
}
