//! Hiding and revealing post containers.
//!
//! The engine only ever touches the container's inline `display` and its two
//! marker attributes, and restores `display` to empty on reveal.

use crate::dom::{closest, query_all, Dom, Selector};
use crate::identity::TIMELINE_CELL;

pub const HIDDEN_ATTR: &str = "data-antiimp-hidden";
pub const HIDDEN_REASON_ATTR: &str = "data-antiimp-hidden-reason";

const HIDDEN_MARKED: Selector = Selector::any().attr_eq(HIDDEN_ATTR, "true");

/// The timeline cell holding `article`, or the article itself outside a timeline.
pub fn container<D: Dom>(dom: &D, article: D::Node) -> D::Node {
    closest(dom, article, &TIMELINE_CELL).unwrap_or(article)
}

pub fn is_hidden<D: Dom>(dom: &D, article: D::Node) -> bool {
    let target = container(dom, article);
    dom.attribute(target, HIDDEN_ATTR) == Some("true")
}

/// Hides the post's container. Returns false when it was already hidden.
pub fn hide_post<D: Dom>(dom: &mut D, article: D::Node, reason: &str) -> bool {
    let target = container(dom, article);
    if dom.attribute(target, HIDDEN_ATTR) == Some("true") {
        return false;
    }
    dom.set_style_display(target, "none");
    dom.set_attribute(target, HIDDEN_ATTR, "true");
    dom.set_attribute(target, HIDDEN_REASON_ATTR, reason);
    true
}

/// Reveals a container this engine hid. Returns false when there was nothing to undo.
pub fn show_post<D: Dom>(dom: &mut D, article: D::Node) -> bool {
    let target = container(dom, article);
    if dom.attribute(target, HIDDEN_ATTR) != Some("true") {
        return false;
    }
    unmark(dom, target);
    true
}

/// Reveals every element in the document carrying the hidden marker.
pub fn reveal_all<D: Dom>(dom: &mut D) -> usize {
    let root = dom.document_element();
    let mut hidden = query_all(dom, root, &HIDDEN_MARKED);
    if HIDDEN_MARKED.matches(dom, root) {
        hidden.push(root);
    }
    for &node in &hidden {
        unmark(dom, node);
    }
    hidden.len()
}

fn unmark<D: Dom>(dom: &mut D, node: D::Node) {
    dom.set_style_display(node, "");
    dom.remove_attribute(node, HIDDEN_ATTR);
    dom.remove_attribute(node, HIDDEN_REASON_ATTR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{PostSpec, TimelineBuilder};
    use crate::policy::HIDDEN_REASON;

    #[test]
    fn test_hide_is_idempotent_and_show_restores() {
        let mut timeline = TimelineBuilder::new();
        let article = timeline.post(PostSpec::new("bluecheck").verified());
        let mut doc = timeline.build();
        let cell = container(&doc, article);
        assert_ne!(cell, article);

        assert!(hide_post(&mut doc, article, HIDDEN_REASON));
        let snapshot = format!("{:?}", doc);
        assert!(!hide_post(&mut doc, article, HIDDEN_REASON));
        assert_eq!(format!("{:?}", doc), snapshot);

        assert_eq!(doc.style_display(cell), "none");
        assert_eq!(doc.attribute(cell, HIDDEN_REASON_ATTR), Some(HIDDEN_REASON));
        assert!(is_hidden(&doc, article));

        assert!(show_post(&mut doc, article));
        assert_eq!(doc.style_display(cell), "");
        assert_eq!(doc.attribute(cell, HIDDEN_ATTR), None);
        assert_eq!(doc.attribute(cell, HIDDEN_REASON_ATTR), None);
        assert!(!show_post(&mut doc, article));
    }

    #[test]
    fn test_show_leaves_foreign_display_alone() {
        let mut timeline = TimelineBuilder::new();
        let article = timeline.post(PostSpec::new("someone"));
        let mut doc = timeline.build();
        let cell = container(&doc, article);
        doc.set_style_display(cell, "flex");

        assert!(!show_post(&mut doc, article));
        assert_eq!(doc.style_display(cell), "flex");
    }

    #[test]
    fn test_reveal_all_sweeps_document() {
        let mut timeline = TimelineBuilder::new();
        let a = timeline.post(PostSpec::new("a").verified());
        let b = timeline.post(PostSpec::new("b").verified());
        let mut doc = timeline.build();
        hide_post(&mut doc, a, HIDDEN_REASON);
        hide_post(&mut doc, b, HIDDEN_REASON);

        // Outside any timeline cell.
        let stray = doc.append_element(doc.document_element(), "div", &[]);
        hide_post(&mut doc, stray, HIDDEN_REASON);

        assert_eq!(reveal_all(&mut doc), 3);
        assert!(!is_hidden(&doc, a));
        assert!(!is_hidden(&doc, b));
        assert_eq!(doc.style_display(stray), "");
        assert_eq!(reveal_all(&mut doc), 0);
    }
}
