//! Element tree abstraction
//!
//! The engine never talks to a concrete page. It reads and marks elements
//! through the [`Dom`] trait, so a browser binding and the in-memory
//! [`Document`] used by the CLI and tests are interchangeable.

mod document;

pub use document::{Document, ElementSnapshot, NodeId, NodeSnapshot};

use std::fmt::Debug;
use std::hash::Hash;

/// Read/mark access to an element tree.
///
/// Only element nodes are addressable; text is reachable through
/// [`Dom::text_content`].
pub trait Dom {
    type Node: Copy + Eq + Hash + Debug;

    fn document_element(&self) -> Self::Node;
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;
    /// Lowercase tag name.
    fn tag_name(&self, node: Self::Node) -> &str;
    fn attribute(&self, node: Self::Node, name: &str) -> Option<&str>;
    /// Concatenated text of the node and all of its descendants.
    fn text_content(&self, node: Self::Node) -> String;
    fn set_attribute(&mut self, node: Self::Node, name: &str, value: &str);
    fn remove_attribute(&mut self, node: Self::Node, name: &str);
    /// Inline `display` style, empty when unset.
    fn style_display(&self, node: Self::Node) -> &str;
    fn set_style_display(&mut self, node: Self::Node, value: &str);
}

/// The small selector vocabulary the host markup needs.
///
/// Every populated field must match; an empty selector matches any element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selector {
    tag: Option<&'static str>,
    test_id: Option<&'static str>,
    attr: Option<&'static str>,
    attr_value: Option<(&'static str, &'static str)>,
    attr_prefix: Option<(&'static str, &'static str)>,
}

impl Selector {
    pub const fn any() -> Self {
        Self {
            tag: None,
            test_id: None,
            attr: None,
            attr_value: None,
            attr_prefix: None,
        }
    }

    pub const fn tag(tag: &'static str) -> Self {
        let mut selector = Self::any();
        selector.tag = Some(tag);
        selector
    }

    /// `[data-testid="..."]`
    pub const fn test_id(mut self, id: &'static str) -> Self {
        self.test_id = Some(id);
        self
    }

    /// `[name]`
    pub const fn has_attr(mut self, name: &'static str) -> Self {
        self.attr = Some(name);
        self
    }

    /// `[name="value"]`
    pub const fn attr_eq(mut self, name: &'static str, value: &'static str) -> Self {
        self.attr_value = Some((name, value));
        self
    }

    /// `[name^="prefix"]`
    pub const fn attr_starts_with(mut self, name: &'static str, prefix: &'static str) -> Self {
        self.attr_prefix = Some((name, prefix));
        self
    }

    pub fn matches<D: Dom>(&self, dom: &D, node: D::Node) -> bool {
        if let Some(tag) = self.tag {
            if !dom.tag_name(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = self.test_id {
            if dom.attribute(node, "data-testid") != Some(id) {
                return false;
            }
        }
        if let Some(name) = self.attr {
            if dom.attribute(node, name).is_none() {
                return false;
            }
        }
        if let Some((name, value)) = self.attr_value {
            if dom.attribute(node, name) != Some(value) {
                return false;
            }
        }
        if let Some((name, prefix)) = self.attr_prefix {
            match dom.attribute(node, name) {
                Some(value) if value.starts_with(prefix) => {}
                _ => return false,
            }
        }
        true
    }
}

/// All descendants of `scope` in document order, excluding `scope` itself.
pub fn descendants<D: Dom>(dom: &D, scope: D::Node) -> Vec<D::Node> {
    let mut out = Vec::new();
    let mut stack: Vec<D::Node> = dom.children(scope).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(dom.children(node).into_iter().rev());
    }
    out
}

pub fn query_all<D: Dom>(dom: &D, scope: D::Node, selector: &Selector) -> Vec<D::Node> {
    descendants(dom, scope)
        .into_iter()
        .filter(|&node| selector.matches(dom, node))
        .collect()
}

pub fn query_first<D: Dom>(dom: &D, scope: D::Node, selector: &Selector) -> Option<D::Node> {
    descendants(dom, scope)
        .into_iter()
        .find(|&node| selector.matches(dom, node))
}

/// Nearest inclusive ancestor matching `selector`, like `Element.closest`.
pub fn closest<D: Dom>(dom: &D, node: D::Node, selector: &Selector) -> Option<D::Node> {
    let mut current = Some(node);
    while let Some(candidate) = current {
        if selector.matches(dom, candidate) {
            return Some(candidate);
        }
        current = dom.parent(candidate);
    }
    None
}
