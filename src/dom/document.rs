use super::Dom;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Content {
    Element(NodeId),
    Text(String),
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    parent: Option<NodeId>,
    content: Vec<Content>,
    display: String,
}

/// Arena-backed element tree.
///
/// Nodes are never freed; a detached subtree simply stops being reachable
/// from the document element.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<ElementData>,
}

/// Serialized element tree as accepted by `--snapshot`.
///
/// ```json
/// {"tag": "div", "attrs": {"data-testid": "cellInnerDiv"}, "children": ["text", {"tag": "a"}]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSnapshot {
    Text(String),
    Element(ElementSnapshot),
}

impl Document {
    /// Empty document with an `html` document element.
    pub fn new() -> Self {
        Self {
            nodes: vec![ElementData {
                tag: "html".to_string(),
                attributes: Vec::new(),
                parent: None,
                content: Vec::new(),
                display: String::new(),
            }],
        }
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            parent: None,
            content: Vec::new(),
            display: String::new(),
        });
        id
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].content.push(Content::Element(child));
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(node, name, value);
        }
        self.append_child(parent, node);
        node
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        self.nodes[parent.0].content.push(Content::Text(text.to_string()));
    }

    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0]
                .content
                .retain(|c| !matches!(c, Content::Element(id) if *id == node));
        }
    }

    /// Builds a document whose document element mirrors `snapshot`.
    pub fn from_snapshot(snapshot: &ElementSnapshot) -> Self {
        let mut doc = Self::new();
        let root = doc.document_element();
        doc.nodes[root.0].tag = snapshot.tag.to_ascii_lowercase();
        doc.fill(root, snapshot);
        doc
    }

    fn fill(&mut self, node: NodeId, snapshot: &ElementSnapshot) {
        for (name, value) in &snapshot.attrs {
            self.set_attribute(node, name, value);
        }
        for child in &snapshot.children {
            match child {
                NodeSnapshot::Text(text) => self.append_text(node, text),
                NodeSnapshot::Element(element) => {
                    let child_node = self.create_element(&element.tag);
                    self.append_child(node, child_node);
                    self.fill(child_node, element);
                }
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let snapshot: ElementSnapshot =
            serde_json::from_str(json).context("Failed to parse page snapshot")?;
        Ok(Self::from_snapshot(&snapshot))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot: {}", path.as_ref().display()))?;
        Self::from_json_str(&content)
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        for content in &self.nodes[node.0].content {
            match content {
                Content::Text(text) => out.push_str(text),
                Content::Element(child) => self.collect_text(*child, out),
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom for Document {
    type Node = NodeId;

    fn document_element(&self) -> NodeId {
        NodeId(0)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0]
            .content
            .iter()
            .filter_map(|c| match c {
                Content::Element(id) => Some(*id),
                Content::Text(_) => None,
            })
            .collect()
    }

    fn tag_name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0]
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let attributes = &mut self.nodes[node.0].attributes;
        match attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        self.nodes[node.0].attributes.retain(|(key, _)| key != name);
    }

    fn style_display(&self, node: NodeId) -> &str {
        &self.nodes[node.0].display
    }

    fn set_style_display(&mut self, node: NodeId, value: &str) {
        self.nodes[node.0].display = value.to_string();
    }
}
