//! Arena-backed, lossless syntax tree.
//!
//! Children vectors are the owning links; `parent` is a plain index used for upward
//! traversal only. Rendering every leaf of the root in order reproduces the source
//! text exactly, so edits made through this API preserve surrounding formatting.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

/// Handle to a node inside a [`SyntaxTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Closed set of node kinds produced by the parser and the node factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    // Composite nodes
    File,
    Class,
    ClassBody,
    ObjectDeclaration,
    ObjectLiteral,
    Property,
    Function,
    ModifierList,
    ParameterList,
    SuperTypeList,
    TypeReference,
    Expression,
    Member,

    // Leaves
    Identifier,
    Keyword,
    Literal,
    Punct,
    LBrace,
    RBrace,
    Whitespace,
    Comment,
}

impl SyntaxKind {
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            SyntaxKind::Identifier
                | SyntaxKind::Keyword
                | SyntaxKind::Literal
                | SyntaxKind::Punct
                | SyntaxKind::LBrace
                | SyntaxKind::RBrace
                | SyntaxKind::Whitespace
                | SyntaxKind::Comment
        )
    }

    pub fn is_trivia(self) -> bool {
        matches!(self, SyntaxKind::Whitespace | SyntaxKind::Comment)
    }

    /// Kinds that count as a member declaration inside a class body.
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            SyntaxKind::Class
                | SyntaxKind::ObjectDeclaration
                | SyntaxKind::Property
                | SyntaxKind::Function
                | SyntaxKind::Member
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0:?} is already attached to a parent")]
    AlreadyAttached(NodeId),
    #[error("anchor node {0:?} is not attached to a parent")]
    DetachedAnchor(NodeId),
    #[error("leaf node {0:?} cannot hold children")]
    LeafParent(NodeId),
    #[error("attaching {0:?} would make it its own ancestor")]
    Cycle(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeData {
    kind: SyntaxKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<NodeData>,
    root: NodeId,
    revision: u64,
}

impl Default for SyntaxTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxTree {
    /// Creates a tree holding only an empty `File` root.
    pub fn new() -> Self {
        let root = NodeData {
            kind: SyntaxKind::File,
            parent: None,
            children: Vec::new(),
            text: None,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            revision: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Incremented by every structural mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn alloc_node(&mut self, kind: SyntaxKind) -> NodeId {
        debug_assert!(!kind.is_leaf(), "use alloc_leaf for {:?}", kind);
        self.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            text: None,
        })
    }

    pub fn alloc_leaf(&mut self, kind: SyntaxKind, text: impl Into<String>) -> NodeId {
        debug_assert!(kind.is_leaf(), "use alloc_node for {:?}", kind);
        self.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            text: Some(text.into()),
        })
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    pub fn kind(&self, id: NodeId) -> SyntaxKind {
        self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Literal text of a leaf; `None` for composite nodes.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].text.as_deref()
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Whether the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|a| a == self.root)
    }

    /// Pre-order walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![id],
        }
    }

    pub fn leaves(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(id).filter(move |&n| self.kind(n).is_leaf())
    }

    pub fn first_child_of_kind(&self, id: NodeId, kind: SyntaxKind) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.kind(c) == kind)
    }

    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.child_index(id)?;
        idx.checked_sub(1).map(|i| self.children(parent)[i])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.child_index(id)?;
        self.children(parent).get(idx + 1).copied()
    }

    /// Declared name of a node: the text of its first direct `Identifier` child.
    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        self.first_child_of_kind(id, SyntaxKind::Identifier)
            .and_then(|leaf| self.text(leaf))
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.kind(parent).is_leaf() {
            return Err(TreeError::LeafParent(parent));
        }
        if self.parent(child).is_some() || child == self.root {
            return Err(TreeError::AlreadyAttached(child));
        }
        if parent == child || self.ancestors(parent).any(|a| a == child) {
            return Err(TreeError::Cycle(child));
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check_attachable(parent, child)?;
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        self.revision += 1;
        Ok(())
    }

    /// Inserts the detached `child` as the sibling immediately preceding `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, child: NodeId) -> Result<(), TreeError> {
        let parent = self.parent(anchor).ok_or(TreeError::DetachedAnchor(anchor))?;
        self.check_attachable(parent, child)?;
        let idx = self
            .child_index(anchor)
            .ok_or(TreeError::DetachedAnchor(anchor))?;
        self.nodes[parent.0].children.insert(idx, child);
        self.nodes[child.0].parent = Some(parent);
        self.revision += 1;
        Ok(())
    }

    /// Unlinks a node from its parent, returning the former parent.
    ///
    /// The node stays in the arena (detached) and may be attached again.
    pub fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
        self.revision += 1;
        Some(parent)
    }

    /// Source text covered by `id`.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        for leaf in self.leaves(id) {
            if let Some(text) = self.text(leaf) {
                out.push_str(text);
            }
        }
        out
    }

    fn start_offset(&self, target: NodeId) -> Option<usize> {
        let mut offset = 0;
        for node in self.descendants(self.root) {
            if node == target {
                return Some(offset);
            }
            if let Some(text) = self.text(node) {
                offset += text.len();
            }
        }
        None
    }

    /// Byte range of an attached node within the rendered file.
    pub fn text_range(&self, id: NodeId) -> Option<Range<usize>> {
        let start = self.start_offset(id)?;
        Some(start..start + self.render(id).len())
    }

    /// Leaf covering the byte `offset`.
    ///
    /// A caret sitting right after an identifier (at the start of the following
    /// trivia) resolves to that identifier.
    pub fn token_at_offset(&self, offset: usize) -> Option<NodeId> {
        let mut start = 0;
        let mut prev: Option<NodeId> = None;
        for leaf in self.leaves(self.root) {
            let len = self.text(leaf).map_or(0, str::len);
            if len == 0 {
                continue;
            }
            let end = start + len;
            if offset < end {
                if offset == start && self.kind(leaf).is_trivia() {
                    if let Some(p) = prev.filter(|&p| !self.kind(p).is_trivia()) {
                        return Some(p);
                    }
                }
                return Some(leaf);
            }
            start = end;
            prev = Some(leaf);
        }
        // Caret at end of file
        if offset == start {
            prev
        } else {
            None
        }
    }

    /// Converts a 1-based line and 1-based character column into a byte offset.
    pub fn offset_at(&self, line: usize, column: usize) -> Option<usize> {
        if line == 0 || column == 0 {
            return None;
        }
        let text = self.render(self.root);
        let mut line_start = 0;
        for _ in 1..line {
            line_start += text[line_start..].find('\n')? + 1;
        }
        let line_text = text[line_start..].split('\n').next().unwrap_or("");
        let mut chars = line_text.char_indices().map(|(i, _)| i);
        match chars.nth(column - 1) {
            Some(byte) => Some(line_start + byte),
            // One past the last character is still a valid caret position
            None if column - 1 == line_text.chars().count() => Some(line_start + line_text.len()),
            None => None,
        }
    }

    /// 1-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let text = self.render(self.root);
        let before = &text[..offset.min(text.len())];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        (line, before[line_start..].chars().count() + 1)
    }

    /// Leading whitespace of the line on which `id` starts.
    pub fn line_indent(&self, id: NodeId) -> String {
        let Some(start) = self.start_offset(id) else {
            return String::new();
        };
        let text = self.render(self.root);
        let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
        text[line_start..]
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect()
    }

    /// Deep-copies `node` from `other` into this arena and returns the detached copy.
    pub fn graft(&mut self, other: &SyntaxTree, node: NodeId) -> NodeId {
        let data = &other.nodes[node.0];
        let copy = self.push(NodeData {
            kind: data.kind,
            parent: None,
            children: Vec::new(),
            text: data.text.clone(),
        });
        for &child in &data.children {
            let child_copy = self.graft(other, child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Indented kind/text listing of a subtree.
    pub fn dump(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(id, 0, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        match self.text(id) {
            Some(text) => out.push_str(&format!("{:?} {:?}\n", self.kind(id), text)),
            None => out.push_str(&format!("{:?}\n", self.kind(id))),
        }
        for &child in self.children(id) {
            self.dump_into(child, depth + 1, out);
        }
    }
}

impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(self.root))
    }
}

pub struct Descendants<'a> {
    tree: &'a SyntaxTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(next).iter().rev().copied());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (SyntaxTree, NodeId, NodeId, NodeId) {
        let mut tree = SyntaxTree::new();
        let class = tree.alloc_node(SyntaxKind::Class);
        let kw = tree.alloc_leaf(SyntaxKind::Keyword, "class");
        let ws = tree.alloc_leaf(SyntaxKind::Whitespace, " ");
        let name = tree.alloc_leaf(SyntaxKind::Identifier, "State");
        let root = tree.root();
        tree.append_child(root, class).unwrap();
        for leaf in [kw, ws, name] {
            tree.append_child(class, leaf).unwrap();
        }
        (tree, class, kw, name)
    }

    #[test]
    fn test_render_and_name() {
        let (tree, class, _, _) = sample();
        assert_eq!(tree.to_string(), "class State");
        assert_eq!(tree.name_of(class), Some("State"));
    }

    #[test]
    fn test_parent_links() {
        let (tree, class, kw, name) = sample();
        assert_eq!(tree.parent(kw), Some(class));
        assert_eq!(tree.ancestors(name).collect::<Vec<_>>(), vec![class, tree.root()]);
        assert_eq!(tree.next_sibling(kw).map(|n| tree.kind(n)), Some(SyntaxKind::Whitespace));
        assert_eq!(tree.prev_sibling(kw), None);
    }

    #[test]
    fn test_insert_before_and_detach() {
        let (mut tree, class, kw, _) = sample();
        let rev = tree.revision();
        let modifier = tree.alloc_leaf(SyntaxKind::Keyword, "data ");
        tree.insert_before(kw, modifier).unwrap();
        assert_eq!(tree.to_string(), "data class State");
        assert!(tree.revision() > rev);

        assert_eq!(tree.detach(modifier), Some(class));
        assert_eq!(tree.to_string(), "class State");
        assert!(!tree.is_attached(modifier));
    }

    #[test]
    fn test_attach_twice_is_rejected() {
        let (mut tree, class, kw, _) = sample();
        assert_eq!(tree.append_child(class, kw), Err(TreeError::AlreadyAttached(kw)));

        let loose = tree.alloc_leaf(SyntaxKind::Punct, ";");
        let detached_anchor = tree.alloc_leaf(SyntaxKind::Punct, ",");
        assert_eq!(
            tree.insert_before(detached_anchor, loose),
            Err(TreeError::DetachedAnchor(detached_anchor))
        );
        assert_eq!(tree.append_child(kw, loose), Err(TreeError::LeafParent(kw)));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut tree = SyntaxTree::new();
        let outer = tree.alloc_node(SyntaxKind::Class);
        let inner = tree.alloc_node(SyntaxKind::ClassBody);
        tree.append_child(outer, inner).unwrap();
        assert_eq!(tree.append_child(inner, outer), Err(TreeError::Cycle(outer)));
    }

    #[test]
    fn test_offsets() {
        let (tree, class, kw, name) = sample();
        assert_eq!(tree.text_range(class), Some(0..11));
        assert_eq!(tree.text_range(name), Some(6..11));
        assert_eq!(tree.token_at_offset(0), Some(kw));
        assert_eq!(tree.token_at_offset(7), Some(name));
        // Right after `class`, on the whitespace boundary
        assert_eq!(tree.token_at_offset(5), Some(kw));
        assert_eq!(tree.token_at_offset(11), Some(name));
        assert_eq!(tree.token_at_offset(12), None);
        assert_eq!(tree.offset_at(1, 7), Some(6));
        assert_eq!(tree.line_col(6), (1, 7));
    }

    #[test]
    fn test_graft_copies_subtree() {
        let (source, class, _, _) = sample();
        let mut target = SyntaxTree::new();
        let copy = target.graft(&source, class);
        assert_eq!(target.parent(copy), None);
        assert_eq!(target.render(copy), "class State");
        assert_eq!(target.name_of(copy), Some("State"));
    }
}
