//! [`Node`] — one node in the persistent document tree.
//!
//! A node is a cheap-clone handle over shared data; editing never mutates a
//! node in place, it builds new nodes that share untouched children with the
//! old tree. Text nodes are nodes whose data carries a string instead of
//! child content.
//!
//! # Position scheme
//!
//! Sizes follow the integer token scheme: a text node's size is its number
//! of characters, a leaf node counts 1, and any other node counts
//! `2 + content.size` (one token each for entering and leaving it).

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::content::ContentMatch;
use crate::fragment::{substring_chars, Fragment, Index};
use crate::mark::Mark;
use crate::replace::{self, ReplaceError};
use crate::resolved_pos::{PositionOutOfRange, ResolvedPos};
use crate::schema::{Attrs, ContentError, NodeType, Schema};
use crate::slice::Slice;

// ── Node ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Node {
    data: Rc<NodeData>,
}

struct NodeData {
    typ: NodeType,
    attrs: Rc<Attrs>,
    marks: Vec<Mark>,
    content: Fragment,
    text: Option<String>,
    /// Character count of `text`; 0 for non-text nodes.
    text_len: usize,
}

impl Node {
    pub(crate) fn new(typ: NodeType, attrs: Rc<Attrs>, content: Fragment, marks: Vec<Mark>) -> Node {
        Node {
            data: Rc::new(NodeData { typ, attrs, marks, content, text: None, text_len: 0 }),
        }
    }

    pub(crate) fn new_text(typ: NodeType, attrs: Rc<Attrs>, text: String, marks: Vec<Mark>) -> Node {
        let text_len = text.chars().count();
        Node {
            data: Rc::new(NodeData {
                typ,
                attrs,
                marks,
                content: Fragment::empty(),
                text: Some(text),
                text_len,
            }),
        }
    }

    pub fn node_type(&self) -> &NodeType {
        &self.data.typ
    }

    pub fn schema(&self) -> &Schema {
        self.data.typ.schema()
    }

    pub fn attrs(&self) -> &Attrs {
        &self.data.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.data.attrs.get(name)
    }

    pub fn marks(&self) -> &[Mark] {
        &self.data.marks
    }

    pub fn content(&self) -> &Fragment {
        &self.data.content
    }

    /// The text of a text node, or `None`.
    pub fn text(&self) -> Option<&str> {
        self.data.text.as_deref()
    }

    /// The text of a text node, or `""` for any other node.
    pub fn text_str(&self) -> &str {
        self.data.text.as_deref().unwrap_or("")
    }

    /// Character count of a text node's text (0 for other nodes).
    pub fn text_len(&self) -> usize {
        self.data.text_len
    }

    pub fn node_size(&self) -> usize {
        if self.is_text() {
            self.data.text_len
        } else if self.is_leaf() {
            1
        } else {
            2 + self.data.content.size()
        }
    }

    pub fn child_count(&self) -> usize {
        self.data.content.child_count()
    }

    /// Child at `index`; panics when out of range.
    pub fn child(&self, index: usize) -> &Node {
        self.data.content.child(index)
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.data.content.maybe_child(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.data.content.first_child()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.data.content.last_child()
    }

    // ── Predicates ────────────────────────────────────────────────────────

    pub fn is_text(&self) -> bool {
        self.data.text.is_some()
    }

    pub fn is_block(&self) -> bool {
        self.data.typ.is_block()
    }

    pub fn is_inline(&self) -> bool {
        self.data.typ.is_inline()
    }

    pub fn is_textblock(&self) -> bool {
        self.data.typ.is_textblock()
    }

    pub fn inline_content(&self) -> bool {
        self.data.typ.inline_content()
    }

    pub fn is_leaf(&self) -> bool {
        self.data.typ.is_leaf()
    }

    pub fn is_atom(&self) -> bool {
        self.data.typ.is_atom()
    }

    /// Identity comparison: whether the two handles point at the same
    /// underlying node value.
    pub fn same(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Whether this node and `other` agree on type, attributes and marks
    /// (but not necessarily content).
    pub fn same_markup(&self, other: &Node) -> bool {
        self.has_markup(&other.data.typ, Some(&other.data.attrs), Some(&other.data.marks))
    }

    /// Whether this node carries the given type, attributes (the type's
    /// defaults when `None`) and marks (none when `None`).
    pub fn has_markup(&self, typ: &NodeType, attrs: Option<&Attrs>, marks: Option<&[Mark]>) -> bool {
        if self.node_type() != typ {
            return false;
        }
        let attrs_match = match attrs {
            Some(a) => *self.attrs() == *a,
            None => match typ.default_attrs() {
                Some(d) => *self.attrs() == **d,
                None => self.attrs().is_empty(),
            },
        };
        attrs_match && Mark::same_set(self.marks(), marks.unwrap_or(&[]))
    }

    // ── Derivation ────────────────────────────────────────────────────────

    /// A copy of this node with different content (same type, attrs, marks).
    pub fn copy(&self, content: Fragment) -> Node {
        if content.same(&self.data.content) {
            return self.clone();
        }
        Node::new(
            self.data.typ.clone(),
            Rc::clone(&self.data.attrs),
            content,
            self.data.marks.clone(),
        )
    }

    /// A copy with the given mark set.
    pub fn mark(&self, marks: Vec<Mark>) -> Node {
        if Mark::same_set(&self.data.marks, &marks) {
            return self.clone();
        }
        Node {
            data: Rc::new(NodeData {
                typ: self.data.typ.clone(),
                attrs: Rc::clone(&self.data.attrs),
                marks,
                content: self.data.content.clone(),
                text: self.data.text.clone(),
                text_len: self.data.text_len,
            }),
        }
    }

    /// A text node carrying `text` instead of this node's text.
    /// Panics when called on a non-text node or with an empty string.
    pub fn with_text(&self, text: String) -> Node {
        assert!(self.is_text(), "with_text on a non-text node");
        assert!(!text.is_empty(), "empty text nodes are not allowed");
        if self.data.text.as_deref() == Some(text.as_str()) {
            return self.clone();
        }
        Node::new_text(self.data.typ.clone(), Rc::clone(&self.data.attrs), text, self.data.marks.clone())
    }

    /// A copy holding only the content (or text) between `from` and `to`.
    /// For text nodes the offsets are character offsets.
    pub fn cut(&self, from: usize, to: usize) -> Node {
        if self.is_text() {
            let to = to.min(self.data.text_len);
            if from == 0 && to == self.data.text_len {
                return self.clone();
            }
            return self.with_text(substring_chars(self.text_str(), from, to));
        }
        if from == 0 && to == self.data.content.size() {
            return self.clone();
        }
        self.copy(self.data.content.cut(from, to))
    }

    // ── Positions & traversal ─────────────────────────────────────────────

    /// Resolve an integer position into this node tree (memoized).
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, PositionOutOfRange> {
        ResolvedPos::resolve_cached(self, pos)
    }

    /// Resolve without consulting or filling the cache.
    pub fn resolve_no_cache(&self, pos: usize) -> Result<ResolvedPos, PositionOutOfRange> {
        ResolvedPos::resolve(self, pos)
    }

    /// The node directly after the given position, descending as needed.
    pub fn node_at(&self, pos: usize) -> Option<Node> {
        let mut node = self.clone();
        let mut pos = pos;
        loop {
            if pos > node.content().size() {
                return None;
            }
            let Index { index, offset } = node.content().find_index(pos);
            let child = node.content().maybe_child(index)?.clone();
            if offset == pos || child.is_text() {
                return Some(child);
            }
            pos -= offset + 1;
            node = child;
        }
    }

    /// Pre-order traversal of descendants touching `from..to`; see
    /// [`Fragment::nodes_between`].
    pub fn nodes_between(
        &self,
        from: usize,
        to: usize,
        f: &mut dyn FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    ) {
        self.data.content.nodes_between(from, to, f, 0, Some(self));
    }

    pub fn text_content(&self) -> String {
        if let Some(text) = self.text() {
            return text.to_string();
        }
        self.text_between(0, self.data.content.size(), None)
    }

    pub fn text_between(&self, from: usize, to: usize, block_separator: Option<&str>) -> String {
        self.data.content.text_between(from, to, block_separator)
    }

    /// Whether a mark equal to `mark` appears on inline content in the
    /// given range.
    pub fn range_has_mark(&self, from: usize, to: usize, mark: &Mark) -> bool {
        let mut found = false;
        if to > from {
            self.nodes_between(from, to, &mut |node, _, _, _| {
                if mark.is_in_set(node.marks()) {
                    found = true;
                }
                !found
            });
        }
        found
    }

    // ── Slicing & replacing ───────────────────────────────────────────────

    /// Cut out the open sub-tree between two positions.
    pub fn slice(
        &self,
        from: usize,
        to: usize,
        include_parents: bool,
    ) -> Result<Slice, PositionOutOfRange> {
        if from == to {
            return Ok(Slice::empty());
        }
        let rfrom = self.resolve(from)?;
        let rto = self.resolve(to)?;
        let depth = if include_parents { 0 } else { rfrom.shared_depth(to) };
        let start = rfrom.start(depth);
        let node = rfrom.node(depth);
        let content = node.content().cut(rfrom.pos() - start, rto.pos() - start);
        Ok(Slice::new(content, rfrom.depth() - depth, rto.depth() - depth))
    }

    /// Replace the range `from..to` with a slice whose open depths line up
    /// with the shared ancestry of the two positions.
    pub fn replace(&self, from: usize, to: usize, slice: &Slice) -> Result<Node, ReplaceError> {
        let rfrom = self.resolve(from).map_err(ReplaceError::from)?;
        let rto = self.resolve(to).map_err(ReplaceError::from)?;
        replace::replace(&rfrom, &rto, slice)
    }

    // ── Schema-aware feasibility checks ───────────────────────────────────

    /// The content match state after this node's children up to `index`.
    /// Panics when called on a node whose content is invalid.
    pub fn content_match_at(&self, index: usize) -> ContentMatch {
        match self
            .node_type()
            .content_match()
            .match_fragment_range(&self.data.content, 0, index)
        {
            Some(m) => m,
            None => panic!("content_match_at called on a node with invalid content"),
        }
    }

    /// Whether replacing the children `from..to` with `replacement` keeps
    /// this node's content valid.
    pub fn can_replace(&self, from: usize, to: usize, replacement: &Fragment) -> bool {
        let one = match self
            .node_type()
            .content_match()
            .match_fragment_range(&self.data.content, 0, from)
        {
            Some(m) => m,
            None => return false,
        };
        let two = match one.match_fragment_range(replacement, 0, replacement.child_count()) {
            Some(m) => m,
            None => return false,
        };
        let end = match two.match_fragment_range(&self.data.content, to, self.child_count()) {
            Some(m) => m,
            None => return false,
        };
        end.valid_end()
            && replacement
                .children()
                .iter()
                .all(|c| self.node_type().allows_marks(c.marks()))
    }

    /// Whether replacing the children `from..to` with a single node of the
    /// given type (and marks) keeps this node's content valid.
    pub fn can_replace_with(
        &self,
        from: usize,
        to: usize,
        typ: &NodeType,
        marks: Option<&[Mark]>,
    ) -> bool {
        if let Some(marks) = marks {
            if !self.node_type().allows_marks(marks) {
                return false;
            }
        }
        let start = match self
            .node_type()
            .content_match()
            .match_fragment_range(&self.data.content, 0, from)
            .and_then(|m| m.match_type(typ))
        {
            Some(m) => m,
            None => return false,
        };
        match start.match_fragment_range(&self.data.content, to, self.child_count()) {
            Some(end) => end.valid_end(),
            None => false,
        }
    }

    /// Whether `other`'s content could be appended to this node.
    pub fn can_append(&self, other: &Node) -> bool {
        if other.content().size() > 0 {
            self.can_replace(self.child_count(), self.child_count(), other.content())
        } else {
            self.node_type().compatible_content(other.node_type())
        }
    }

    /// Deep validity check: content, attributes and marks of this node and
    /// every descendant.
    pub fn check(&self) -> Result<(), ContentError> {
        self.node_type().check_content(&self.data.content)?;
        self.node_type().check_attrs(&self.data.attrs)?;
        let mut copy: Vec<Mark> = Vec::new();
        for mark in self.marks() {
            if !self.node_type().allows_mark_type(mark.mark_type()) {
                return Err(ContentError::DisallowedMark {
                    node: self.node_type().name().to_string(),
                    mark: mark.mark_type().name().to_string(),
                });
            }
            copy = mark.add_to_set(&copy);
        }
        if !Mark::same_set(&copy, self.marks()) {
            return Err(ContentError::InvalidMarkSet(self.node_type().name().to_string()));
        }
        for child in self.data.content.children() {
            child.check()?;
        }
        Ok(())
    }

    // ── JSON codec ────────────────────────────────────────────────────────

    /// `{"type": ..., "attrs"?, "content"?, "marks"?, "text"?}`.
    pub fn to_json(&self) -> Value {
        let mut m = serde_json::Map::new();
        m.insert("type".into(), Value::String(self.node_type().name().to_string()));
        if !self.attrs().is_empty() {
            m.insert("attrs".into(), Value::Object((*self.data.attrs).clone()));
        }
        if let Some(text) = self.text() {
            m.insert("text".into(), Value::String(text.to_string()));
        } else if self.data.content.size() > 0 {
            m.insert("content".into(), self.data.content.to_json());
        }
        if !self.marks().is_empty() {
            m.insert(
                "marks".into(),
                Value::Array(self.marks().iter().map(Mark::to_json).collect()),
            );
        }
        Value::Object(m)
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Node, ContentError> {
        let obj = json
            .as_object()
            .ok_or_else(|| ContentError::InvalidJson("node must be an object".into()))?;
        let type_name = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ContentError::InvalidJson("node missing type".into()))?;
        let marks = match obj.get("marks") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|m| Mark::from_json(schema, m))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ContentError::InvalidJson("invalid mark list".into())),
        };
        let typ = schema
            .node_type(type_name)
            .ok_or_else(|| ContentError::UnknownNodeType(type_name.to_string()))?;
        if typ.is_text() {
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ContentError::InvalidJson("invalid text node".into()))?;
            if text.is_empty() {
                return Err(ContentError::InvalidJson("empty text node".into()));
            }
            return Ok(schema.text_with_marks(text, marks));
        }
        let content = Fragment::from_json(schema, obj.get("content").unwrap_or(&Value::Null))?;
        let attrs = obj.get("attrs").and_then(Value::as_object);
        typ.create_with_marks(attrs.cloned(), content, marks)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.same(other) {
            return true;
        }
        if !self.same_markup(other) {
            return false;
        }
        if self.is_text() {
            self.text_str() == other.text_str()
        } else {
            self.data.content == other.data.content
        }
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut base = if let Some(text) = self.text() {
            format!("{text:?}")
        } else if self.data.content.size() > 0 {
            format!("{}({:?})", self.node_type().name(), self.data.content)
        } else {
            self.node_type().name().to_string()
        };
        for mark in self.marks().iter().rev() {
            base = format!("{}({})", mark.mark_type().name(), base);
        }
        f.write_str(&base)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::schema::tests::{basic_schema, doc_of};
    use super::*;

    #[test]
    fn node_sizes() {
        let schema = basic_schema();
        let text = schema.text("abc");
        assert_eq!(text.node_size(), 3);
        let para = schema.node("paragraph", None, vec![text], Vec::new()).unwrap();
        assert_eq!(para.node_size(), 5);
        let hr = schema.node("horizontal_rule", None, vec![], Vec::new()).unwrap();
        assert_eq!(hr.node_size(), 1);
    }

    #[test]
    fn cut_text_node_by_chars() {
        let schema = basic_schema();
        let text = schema.text("hello");
        let cut = text.cut(1, 4);
        assert_eq!(cut.text_str(), "ell");
        assert_eq!(cut.node_size(), 3);
    }

    #[test]
    fn copy_shares_untouched_children() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let replaced = doc
            .replace(1, 1, &Slice::new(Fragment::from(schema.text("x")), 0, 0))
            .unwrap();
        // The second paragraph is untouched and shared by identity.
        assert!(replaced.child(1).same(doc.child(1)));
        assert!(!replaced.child(0).same(doc.child(0)));
    }

    #[test]
    fn json_round_trip() {
        let schema = basic_schema();
        let strong = schema.mark("strong", None).unwrap();
        let doc = schema
            .node(
                "doc",
                None,
                vec![schema
                    .node(
                        "paragraph",
                        None,
                        vec![schema.text("plain "), schema.text_with_marks("bold", vec![strong])],
                        Vec::new(),
                    )
                    .unwrap()],
                Vec::new(),
            )
            .unwrap();
        let back = Node::from_json(&schema, &doc.to_json()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn from_json_rejects_unknown_type() {
        let schema = basic_schema();
        let err = Node::from_json(&schema, &json!({"type": "nope"})).unwrap_err();
        assert!(matches!(err, ContentError::UnknownNodeType(_)));
    }

    #[test]
    fn node_at_finds_children() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        assert_eq!(doc.node_at(0).unwrap().node_type().name(), "paragraph");
        assert_eq!(doc.node_at(1).unwrap().text_str(), "ab");
        assert_eq!(doc.node_at(5).unwrap().text_str(), "cd");
        assert!(doc.node_at(doc.content().size()).is_none());
    }

    #[test]
    fn check_catches_bad_content() {
        let schema = basic_schema();
        // A doc whose only child is a text node violates doc's "block+".
        let typ = schema.node_type("doc").unwrap();
        let bad = Node::new(
            typ,
            Rc::new(Attrs::new()),
            Fragment::from(schema.text("loose")),
            Vec::new(),
        );
        assert!(matches!(bad.check(), Err(ContentError::InvalidContent(_))));
        let good = doc_of(&schema, &["ok"]);
        assert!(good.check().is_ok());
    }
}
