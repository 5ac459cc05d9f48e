//! [`Fragment`] — an immutable ordered sequence of sibling nodes.
//!
//! A fragment caches the total size of its children (in the integer token
//! scheme where a non-leaf node contributes `2 + content.size` and a text
//! node contributes its character count). Adjacent text nodes with the same
//! markup are merged on construction.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::node::Node;
use crate::schema::{ContentError, Schema};

/// Result of [`Fragment::find_index`]: the child containing a position and
/// the offset at which that child starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index {
    pub index: usize,
    pub offset: usize,
}

// ── Fragment ──────────────────────────────────────────────────────────────

/// A persistent list of child nodes. Cloning is cheap; the child vector is
/// shared.
#[derive(Clone)]
pub struct Fragment {
    content: Rc<Vec<Node>>,
    size: usize,
}

impl Fragment {
    /// Build a fragment from exactly the given children, without merging.
    /// Callers must pass children that are already in canonical form.
    pub(crate) fn from_children(content: Vec<Node>) -> Fragment {
        let size = content.iter().map(|n| n.node_size()).sum();
        Fragment { content: Rc::new(content), size }
    }

    /// Build a fragment from a list of nodes, joining adjacent text nodes
    /// with the same markup.
    pub fn from_array(nodes: Vec<Node>) -> Fragment {
        let mut joined: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            match joined.last() {
                Some(last) if node.is_text() && last.same_markup(&node) => {
                    let merged = last.with_text(format!("{}{}", last.text_str(), node.text_str()));
                    let end = joined.len() - 1;
                    joined[end] = merged;
                }
                _ => joined.push(node),
            }
        }
        Fragment::from_children(joined)
    }

    pub fn empty() -> Fragment {
        Fragment { content: Rc::new(Vec::new()), size: 0 }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Identity comparison: whether both handles share the same child list.
    pub fn same(&self, other: &Fragment) -> bool {
        Rc::ptr_eq(&self.content, &other.content)
    }

    pub fn child_count(&self) -> usize {
        self.content.len()
    }

    /// The child at `index`. Panics when out of range.
    pub fn child(&self, index: usize) -> &Node {
        &self.content[index]
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.content.get(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.content.first()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.content.last()
    }

    pub fn children(&self) -> &[Node] {
        &self.content
    }

    /// Invoke `f` for every direct child.
    pub fn for_each(&self, mut f: impl FnMut(&Node, usize, usize)) {
        let mut pos = 0;
        for (i, child) in self.content.iter().enumerate() {
            f(child, pos, i);
            pos += child.node_size();
        }
    }

    /// Pre-order traversal of all descendants that touch the range
    /// `from..to`. The visitor receives the node, its absolute position,
    /// its parent (when known) and its index; returning `false` prevents
    /// descending into the node's children.
    pub fn nodes_between(
        &self,
        from: usize,
        to: usize,
        f: &mut dyn FnMut(&Node, usize, Option<&Node>, usize) -> bool,
        node_start: usize,
        parent: Option<&Node>,
    ) {
        let mut pos = 0;
        for (i, child) in self.content.iter().enumerate() {
            if pos >= to {
                break;
            }
            let end = pos + child.node_size();
            if end > from && f(child, node_start + pos, parent, i) && child.content().size() > 0 {
                let start = pos + 1;
                child.content().nodes_between(
                    from.saturating_sub(start),
                    (to - start).min(child.content().size()),
                    f,
                    node_start + start,
                    Some(child),
                );
            }
            pos = end;
        }
    }

    /// Concatenated text of the range, with `block_separator` inserted
    /// between block-level leaves/textblocks when given.
    pub fn text_between(&self, from: usize, to: usize, block_separator: Option<&str>) -> String {
        let mut text = String::new();
        let mut first = true;
        self.nodes_between(
            from,
            to,
            &mut |node, pos, _parent, _index| {
                if node.is_text() {
                    let start = from.max(pos) - pos;
                    let end = (to - pos).min(node.text_len());
                    text.push_str(&substring_chars(node.text_str(), start, end));
                } else if node.is_block() && node.is_textblock() {
                    if let Some(sep) = block_separator {
                        if first {
                            first = false;
                        } else {
                            text.push_str(sep);
                        }
                    }
                }
                true
            },
            0,
            None,
        );
        text
    }

    /// Append another fragment, joining boundary text nodes when possible.
    pub fn append(&self, other: &Fragment) -> Fragment {
        if other.size == 0 {
            return self.clone();
        }
        if self.size == 0 {
            return other.clone();
        }
        let mut content: Vec<Node> = (*self.content).clone();
        let mut rest = other.content.iter();
        if let (Some(last), Some(first)) = (content.last(), other.first_child()) {
            if last.is_text() && last.same_markup(first) {
                let merged = last.with_text(format!("{}{}", last.text_str(), first.text_str()));
                let end = content.len() - 1;
                content[end] = merged;
                rest.next();
            }
        }
        content.extend(rest.cloned());
        Fragment::from_children(content)
    }

    /// Sub-fragment between two positions, cutting partially covered nodes.
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        if from == 0 && to == self.size {
            return self.clone();
        }
        let mut result = Vec::new();
        if to > from {
            let mut pos = 0;
            for child in self.content.iter() {
                if pos >= to {
                    break;
                }
                let end = pos + child.node_size();
                if end > from {
                    let cut = if pos < from || end > to {
                        if child.is_text() {
                            child.cut(from.saturating_sub(pos), (to - pos).min(child.text_len()))
                        } else {
                            child.cut(
                                (from.max(pos + 1) - pos) - 1,
                                ((to - pos).min(child.content().size() + 1)).saturating_sub(1),
                            )
                        }
                    } else {
                        child.clone()
                    };
                    result.push(cut);
                }
                pos = end;
            }
        }
        Fragment::from_children(result)
    }

    /// Sub-fragment spanning the children `from..to` (by index).
    pub fn cut_by_index(&self, from: usize, to: usize) -> Fragment {
        if from == to {
            return Fragment::empty();
        }
        if from == 0 && to == self.content.len() {
            return self.clone();
        }
        Fragment::from_children(self.content[from..to].to_vec())
    }

    /// Replace the child at `index`, keeping everything else shared.
    pub fn replace_child(&self, index: usize, node: Node) -> Fragment {
        if self.content[index].same(&node) {
            return self.clone();
        }
        let mut content = (*self.content).clone();
        content[index] = node;
        Fragment::from_children(content)
    }

    /// A copy with `node` added to the front.
    pub fn add_to_start(&self, node: Node) -> Fragment {
        let mut content = Vec::with_capacity(self.content.len() + 1);
        content.push(node);
        content.extend(self.content.iter().cloned());
        Fragment::from_children(content)
    }

    /// A copy with `node` appended to the end.
    pub fn add_to_end(&self, node: Node) -> Fragment {
        let mut content = (*self.content).clone();
        content.push(node);
        Fragment::from_children(content)
    }

    /// Find the child covering the given position.
    ///
    /// When the position falls on the boundary between two children, the
    /// index of the later child is returned with `offset == pos`. Panics
    /// when `pos` is outside `0..=size`.
    pub fn find_index(&self, pos: usize) -> Index {
        if pos == 0 {
            return Index { index: 0, offset: pos };
        }
        if pos == self.size {
            return Index { index: self.content.len(), offset: pos };
        }
        assert!(pos < self.size, "position {pos} outside of fragment ({self:?})");
        let mut cur_pos = 0;
        for (i, cur) in self.content.iter().enumerate() {
            let end = cur_pos + cur.node_size();
            if end >= pos {
                if end == pos {
                    return Index { index: i + 1, offset: end };
                }
                return Index { index: i, offset: cur_pos };
            }
            cur_pos = end;
        }
        unreachable!("find_index scanned past fragment end")
    }

    /// First position at which this fragment and `other` differ, or `None`
    /// when they are the same.
    pub fn find_diff_start(&self, other: &Fragment, pos: usize) -> Option<usize> {
        let mut pos = pos;
        let mut i = 0;
        loop {
            if i == self.child_count() || i == other.child_count() {
                return if self.child_count() == other.child_count() { None } else { Some(pos) };
            }
            let (child_a, child_b) = (self.child(i), other.child(i));
            if child_a.same(child_b) {
                pos += child_a.node_size();
                i += 1;
                continue;
            }
            if !child_a.same_markup(child_b) {
                return Some(pos);
            }
            if child_a.is_text() && child_a.text_str() != child_b.text_str() {
                for (ca, cb) in child_a.text_str().chars().zip(child_b.text_str().chars()) {
                    if ca != cb {
                        break;
                    }
                    pos += 1;
                }
                return Some(pos);
            }
            if child_a.content().size() > 0 || child_b.content().size() > 0 {
                if let Some(inner) =
                    child_a.content().find_diff_start(child_b.content(), pos + 1)
                {
                    return Some(inner);
                }
            }
            pos += child_a.node_size();
            i += 1;
        }
    }

    /// Last position (in both fragments) before which they differ, or
    /// `None` when they are the same.
    pub fn find_diff_end(
        &self,
        other: &Fragment,
        pos_a: usize,
        pos_b: usize,
    ) -> Option<(usize, usize)> {
        let (mut i_a, mut i_b) = (self.child_count(), other.child_count());
        let (mut pos_a, mut pos_b) = (pos_a, pos_b);
        loop {
            if i_a == 0 || i_b == 0 {
                return if i_a == i_b { None } else { Some((pos_a, pos_b)) };
            }
            i_a -= 1;
            i_b -= 1;
            let (child_a, child_b) = (self.child(i_a), other.child(i_b));
            let size = child_a.node_size();
            if child_a.same(child_b) {
                pos_a -= size;
                pos_b -= size;
                continue;
            }
            if !child_a.same_markup(child_b) {
                return Some((pos_a, pos_b));
            }
            if child_a.is_text() && child_a.text_str() != child_b.text_str() {
                let a: Vec<char> = child_a.text_str().chars().collect();
                let b: Vec<char> = child_b.text_str().chars().collect();
                let mut same = 0;
                let min_size = a.len().min(b.len());
                while same < min_size && a[a.len() - same - 1] == b[b.len() - same - 1] {
                    same += 1;
                    pos_a -= 1;
                    pos_b -= 1;
                }
                return Some((pos_a, pos_b));
            }
            if child_a.content().size() > 0 || child_b.content().size() > 0 {
                if let Some(inner) =
                    child_a
                        .content()
                        .find_diff_end(child_b.content(), pos_a - 1, pos_b - 1)
                {
                    return Some(inner);
                }
            }
            pos_a -= size;
            pos_b -= size;
        }
    }

    // ── JSON codec ────────────────────────────────────────────────────────

    /// An array of child JSON values, or `Null` for the empty fragment.
    pub fn to_json(&self) -> Value {
        if self.content.is_empty() {
            Value::Null
        } else {
            Value::Array(self.content.iter().map(Node::to_json).collect())
        }
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Fragment, ContentError> {
        match json {
            Value::Null => Ok(Fragment::empty()),
            Value::Array(items) => {
                let nodes = items
                    .iter()
                    .map(|item| Node::from_json(schema, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Fragment::from_array(nodes))
            }
            _ => Err(ContentError::InvalidJson("fragment must be an array".into())),
        }
    }
}

impl From<Node> for Fragment {
    fn from(node: Node) -> Fragment {
        Fragment::from_children(vec![node])
    }
}

impl From<Vec<Node>> for Fragment {
    fn from(nodes: Vec<Node>) -> Fragment {
        Fragment::from_array(nodes)
    }
}

impl From<Option<Fragment>> for Fragment {
    fn from(frag: Option<Fragment>) -> Fragment {
        frag.unwrap_or_else(Fragment::empty)
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.content, &other.content)
            || (self.size == other.size && *self.content == *other.content)
    }
}

impl Eq for Fragment {}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for child in self.content.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{child:?}")?;
        }
        Ok(())
    }
}

/// Slice a string by character offsets.
pub(crate) fn substring_chars(s: &str, from: usize, to: usize) -> String {
    s.chars().skip(from).take(to.saturating_sub(from)).collect()
}
