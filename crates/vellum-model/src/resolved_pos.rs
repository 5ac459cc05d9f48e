//! [`ResolvedPos`] — an integer position resolved into an ancestor path.
//!
//! Resolving descends from the document root, recording at every level the
//! ancestor node, the child index and the absolute position before that
//! child. Resolutions are memoized in a small thread-local ring keyed by
//! document identity, so repeatedly resolving positions in the same
//! (immutable) document is cheap.

use std::cell::RefCell;
use std::fmt;

use thiserror::Error;

use crate::fragment::Index;
use crate::mark::Mark;
use crate::node::Node;

/// A position outside `0..=doc.content().size()` was resolved or mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("position {pos} out of range")]
pub struct PositionOutOfRange {
    pub pos: usize,
}

#[derive(Clone)]
struct PathRow {
    node: Node,
    index: usize,
    /// Absolute position before the child at `index`.
    before: usize,
}

// ── ResolvedPos ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ResolvedPos {
    pos: usize,
    path: Vec<PathRow>,
    parent_offset: usize,
}

impl ResolvedPos {
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Number of ancestor levels; 0 means the position points directly
    /// into the root.
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    /// Offset of the position into its deepest ancestor.
    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    pub fn doc(&self) -> &Node {
        self.node(0)
    }

    pub fn parent(&self) -> &Node {
        self.node(self.depth())
    }

    /// The ancestor node at the given depth.
    pub fn node(&self, depth: usize) -> &Node {
        &self.path[depth].node
    }

    /// The index pointed at in the ancestor at the given depth.
    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// Like [`index`](Self::index), but pointing after the child the
    /// position is inside of, when it is inside one.
    pub fn index_after(&self, depth: usize) -> usize {
        let index = self.index(depth);
        if depth == self.depth() && self.text_offset() == 0 {
            index
        } else {
            index + 1
        }
    }

    /// Position where the content of the ancestor at `depth` starts.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 {
            0
        } else {
            self.path[depth - 1].before + 1
        }
    }

    /// Position where the content of the ancestor at `depth` ends.
    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content().size()
    }

    /// Position directly before the ancestor at `depth` (or the position
    /// itself for `depth() + 1`). Panics for depth 0.
    pub fn before(&self, depth: usize) -> usize {
        assert!(depth > 0, "there is no position before the top-level node");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].before
        }
    }

    /// Position directly after the ancestor at `depth` (or the position
    /// itself for `depth() + 1`). Panics for depth 0.
    pub fn after(&self, depth: usize) -> usize {
        assert!(depth > 0, "there is no position after the top-level node");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].before + self.node(depth).node_size()
        }
    }

    /// When the position points into a text node, the offset into that
    /// node's text; 0 otherwise.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path[self.path.len() - 1].before
    }

    /// The node directly after the position, cut when the position is
    /// mid-text.
    pub fn node_after(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth());
        if index == parent.child_count() {
            return None;
        }
        let d_off = self.text_offset();
        let child = parent.child(index);
        Some(if d_off > 0 { child.cut(d_off, child.text_len()) } else { child.clone() })
    }

    /// The node directly before the position, cut when the position is
    /// mid-text.
    pub fn node_before(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth());
        let d_off = self.text_offset();
        if d_off > 0 {
            return Some(parent.child(index).cut(0, d_off));
        }
        if index == 0 {
            None
        } else {
            Some(parent.child(index - 1).clone())
        }
    }

    /// The marks that newly inserted content at this position would
    /// inherit: the marks of the preceding node, dropping non-inclusive
    /// marks at their boundary.
    pub fn marks(&self) -> Vec<Mark> {
        let parent = self.parent();
        let index = self.index(self.depth());
        if parent.content().size() == 0 {
            return Vec::new();
        }
        // Mid-text: the text node's own marks apply.
        if self.text_offset() > 0 {
            return parent.child(index).marks().to_vec();
        }
        let mut main = if index > 0 { parent.maybe_child(index - 1) } else { None };
        let mut other = parent.maybe_child(index);
        if main.is_none() {
            std::mem::swap(&mut main, &mut other);
        }
        let Some(main) = main else { return Vec::new() };
        let mut marks = main.marks().to_vec();
        let mut i = 0;
        while i < marks.len() {
            let keep = marks[i].mark_type().inclusive()
                || other.is_some_and(|o| marks[i].is_in_set(o.marks()));
            if keep {
                i += 1;
            } else {
                marks.remove(i);
            }
        }
        marks
    }

    /// The marks a replacement of the range between this position and
    /// `end` should inherit, or `None` when the position does not precede
    /// inline content.
    pub fn marks_across(&self, end: &ResolvedPos) -> Option<Vec<Mark>> {
        let after = self.parent().maybe_child(self.index(self.depth()))?;
        if !after.is_inline() {
            return None;
        }
        let mut marks = after.marks().to_vec();
        let next = end.parent().maybe_child(end.index(end.depth()));
        let mut i = 0;
        while i < marks.len() {
            let keep = marks[i].mark_type().inclusive()
                || next.is_some_and(|n| marks[i].is_in_set(n.marks()));
            if keep {
                i += 1;
            } else {
                marks.remove(i);
            }
        }
        Some(marks)
    }

    /// The deepest ancestor depth whose content fully contains both this
    /// position and `pos`.
    pub fn shared_depth(&self, pos: usize) -> usize {
        for depth in (1..=self.depth()).rev() {
            if self.start(depth) <= pos && self.end(depth) >= pos {
                return depth;
            }
        }
        0
    }

    /// The closest ancestor range (a parent plus a child index range) that
    /// encloses both positions and satisfies `pred`.
    pub fn block_range(
        &self,
        other: &ResolvedPos,
        pred: Option<&dyn Fn(&Node) -> bool>,
    ) -> Option<NodeRange> {
        if other.pos < self.pos {
            return other.block_range(self, pred);
        }
        let top = if self.parent().inline_content() || self.pos == other.pos {
            self.depth().checked_sub(1)?
        } else {
            self.depth()
        };
        for depth in (0..=top).rev() {
            if other.pos <= self.end(depth) && pred.map_or(true, |p| p(self.node(depth))) {
                return Some(NodeRange { from: self.clone(), to: other.clone(), depth });
            }
        }
        None
    }

    pub fn min<'a>(&'a self, other: &'a ResolvedPos) -> &'a ResolvedPos {
        if other.pos < self.pos {
            other
        } else {
            self
        }
    }

    pub fn max<'a>(&'a self, other: &'a ResolvedPos) -> &'a ResolvedPos {
        if other.pos > self.pos {
            other
        } else {
            self
        }
    }

    // ── Resolution ────────────────────────────────────────────────────────

    pub(crate) fn resolve(doc: &Node, pos: usize) -> Result<ResolvedPos, PositionOutOfRange> {
        if pos > doc.content().size() {
            return Err(PositionOutOfRange { pos });
        }
        let mut path = Vec::new();
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = doc.clone();
        loop {
            let Index { index, offset } = node.content().find_index(parent_offset);
            let rem = parent_offset - offset;
            path.push(PathRow { node: node.clone(), index, before: start + offset });
            if rem == 0 {
                break;
            }
            let child = node.child(index).clone();
            if child.is_text() {
                break;
            }
            parent_offset = rem - 1;
            start += offset + 1;
            node = child;
        }
        Ok(ResolvedPos { pos, path, parent_offset })
    }

    pub(crate) fn resolve_cached(doc: &Node, pos: usize) -> Result<ResolvedPos, PositionOutOfRange> {
        RESOLVE_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            for entry in cache.entries.iter().flatten() {
                if entry.0.same(doc) && entry.1 == pos {
                    return Ok(entry.2.clone());
                }
            }
            let resolved = ResolvedPos::resolve(doc, pos)?;
            let slot = cache.next;
            cache.entries[slot] = Some((doc.clone(), pos, resolved.clone()));
            cache.next = (slot + 1) % RESOLVE_CACHE_SIZE;
            Ok(resolved)
        })
    }
}

impl fmt::Debug for ResolvedPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolvedPos({})", self.pos)
    }
}

// ── Resolution cache ──────────────────────────────────────────────────────

const RESOLVE_CACHE_SIZE: usize = 12;

struct ResolveCache {
    entries: [Option<(Node, usize, ResolvedPos)>; RESOLVE_CACHE_SIZE],
    next: usize,
}

thread_local! {
    static RESOLVE_CACHE: RefCell<ResolveCache> = RefCell::new(ResolveCache {
        entries: [const { None }; RESOLVE_CACHE_SIZE],
        next: 0,
    });
}

// ── NodeRange ─────────────────────────────────────────────────────────────

/// A range of children of one parent node, between two resolved positions.
#[derive(Clone, Debug)]
pub struct NodeRange {
    pub from: ResolvedPos,
    pub to: ResolvedPos,
    /// Depth of the shared parent.
    pub depth: usize,
}

impl NodeRange {
    pub fn start(&self) -> usize {
        self.from.before(self.depth + 1)
    }

    pub fn end(&self) -> usize {
        self.to.after(self.depth + 1)
    }

    pub fn parent(&self) -> &Node {
        self.from.node(self.depth)
    }

    pub fn start_index(&self) -> usize {
        self.from.index(self.depth)
    }

    pub fn end_index(&self) -> usize {
        self.to.index_after(self.depth)
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::tests::{basic_schema, doc_of};

    #[test]
    fn path_queries() {
        let schema = basic_schema();
        // doc(paragraph("ab"), paragraph("cd"))
        let doc = doc_of(&schema, &["ab", "cd"]);
        let p = doc.resolve(3).unwrap();
        assert_eq!(p.depth(), 1);
        assert_eq!(p.parent().node_type().name(), "paragraph");
        assert_eq!(p.start(1), 1);
        assert_eq!(p.end(1), 3);
        assert_eq!(p.before(1), 0);
        assert_eq!(p.after(1), 4);
        assert_eq!(p.parent_offset(), 2);
        // Position 3 sits at the end of the text node, not inside it.
        assert_eq!(p.text_offset(), 0);
        assert_eq!(doc.resolve(2).unwrap().text_offset(), 1);

        let boundary = doc.resolve(4).unwrap();
        assert_eq!(boundary.depth(), 0);
        assert_eq!(boundary.index(0), 1);
        assert_eq!(boundary.text_offset(), 0);
        assert_eq!(boundary.node_before().unwrap().node_type().name(), "paragraph");
        assert_eq!(boundary.node_after().unwrap().node_type().name(), "paragraph");
    }

    #[test]
    fn mid_text_node_before_and_after_are_cut() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["abcd"]);
        let p = doc.resolve(3).unwrap();
        assert_eq!(p.node_before().unwrap().text_str(), "ab");
        assert_eq!(p.node_after().unwrap().text_str(), "cd");
    }

    #[test]
    fn shared_depth() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let p = doc.resolve(2).unwrap();
        assert_eq!(p.shared_depth(2), 1);
        assert_eq!(p.shared_depth(5), 0);
    }

    #[test]
    fn block_range_finds_enclosing_parent() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let from = doc.resolve(2).unwrap();
        let to = doc.resolve(6).unwrap();
        let range = from.block_range(&to, None).unwrap();
        assert_eq!(range.depth, 0);
        assert_eq!(range.start_index(), 0);
        assert_eq!(range.end_index(), 2);
        assert_eq!(range.start(), 0);
        assert_eq!(range.end(), 8);
    }

    #[test]
    fn marks_honor_inclusive_flag() {
        let schema = basic_schema();
        let strong = schema.mark("strong", None).unwrap();
        let link = schema
            .mark("link", Some(crate::Attrs::from_iter([(
                "href".to_string(),
                serde_json::json!("x"),
            )])))
            .unwrap();
        let para = schema
            .node(
                "paragraph",
                None,
                vec![
                    schema.text_with_marks("ab", vec![strong.clone(), link.clone()]),
                    schema.text("cd"),
                ],
                Vec::new(),
            )
            .unwrap();
        let doc = schema.node("doc", None, vec![para], Vec::new()).unwrap();
        // At the end of the marked span, the non-inclusive link does not
        // stick; strong does.
        let p = doc.resolve(3).unwrap();
        let marks = p.marks();
        assert!(strong.is_in_set(&marks));
        assert!(!link.is_in_set(&marks));
        // Inside the span both apply.
        let inside = doc.resolve(2).unwrap();
        assert!(link.is_in_set(&inside.marks()));
    }

    #[test]
    fn resolution_is_cached_per_document() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab"]);
        let first = doc.resolve(2).unwrap();
        let second = doc.resolve(2).unwrap();
        assert_eq!(first.pos(), second.pos());
        assert!(first.doc().same(second.doc()));
        assert!(doc.resolve(99).is_err());
    }
}
