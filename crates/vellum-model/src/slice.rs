//! [`Slice`] — an open-ended sub-tree, the unit of content insertion and
//! extraction.
//!
//! The outer `open_start`/`open_end` levels of a slice's fragment are
//! structurally incomplete: when the slice is inserted, those levels join
//! with the nodes around the insertion point instead of standing on their
//! own. A slice's `size` is its fragment size minus the open tokens.

use std::fmt;

use serde_json::Value;

use crate::fragment::{Fragment, Index};
use crate::node::Node;
use crate::replace::ReplaceError;
use crate::schema::{ContentError, Schema};

// ── Slice ─────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub struct Slice {
    content: Fragment,
    open_start: usize,
    open_end: usize,
}

impl Slice {
    /// Wrap a fragment with the given open depths. Callers must keep the
    /// open depths within the fragment's actual nesting (see
    /// [`Slice::max_open`]); the JSON decode path validates this.
    pub fn new(content: Fragment, open_start: usize, open_end: usize) -> Slice {
        Slice { content, open_start, open_end }
    }

    pub fn empty() -> Slice {
        Slice { content: Fragment::empty(), open_start: 0, open_end: 0 }
    }

    pub fn content(&self) -> &Fragment {
        &self.content
    }

    pub fn open_start(&self) -> usize {
        self.open_start
    }

    pub fn open_end(&self) -> usize {
        self.open_end
    }

    /// Token size of the slice when inserted (open tokens don't count).
    pub fn size(&self) -> usize {
        self.content.size() - self.open_start - self.open_end
    }

    /// The deepest open depth the fragment supports on the given side:
    /// the length of its first/last descendant spine of non-leaf nodes.
    pub fn max_open(content: &Fragment, start: bool) -> usize {
        let mut depth = 0;
        let mut cur = if start { content.first_child() } else { content.last_child() };
        while let Some(node) = cur {
            if node.is_leaf() || node.is_text() {
                break;
            }
            depth += 1;
            cur = if start { node.content().first_child() } else { node.content().last_child() };
        }
        depth
    }

    /// Insert a fragment at a slice-internal position, descending into
    /// open nodes. Returns `None` when the content does not fit there.
    pub fn insert_at(&self, pos: usize, fragment: &Fragment) -> Option<Slice> {
        let content = insert_into(&self.content, pos + self.open_start, fragment, None)?;
        Some(Slice::new(content, self.open_start, self.open_end))
    }

    /// Remove a flat sub-range of the slice (both ends must sit at the
    /// same depth directly inside one fragment).
    pub fn remove_between(&self, from: usize, to: usize) -> Result<Slice, ReplaceError> {
        let content =
            remove_range(&self.content, from + self.open_start, to + self.open_start)?;
        Ok(Slice::new(content, self.open_start, self.open_end))
    }

    // ── JSON codec ────────────────────────────────────────────────────────

    /// `{"content": ...}` plus `openStart`/`openEnd` when non-zero; `Null`
    /// for the empty slice.
    pub fn to_json(&self) -> Value {
        if self.content.size() == 0 {
            return Value::Null;
        }
        let mut m = serde_json::Map::new();
        m.insert("content".into(), self.content.to_json());
        if self.open_start > 0 {
            m.insert("openStart".into(), Value::from(self.open_start));
        }
        if self.open_end > 0 {
            m.insert("openEnd".into(), Value::from(self.open_end));
        }
        Value::Object(m)
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Slice, ContentError> {
        if json.is_null() {
            return Ok(Slice::empty());
        }
        let obj = json
            .as_object()
            .ok_or_else(|| ContentError::InvalidJson("slice must be an object".into()))?;
        let content = Fragment::from_json(schema, obj.get("content").unwrap_or(&Value::Null))?;
        let open_start = json_open(obj.get("openStart"))?;
        let open_end = json_open(obj.get("openEnd"))?;
        if open_start > Slice::max_open(&content, true) || open_end > Slice::max_open(&content, false)
        {
            return Err(ContentError::InvalidJson("slice open depths out of range".into()));
        }
        Ok(Slice::new(content, open_start, open_end))
    }
}

fn json_open(value: Option<&Value>) -> Result<usize, ContentError> {
    match value {
        None => Ok(0),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| ContentError::InvalidJson("slice open depth must be a number".into())),
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slice({:?}, {}, {})", self.content, self.open_start, self.open_end)
    }
}

// ── Internals ─────────────────────────────────────────────────────────────

fn insert_into(
    content: &Fragment,
    dist: usize,
    insert: &Fragment,
    parent: Option<&Node>,
) -> Option<Fragment> {
    let Index { index, offset } = content.find_index(dist);
    let child = content.maybe_child(index);
    if offset == dist || child.is_some_and(Node::is_text) {
        if let Some(parent) = parent {
            if !parent.can_replace(index, index, insert) {
                return None;
            }
        }
        return Some(
            content.cut(0, dist).append(insert).append(&content.cut(dist, content.size())),
        );
    }
    let child = child?;
    let inner = insert_into(child.content(), dist - offset - 1, insert, Some(child))?;
    Some(content.replace_child(index, child.copy(inner)))
}

fn remove_range(content: &Fragment, from: usize, to: usize) -> Result<Fragment, ReplaceError> {
    let Index { index, offset } = content.find_index(from);
    let child = content.maybe_child(index);
    let Index { index: index_to, offset: offset_to } = content.find_index(to);
    if offset == from || child.is_some_and(|c| c.is_text()) {
        if offset_to != to && !content.child(index_to).is_text() {
            return Err(ReplaceError::NotFlat);
        }
        return Ok(content.cut(0, from).append(&content.cut(to, content.size())));
    }
    if index != index_to {
        return Err(ReplaceError::NotFlat);
    }
    let child = child.ok_or(ReplaceError::NotFlat)?;
    let inner = remove_range(child.content(), from - offset - 1, to - offset - 1)?;
    Ok(content.replace_child(index, child.copy(inner)))
}

#[cfg(test)]
mod tests {
    use crate::schema::tests::{basic_schema, doc_of};
    use super::*;

    #[test]
    fn slice_size_discounts_open_tokens() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        // Cut across the paragraph boundary: both sides open one level.
        let slice = doc.slice(2, 6, false).unwrap();
        assert_eq!(slice.open_start(), 1);
        assert_eq!(slice.open_end(), 1);
        assert_eq!(slice.size(), 4);
        assert_eq!(slice.content().child_count(), 2);
    }

    #[test]
    fn insert_at_descends_open_nodes() {
        let schema = basic_schema();
        let li = schema.node_type("list_item").unwrap();
        let empty_li = li.create(None, Fragment::empty()).unwrap();
        let other_li = empty_li.clone();
        let slice = Slice::new(Fragment::from_array(vec![empty_li, other_li]), 1, 1);
        let para = schema.node("paragraph", None, vec![schema.text("b")], Vec::new()).unwrap();
        let inserted = slice.insert_at(2, &Fragment::from(para)).unwrap();
        // The paragraph lands inside the second list item.
        assert_eq!(inserted.content().child(1).child_count(), 1);
        assert_eq!(inserted.content().child(0).child_count(), 0);
    }

    #[test]
    fn remove_between_rejects_non_flat_ranges() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let slice = Slice::new(doc.content().clone(), 0, 0);
        assert!(slice.remove_between(1, 5).is_err());
        let flat = slice.remove_between(1, 3).unwrap();
        assert_eq!(flat.content().child(0).text_content(), "");
        assert_eq!(flat.content().child(0).node_size(), 2);
    }

    #[test]
    fn json_round_trip() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let slice = doc.slice(2, 6, false).unwrap();
        let back = Slice::from_json(&schema, &slice.to_json()).unwrap();
        assert_eq!(back, slice);
        assert_eq!(Slice::from_json(&schema, &Value::Null).unwrap(), Slice::empty());
    }

    #[test]
    fn json_rejects_overdeep_opens() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab"]);
        let mut json = doc.slice(0, 4, false).unwrap().to_json();
        json.as_object_mut()
            .unwrap()
            .insert("openStart".into(), Value::from(5));
        assert!(Slice::from_json(&schema, &json).is_err());
    }
}
