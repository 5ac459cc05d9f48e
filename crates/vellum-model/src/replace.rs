//! The low-level replace algorithm behind [`Node::replace`].
//!
//! Requires the slice's open depths to line up exactly with the shared
//! ancestry of the two positions. Descends the levels shared by `from` and
//! `to`, joins compatible node types where the slice's open sides meet the
//! tree, and re-validates every rebuilt node against the schema on the way
//! out. Depth-tolerant fitting lives a layer up, in the transform crate.

use thiserror::Error;

use crate::fragment::Fragment;
use crate::node::Node;
use crate::resolved_pos::{PositionOutOfRange, ResolvedPos};
use crate::slice::Slice;

/// Failures of the low-level replace machinery.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplaceError {
    /// The slice is opened deeper than the insertion position is nested.
    #[error("inserted content deeper than insertion position")]
    SliceTooDeep,
    /// The slice's open depths disagree with the depths of the two ends.
    #[error("inconsistent open depths")]
    OpenDepthMismatch,
    /// Two nodes whose content cannot be merged would have to be joined.
    #[error("cannot join {child} onto {parent}")]
    JoinIncompatible { parent: String, child: String },
    /// A rebuilt node's content no longer matches its type.
    #[error("invalid content for node type {0}")]
    InvalidContent(String),
    /// A slice-internal removal crossed node boundaries.
    #[error("removing non-flat range")]
    NotFlat,
    #[error(transparent)]
    OutOfRange(#[from] PositionOutOfRange),
}

pub(crate) fn replace(
    from: &ResolvedPos,
    to: &ResolvedPos,
    slice: &Slice,
) -> Result<Node, ReplaceError> {
    if slice.open_start() > from.depth() {
        return Err(ReplaceError::SliceTooDeep);
    }
    if from.depth() as isize - slice.open_start() as isize
        != to.depth() as isize - slice.open_end() as isize
    {
        return Err(ReplaceError::OpenDepthMismatch);
    }
    replace_outer(from, to, slice, 0)
}

fn replace_outer(
    from: &ResolvedPos,
    to: &ResolvedPos,
    slice: &Slice,
    depth: usize,
) -> Result<Node, ReplaceError> {
    let index = from.index(depth);
    let node = from.node(depth);
    if index == to.index(depth) && depth < from.depth() - slice.open_start() {
        // Both ends point into the same child: recurse.
        let inner = replace_outer(from, to, slice, depth + 1)?;
        Ok(node.copy(node.content().replace_child(index, inner)))
    } else if slice.content().size() == 0 {
        close(node, replace_two_way(from, to, depth)?)
    } else if slice.open_start() == 0
        && slice.open_end() == 0
        && from.depth() == depth
        && to.depth() == depth
    {
        // Flat case: splice the slice content directly between the ends.
        let parent = from.parent();
        let content = parent.content();
        let new_content = content
            .cut(0, from.parent_offset())
            .append(slice.content())
            .append(&content.cut(to.parent_offset(), content.size()));
        close(parent, new_content)
    } else {
        let (start, end) = prepare_slice_for_replace(slice, from)?;
        close(node, replace_three_way(from, &start, &end, to, depth)?)
    }
}

fn check_join(main: &Node, sub: &Node) -> Result<(), ReplaceError> {
    if sub.node_type().compatible_content(main.node_type()) {
        Ok(())
    } else {
        Err(ReplaceError::JoinIncompatible {
            parent: main.node_type().name().to_string(),
            child: sub.node_type().name().to_string(),
        })
    }
}

fn joinable(
    before: &ResolvedPos,
    after: &ResolvedPos,
    depth: usize,
) -> Result<Node, ReplaceError> {
    let node = before.node(depth);
    check_join(node, after.node(depth))?;
    Ok(node.clone())
}

fn add_node(child: Node, target: &mut Vec<Node>) {
    match target.last() {
        Some(last) if child.is_text() && child.same_markup(last) => {
            let merged = last.with_text(format!("{}{}", last.text_str(), child.text_str()));
            let end = target.len() - 1;
            target[end] = merged;
        }
        _ => target.push(child),
    }
}

/// Add the nodes of one level between the given bounds (either of which
/// may be absent, meaning "from the level's start" / "to its end").
fn add_range(
    start: Option<&ResolvedPos>,
    end: Option<&ResolvedPos>,
    depth: usize,
    target: &mut Vec<Node>,
) {
    let Some(bound) = end.or(start) else { return };
    let node = bound.node(depth);
    let mut start_index = 0;
    let end_index = end.map_or(node.child_count(), |e| e.index(depth));
    if let Some(s) = start {
        start_index = s.index(depth);
        if s.depth() > depth {
            start_index += 1;
        } else if s.text_offset() > 0 {
            if let Some(after) = s.node_after() {
                add_node(after, target);
            }
            start_index += 1;
        }
    }
    for i in start_index..end_index {
        add_node(node.child(i).clone(), target);
    }
    if let Some(e) = end {
        if e.depth() == depth && e.text_offset() > 0 {
            if let Some(before) = e.node_before() {
                add_node(before, target);
            }
        }
    }
}

/// Rebuild a node with new content, re-validating against the schema.
fn close(node: &Node, content: Fragment) -> Result<Node, ReplaceError> {
    if !node.node_type().valid_content(&content) {
        return Err(ReplaceError::InvalidContent(node.node_type().name().to_string()));
    }
    Ok(node.copy(content))
}

fn replace_three_way(
    from: &ResolvedPos,
    start: &ResolvedPos,
    end: &ResolvedPos,
    to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let open_start = if from.depth() > depth {
        Some(joinable(from, start, depth + 1)?)
    } else {
        None
    };
    let open_end = if to.depth() > depth {
        Some(joinable(end, to, depth + 1)?)
    } else {
        None
    };
    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    match (&open_start, &open_end) {
        (Some(os), Some(oe)) if start.index(depth) == end.index(depth) => {
            check_join(os, oe)?;
            let inner = replace_three_way(from, start, end, to, depth + 1)?;
            add_node(close(os, inner)?, &mut content);
        }
        _ => {
            if let Some(os) = &open_start {
                add_node(close(os, replace_two_way(from, start, depth + 1)?)?, &mut content);
            }
            add_range(Some(start), Some(end), depth, &mut content);
            if let Some(oe) = &open_end {
                add_node(close(oe, replace_two_way(end, to, depth + 1)?)?, &mut content);
            }
        }
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_children(content))
}

fn replace_two_way(
    from: &ResolvedPos,
    to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    if from.depth() > depth {
        let node = joinable(from, to, depth + 1)?;
        let inner = replace_two_way(from, to, depth + 1)?;
        add_node(close(&node, inner)?, &mut content);
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_children(content))
}

/// Wrap the slice content in copies of the ancestors at the insertion
/// point so its open ends can be resolved like a normal document.
fn prepare_slice_for_replace(
    slice: &Slice,
    along: &ResolvedPos,
) -> Result<(ResolvedPos, ResolvedPos), ReplaceError> {
    let extra = along.depth() - slice.open_start();
    let parent = along.node(extra);
    let mut node = parent.copy(slice.content().clone());
    for i in (0..extra).rev() {
        node = along.node(i).copy(Fragment::from(node));
    }
    let start = node.resolve_no_cache(slice.open_start() + extra)?;
    let end = node.resolve_no_cache(node.content().size() - slice.open_end() - extra)?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use crate::schema::tests::{basic_schema, doc_of};
    use crate::slice::Slice;

    #[test]
    fn delete_across_paragraphs_joins_them() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let joined = doc.replace(2, 6, &Slice::empty()).unwrap();
        assert_eq!(joined, doc_of(&schema, &["ad"]));
    }

    #[test]
    fn insert_open_slice_joins_both_sides() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let source = doc_of(&schema, &["XY", "Z"]);
        // Slice "Y", "Z" (open on both sides).
        let slice = source.slice(2, 6, false).unwrap();
        let result = doc.replace(2, 6, &slice).unwrap();
        assert_eq!(result, doc_of(&schema, &["aY", "Zd"]));
    }

    #[test]
    fn mismatched_open_depth_fails() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let source = doc_of(&schema, &["XY"]);
        // [paragraph("Y")], open one level on both sides.
        let open_both = source.slice(2, 3, true).unwrap();
        assert!(matches!(
            doc.replace(0, 0, &open_both),
            Err(super::ReplaceError::SliceTooDeep)
        ));
        let skewed = Slice::new(open_both.content().clone(), 1, 0);
        assert!(matches!(
            doc.replace(2, 2, &skewed),
            Err(super::ReplaceError::OpenDepthMismatch)
        ));
    }

    #[test]
    fn incompatible_join_fails() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab"]);
        let list = schema
            .node(
                "bullet_list",
                None,
                vec![schema
                    .node(
                        "list_item",
                        None,
                        vec![schema.node("paragraph", None, vec![schema.text("x")], Vec::new()).unwrap()],
                        Vec::new(),
                    )
                    .unwrap()],
                Vec::new(),
            )
            .unwrap();
        // An open bullet list cannot join onto a paragraph.
        let slice = Slice::new(crate::Fragment::from(list), 1, 1);
        assert!(matches!(
            doc.replace(1, 1, &slice),
            Err(super::ReplaceError::JoinIncompatible { .. })
        ));
    }
}
