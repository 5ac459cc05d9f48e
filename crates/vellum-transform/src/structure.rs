//! Structural edits built on the replace steps: split, join, lift, wrap,
//! block-type and node-markup changes, plus their feasibility checks.
//!
//! The feasibility functions (`can_split`, `can_join`, `lift_target`,
//! `find_wrapping`, …) are cheap, pure queries callers run before
//! attempting an edit; the step builders encode the edit itself as a
//! structure-flagged replace step that refuses to overwrite real content.

use vellum_model::{Attrs, Fragment, Node, NodeRange, NodeType, Slice};

use crate::map::Mappable;
use crate::replace_step::{ReplaceAroundStep, ReplaceStep};
use crate::step::Step;
use crate::transform::{Transform, TransformError};

/// A node type plus creation attributes, used for split overrides and
/// wrapping layers.
#[derive(Debug, Clone)]
pub struct TypeWithAttrs {
    pub typ: NodeType,
    pub attrs: Option<Attrs>,
}

impl TypeWithAttrs {
    pub fn new(typ: NodeType) -> TypeWithAttrs {
        TypeWithAttrs { typ, attrs: None }
    }
}

// ── Split ─────────────────────────────────────────────────────────────────

/// Whether splitting at `pos` up through `depth` levels (optionally
/// changing the types of the nodes after the split) keeps everything
/// schema-valid.
pub fn can_split(
    doc: &Node,
    pos: usize,
    depth: usize,
    types_after: Option<&[Option<TypeWithAttrs>]>,
) -> bool {
    if depth == 0 {
        return false;
    }
    let Ok(rpos) = doc.resolve(pos) else { return false };
    let Some(base) = rpos.depth().checked_sub(depth) else { return false };
    let inner_type = types_after
        .and_then(|ts| ts.last())
        .and_then(|t| t.as_ref())
        .map(|t| t.typ.clone())
        .unwrap_or_else(|| rpos.parent().node_type().clone());
    let parent = rpos.parent();
    if parent.node_type().isolating()
        || !parent.can_replace(rpos.index(rpos.depth()), parent.child_count(), &Fragment::empty())
        || !inner_type.valid_content(
            &parent.content().cut_by_index(rpos.index(rpos.depth()), parent.child_count()),
        )
    {
        return false;
    }
    let mut i = depth as isize - 2;
    for d in ((base + 1)..rpos.depth()).rev() {
        let node = rpos.node(d);
        let index = rpos.index(d);
        if node.node_type().isolating() {
            return false;
        }
        let mut rest = node.content().cut_by_index(index, node.child_count());
        let override_child = i
            .checked_add(1)
            .and_then(|j| types_after.and_then(|ts| ts.get(j as usize)))
            .and_then(|t| t.as_ref());
        if let Some(over) = override_child {
            let Ok(first) = over.typ.create(over.attrs.clone(), Fragment::empty()) else {
                return false;
            };
            rest = if rest.child_count() > 0 {
                rest.replace_child(0, first)
            } else {
                Fragment::from(first)
            };
        }
        let after_type = (i >= 0)
            .then(|| types_after.and_then(|ts| ts.get(i as usize)).and_then(|t| t.as_ref()))
            .flatten()
            .map(|t| t.typ.clone())
            .unwrap_or_else(|| node.node_type().clone());
        if !node.can_replace(index + 1, node.child_count(), &Fragment::empty())
            || !after_type.valid_content(&rest)
        {
            return false;
        }
        i -= 1;
    }
    let index = rpos.index_after(base);
    let base_type = types_after
        .and_then(|ts| ts.first())
        .and_then(|t| t.as_ref())
        .map(|t| t.typ.clone())
        .unwrap_or_else(|| rpos.node(base + 1).node_type().clone());
    rpos.node(base).can_replace_with(index, index, &base_type, None)
}

pub(crate) fn split_step(
    doc: &Node,
    pos: usize,
    depth: usize,
    types_after: Option<&[Option<TypeWithAttrs>]>,
) -> Result<Step, TransformError> {
    let rpos = doc.resolve(pos)?;
    if depth == 0 || depth > rpos.depth() {
        return Err(TransformError::CannotSplit { pos, depth });
    }
    let mut before = Fragment::empty();
    let mut after = Fragment::empty();
    let mut i = depth as isize - 1;
    let end = rpos.depth() - depth;
    for d in ((end + 1)..=rpos.depth()).rev() {
        before = Fragment::from(rpos.node(d).copy(before));
        let type_after = (i >= 0)
            .then(|| types_after.and_then(|ts| ts.get(i as usize)).and_then(|t| t.as_ref()))
            .flatten();
        let node_after = match type_after {
            Some(t) => t.typ.create(t.attrs.clone(), after)?,
            None => rpos.node(d).copy(after),
        };
        after = Fragment::from(node_after);
        i -= 1;
    }
    Ok(Step::Replace(ReplaceStep::structural(
        pos,
        pos,
        Slice::new(before.append(&after), depth, depth),
    )))
}

// ── Join ──────────────────────────────────────────────────────────────────

fn joinable_pair(a: &Node, b: &Node) -> bool {
    !a.is_leaf() && a.can_append(b)
}

/// Whether the nodes before and after `pos` can be joined.
pub fn can_join(doc: &Node, pos: usize) -> bool {
    let Ok(rpos) = doc.resolve(pos) else { return false };
    let index = rpos.index(rpos.depth());
    match (rpos.node_before(), rpos.node_after()) {
        (Some(before), Some(after)) => {
            joinable_pair(&before, &after)
                && rpos.parent().can_replace(index, index + 1, &Fragment::empty())
        }
        _ => false,
    }
}

/// Find a point at or around `pos` where two nodes could be joined;
/// `dir` < 0 searches before, > 0 after.
pub fn join_point(doc: &Node, pos: usize, dir: i8) -> Option<usize> {
    let rpos = doc.resolve(pos).ok()?;
    let mut pos = pos;
    let mut d = rpos.depth();
    loop {
        let (before, after, index) = if d == rpos.depth() {
            (rpos.node_before(), rpos.node_after(), rpos.index(d))
        } else if dir > 0 {
            let index = rpos.index(d) + 1;
            (
                Some(rpos.node(d + 1).clone()),
                rpos.node(d).maybe_child(index).cloned(),
                index,
            )
        } else {
            let index = rpos.index(d);
            let before = if index > 0 {
                rpos.node(d).maybe_child(index - 1).cloned()
            } else {
                None
            };
            (before, Some(rpos.node(d + 1).clone()), index)
        };
        if let (Some(b), Some(a)) = (&before, &after) {
            if !b.is_textblock()
                && joinable_pair(b, a)
                && rpos.node(d).can_replace(index, index + 1, &Fragment::empty())
            {
                return Some(pos);
            }
        }
        if d == 0 {
            return None;
        }
        pos = if dir < 0 { rpos.before(d) } else { rpos.after(d) };
        d -= 1;
    }
}

pub(crate) fn join_step(pos: usize, depth: usize) -> Step {
    Step::Replace(ReplaceStep::structural(pos - depth, pos + depth, Slice::empty()))
}

// ── Lift ──────────────────────────────────────────────────────────────────

fn can_cut(node: &Node, start: usize, end: usize) -> bool {
    (start == 0 || node.can_replace(start, node.child_count(), &Fragment::empty()))
        && (end == node.child_count() || node.can_replace(0, end, &Fragment::empty()))
}

/// The shallowest depth the content of `range` can be lifted to, if any.
pub fn lift_target(range: &NodeRange) -> Option<usize> {
    let parent = range.parent();
    let content = parent.content().cut_by_index(range.start_index(), range.end_index());
    let mut depth = range.depth;
    loop {
        let node = range.from.node(depth);
        let index = range.from.index(depth);
        let end_index = range.to.index_after(depth);
        if depth < range.depth && node.can_replace(index, end_index, &content) {
            return Some(depth);
        }
        if depth == 0 || node.node_type().isolating() || !can_cut(node, index, end_index) {
            return None;
        }
        depth -= 1;
    }
}

pub(crate) fn lift_step(range: &NodeRange, target: usize) -> Step {
    let (rfrom, rto, depth) = (&range.from, &range.to, range.depth);
    let gap_start = rfrom.before(depth + 1);
    let gap_end = rto.after(depth + 1);
    let mut start = gap_start;
    let mut end = gap_end;

    let mut before = Fragment::empty();
    let mut open_start = 0;
    let mut splitting = false;
    for d in ((target + 1)..=depth).rev() {
        if splitting || rfrom.index(d) > 0 {
            splitting = true;
            before = Fragment::from(rfrom.node(d).copy(before));
            open_start += 1;
        } else {
            start -= 1;
        }
    }
    let mut after = Fragment::empty();
    let mut open_end = 0;
    let mut splitting = false;
    for d in ((target + 1)..=depth).rev() {
        if splitting || rto.after(d + 1) < rto.end(d) {
            splitting = true;
            after = Fragment::from(rto.node(d).copy(after));
            open_end += 1;
        } else {
            end += 1;
        }
    }
    Step::ReplaceAround(ReplaceAroundStep {
        from: start,
        to: end,
        gap_from: gap_start,
        gap_to: gap_end,
        slice: Slice::new(before.append(&after), open_start, open_end),
        insert: before.size() - open_start,
        structure: true,
    })
}

// ── Wrap ──────────────────────────────────────────────────────────────────

/// Find the wrapper layers needed to wrap `range` in a node of the given
/// type: wrappers admissible around the range from the outside, the type
/// itself, then wrappers making the range's content admissible inside.
pub fn find_wrapping(
    range: &NodeRange,
    node_type: &NodeType,
    attrs: Option<&Attrs>,
    inner_range: Option<&NodeRange>,
) -> Option<Vec<TypeWithAttrs>> {
    let inner_range = inner_range.unwrap_or(range);
    let around = find_wrapping_outside(range, node_type)?;
    let inner = find_wrapping_inside(inner_range, node_type)?;
    let mut result: Vec<TypeWithAttrs> =
        around.into_iter().map(TypeWithAttrs::new).collect();
    result.push(TypeWithAttrs { typ: node_type.clone(), attrs: attrs.cloned() });
    result.extend(inner.into_iter().map(TypeWithAttrs::new));
    Some(result)
}

fn find_wrapping_outside(range: &NodeRange, typ: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let around = parent.content_match_at(range.start_index()).find_wrapping(typ)?;
    let outer = around.first().unwrap_or(typ);
    if parent.can_replace_with(range.start_index(), range.end_index(), outer, None) {
        Some(around)
    } else {
        None
    }
}

fn find_wrapping_inside(range: &NodeRange, typ: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let inner = parent.child(range.start_index());
    let inside = typ.content_match().find_wrapping(inner.node_type())?;
    let last_type = inside.last().unwrap_or(typ).clone();
    let mut inner_match = Some(last_type.content_match());
    for i in range.start_index()..range.end_index() {
        inner_match = inner_match.and_then(|m| m.match_type(parent.child(i).node_type()));
    }
    match inner_match {
        Some(m) if m.valid_end() => Some(inside),
        _ => None,
    }
}

pub(crate) fn wrap_step(
    range: &NodeRange,
    wrappers: &[TypeWithAttrs],
) -> Result<Step, TransformError> {
    let mut content = Fragment::empty();
    for wrapper in wrappers.iter().rev() {
        if content.size() > 0 {
            let valid = wrapper
                .typ
                .content_match()
                .match_fragment(&content)
                .is_some_and(|m| m.valid_end());
            if !valid {
                return Err(TransformError::BadWrapperType(wrapper.typ.name().to_string()));
            }
        }
        content = Fragment::from(wrapper.typ.create(wrapper.attrs.clone(), content)?);
    }
    let start = range.start();
    let end = range.end();
    Ok(Step::ReplaceAround(ReplaceAroundStep {
        from: start,
        to: end,
        gap_from: start,
        gap_to: end,
        slice: Slice::new(content, 0, 0),
        insert: wrappers.len(),
        structure: true,
    }))
}

// ── Block type & markup ───────────────────────────────────────────────────

fn can_change_type(doc: &Node, pos: usize, typ: &NodeType) -> bool {
    let Ok(rpos) = doc.resolve(pos) else { return false };
    let index = rpos.index(rpos.depth());
    rpos.parent().can_replace_with(index, index + 1, typ, None)
}

pub(crate) fn set_block_type(
    tr: &mut Transform,
    from: usize,
    to: usize,
    typ: &NodeType,
    attrs: Option<&Attrs>,
) -> Result<(), TransformError> {
    if !typ.is_textblock() {
        return Err(TransformError::NotTextblock);
    }
    let map_from = tr.mapping.len();
    let mut candidates: Vec<(usize, Node)> = Vec::new();
    tr.doc.nodes_between(from, to, &mut |node, pos, _, _| {
        if node.is_textblock() && !node.has_markup(typ, attrs, None) {
            candidates.push((pos, node.clone()));
            return false;
        }
        true
    });
    for (pos, node) in candidates {
        let mapped = tr.mapping.slice_from(map_from).map(pos, 1);
        if !can_change_type(&tr.doc, mapped, typ) {
            continue;
        }
        // Clear marks and children the new type does not allow.
        crate::mark::clear_incompatible(tr, tr.mapping.slice_from(map_from).map(pos, 1), typ)?;
        let mapping = tr.mapping.slice_from(map_from);
        let start = mapping.map(pos, 1);
        let end = mapping.map(pos + node.node_size(), 1);
        let new_node = typ.create_with_marks(
            attrs.cloned(),
            Fragment::empty(),
            node.marks().to_vec(),
        )?;
        tr.step(Step::ReplaceAround(ReplaceAroundStep {
            from: start,
            to: end,
            gap_from: start + 1,
            gap_to: end - 1,
            slice: Slice::new(Fragment::from(new_node), 0, 0),
            insert: 1,
            structure: true,
        }))?;
    }
    Ok(())
}

pub(crate) fn set_node_markup(
    tr: &mut Transform,
    pos: usize,
    typ: Option<&NodeType>,
    attrs: Option<&Attrs>,
    marks: Option<Vec<vellum_model::Mark>>,
) -> Result<(), TransformError> {
    let node = tr.doc.node_at(pos).ok_or(TransformError::NoNodeAt(pos))?;
    let typ = typ.cloned().unwrap_or_else(|| node.node_type().clone());
    let new_node = typ.create_with_marks(
        attrs.cloned(),
        Fragment::empty(),
        marks.unwrap_or_else(|| node.marks().to_vec()),
    )?;
    if node.is_leaf() {
        return tr.replace_with(pos, pos + node.node_size(), new_node).map(|_| ());
    }
    if !typ.valid_content(node.content()) {
        return Err(TransformError::InvalidContent(typ.name().to_string()));
    }
    tr.step(Step::ReplaceAround(ReplaceAroundStep {
        from: pos,
        to: pos + node.node_size(),
        gap_from: pos + 1,
        gap_to: pos + node.node_size() - 1,
        slice: Slice::new(Fragment::from(new_node), 0, 0),
        insert: 1,
        structure: true,
    }))?;
    Ok(())
}

// ── Insert point ──────────────────────────────────────────────────────────

/// The closest position at or around `pos` where a node of the given type
/// can be inserted, if any.
pub fn insert_point(doc: &Node, pos: usize, node_type: &NodeType) -> Option<usize> {
    let rpos = doc.resolve(pos).ok()?;
    let depth = rpos.depth();
    if rpos.parent().can_replace_with(rpos.index(depth), rpos.index(depth), node_type, None) {
        return Some(pos);
    }
    if rpos.parent_offset() == 0 {
        for d in (0..depth).rev() {
            let index = rpos.index(d);
            if rpos.node(d).can_replace_with(index, index, node_type, None) {
                return Some(rpos.before(d + 1));
            }
            if index > 0 {
                return None;
            }
        }
    }
    if rpos.parent_offset() == rpos.parent().content().size() {
        for d in (0..depth).rev() {
            let index = rpos.index_after(d);
            if rpos.node(d).can_replace_with(index, index, node_type, None) {
                return Some(rpos.after(d + 1));
            }
            if index < rpos.node(d).child_count() {
                return None;
            }
        }
    }
    None
}
