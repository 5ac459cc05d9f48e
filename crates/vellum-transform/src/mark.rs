//! Range-level mark editing: computing the minimal set of mark steps for
//! adding or removing marks over a range, and clearing content a new
//! parent type cannot hold.

use vellum_model::{Fragment, Mark, MarkType, Node, NodeType, Slice};

use crate::mark_step::{AddMarkStep, RemoveMarkStep};
use crate::replace_step::ReplaceStep;
use crate::step::Step;
use crate::transform::{Transform, TransformError};

/// What to remove in a [`Transform::remove_mark`]-style call.
#[derive(Debug, Clone)]
pub enum MarkFilter<'a> {
    /// Remove marks equal to this one.
    Mark(&'a Mark),
    /// Remove all marks of this type.
    Type(&'a MarkType),
    /// Remove every mark.
    Any,
}

pub(crate) fn add_mark(
    tr: &mut Transform,
    from: usize,
    to: usize,
    mark: &Mark,
) -> Result<(), TransformError> {
    let mut removed: Vec<RemoveMarkStep> = Vec::new();
    let mut added: Vec<AddMarkStep> = Vec::new();
    tr.doc.nodes_between(from, to, &mut |node, pos, parent, _| {
        if !node.is_inline() {
            return true;
        }
        let marks = node.marks();
        let parent_allows = parent
            .map(|p| p.node_type().allows_mark_type(mark.mark_type()))
            .unwrap_or(false);
        if !mark.is_in_set(marks) && parent_allows {
            let start = pos.max(from);
            let end = (pos + node.node_size()).min(to);
            let new_set = mark.add_to_set(marks);
            for old in marks {
                if !old.is_in_set(&new_set) {
                    match removed.last_mut() {
                        Some(last) if last.to == start && &last.mark == old => last.to = end,
                        _ => removed.push(RemoveMarkStep {
                            from: start,
                            to: end,
                            mark: old.clone(),
                        }),
                    }
                }
            }
            match added.last_mut() {
                Some(last) if last.to == start => last.to = end,
                _ => added.push(AddMarkStep { from: start, to: end, mark: mark.clone() }),
            }
        }
        true
    });
    for step in removed {
        tr.step(Step::RemoveMark(step))?;
    }
    for step in added {
        tr.step(Step::AddMark(step))?;
    }
    Ok(())
}

struct Matched {
    mark: Mark,
    from: usize,
    to: usize,
    step: usize,
}

pub(crate) fn remove_mark(
    tr: &mut Transform,
    from: usize,
    to: usize,
    filter: &MarkFilter<'_>,
) -> Result<(), TransformError> {
    let mut matched: Vec<Matched> = Vec::new();
    let mut step = 0usize;
    tr.doc.nodes_between(from, to, &mut |node, pos, _, _| {
        if !node.is_inline() {
            return true;
        }
        step += 1;
        let to_remove: Vec<Mark> = match filter {
            MarkFilter::Type(typ) => {
                let mut found = Vec::new();
                let mut set = node.marks().to_vec();
                while let Some(mark) = typ.is_in_set(&set).cloned() {
                    set = mark.remove_from_set(&set);
                    found.push(mark);
                }
                found
            }
            MarkFilter::Mark(mark) => {
                if mark.is_in_set(node.marks()) {
                    vec![(*mark).clone()]
                } else {
                    Vec::new()
                }
            }
            MarkFilter::Any => node.marks().to_vec(),
        };
        if !to_remove.is_empty() {
            let end = (pos + node.node_size()).min(to);
            for mark in to_remove {
                let found = matched
                    .iter_mut()
                    .find(|m| m.step == step - 1 && m.mark == mark);
                match found {
                    Some(m) => {
                        m.to = end;
                        m.step = step;
                    }
                    None => matched.push(Matched { mark, from: pos.max(from), to: end, step }),
                }
            }
        }
        true
    });
    for m in matched {
        tr.step(Step::RemoveMark(RemoveMarkStep { from: m.from, to: m.to, mark: m.mark }))?;
    }
    Ok(())
}

/// Remove children, marks and trailing gaps that would be invalid if the
/// node at `pos` became a node of `parent_type`.
pub(crate) fn clear_incompatible(
    tr: &mut Transform,
    pos: usize,
    parent_type: &NodeType,
) -> Result<(), TransformError> {
    let node = tr.doc.node_at(pos).ok_or(TransformError::NoNodeAt(pos))?;
    let mut matched = Some(parent_type.content_match());
    let mut cur = pos + 1;
    let mut delete_steps: Vec<Step> = Vec::new();
    let mut mark_steps: Vec<Step> = Vec::new();
    for i in 0..node.child_count() {
        let child = node.child(i);
        let end = cur + child.node_size();
        let allowed = matched.as_ref().and_then(|m| m.match_type(child.node_type()));
        match allowed {
            None => delete_steps.push(Step::Replace(ReplaceStep::new(cur, end, Slice::empty()))),
            Some(next) => {
                matched = Some(next);
                for mark in child.marks() {
                    if !parent_type.allows_mark_type(mark.mark_type()) {
                        mark_steps.push(Step::RemoveMark(RemoveMarkStep {
                            from: cur,
                            to: end,
                            mark: mark.clone(),
                        }));
                    }
                }
            }
        }
        cur = end;
    }
    for step in mark_steps {
        tr.step(step)?;
    }
    if let Some(m) = matched {
        if !m.valid_end() {
            if let Some(fill) = m.fill_before(&Fragment::empty(), true, 0) {
                tr.replace(cur, cur, &Slice::new(fill, 0, 0))?;
            }
        }
    }
    for step in delete_steps.into_iter().rev() {
        tr.step(step)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test_util::{basic_schema, doc_of};
    use super::*;

    #[test]
    fn add_mark_spans_multiple_blocks() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab", "cd"]);
        let strong = schema.mark("strong", None).unwrap();
        let mut tr = Transform::new(doc);
        tr.add_mark(1, 7, &strong).unwrap();
        // One coalesced step per block-crossing range.
        assert_eq!(tr.steps.len(), 1);
        assert!(tr.doc.range_has_mark(1, 3, &strong));
        assert!(tr.doc.range_has_mark(5, 7, &strong));
    }

    #[test]
    fn add_mark_removes_excluded_marks() {
        let schema = basic_schema();
        let em = schema.mark("em", None).unwrap();
        let code = schema.mark("code", None).unwrap();
        let para = schema
            .node(
                "paragraph",
                None,
                vec![schema.text_with_marks("ab", vec![em.clone()])],
                Vec::new(),
            )
            .unwrap();
        let doc = schema.node("doc", None, vec![para], Vec::new()).unwrap();
        let mut tr = Transform::new(doc);
        tr.add_mark(1, 3, &code).unwrap();
        assert!(tr.doc.range_has_mark(1, 3, &code));
        assert!(!tr.doc.range_has_mark(1, 3, &em));
    }

    #[test]
    fn remove_mark_by_type_and_by_value() {
        let schema = basic_schema();
        let em = schema.mark("em", None).unwrap();
        let para = schema
            .node(
                "paragraph",
                None,
                vec![schema.text_with_marks("ab", vec![em.clone()]), schema.text("cd")],
                Vec::new(),
            )
            .unwrap();
        let doc = schema.node("doc", None, vec![para], Vec::new()).unwrap();
        let mut tr = Transform::new(doc.clone());
        tr.remove_mark(1, 5, &MarkFilter::Mark(&em)).unwrap();
        assert!(!tr.doc.range_has_mark(1, 5, &em));
        let em_type = schema.mark_type("em").unwrap();
        let mut tr = Transform::new(doc);
        tr.remove_mark(1, 5, &MarkFilter::Type(&em_type)).unwrap();
        assert!(!tr.doc.range_has_mark(1, 5, &em));
    }
}
