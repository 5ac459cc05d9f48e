//! [`Transform`] — the mutation surface of the engine.
//!
//! A transform accumulates steps against a document: each applied step
//! yields a new immutable document (the old ones are kept in `docs`) and
//! appends its map to the running [`Mapping`]. Higher layers mutate
//! documents exclusively through this type.

use serde_json::Value;
use thiserror::Error;

use vellum_model::{Attrs, ContentError, Fragment, Mark, Node, NodeRange, NodeType, PositionOutOfRange, Slice};

use crate::attr_step::{AttrStep, DocAttrStep};
use crate::fit;
use crate::map::Mapping;
use crate::mark::{self, MarkFilter};
use crate::mark_step::{AddNodeMarkStep, RemoveNodeMarkStep};
use crate::step::{Step, StepError};
use crate::structure::{self, TypeWithAttrs};

/// Unified error of the transform layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error(transparent)]
    Step(#[from] StepError),
    /// The replaced range and slice admit no fit at all.
    #[error("no suitable fit for the replaced range")]
    NoFit,
    #[error(transparent)]
    OutOfRange(#[from] PositionOutOfRange),
    #[error("no node at position {0}")]
    NoNodeAt(usize),
    #[error("cannot split {depth} levels at position {pos}")]
    CannotSplit { pos: usize, depth: usize },
    #[error("block type must be a textblock")]
    NotTextblock,
    #[error("invalid content for node type {0}")]
    InvalidContent(String),
    #[error("wrapper type {0} does not form valid content of its parent wrapper")]
    BadWrapperType(String),
}

impl From<ContentError> for TransformError {
    fn from(err: ContentError) -> Self {
        TransformError::Step(StepError::Content(err))
    }
}

// ── Transform ─────────────────────────────────────────────────────────────

pub struct Transform {
    /// The current document.
    pub doc: Node,
    /// The steps applied so far.
    pub steps: Vec<Step>,
    /// The documents each step was applied to (`docs[i]` is the input of
    /// `steps[i]`).
    pub docs: Vec<Node>,
    /// The accumulated position mapping.
    pub mapping: Mapping,
}

impl Transform {
    pub fn new(doc: Node) -> Transform {
        Transform { doc, steps: Vec::new(), docs: Vec::new(), mapping: Mapping::new() }
    }

    /// The document before any steps were applied.
    pub fn before(&self) -> &Node {
        self.docs.first().unwrap_or(&self.doc)
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Apply a step, erroring when it fails.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, TransformError> {
        self.maybe_step(step)?;
        Ok(self)
    }

    /// Apply a step, reporting failure as a soft result the caller may
    /// ignore.
    pub fn maybe_step(&mut self, step: Step) -> Result<(), StepError> {
        let doc = step.apply(&self.doc)?;
        self.add_step(step, doc);
        Ok(())
    }

    fn add_step(&mut self, step: Step, doc: Node) {
        self.docs.push(self.doc.clone());
        self.mapping.append_map(step.get_map());
        self.steps.push(step);
        self.doc = doc;
    }

    // ── Replacing ─────────────────────────────────────────────────────────

    /// Replace `from..to` with a slice, fitting open content into the
    /// surrounding structure.
    pub fn replace(
        &mut self,
        from: usize,
        to: usize,
        slice: &Slice,
    ) -> Result<&mut Self, TransformError> {
        if let Some(step) = fit::replace_step(&self.doc, from, to, slice)? {
            self.step(step)?;
        }
        Ok(self)
    }

    pub fn replace_with(
        &mut self,
        from: usize,
        to: usize,
        content: impl Into<Fragment>,
    ) -> Result<&mut Self, TransformError> {
        let slice = Slice::new(content.into(), 0, 0);
        self.replace(from, to, &slice)
    }

    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        self.replace(from, to, &Slice::empty())
    }

    pub fn insert(
        &mut self,
        pos: usize,
        content: impl Into<Fragment>,
    ) -> Result<&mut Self, TransformError> {
        self.replace_with(pos, pos, content)
    }

    // ── Structure ─────────────────────────────────────────────────────────

    /// Split the node at `pos` (and `depth - 1` of its ancestors),
    /// optionally giving the nodes after the split other types.
    pub fn split(
        &mut self,
        pos: usize,
        depth: usize,
        types_after: Option<&[Option<TypeWithAttrs>]>,
    ) -> Result<&mut Self, TransformError> {
        let step = structure::split_step(&self.doc, pos, depth, types_after)?;
        self.step(step)
    }

    /// Join the nodes around `pos`, pulling `depth` levels together.
    pub fn join(&mut self, pos: usize, depth: usize) -> Result<&mut Self, TransformError> {
        self.step(structure::join_step(pos, depth))
    }

    /// Lift the content of `range` to the given ancestor depth (found via
    /// [`lift_target`](crate::structure::lift_target)).
    pub fn lift(&mut self, range: &NodeRange, target: usize) -> Result<&mut Self, TransformError> {
        self.step(structure::lift_step(range, target))
    }

    /// Wrap `range` in the given wrapper layers (found via
    /// [`find_wrapping`](crate::structure::find_wrapping)).
    pub fn wrap(
        &mut self,
        range: &NodeRange,
        wrappers: &[TypeWithAttrs],
    ) -> Result<&mut Self, TransformError> {
        let step = structure::wrap_step(range, wrappers)?;
        self.step(step)
    }

    /// Turn all textblocks in the range into the given type.
    pub fn set_block_type(
        &mut self,
        from: usize,
        to: usize,
        typ: &NodeType,
        attrs: Option<&Attrs>,
    ) -> Result<&mut Self, TransformError> {
        structure::set_block_type(self, from, to, typ, attrs)?;
        Ok(self)
    }

    /// Change the type, attributes and/or marks of the node at `pos`.
    pub fn set_node_markup(
        &mut self,
        pos: usize,
        typ: Option<&NodeType>,
        attrs: Option<&Attrs>,
        marks: Option<Vec<Mark>>,
    ) -> Result<&mut Self, TransformError> {
        structure::set_node_markup(self, pos, typ, attrs, marks)?;
        Ok(self)
    }

    /// Set a single attribute of the node at `pos`.
    pub fn set_node_attribute(
        &mut self,
        pos: usize,
        attr: &str,
        value: Value,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::Attr(AttrStep { pos, attr: attr.to_string(), value }))
    }

    /// Set a single attribute of the document node.
    pub fn set_doc_attribute(
        &mut self,
        attr: &str,
        value: Value,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::DocAttr(DocAttrStep { attr: attr.to_string(), value }))
    }

    // ── Marks ─────────────────────────────────────────────────────────────

    /// Add a mark to all inline content in the range.
    pub fn add_mark(
        &mut self,
        from: usize,
        to: usize,
        mark: &Mark,
    ) -> Result<&mut Self, TransformError> {
        mark::add_mark(self, from, to, mark)?;
        Ok(self)
    }

    /// Remove matching marks from all inline content in the range.
    pub fn remove_mark(
        &mut self,
        from: usize,
        to: usize,
        filter: &MarkFilter<'_>,
    ) -> Result<&mut Self, TransformError> {
        mark::remove_mark(self, from, to, filter)?;
        Ok(self)
    }

    /// Add a mark to the node at `pos`.
    pub fn add_node_mark(&mut self, pos: usize, mark: Mark) -> Result<&mut Self, TransformError> {
        self.step(Step::AddNodeMark(AddNodeMarkStep { pos, mark }))
    }

    /// Remove a mark from the node at `pos`.
    pub fn remove_node_mark(
        &mut self,
        pos: usize,
        mark: Mark,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::RemoveNodeMark(RemoveNodeMarkStep { pos, mark }))
    }

    /// Drop marks and children that a node of `parent_type` could not
    /// hold, preparing the node at `pos` for a type change.
    pub fn clear_incompatible(
        &mut self,
        pos: usize,
        parent_type: &NodeType,
    ) -> Result<&mut Self, TransformError> {
        mark::clear_incompatible(self, pos, parent_type)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::map::Mappable;
    use crate::test_util::{basic_schema, doc_of};
    use super::*;

    #[test]
    fn transform_accumulates_steps_and_mapping() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["abcd"]);
        let mut tr = Transform::new(doc.clone());
        assert!(!tr.doc_changed());
        tr.delete(2, 4).unwrap().insert(1, schema.text("Z")).unwrap();
        assert!(tr.doc_changed());
        assert_eq!(tr.steps.len(), 2);
        assert_eq!(tr.docs.len(), 2);
        assert!(tr.before().same(&doc));
        assert_eq!(tr.doc, doc_of(&schema, &["Zad"]));
        // The mapping tracks both edits: position 4 collapses to 2 with
        // the deletion, then shifts to 3 past the insertion.
        assert_eq!(tr.mapping.map(4, 1), 3);
        assert_eq!(tr.mapping.map(2, -1), 3);
    }

    #[test]
    fn maybe_step_reports_soft_failure() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["ab"]);
        let mut tr = Transform::new(doc);
        let bad = Step::Attr(AttrStep { pos: 2, attr: "level".into(), value: Value::Null });
        assert!(tr.maybe_step(bad).is_err());
        assert!(!tr.doc_changed());
    }

    #[test]
    fn inverted_steps_undo_a_transform() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["hello", "world"]);
        let strong = schema.mark("strong", None).unwrap();
        let mut tr = Transform::new(doc.clone());
        tr.delete(3, 9).unwrap();
        tr.add_mark(1, 4, &strong).unwrap();
        tr.split(2, 1, None).unwrap();
        let mut current = tr.doc.clone();
        for (step, before) in tr.steps.iter().zip(&tr.docs).rev() {
            let inverse = step.invert(before).unwrap();
            current = inverse.apply(&current).unwrap();
        }
        assert_eq!(current, doc);
    }
}
