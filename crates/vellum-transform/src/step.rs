//! [`Step`] — one atomic, invertible, remappable document edit.
//!
//! All step kinds live in one closed enum; the per-kind payloads and logic
//! are in their own modules. JSON decoding goes through an explicit
//! [`StepRegistry`] value mapping `stepType` discriminators to decoder
//! functions — build one at startup and pass it wherever steps are
//! deserialized.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use vellum_model::{ContentError, Node, PositionOutOfRange, ReplaceError, Schema, Slice};

use crate::attr_step::{AttrStep, DocAttrStep};
use crate::map::{Mappable, StepMap};
use crate::mark_step::{AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep};
use crate::replace_step::{ReplaceAroundStep, ReplaceStep};

// ── Errors ────────────────────────────────────────────────────────────────

/// Why a step could not be applied to (or inverted against) a document.
/// These are expected-domain failures: `Transform::maybe_step` surfaces
/// them as soft results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("structural replace would overwrite content")]
    WouldOverwrite,
    #[error("gap is not a flat range")]
    GapNotFlat,
    #[error("content does not fit in gap")]
    GapContentMismatch,
    #[error("no node at position {0}")]
    NoNodeAt(usize),
    #[error(transparent)]
    Replace(#[from] ReplaceError),
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl From<PositionOutOfRange> for StepError {
    fn from(err: PositionOutOfRange) -> Self {
        StepError::Replace(ReplaceError::OutOfRange(err))
    }
}

/// Failures decoding a step from JSON.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepJsonError {
    #[error("unknown step type '{0}'")]
    UnknownType(String),
    #[error("invalid input for {0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Apply a replace to a document, turning replace failures into step
/// failures.
pub(crate) fn from_replace(
    doc: &Node,
    from: usize,
    to: usize,
    slice: &Slice,
) -> Result<Node, StepError> {
    doc.replace(from, to, slice).map_err(StepError::from)
}

// ── Step ──────────────────────────────────────────────────────────────────

/// The closed set of edit kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Replace(ReplaceStep),
    ReplaceAround(ReplaceAroundStep),
    AddMark(AddMarkStep),
    RemoveMark(RemoveMarkStep),
    AddNodeMark(AddNodeMarkStep),
    RemoveNodeMark(RemoveNodeMarkStep),
    Attr(AttrStep),
    DocAttr(DocAttrStep),
}

impl Step {
    /// Apply the step to a document, producing a new document. Pure:
    /// expected-domain failures come back as `Err`, never panics.
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        match self {
            Step::Replace(s) => s.apply(doc),
            Step::ReplaceAround(s) => s.apply(doc),
            Step::AddMark(s) => s.apply(doc),
            Step::RemoveMark(s) => s.apply(doc),
            Step::AddNodeMark(s) => s.apply(doc),
            Step::RemoveNodeMark(s) => s.apply(doc),
            Step::Attr(s) => s.apply(doc),
            Step::DocAttr(s) => s.apply(doc),
        }
    }

    /// The step's position delta (empty for non-structural steps).
    pub fn get_map(&self) -> StepMap {
        match self {
            Step::Replace(s) => s.get_map(),
            Step::ReplaceAround(s) => s.get_map(),
            _ => StepMap::empty(),
        }
    }

    /// The step that undoes this one. `doc` must be the document the step
    /// was applied to.
    pub fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        match self {
            Step::Replace(s) => s.invert(doc),
            Step::ReplaceAround(s) => s.invert(doc),
            Step::AddMark(s) => Ok(s.invert()),
            Step::RemoveMark(s) => Ok(s.invert()),
            Step::AddNodeMark(s) => Ok(s.invert(doc)),
            Step::RemoveNodeMark(s) => Ok(s.invert(doc)),
            Step::Attr(s) => s.invert(doc),
            Step::DocAttr(s) => Ok(s.invert(doc)),
        }
    }

    /// Rebase the step's positions through a mapping. `None` means the
    /// step's target was removed by the mapped-over edits; callers drop
    /// the step silently.
    pub fn map(&self, mapping: &dyn Mappable) -> Option<Step> {
        match self {
            Step::Replace(s) => s.map(mapping).map(Step::Replace),
            Step::ReplaceAround(s) => s.map(mapping).map(Step::ReplaceAround),
            Step::AddMark(s) => s.map(mapping).map(Step::AddMark),
            Step::RemoveMark(s) => s.map(mapping).map(Step::RemoveMark),
            Step::AddNodeMark(s) => s.map(mapping).map(Step::AddNodeMark),
            Step::RemoveNodeMark(s) => s.map(mapping).map(Step::RemoveNodeMark),
            Step::Attr(s) => s.map(mapping).map(Step::Attr),
            Step::DocAttr(s) => Some(Step::DocAttr(s.clone())),
        }
    }

    /// Coalesce with an adjacent compatible step, when possible.
    pub fn merge(&self, other: &Step) -> Option<Step> {
        match (self, other) {
            (Step::Replace(a), Step::Replace(b)) => a.merge(b).map(Step::Replace),
            (Step::AddMark(a), Step::AddMark(b)) => a.merge(b).map(Step::AddMark),
            (Step::RemoveMark(a), Step::RemoveMark(b)) => a.merge(b).map(Step::RemoveMark),
            _ => None,
        }
    }

    /// `{"stepType": ..., ...}`.
    pub fn to_json(&self) -> Value {
        match self {
            Step::Replace(s) => s.to_json(),
            Step::ReplaceAround(s) => s.to_json(),
            Step::AddMark(s) => s.to_json(),
            Step::RemoveMark(s) => s.to_json(),
            Step::AddNodeMark(s) => s.to_json(),
            Step::RemoveNodeMark(s) => s.to_json(),
            Step::Attr(s) => s.to_json(),
            Step::DocAttr(s) => s.to_json(),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// Decoder for one `stepType` discriminator.
pub type StepDecoder = fn(&Schema, &Value) -> Result<Step, StepJsonError>;

/// Registry resolving `stepType` strings to decoders. Deliberately a plain
/// value, not process-wide state: construct it once and inject it where
/// deserialization happens.
pub struct StepRegistry {
    decoders: HashMap<String, StepDecoder>,
}

impl StepRegistry {
    pub fn new() -> StepRegistry {
        StepRegistry { decoders: HashMap::new() }
    }

    /// A registry knowing the built-in step kinds.
    pub fn with_defaults() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry.register("replace", ReplaceStep::from_json);
        registry.register("replaceAround", ReplaceAroundStep::from_json);
        registry.register("addMark", AddMarkStep::from_json);
        registry.register("removeMark", RemoveMarkStep::from_json);
        registry.register("addNodeMark", AddNodeMarkStep::from_json);
        registry.register("removeNodeMark", RemoveNodeMarkStep::from_json);
        registry.register("attr", AttrStep::from_json);
        registry.register("docAttr", DocAttrStep::from_json);
        registry
    }

    pub fn register(&mut self, step_type: &str, decoder: StepDecoder) {
        self.decoders.insert(step_type.to_string(), decoder);
    }

    pub fn step_from_json(&self, schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        let step_type = json
            .get("stepType")
            .and_then(Value::as_str)
            .ok_or(StepJsonError::Invalid("step (missing stepType)"))?;
        let decoder = self
            .decoders
            .get(step_type)
            .ok_or_else(|| StepJsonError::UnknownType(step_type.to_string()))?;
        decoder(schema, json)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        StepRegistry::with_defaults()
    }
}

// ── JSON helpers shared by the step kinds ─────────────────────────────────

pub(crate) fn json_usize(json: &Value, field: &str, kind: &'static str) -> Result<usize, StepJsonError> {
    json.get(field)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or(StepJsonError::Invalid(kind))
}

pub(crate) fn json_slice(
    schema: &Schema,
    json: &Value,
    kind: &'static str,
) -> Result<Slice, StepJsonError> {
    match json.get("slice") {
        None => Ok(Slice::empty()),
        Some(v) => Slice::from_json(schema, v).map_err(|_| StepJsonError::Invalid(kind)),
    }
}

#[cfg(test)]
mod tests {
    use vellum_model::Fragment;

    use crate::test_util::{basic_schema, doc_of};
    use super::*;

    #[test]
    fn registry_round_trips_every_kind() {
        let schema = basic_schema();
        let registry = StepRegistry::with_defaults();
        let strong = schema.mark("strong", None).unwrap();
        let steps = vec![
            Step::Replace(ReplaceStep::new(
                1,
                3,
                Slice::new(Fragment::from(schema.text("xy")), 0, 0),
            )),
            Step::ReplaceAround(ReplaceAroundStep {
                from: 0,
                to: 8,
                gap_from: 1,
                gap_to: 7,
                slice: Slice::new(
                    Fragment::from(
                        schema
                            .node_type("blockquote")
                            .unwrap()
                            .create(None, Fragment::empty())
                            .unwrap(),
                    ),
                    0,
                    0,
                ),
                insert: 1,
                structure: true,
            }),
            Step::AddMark(AddMarkStep { from: 1, to: 3, mark: strong.clone() }),
            Step::RemoveMark(RemoveMarkStep { from: 1, to: 3, mark: strong.clone() }),
            Step::AddNodeMark(AddNodeMarkStep { pos: 0, mark: strong.clone() }),
            Step::RemoveNodeMark(RemoveNodeMarkStep { pos: 0, mark: strong }),
            Step::Attr(AttrStep { pos: 0, attr: "level".into(), value: serde_json::json!(2) }),
            Step::DocAttr(DocAttrStep { attr: "version".into(), value: serde_json::json!(7) }),
        ];
        for step in steps {
            let json = step.to_json();
            let back = registry.step_from_json(&schema, &json).unwrap();
            assert_eq!(back, step, "{json}");
        }
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let schema = basic_schema();
        let registry = StepRegistry::with_defaults();
        let err = registry
            .step_from_json(&schema, &serde_json::json!({"stepType": "teleport"}))
            .unwrap_err();
        assert!(matches!(err, StepJsonError::UnknownType(_)));
    }

    #[test]
    fn mapped_step_drops_when_target_removed() {
        let schema = basic_schema();
        let doc = doc_of(&schema, &["abcd"]);
        let strong = schema.mark("strong", None).unwrap();
        let step = Step::AddMark(AddMarkStep { from: 2, to: 4, mark: strong });
        // An edit that deletes the step's whole target range.
        let deletion = StepMap::new(vec![crate::map::MapRange { start: 1, old_size: 5, new_size: 0 }]);
        assert!(step.map(&deletion).is_none());
        assert!(step.apply(&doc).is_ok());
    }
}
