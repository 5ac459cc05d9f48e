//! The two structural step kinds: [`ReplaceStep`] and
//! [`ReplaceAroundStep`].

use serde_json::Value;

use vellum_model::{Node, Schema, Slice};

use crate::map::{MapRange, Mappable, StepMap};
use crate::step::{from_replace, json_slice, json_usize, Step, StepError, StepJsonError};

// ── ReplaceStep ───────────────────────────────────────────────────────────

/// Replace the range `from..to` with a slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceStep {
    pub from: usize,
    pub to: usize,
    pub slice: Slice,
    /// A structure step only moves node boundaries around and refuses to
    /// apply when actual content sits in its replaced ranges.
    pub structure: bool,
}

impl ReplaceStep {
    pub fn new(from: usize, to: usize, slice: Slice) -> ReplaceStep {
        ReplaceStep { from, to, slice, structure: false }
    }

    pub fn structural(from: usize, to: usize, slice: Slice) -> ReplaceStep {
        ReplaceStep { from, to, slice, structure: true }
    }

    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        if self.structure && content_between(doc, self.from, self.to)? {
            return Err(StepError::WouldOverwrite);
        }
        from_replace(doc, self.from, self.to, &self.slice)
    }

    pub fn get_map(&self) -> StepMap {
        StepMap::new(vec![MapRange {
            start: self.from,
            old_size: self.to - self.from,
            new_size: self.slice.size(),
        }])
    }

    pub fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        let slice = doc.slice(self.from, self.to, false)?;
        Ok(Step::Replace(ReplaceStep::new(self.from, self.from + self.slice.size(), slice)))
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<ReplaceStep> {
        let from = mapping.map_result(self.from, 1);
        let to = mapping.map_result(self.to, -1);
        if from.deleted_across() && to.deleted_across() {
            return None;
        }
        Some(ReplaceStep::new(from.pos, from.pos.max(to.pos), self.slice.clone()))
    }

    pub fn merge(&self, other: &ReplaceStep) -> Option<ReplaceStep> {
        if self.structure || other.structure {
            return None;
        }
        if self.from + self.slice.size() == other.from
            && self.slice.open_end() == 0
            && other.slice.open_start() == 0
        {
            let slice = if self.slice.size() + other.slice.size() == 0 {
                Slice::empty()
            } else {
                Slice::new(
                    self.slice.content().append(other.slice.content()),
                    self.slice.open_start(),
                    other.slice.open_end(),
                )
            };
            Some(ReplaceStep::new(self.from, self.to + (other.to - other.from), slice))
        } else if other.to == self.from
            && self.slice.open_start() == 0
            && other.slice.open_end() == 0
        {
            let slice = if self.slice.size() + other.slice.size() == 0 {
                Slice::empty()
            } else {
                Slice::new(
                    other.slice.content().append(self.slice.content()),
                    other.slice.open_start(),
                    self.slice.open_end(),
                )
            };
            Some(ReplaceStep::new(other.from, self.to, slice))
        } else {
            None
        }
    }

    pub fn to_json(&self) -> Value {
        let mut m = serde_json::Map::new();
        m.insert("stepType".into(), Value::String("replace".into()));
        m.insert("from".into(), Value::from(self.from));
        m.insert("to".into(), Value::from(self.to));
        if self.slice.size() > 0 {
            m.insert("slice".into(), self.slice.to_json());
        }
        if self.structure {
            m.insert("structure".into(), Value::Bool(true));
        }
        Value::Object(m)
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        let from = json_usize(json, "from", "ReplaceStep")?;
        let to = json_usize(json, "to", "ReplaceStep")?;
        if to < from {
            return Err(StepJsonError::Invalid("ReplaceStep"));
        }
        let slice = json_slice(schema, json, "ReplaceStep")?;
        let structure = json.get("structure").and_then(Value::as_bool).unwrap_or(false);
        Ok(Step::Replace(ReplaceStep { from, to, slice, structure }))
    }
}

// ── ReplaceAroundStep ─────────────────────────────────────────────────────

/// Replace `from..to`, but keep the gap `gap_from..gap_to` and re-insert
/// it at offset `insert` inside the new slice. This is how lift, wrap,
/// split-like and node-markup edits preserve untouched content without
/// re-specifying it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceAroundStep {
    pub from: usize,
    pub to: usize,
    pub gap_from: usize,
    pub gap_to: usize,
    pub slice: Slice,
    /// Slice-internal position the gap content is inserted at.
    pub insert: usize,
    pub structure: bool,
}

impl ReplaceAroundStep {
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        if self.structure
            && (content_between(doc, self.from, self.gap_from)?
                || content_between(doc, self.gap_to, self.to)?)
        {
            return Err(StepError::WouldOverwrite);
        }
        let gap = doc.slice(self.gap_from, self.gap_to, false)?;
        if gap.open_start() > 0 || gap.open_end() > 0 {
            return Err(StepError::GapNotFlat);
        }
        let inserted = self
            .slice
            .insert_at(self.insert, gap.content())
            .ok_or(StepError::GapContentMismatch)?;
        from_replace(doc, self.from, self.to, &inserted)
    }

    pub fn get_map(&self) -> StepMap {
        StepMap::new(vec![
            MapRange {
                start: self.from,
                old_size: self.gap_from - self.from,
                new_size: self.insert,
            },
            MapRange {
                start: self.gap_to,
                old_size: self.to - self.gap_to,
                new_size: self.slice.size() - self.insert,
            },
        ])
    }

    pub fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        let gap = self.gap_to - self.gap_from;
        let slice = doc
            .slice(self.from, self.to, false)?
            .remove_between(self.gap_from - self.from, self.gap_to - self.from)
            .map_err(StepError::from)?;
        Ok(Step::ReplaceAround(ReplaceAroundStep {
            from: self.from,
            to: self.from + self.slice.size() + gap,
            gap_from: self.from + self.insert,
            gap_to: self.from + self.insert + gap,
            slice,
            insert: self.gap_from - self.from,
            structure: self.structure,
        }))
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<ReplaceAroundStep> {
        let from = mapping.map_result(self.from, 1);
        let to = mapping.map_result(self.to, -1);
        let gap_from = if self.from == self.gap_from { from.pos } else { mapping.map(self.gap_from, -1) };
        let gap_to = if self.to == self.gap_to { to.pos } else { mapping.map(self.gap_to, 1) };
        if (from.deleted_across() && to.deleted_across()) || gap_from < from.pos || gap_to > to.pos
        {
            return None;
        }
        Some(ReplaceAroundStep {
            from: from.pos,
            to: to.pos,
            gap_from,
            gap_to,
            slice: self.slice.clone(),
            insert: self.insert,
            structure: self.structure,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut m = serde_json::Map::new();
        m.insert("stepType".into(), Value::String("replaceAround".into()));
        m.insert("from".into(), Value::from(self.from));
        m.insert("to".into(), Value::from(self.to));
        m.insert("gapFrom".into(), Value::from(self.gap_from));
        m.insert("gapTo".into(), Value::from(self.gap_to));
        m.insert("insert".into(), Value::from(self.insert));
        if self.slice.size() > 0 {
            m.insert("slice".into(), self.slice.to_json());
        }
        if self.structure {
            m.insert("structure".into(), Value::Bool(true));
        }
        Value::Object(m)
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        let from = json_usize(json, "from", "ReplaceAroundStep")?;
        let to = json_usize(json, "to", "ReplaceAroundStep")?;
        let gap_from = json_usize(json, "gapFrom", "ReplaceAroundStep")?;
        let gap_to = json_usize(json, "gapTo", "ReplaceAroundStep")?;
        let insert = json_usize(json, "insert", "ReplaceAroundStep")?;
        if gap_from < from || gap_to < gap_from || to < gap_to {
            return Err(StepJsonError::Invalid("ReplaceAroundStep"));
        }
        let slice = json_slice(schema, json, "ReplaceAroundStep")?;
        if insert > slice.size() {
            return Err(StepJsonError::Invalid("ReplaceAroundStep"));
        }
        let structure = json.get("structure").and_then(Value::as_bool).unwrap_or(false);
        Ok(Step::ReplaceAround(ReplaceAroundStep {
            from,
            to,
            gap_from,
            gap_to,
            slice,
            insert,
            structure,
        }))
    }
}

/// Whether any real content (as opposed to opening/closing tokens) sits
/// between two positions.
fn content_between(doc: &Node, from: usize, to: usize) -> Result<bool, StepError> {
    let rfrom = doc.resolve(from)?;
    let mut dist = to - from;
    let mut depth = rfrom.depth();
    while dist > 0
        && depth > 0
        && rfrom.index_after(depth) == rfrom.node(depth).child_count()
    {
        depth -= 1;
        dist -= 1;
    }
    if dist > 0 {
        let mut next = rfrom.node(depth).maybe_child(rfrom.index_after(depth)).cloned();
        while dist > 0 {
            match next {
                None => return Ok(true),
                Some(node) if node.is_leaf() || node.is_text() => return Ok(true),
                Some(node) => {
                    next = node.first_child().cloned();
                    dist -= 1;
                }
            }
        }
    }
    Ok(false)
}
