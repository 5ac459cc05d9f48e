//! Mark steps: add/remove a mark over a range of inline content, or on a
//! single node.

use serde_json::Value;

use vellum_model::{Fragment, Mark, Node, Schema, Slice};

use crate::map::Mappable;
use crate::step::{from_replace, json_usize, Step, StepError, StepJsonError};

/// Rebuild a fragment, applying `f` to every inline node (after mapping
/// its children). `f` receives the node and its parent.
fn map_fragment(
    fragment: &Fragment,
    f: &mut dyn FnMut(Node, &Node) -> Node,
    parent: &Node,
) -> Fragment {
    let mut mapped = Vec::with_capacity(fragment.child_count());
    for i in 0..fragment.child_count() {
        let mut child = fragment.child(i).clone();
        if child.content().size() > 0 {
            let inner = map_fragment(child.content(), f, &child);
            child = child.copy(inner);
        }
        if child.is_inline() {
            child = f(child, parent);
        }
        mapped.push(child);
    }
    Fragment::from_array(mapped)
}

fn json_mark(schema: &Schema, json: &Value, kind: &'static str) -> Result<Mark, StepJsonError> {
    json.get("mark")
        .ok_or(StepJsonError::Invalid(kind))
        .and_then(|m| Mark::from_json(schema, m).map_err(StepJsonError::from))
}

// ── AddMarkStep ───────────────────────────────────────────────────────────

/// Add a mark to all inline content in `from..to`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddMarkStep {
    pub from: usize,
    pub to: usize,
    pub mark: Mark,
}

impl AddMarkStep {
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        let old_slice = doc.slice(self.from, self.to, false)?;
        let rfrom = doc.resolve(self.from)?;
        let parent = rfrom.node(rfrom.shared_depth(self.to)).clone();
        let content = map_fragment(
            old_slice.content(),
            &mut |node, parent| {
                if !parent.node_type().allows_mark_type(self.mark.mark_type()) {
                    return node;
                }
                node.mark(self.mark.add_to_set(node.marks()))
            },
            &parent,
        );
        let slice = Slice::new(content, old_slice.open_start(), old_slice.open_end());
        from_replace(doc, self.from, self.to, &slice)
    }

    pub fn invert(&self) -> Step {
        Step::RemoveMark(RemoveMarkStep { from: self.from, to: self.to, mark: self.mark.clone() })
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<AddMarkStep> {
        let from = mapping.map_result(self.from, 1);
        let to = mapping.map_result(self.to, -1);
        if (from.deleted() && to.deleted()) || from.pos >= to.pos {
            return None;
        }
        Some(AddMarkStep { from: from.pos, to: to.pos, mark: self.mark.clone() })
    }

    pub fn merge(&self, other: &AddMarkStep) -> Option<AddMarkStep> {
        if self.mark == other.mark && self.from <= other.to && self.to >= other.from {
            Some(AddMarkStep {
                from: self.from.min(other.from),
                to: self.to.max(other.to),
                mark: self.mark.clone(),
            })
        } else {
            None
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "stepType": "addMark",
            "mark": self.mark.to_json(),
            "from": self.from,
            "to": self.to,
        })
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        Ok(Step::AddMark(AddMarkStep {
            from: json_usize(json, "from", "AddMarkStep")?,
            to: json_usize(json, "to", "AddMarkStep")?,
            mark: json_mark(schema, json, "AddMarkStep")?,
        }))
    }
}

// ── RemoveMarkStep ────────────────────────────────────────────────────────

/// Remove a mark from all inline content in `from..to`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveMarkStep {
    pub from: usize,
    pub to: usize,
    pub mark: Mark,
}

impl RemoveMarkStep {
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        let old_slice = doc.slice(self.from, self.to, false)?;
        let rfrom = doc.resolve(self.from)?;
        let parent = rfrom.node(rfrom.shared_depth(self.to)).clone();
        let content = map_fragment(
            old_slice.content(),
            &mut |node, _parent| node.mark(self.mark.remove_from_set(node.marks())),
            &parent,
        );
        let slice = Slice::new(content, old_slice.open_start(), old_slice.open_end());
        from_replace(doc, self.from, self.to, &slice)
    }

    pub fn invert(&self) -> Step {
        Step::AddMark(AddMarkStep { from: self.from, to: self.to, mark: self.mark.clone() })
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<RemoveMarkStep> {
        let from = mapping.map_result(self.from, 1);
        let to = mapping.map_result(self.to, -1);
        if (from.deleted() && to.deleted()) || from.pos >= to.pos {
            return None;
        }
        Some(RemoveMarkStep { from: from.pos, to: to.pos, mark: self.mark.clone() })
    }

    pub fn merge(&self, other: &RemoveMarkStep) -> Option<RemoveMarkStep> {
        if self.mark == other.mark && self.from <= other.to && self.to >= other.from {
            Some(RemoveMarkStep {
                from: self.from.min(other.from),
                to: self.to.max(other.to),
                mark: self.mark.clone(),
            })
        } else {
            None
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "stepType": "removeMark",
            "mark": self.mark.to_json(),
            "from": self.from,
            "to": self.to,
        })
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        Ok(Step::RemoveMark(RemoveMarkStep {
            from: json_usize(json, "from", "RemoveMarkStep")?,
            to: json_usize(json, "to", "RemoveMarkStep")?,
            mark: json_mark(schema, json, "RemoveMarkStep")?,
        }))
    }
}

// ── Node mark steps ───────────────────────────────────────────────────────

/// Replace a single node with a copy of itself carrying an extra mark,
/// keeping its content in place through an open slice.
fn update_node_marks(doc: &Node, pos: usize, marks: Vec<Mark>) -> Result<Node, StepError> {
    let node = doc.node_at(pos).ok_or(StepError::NoNodeAt(pos))?;
    let updated = node
        .node_type()
        .create_with_marks(Some(node.attrs().clone()), Fragment::empty(), marks)?;
    let open_end = if node.is_leaf() { 0 } else { 1 };
    from_replace(
        doc,
        pos,
        pos + 1,
        &Slice::new(Fragment::from(updated), 0, open_end),
    )
}

/// Add a mark to the node at `pos`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddNodeMarkStep {
    pub pos: usize,
    pub mark: Mark,
}

impl AddNodeMarkStep {
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNodeAt(self.pos))?;
        update_node_marks(doc, self.pos, self.mark.add_to_set(node.marks()))
    }

    pub fn invert(&self, doc: &Node) -> Step {
        if let Some(node) = doc.node_at(self.pos) {
            let new_set = self.mark.add_to_set(node.marks());
            if new_set.len() == node.marks().len() {
                // The mark replaced one with the same type: invert by
                // restoring the replaced mark.
                for old in node.marks() {
                    if !old.is_in_set(&new_set) {
                        return Step::AddNodeMark(AddNodeMarkStep {
                            pos: self.pos,
                            mark: old.clone(),
                        });
                    }
                }
                return Step::AddNodeMark(self.clone());
            }
        }
        Step::RemoveNodeMark(RemoveNodeMarkStep { pos: self.pos, mark: self.mark.clone() })
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<AddNodeMarkStep> {
        let pos = mapping.map_result(self.pos, 1);
        if pos.deleted_after() {
            None
        } else {
            Some(AddNodeMarkStep { pos: pos.pos, mark: self.mark.clone() })
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "stepType": "addNodeMark",
            "pos": self.pos,
            "mark": self.mark.to_json(),
        })
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        Ok(Step::AddNodeMark(AddNodeMarkStep {
            pos: json_usize(json, "pos", "AddNodeMarkStep")?,
            mark: json_mark(schema, json, "AddNodeMarkStep")?,
        }))
    }
}

/// Remove a mark from the node at `pos`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveNodeMarkStep {
    pub pos: usize,
    pub mark: Mark,
}

impl RemoveNodeMarkStep {
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNodeAt(self.pos))?;
        update_node_marks(doc, self.pos, self.mark.remove_from_set(node.marks()))
    }

    pub fn invert(&self, doc: &Node) -> Step {
        match doc.node_at(self.pos) {
            Some(node) if self.mark.is_in_set(node.marks()) => {
                Step::AddNodeMark(AddNodeMarkStep { pos: self.pos, mark: self.mark.clone() })
            }
            _ => Step::RemoveNodeMark(self.clone()),
        }
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<RemoveNodeMarkStep> {
        let pos = mapping.map_result(self.pos, 1);
        if pos.deleted_after() {
            None
        } else {
            Some(RemoveNodeMarkStep { pos: pos.pos, mark: self.mark.clone() })
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "stepType": "removeNodeMark",
            "pos": self.pos,
            "mark": self.mark.to_json(),
        })
    }

    pub fn from_json(schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        Ok(Step::RemoveNodeMark(RemoveNodeMarkStep {
            pos: json_usize(json, "pos", "RemoveNodeMarkStep")?,
            mark: json_mark(schema, json, "RemoveNodeMarkStep")?,
        }))
    }
}
