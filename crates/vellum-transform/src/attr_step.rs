//! Attribute steps: update one attribute of a single node, or of the
//! document itself. Neither moves any positions.

use serde_json::Value;

use vellum_model::{Fragment, Node, Schema, Slice};

use crate::map::Mappable;
use crate::step::{from_replace, json_usize, Step, StepError, StepJsonError};

// ── AttrStep ──────────────────────────────────────────────────────────────

/// Set `attr` of the node at `pos` to `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrStep {
    pub pos: usize,
    pub attr: String,
    pub value: Value,
}

impl AttrStep {
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNodeAt(self.pos))?;
        let mut attrs = node.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        let updated = node
            .node_type()
            .create_with_marks(Some(attrs), Fragment::empty(), node.marks().to_vec())?;
        let open_end = if node.is_leaf() { 0 } else { 1 };
        from_replace(
            doc,
            self.pos,
            self.pos + 1,
            &Slice::new(Fragment::from(updated), 0, open_end),
        )
    }

    pub fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        let node = doc.node_at(self.pos).ok_or(StepError::NoNodeAt(self.pos))?;
        Ok(Step::Attr(AttrStep {
            pos: self.pos,
            attr: self.attr.clone(),
            value: node.attr(&self.attr).cloned().unwrap_or(Value::Null),
        }))
    }

    pub fn map(&self, mapping: &dyn Mappable) -> Option<AttrStep> {
        let pos = mapping.map_result(self.pos, 1);
        if pos.deleted_after() {
            None
        } else {
            Some(AttrStep { pos: pos.pos, attr: self.attr.clone(), value: self.value.clone() })
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "stepType": "attr",
            "pos": self.pos,
            "attr": self.attr,
            "value": self.value,
        })
    }

    pub fn from_json(_schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        let attr = json
            .get("attr")
            .and_then(Value::as_str)
            .ok_or(StepJsonError::Invalid("AttrStep"))?;
        Ok(Step::Attr(AttrStep {
            pos: json_usize(json, "pos", "AttrStep")?,
            attr: attr.to_string(),
            value: json.get("value").cloned().unwrap_or(Value::Null),
        }))
    }
}

// ── DocAttrStep ───────────────────────────────────────────────────────────

/// Set `attr` of the document's top node to `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocAttrStep {
    pub attr: String,
    pub value: Value,
}

impl DocAttrStep {
    pub fn apply(&self, doc: &Node) -> Result<Node, StepError> {
        let mut attrs = doc.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        let updated = doc.node_type().create_with_marks(
            Some(attrs),
            doc.content().clone(),
            doc.marks().to_vec(),
        )?;
        Ok(updated)
    }

    pub fn invert(&self, doc: &Node) -> Step {
        Step::DocAttr(DocAttrStep {
            attr: self.attr.clone(),
            value: doc.attr(&self.attr).cloned().unwrap_or(Value::Null),
        })
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "stepType": "docAttr",
            "attr": self.attr,
            "value": self.value,
        })
    }

    pub fn from_json(_schema: &Schema, json: &Value) -> Result<Step, StepJsonError> {
        let attr = json
            .get("attr")
            .and_then(Value::as_str)
            .ok_or(StepJsonError::Invalid("DocAttrStep"))?;
        Ok(Step::DocAttr(DocAttrStep {
            attr: attr.to_string(),
            value: json.get("value").cloned().unwrap_or(Value::Null),
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use vellum_model::Node;

    use crate::test_util::basic_schema;
    use super::*;

    fn doc_with_heading(schema: &vellum_model::Schema, level: i64) -> Node {
        schema
            .node(
                "doc",
                None,
                vec![schema
                    .node(
                        "heading",
                        Some(vellum_model::Attrs::from_iter([("level".to_string(), json!(level))])),
                        vec![schema.text("hi")],
                        Vec::new(),
                    )
                    .unwrap()],
                Vec::new(),
            )
            .unwrap()
    }

    #[test]
    fn attr_step_updates_and_inverts() {
        let schema = basic_schema();
        let doc = doc_with_heading(&schema, 1);
        let step = AttrStep { pos: 0, attr: "level".into(), value: json!(2) };
        let updated = step.apply(&doc).unwrap();
        assert_eq!(updated, doc_with_heading(&schema, 2));
        // Content is preserved through the open slice.
        assert_eq!(updated.child(0).text_content(), "hi");
        let inverse = step.invert(&doc).unwrap();
        assert_eq!(inverse.apply(&updated).unwrap(), doc);
    }

    #[test]
    fn attr_step_fails_without_node() {
        let schema = basic_schema();
        let doc = doc_with_heading(&schema, 1);
        let step = AttrStep { pos: 3, attr: "level".into(), value: json!(2) };
        assert!(matches!(step.apply(&doc), Err(StepError::NoNodeAt(3))));
    }
}
