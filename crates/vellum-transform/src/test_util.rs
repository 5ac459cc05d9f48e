//! Shared schema/document builders for this crate's tests.

use indexmap::IndexMap;
use serde_json::json;

use vellum_model::{AttrSpec, MarkSpec, Node, NodeSpec, Schema, SchemaSpec};

/// The same small rich-text schema the model crate tests with.
pub fn basic_schema() -> Schema {
    let mut nodes = IndexMap::new();
    nodes.insert(
        "doc".to_string(),
        NodeSpec { content: Some("block+".into()), ..Default::default() },
    );
    nodes.insert(
        "paragraph".to_string(),
        NodeSpec {
            content: Some("inline*".into()),
            group: Some("block".into()),
            ..Default::default()
        },
    );
    nodes.insert(
        "blockquote".to_string(),
        NodeSpec {
            content: Some("block+".into()),
            group: Some("block".into()),
            ..Default::default()
        },
    );
    nodes.insert(
        "heading".to_string(),
        NodeSpec {
            content: Some("inline*".into()),
            group: Some("block".into()),
            attrs: IndexMap::from_iter([(
                "level".to_string(),
                AttrSpec { default: Some(json!(1)), validate: None },
            )]),
            ..Default::default()
        },
    );
    nodes.insert(
        "horizontal_rule".to_string(),
        NodeSpec { group: Some("block".into()), ..Default::default() },
    );
    nodes.insert(
        "bullet_list".to_string(),
        NodeSpec {
            content: Some("list_item+".into()),
            group: Some("block".into()),
            ..Default::default()
        },
    );
    nodes.insert(
        "list_item".to_string(),
        NodeSpec { content: Some("paragraph+".into()), ..Default::default() },
    );
    nodes.insert(
        "text".to_string(),
        NodeSpec { inline: true, group: Some("inline".into()), ..Default::default() },
    );
    let mut marks = IndexMap::new();
    marks.insert("em".to_string(), MarkSpec::default());
    marks.insert("strong".to_string(), MarkSpec::default());
    marks.insert(
        "link".to_string(),
        MarkSpec {
            attrs: IndexMap::from_iter([(
                "href".to_string(),
                AttrSpec { default: None, validate: None },
            )]),
            inclusive: false,
            ..Default::default()
        },
    );
    marks.insert("code".to_string(), MarkSpec { excludes: Some("_".into()), ..Default::default() });
    Schema::new(SchemaSpec { nodes, marks, top_node: None }).expect("basic schema builds")
}

/// A doc of paragraphs, one per entry; an empty string makes an empty
/// paragraph.
pub fn doc_of(schema: &Schema, paragraphs: &[&str]) -> Node {
    let paras: Vec<Node> = paragraphs
        .iter()
        .map(|t| {
            let content: Vec<Node> = if t.is_empty() { Vec::new() } else { vec![schema.text(t)] };
            schema.node("paragraph", None, content, Vec::new()).expect("valid paragraph")
        })
        .collect();
    schema.node("doc", None, paras, Vec::new()).expect("valid doc")
}
