//! Cross-cutting document-tree invariants: size algebra, slicing,
//! replacing, resolution and JSON round trips over a matrix of positions.

mod common;

use common::{doc_of, para, rich_schema};
use vellum_model::{Node, Slice};

#[test]
fn cut_size_matrix() {
    let schema = rich_schema();
    let doc = doc_of(&schema, &["one", "two", ""]);
    let content = doc.content();
    for from in 0..=content.size() {
        for to in from..=content.size() {
            let cut = content.cut(from, to);
            assert_eq!(cut.size(), to - from, "cut({from},{to})");
        }
    }
    assert_eq!(content.cut(0, content.size()), *content);
}

#[test]
fn slice_and_replace_identity_matrix() {
    let schema = rich_schema();
    let doc = doc_of(&schema, &["abc", "def"]);
    // Cutting any range out and splicing it back in restores the doc.
    for from in 0..=doc.content().size() {
        for to in from..=doc.content().size() {
            let slice = doc.slice(from, to, false).unwrap();
            assert_eq!(slice.size(), to - from, "slice({from},{to})");
            let restored = doc.replace(from, to, &slice);
            match restored {
                Ok(d) => assert_eq!(d, doc, "replace({from},{to})"),
                Err(e) => panic!("replace({from},{to}) failed: {e}"),
            }
        }
    }
}

#[test]
fn resolved_positions_agree_with_node_at() {
    let schema = rich_schema();
    let quote = schema
        .node("blockquote", None, vec![para(&schema, "in")], Vec::new())
        .unwrap();
    let doc = schema
        .node("doc", None, vec![para(&schema, "ab"), quote], Vec::new())
        .unwrap();
    for pos in 0..doc.content().size() {
        let rpos = doc.resolve(pos).unwrap();
        assert!(rpos.depth() <= 2);
        assert_eq!(rpos.pos(), pos);
        let end = rpos.end(rpos.depth());
        let start = rpos.start(rpos.depth());
        assert!(start <= pos && pos <= end, "pos {pos} inside {start}..{end}");
        if let Some(after) = rpos.node_after() {
            assert_eq!(
                doc.node_at(pos).map(|n| n.node_type().name().to_string()),
                Some(after.node_type().name().to_string()),
                "node at {pos}"
            );
        }
    }
}

#[test]
fn json_round_trip_matrix() {
    let schema = rich_schema();
    let strong = schema.mark("strong", None).unwrap();
    let em = schema.mark("em", None).unwrap();
    let docs = vec![
        doc_of(&schema, &[""]),
        doc_of(&schema, &["plain"]),
        schema
            .node(
                "doc",
                None,
                vec![
                    schema
                        .node(
                            "paragraph",
                            None,
                            vec![
                                schema.text("a"),
                                schema.text_with_marks("b", vec![em.clone(), strong.clone()]),
                            ],
                            Vec::new(),
                        )
                        .unwrap(),
                    schema.node("horizontal_rule", None, Vec::<Node>::new(), Vec::new()).unwrap(),
                ],
                Vec::new(),
            )
            .unwrap(),
    ];
    for doc in docs {
        let back = Node::from_json(&schema, &doc.to_json()).unwrap();
        assert_eq!(back, doc);
        back.check().unwrap();
    }
    // Slices round-trip with their open depths.
    let doc = doc_of(&schema, &["abc", "def"]);
    for (from, to) in [(1, 3), (2, 6), (0, 8), (4, 4)] {
        let slice = doc.slice(from, to, false).unwrap();
        assert_eq!(Slice::from_json(&schema, &slice.to_json()).unwrap(), slice);
    }
}

#[test]
fn diff_positions_bound_minimal_patches() {
    let schema = rich_schema();
    let a = doc_of(&schema, &["hello", "world"]);
    let b = doc_of(&schema, &["hello", "wood"]);
    let start = a.content().find_diff_start(b.content(), 0).unwrap();
    let (end_a, end_b) = a
        .content()
        .find_diff_end(b.content(), a.content().size(), b.content().size())
        .unwrap();
    // "wo" prefix and "d" suffix are shared.
    assert_eq!(start, 10);
    assert_eq!(end_a, 12);
    assert_eq!(end_b, 11);
    // Replacing the diff range of `a` with that of `b` yields `b`.
    let patch = b.slice(start, end_b, false).unwrap();
    assert_eq!(a.replace(start, end_a, &patch).unwrap(), b);
}

#[test]
fn deep_check_validates_whole_tree() {
    let schema = rich_schema();
    let li = schema
        .node("list_item", None, vec![para(&schema, "x")], Vec::new())
        .unwrap();
    let list = schema.node("bullet_list", None, vec![li], Vec::new()).unwrap();
    let doc = schema.node("doc", None, vec![list], Vec::new()).unwrap();
    doc.check().unwrap();
    assert_eq!(doc.text_content(), "x");
}
