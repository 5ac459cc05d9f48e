//! End-to-end transform scenarios: the split/join/mark/mapping behavior
//! the engine guarantees, exercised through the public surface.

mod common;

use common::{doc_of, para, rich_schema};
use serde_json::json;
use vellum_model::{Fragment, Node, Slice};
use vellum_transform::{
    can_split, AttrStep, DocAttrStep, MapRange, Mappable, Mapping, MarkFilter, ReplaceAroundStep,
    Step, StepMap, StepRegistry, Transform,
};

#[test]
fn splitting_two_empty_paragraphs_makes_three() {
    let schema = rich_schema();
    let doc = doc_of(&schema, &["", ""]);
    assert!(can_split(&doc, 1, 1, None));
    let mut tr = Transform::new(doc);
    tr.split(1, 1, None).unwrap();
    assert_eq!(tr.doc.child_count(), 3);
    assert_eq!(tr.doc, doc_of(&schema, &["", "", ""]));
}

#[test]
fn add_then_remove_mark_is_identity() {
    let schema = rich_schema();
    let doc = doc_of(&schema, &["hello"]);
    let strong = schema.mark("strong", None).unwrap();
    let mut tr = Transform::new(doc.clone());
    tr.add_mark(0, 5, &strong).unwrap();
    tr.remove_mark(0, 5, &MarkFilter::Mark(&strong)).unwrap();
    assert_eq!(tr.doc, doc);
}

#[test]
fn step_map_positions_around_a_replacement() {
    // A 3-token deletion replaced by a 1-token insertion at offset 5.
    let map = StepMap::new(vec![MapRange { start: 5, old_size: 3, new_size: 1 }]);
    assert_eq!(map.map(4, 1), 4);
    assert_eq!(map.map(9, 1), 7);
    let inside = map.map_result(6, 1);
    assert_eq!(inside.pos, 6);
    assert!(inside.deleted());
}

#[test]
fn replace_around_step_splits_a_list_item() {
    let schema = rich_schema();
    let li = schema
        .node(
            "list_item",
            None,
            vec![para(&schema, "a"), para(&schema, "b")],
            Vec::new(),
        )
        .unwrap();
    let list = schema.node("bullet_list", None, vec![li.clone()], Vec::new()).unwrap();
    let doc = schema.node("doc", None, vec![list], Vec::new()).unwrap();

    let empty_li = schema.node("list_item", None, Vec::<Node>::new(), Vec::new()).unwrap();
    let step = Step::ReplaceAround(ReplaceAroundStep {
        from: 5,
        to: 8,
        gap_from: 5,
        gap_to: 8,
        slice: Slice::new(Fragment::from_array(vec![empty_li.clone(), empty_li]), 1, 1),
        insert: 2,
        structure: true,
    });
    let mut tr = Transform::new(doc);
    tr.step(step).unwrap();
    let list = tr.doc.child(0);
    assert_eq!(list.child_count(), 2);
    let merged = list.child(0).content().append(list.child(1).content());
    assert_eq!(&merged, li.content());
}

#[test]
fn every_step_kind_inverts_cleanly() {
    let schema = rich_schema();
    let strong = schema.mark("strong", None).unwrap();
    let heading = schema
        .node(
            "doc",
            None,
            vec![
                schema
                    .node("heading", None, vec![schema.text("title")], Vec::new())
                    .unwrap(),
                para(&schema, "body"),
            ],
            Vec::new(),
        )
        .unwrap();

    let steps: Vec<Step> = vec![
        // Structural replace.
        {
            let mut tr = Transform::new(heading.clone());
            tr.delete(2, 5).unwrap();
            tr.steps[0].clone()
        },
        Step::AddMark(vellum_transform::AddMarkStep { from: 1, to: 6, mark: strong.clone() }),
        Step::Attr(AttrStep { pos: 0, attr: "level".into(), value: json!(3) }),
    ];
    for step in steps {
        let applied = step.apply(&heading).unwrap();
        let inverse = step.invert(&heading).unwrap();
        assert_eq!(inverse.apply(&applied).unwrap(), heading, "step {:?}", step.to_json());
    }
}

#[test]
fn mapping_composition_matches_sequential_step_maps() {
    let schema = rich_schema();
    let doc = doc_of(&schema, &["abcdef"]);
    let mut tr = Transform::new(doc);
    tr.delete(2, 4).unwrap();
    tr.insert(1, schema.text("xy")).unwrap();
    tr.delete(5, 6).unwrap();
    let maps: Vec<StepMap> = tr.steps.iter().map(|s| s.get_map()).collect();
    for pos in 0..=8 {
        let mut sequential = pos;
        for map in &maps {
            sequential = map.map(sequential, 1);
        }
        assert_eq!(tr.mapping.map(pos, 1), sequential, "position {pos}");
    }
}

#[test]
fn mirrored_inverse_restores_positions() {
    let schema = rich_schema();
    let doc = doc_of(&schema, &["abcd"]);
    let mut tr = Transform::new(doc.clone());
    tr.delete(1, 3).unwrap();
    let step = tr.steps[0].clone();
    let inverse = step.invert(&doc).unwrap();

    let mut mapping = Mapping::new();
    mapping.append_map(step.get_map());
    mapping.append_mirrored_map(inverse.get_map(), 0);
    for pos in 0..=doc.content().size() {
        assert_eq!(mapping.map(pos, 1), pos, "position {pos}");
    }
}

#[test]
fn steps_rebase_across_concurrent_edits() {
    let schema = rich_schema();
    let doc = doc_of(&schema, &["hello world"]);
    let strong = schema.mark("strong", None).unwrap();

    // Local edit: insert at the front. Remote edit (made against the same
    // base): embolden "world".
    let mut local = Transform::new(doc.clone());
    local.insert(1, schema.text(">> ")).unwrap();
    let remote = Step::AddMark(vellum_transform::AddMarkStep { from: 7, to: 12, mark: strong.clone() });

    // Rebase the remote step over the local mapping and apply.
    let rebased = remote.map(&local.mapping).unwrap();
    let mut tr = Transform::new(local.doc.clone());
    match &rebased {
        Step::AddMark(s) => {
            assert_eq!((s.from, s.to), (10, 15));
        }
        other => panic!("unexpected step {other:?}"),
    }
    tr.step(rebased).unwrap();
    assert!(tr.doc.range_has_mark(10, 15, &strong));
    assert_eq!(tr.doc.child(0).text_content(), ">> hello world");
}

#[test]
fn step_json_survives_registry_round_trip() {
    let schema = rich_schema();
    let registry = StepRegistry::with_defaults();
    let doc = doc_of(&schema, &["abc", "def"]);
    let mut tr = Transform::new(doc);
    tr.delete(2, 7).unwrap();
    tr.set_doc_attribute("stale", json!(false)).unwrap();
    tr.split(2, 1, None).unwrap();
    assert!(matches!(tr.steps[1], Step::DocAttr(DocAttrStep { .. })));
    for step in &tr.steps {
        let back = registry.step_from_json(&schema, &step.to_json()).unwrap();
        assert_eq!(&back, step);
    }
}
