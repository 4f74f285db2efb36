use super::*;
use crate::layer::{ListOp, Reference};
use std::sync::Mutex as StdMutex;

fn p(s: &str) -> Path {
    Path::new(s).unwrap()
}

fn stage() -> Stage {
    Stage::create_in_memory(StageOpts::default()).unwrap()
}

fn names(prims: &[Prim]) -> Vec<String> {
    prims.iter().map(|prim| prim.path().to_string()).collect()
}

#[test]
fn open_rejects_invalid_options() {
    let opts = StageOpts {
        max_composition_depth: 0,
        ..StageOpts::default()
    };
    let err = Stage::create_in_memory(opts).unwrap_err();
    assert!(matches!(err, StageError::Validation(_)));
}

#[test]
fn stages_have_distinct_identities() {
    let a = stage();
    let b = stage();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.clone(), a);
    assert_ne!(a, b);
}

#[test]
fn define_prim_defines_missing_ancestors() {
    let stage = stage();
    let prim = stage.define_prim(&p("/a/b/c"), "Xform").unwrap();
    assert_eq!(prim.type_name(), "Xform");
    for path in ["/a", "/a/b", "/a/b/c"] {
        let prim = stage.get_prim_at_path(&p(path)).unwrap();
        assert!(prim.is_defined(), "{path} should be defined");
    }
    assert!(stage.get_prim_at_path(&p("/a/b/missing")).is_none());
    assert!(stage.define_prim(&Path::absolute_root(), "").is_err());
    assert!(stage.define_prim(&p("/a.attr"), "").is_err());
}

#[test]
fn override_prim_reuses_existing_prims() {
    let stage = stage();
    stage.define_prim(&p("/foo"), "Scope").unwrap();
    let same = stage.override_prim(&p("/foo")).unwrap();
    assert_eq!(same.specifier(), Some(Specifier::Def));

    let over = stage.override_prim(&p("/bar")).unwrap();
    assert_eq!(over.specifier(), Some(Specifier::Over));
    assert!(!over.is_defined());
    assert!(over.is_valid());
}

#[test]
fn class_prims_live_at_the_root() {
    let stage = stage();
    let cls = stage.create_class_prim(&p("/cls")).unwrap();
    assert!(cls.is_abstract());
    let err = stage.create_class_prim(&p("/cls/nested")).unwrap_err();
    assert!(matches!(err, StageError::Coding(_)));
}

#[test]
fn remove_prim_drops_the_edit_target_spec() {
    let stage = stage();
    stage.define_prim(&p("/foo/bar"), "").unwrap();
    assert!(stage.remove_prim(&p("/foo")).unwrap());
    assert!(stage.get_prim_at_path(&p("/foo")).is_none());
    assert!(stage.get_prim_at_path(&p("/foo/bar")).is_none());
    assert!(!stage.remove_prim(&p("/foo")).unwrap());
}

#[test]
fn traverse_prunes_inactive_undefined_and_abstract_subtrees() {
    let stage = stage();
    for path in ["/a/child", "/b/child", "/d"] {
        stage.define_prim(&p(path), "").unwrap();
    }
    stage.override_prim(&p("/c/child")).unwrap();
    stage.create_class_prim(&p("/cls")).unwrap();
    stage
        .get_prim_at_path(&p("/b"))
        .unwrap()
        .set_active(false)
        .unwrap();

    assert_eq!(names(&stage.traverse()), ["/a", "/a/child", "/d"]);
    assert_eq!(
        names(&stage.traverse_all()),
        ["/a", "/a/child", "/b", "/d", "/c", "/c/child", "/cls"]
    );
    assert!(stage.get_prim_at_path(&p("/b/child")).is_none());
}

#[test]
fn subscribers_get_one_notice_per_block() {
    let stage = stage();
    let foo = stage.define_prim(&p("/foo"), "").unwrap();
    let seen: Arc<StdMutex<Vec<ObjectsChanged>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let id = stage.subscribe(move |n| sink.lock().unwrap().push(n.clone()));

    {
        let _block = ChangeBlock::new();
        foo.set_type_name("Scope").unwrap();
        foo.set_metadata(fields::DOCUMENTATION, "doc").unwrap();
    }
    {
        let notices = seen.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].stage_id(), stage.id());
        assert_eq!(notices[0].resynced_paths(), &[p("/foo")]);
        assert!(notices[0].changed_info_only_paths().is_empty());
    }

    assert!(stage.unsubscribe(id));
    assert!(!stage.unsubscribe(id));
    foo.set_metadata(fields::DOCUMENTATION, "again").unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn edit_target_must_be_in_the_layer_stack() {
    let root = Layer::create_anonymous("stage_edit_root");
    let sub = Layer::create_new("stage_edit_sub.usda").unwrap();
    root.set_sublayers(vec!["stage_edit_sub.usda".into()])
        .unwrap();
    let stage = Stage::open(Arc::clone(&root), StageOpts::default()).unwrap();
    assert_eq!(stage.layer_stack().layers().len(), 2);

    stage.set_edit_target(&sub).unwrap();
    stage.define_prim(&p("/foo"), "").unwrap();
    assert!(sub.has_spec(&p("/foo")));
    assert!(!root.has_spec(&p("/foo")));

    let stranger = Layer::create_anonymous("stage_edit_stranger");
    assert!(stage.set_edit_target(&stranger).is_err());
    assert_eq!(stage.edit_target().id(), sub.id());
}

#[test]
fn session_layer_is_strongest() {
    let opts = StageOpts {
        session_layer: true,
        ..StageOpts::default()
    };
    let stage = Stage::create_in_memory(opts).unwrap();
    let session = Arc::clone(stage.session_layer().unwrap());
    let foo = stage.define_prim(&p("/foo"), "").unwrap();
    foo.set_metadata(fields::DOCUMENTATION, "root").unwrap();

    stage.set_edit_target(&session).unwrap();
    foo.set_metadata(fields::DOCUMENTATION, "session").unwrap();
    assert_eq!(
        foo.get_metadata(fields::DOCUMENTATION),
        Some(Value::from("session"))
    );
    assert_eq!(stage.layer_stack().layers()[0].id(), session.id());
}

#[test]
fn sublayer_edits_rebuild_the_layer_stack() {
    let root = Layer::create_anonymous("stage_reshape_root");
    let late = Layer::create_new("stage_reshape_late.usda").unwrap();
    late.create_prim_spec(&p("/late"), Specifier::Def, "")
        .unwrap();
    let stage = Stage::open(Arc::clone(&root), StageOpts::default()).unwrap();
    assert!(stage.get_prim_at_path(&p("/late")).is_none());

    let seen: Arc<StdMutex<Vec<ObjectsChanged>>> = Arc::default();
    let sink = Arc::clone(&seen);
    stage.subscribe(move |n| sink.lock().unwrap().push(n.clone()));
    root.set_sublayers(vec!["stage_reshape_late.usda".into()])
        .unwrap();

    assert!(stage.get_prim_at_path(&p("/late")).is_some());
    assert_eq!(
        seen.lock().unwrap()[0].resynced_paths(),
        &[Path::absolute_root()]
    );

    // The new sublayer is watched too.
    late.set_field(&p("/late"), fields::DOCUMENTATION, "doc")
        .unwrap();
    assert_eq!(
        seen.lock().unwrap()[1].changed_info_only_paths(),
        &[p("/late")]
    );
}

#[test]
fn timing_metadata_falls_back_in_order() {
    let stage = stage();
    assert_eq!(stage.time_codes_per_second(), 24.0);
    assert_eq!(stage.frames_per_second(), 24.0);

    stage.set_frames_per_second(30.0).unwrap();
    assert_eq!(stage.time_codes_per_second(), 30.0);
    stage.set_time_codes_per_second(48.0).unwrap();
    assert_eq!(stage.time_codes_per_second(), 48.0);
    assert_eq!(stage.frames_per_second(), 30.0);
    assert!(stage.set_time_codes_per_second(0.0).is_err());

    let custom = Stage::create_in_memory(StageOpts {
        default_time_codes_per_second: 12.0,
        ..StageOpts::default()
    })
    .unwrap();
    assert_eq!(custom.frames_per_second(), 12.0);
}

#[test]
fn attribute_queries_by_path() {
    let stage = stage();
    stage.set_interpolation_type(InterpolationType::Held);
    assert_eq!(stage.interpolation_type(), InterpolationType::Held);

    let foo = stage.define_prim(&p("/foo"), "Mesh").unwrap();
    let attr = foo.create_attribute("size", "double").unwrap();
    attr.set(1.0, TimeCode::new(0.0)).unwrap();
    attr.set(3.0, TimeCode::new(10.0)).unwrap();

    assert_eq!(
        stage
            .get_attribute_value(&p("/foo.size"), TimeCode::new(5.0))
            .unwrap(),
        Some(Value::Double(1.0))
    );
    stage.set_interpolation_type(InterpolationType::Linear);
    assert_eq!(
        stage
            .get_attribute_value(&p("/foo.size"), TimeCode::new(5.0))
            .unwrap(),
        Some(Value::Double(2.0))
    );
    assert_eq!(
        stage
            .get_attribute_value(&p("/foo.visibility"), TimeCode::DEFAULT)
            .unwrap(),
        Some(Value::Token(Token::new("inherited")))
    );
    assert!(
        stage
            .get_attribute_value(&p("/foo"), TimeCode::DEFAULT)
            .is_err()
    );

    let rel = foo.create_relationship("material").unwrap();
    rel.add_target(p("/looks/red")).unwrap();
    assert_eq!(
        stage.get_relationship_targets(&p("/foo.material")).unwrap(),
        vec![p("/looks/red")]
    );
}

#[test]
fn prefetch_and_diagnostics() {
    let stage = stage();
    let root = Arc::clone(stage.root_layer());
    stage.define_prim(&p("/foo"), "").unwrap();
    stage.define_prim(&p("/bar"), "").unwrap();
    root.set_field(
        &p("/foo"),
        fields::REFERENCES,
        Value::ReferenceListOp(ListOp::prepended(vec![Reference::new(
            "stage_no_such_layer.usda",
            None,
        )])),
    )
    .unwrap();

    stage.prefetch(&[p("/foo"), p("/bar"), p("/foo/missing")]);
    let cache = stage.cache();
    assert!(cache.cached(&p("/bar")).is_some());
    assert!(cache.cached(&p("/foo/missing")).is_some());
    let diagnostics = stage.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].site, p("/foo"));
}

#[test]
fn dropping_the_stage_detaches_it_from_layers() {
    let root = Layer::create_anonymous("stage_drop");
    let stage = Stage::open(Arc::clone(&root), StageOpts::default()).unwrap();
    assert_eq!(root.listeners().len(), 1);
    drop(stage);
    assert!(root.listeners().is_empty());
}
