use super::*;
use crate::foundation::core::{InterpolationType, LayerOffset};
use crate::stage::StageOpts;

fn p(s: &str) -> Path {
    Path::new(s).unwrap()
}

fn stage() -> Stage {
    Stage::create_in_memory(StageOpts::default()).unwrap()
}

fn tokens(items: &[&str]) -> Vec<Token> {
    items.iter().map(|s| Token::new(s)).collect()
}

#[test]
fn handles_report_namespace_and_validity() {
    let stage = stage();
    let bar = stage.define_prim(&p("/foo/bar"), "").unwrap();
    assert_eq!(bar.name(), "bar");
    assert_eq!(bar.parent().unwrap().path(), &p("/foo"));
    assert!(stage.pseudo_root().is_pseudo_root());
    assert_eq!(stage.pseudo_root().name(), "");
    assert!(stage.pseudo_root().parent().is_none());

    stage.remove_prim(&p("/foo")).unwrap();
    assert!(!bar.is_valid());
    let err = bar.set_active(false).unwrap_err();
    assert!(matches!(err, StageError::Coding(_)));
    assert!(stage.pseudo_root().set_metadata("comment", "x").is_err());
}

#[test]
fn children_follow_composition_and_activation() {
    let stage = stage();
    for path in ["/root/a", "/root/b", "/root/c"] {
        stage.define_prim(&p(path), "").unwrap();
    }
    let root = stage.get_prim_at_path(&p("/root")).unwrap();
    root.child("b").unwrap().set_active(false).unwrap();

    let names = |prims: Vec<Prim>| {
        prims
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(root.children()), ["a", "c"]);
    assert_eq!(names(root.all_children()), ["a", "b", "c"]);
    assert!(root.child("missing").is_none());

    root.set_metadata(fields::PRIM_ORDER, Value::TokenArray(tokens(&["c", "a"])))
        .unwrap();
    assert_eq!(names(root.all_children()), ["c", "a", "b"]);

    root.set_active(false).unwrap();
    assert!(root.all_children().is_empty());
}

#[test]
fn type_names_drive_schema_kinds() {
    let stage = stage();
    let prim = stage.define_prim(&p("/geo"), "Mesh").unwrap();
    assert_eq!(prim.schema_kind(), SchemaKind::Mesh);
    assert!(prim.is_a(SchemaFamily::PointBased));

    prim.set_type_name("Xform").unwrap();
    assert_eq!(prim.schema_kind(), SchemaKind::Xform);
    assert!(!prim.is_a(SchemaFamily::Gprim));

    prim.set_type_name("").unwrap();
    assert_eq!(prim.schema_kind(), SchemaKind::Untyped);
    assert_eq!(prim.type_name(), "");
}

#[test]
fn metadata_round_trips_through_the_edit_target() {
    let stage = stage();
    let prim = stage.define_prim(&p("/foo"), "").unwrap();
    prim.set_metadata(fields::DOCUMENTATION, "hello").unwrap();
    assert_eq!(
        prim.get_metadata(fields::DOCUMENTATION),
        Some(Value::from("hello"))
    );
    assert!(prim.clear_metadata(fields::DOCUMENTATION).unwrap());
    assert!(!prim.clear_metadata(fields::DOCUMENTATION).unwrap());
    assert_eq!(prim.get_metadata(fields::DOCUMENTATION), None);

    for reserved in [
        fields::DEFAULT,
        fields::PRIM_CHILDREN,
        fields::SPECIFIER,
        "",
    ] {
        assert!(prim.set_metadata(reserved, 1i64).is_err(), "{reserved}");
    }
}

#[test]
fn reference_editor_composes_targets() {
    let stage = stage();
    let target = stage.define_prim(&p("/target"), "").unwrap();
    target
        .create_attribute("size", "double")
        .unwrap()
        .set(4.0, TimeCode::DEFAULT)
        .unwrap();
    let foo = stage.define_prim(&p("/foo"), "").unwrap();

    let refs = foo.references();
    assert!(!refs.has_authored());
    refs.add_internal_reference(p("/target")).unwrap();
    assert!(refs.has_authored());
    assert_eq!(
        foo.get_attribute("size").get(TimeCode::DEFAULT),
        Some(Value::Double(4.0))
    );

    let authored = refs.authored().unwrap();
    assert_eq!(authored.prepended, vec![Reference::internal(p("/target"))]);

    refs.remove(&Reference::internal(p("/target"))).unwrap();
    assert_eq!(foo.get_attribute("size").get(TimeCode::DEFAULT), None);
    assert!(refs.clear().unwrap());
    assert!(refs.authored().is_none());
}

#[test]
fn reference_editor_targets_other_layers() {
    let other = Layer::create_new("prim_refs_other.usda").unwrap();
    other
        .create_prim_spec(&p("/model"), Specifier::Def, "Xform")
        .unwrap();
    other.set_default_prim("model").unwrap();

    let stage = stage();
    let foo = stage.define_prim(&p("/foo"), "").unwrap();
    foo.references()
        .add_reference("prim_refs_other.usda", None)
        .unwrap();
    assert_eq!(foo.type_name(), "Xform");

    foo.references()
        .set(vec![
            Reference::new("prim_refs_other.usda", Some(p("/model")))
                .with_layer_offset(LayerOffset::new(5.0, 1.0).unwrap()),
        ])
        .unwrap();
    assert!(foo.references().authored().unwrap().is_explicit());
    assert_eq!(foo.type_name(), "Xform");
}

#[test]
fn inherit_and_specialize_editors() {
    let stage = stage();
    let cls = stage.create_class_prim(&p("/cls")).unwrap();
    cls.set_metadata(fields::DOCUMENTATION, "class doc")
        .unwrap();
    let base = stage.define_prim(&p("/base"), "").unwrap();
    base.set_metadata(fields::COMMENT, "base comment").unwrap();

    let foo = stage.define_prim(&p("/foo"), "").unwrap();
    foo.inherits()
        .add(p("/cls"), ListPosition::BackOfAppendList)
        .unwrap();
    foo.specializes()
        .add(p("/base"), ListPosition::default())
        .unwrap();
    assert_eq!(
        foo.get_metadata(fields::DOCUMENTATION),
        Some(Value::from("class doc"))
    );
    assert_eq!(
        foo.get_metadata(fields::COMMENT),
        Some(Value::from("base comment"))
    );
    assert_eq!(
        foo.get_metadata(fields::INHERITS),
        Some(Value::PathArray(vec![p("/cls")]))
    );
    assert_eq!(foo.inherits().prim().path(), &p("/foo"));
}

#[test]
fn variant_sets_select_opinions() {
    let stage = stage();
    let foo = stage.define_prim(&p("/foo"), "").unwrap();
    let sets = foo.variant_sets();
    sets.add_variant_set("look").unwrap();
    sets.add_variant_set("look").unwrap();
    assert_eq!(sets.names(), ["look"]);
    assert!(sets.add_variant_set("").is_err());

    let red = sets.add_variant("look", "red").unwrap();
    sets.add_variant("look", "blue").unwrap();
    sets.add_variant("lod", "high").unwrap();
    assert!(sets.has_variant_set("lod"));
    assert_eq!(sets.variant_names("look"), ["blue", "red"]);

    stage
        .edit_target()
        .set_field(&red, fields::DOCUMENTATION, "red doc")
        .unwrap();
    assert_eq!(foo.get_metadata(fields::DOCUMENTATION), None);

    sets.set_selection("look", "red").unwrap();
    sets.set_selection("lod", "high").unwrap();
    assert_eq!(sets.selection("look").as_deref(), Some("red"));
    assert_eq!(sets.selection("lod").as_deref(), Some("high"));
    assert_eq!(
        foo.get_metadata(fields::DOCUMENTATION),
        Some(Value::from("red doc"))
    );
}

#[test]
fn attributes_resolve_values_samples_and_fallbacks() {
    let stage = stage();
    let mesh = stage.define_prim(&p("/mesh"), "Mesh").unwrap();

    let scheme = mesh.get_attribute("subdivisionScheme");
    assert!(scheme.is_valid());
    assert!(scheme.has_value());
    assert!(!scheme.has_authored_value());
    assert_eq!(scheme.type_name(), Some(Token::new("token")));
    assert_eq!(
        scheme.get(TimeCode::DEFAULT),
        Some(Value::Token(Token::new("catmullClark")))
    );
    scheme.set(Token::new("none"), TimeCode::DEFAULT).unwrap();
    assert_eq!(
        scheme.get(TimeCode::DEFAULT),
        Some(Value::Token(Token::new("none")))
    );
    assert!(scheme.has_authored_value());

    let missing = mesh.get_attribute("nope");
    assert!(!missing.is_valid());
    assert!(!missing.has_value());
    assert_eq!(missing.get(TimeCode::new(1.0)), None);

    let size = mesh.create_attribute("size", "double").unwrap();
    assert_eq!(size.path(), Some(p("/mesh.size")));
    assert_eq!(size.type_name(), Some(Token::new("double")));
    assert!(!size.value_might_be_time_varying());
    size.set(0.0, TimeCode::new(0.0)).unwrap();
    size.set(10.0, TimeCode::new(10.0)).unwrap();
    assert_eq!(size.time_samples(), vec![0.0, 10.0]);
    assert!(size.value_might_be_time_varying());
    assert_eq!(size.get_bracketing_time_samples(4.0), Some((0.0, 10.0)));
    assert_eq!(size.get(TimeCode::new(4.0)), Some(Value::Double(4.0)));
    stage.set_interpolation_type(InterpolationType::Held);
    assert_eq!(size.get(TimeCode::new(4.0)), Some(Value::Double(0.0)));

    size.set_metadata(fields::INTERPOLATION, Token::new("vertex"))
        .unwrap();
    assert_eq!(
        size.get_metadata(fields::INTERPOLATION),
        Some(Value::Token(Token::new("vertex")))
    );

    assert!(size.clear().unwrap());
    assert!(!size.has_authored_value());
    assert!(size.time_samples().is_empty());
    assert_eq!(
        mesh.property_names(),
        [Token::new("subdivisionScheme"), Token::new("size")]
    );
}

#[test]
fn relationships_edit_target_lists() {
    let stage = stage();
    let foo = stage.define_prim(&p("/foo"), "").unwrap();
    let rel = foo.get_relationship("look");
    assert!(!rel.is_valid());
    assert!(rel.targets().is_empty());

    rel.add_target(p("/a")).unwrap();
    rel.add_target(p("/b")).unwrap();
    assert!(rel.is_valid());
    assert_eq!(rel.targets(), vec![p("/a"), p("/b")]);

    rel.remove_target(&p("/a")).unwrap();
    assert_eq!(rel.targets(), vec![p("/b")]);

    rel.set_targets(vec![p("/c"), p("/a")]).unwrap();
    assert_eq!(rel.targets(), vec![p("/c"), p("/a")]);

    assert!(rel.clear_targets().unwrap());
    assert!(rel.targets().is_empty());
    assert_eq!(rel.name(), "look");
    assert_eq!(rel.prim().path(), &p("/foo"));

    let created = foo.create_relationship("other").unwrap();
    assert!(created.is_valid());
    assert!(created.targets().is_empty());
}
