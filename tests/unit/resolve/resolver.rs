use super::*;
use crate::change::block::{ChangeListener, RawEdit};
use crate::compose::cache::ComposeOpts;
use crate::compose::{LayerStack, PrimIndexCache};
use crate::foundation::core::LayerOffset;
use crate::layer::SpecType;
use std::sync::Weak;

struct Quiet;

impl ChangeListener for Quiet {
    fn process_edits(&self, _edits: &[RawEdit]) {}
}

fn p(s: &str) -> Path {
    Path::new(s).unwrap()
}

fn cache_for(root: &Arc<Layer>) -> PrimIndexCache {
    let stack = Arc::new(LayerStack::build(Arc::clone(root), None));
    let quiet: Weak<dyn ChangeListener> = Weak::<Quiet>::new();
    PrimIndexCache::new(
        stack,
        ComposeOpts {
            max_depth: 64,
            variant_fallbacks: BTreeMap::new(),
        },
        quiet,
    )
}

fn def(layer: &Layer, path: &str) {
    layer
        .create_prim_spec(&p(path), Specifier::Def, "")
        .unwrap();
}

fn reference(layer: &Layer, from: &str, r: Reference) {
    layer
        .set_field(
            &p(from),
            fields::REFERENCES,
            Value::ReferenceListOp(ListOp::prepended(vec![r])),
        )
        .unwrap();
}

fn attr(layer: &Layer, path: &str) -> Token {
    let path = p(path);
    layer
        .create_property_spec(&path, SpecType::Attribute, "double")
        .unwrap();
    path.name().cloned().unwrap()
}

#[test]
fn direct_opinions_beat_inherited_ones() {
    let root = Layer::create_anonymous("res_strength");
    root.create_prim_spec(&p("/cls"), Specifier::Class, "")
        .unwrap();
    def(&root, "/foo");
    root.set_field(
        &p("/foo"),
        fields::INHERITS,
        Value::PathListOp(ListOp::prepended(vec![p("/cls")])),
    )
    .unwrap();
    root.set_field(&p("/cls"), fields::DOCUMENTATION, "from class")
        .unwrap();

    let cache = cache_for(&root);
    let index = cache.prim_index(&p("/foo"));
    assert_eq!(
        resolve_field(&index, None, fields::DOCUMENTATION),
        Some(Value::from("from class"))
    );

    root.set_field(&p("/foo"), fields::DOCUMENTATION, "own")
        .unwrap();
    assert_eq!(
        resolve_field(&index, None, fields::DOCUMENTATION),
        Some(Value::from("own"))
    );
}

#[test]
fn list_ops_apply_weakest_to_strongest() {
    let strong = Layer::create_anonymous("res_list_strong");
    let weak = Layer::create_new("res_list_weak.usda").unwrap();
    strong
        .set_sublayers(vec!["res_list_weak.usda".into()])
        .unwrap();
    def(&weak, "/foo");
    def(&strong, "/foo");
    weak.set_field(
        &p("/foo"),
        "tags",
        Value::TokenListOp(ListOp::prepended(vec![Token::new("a"), Token::new("b")])),
    )
    .unwrap();
    strong
        .set_field(
            &p("/foo"),
            "tags",
            Value::TokenListOp(ListOp {
                deleted: vec![Token::new("a")],
                appended: vec![Token::new("c")],
                ..ListOp::default()
            }),
        )
        .unwrap();

    let cache = cache_for(&strong);
    let index = cache.prim_index(&p("/foo"));
    assert_eq!(
        compose_list_op::<Token>(&index, None, "tags"),
        vec![Token::new("b"), Token::new("c")]
    );
    assert_eq!(
        get_value(
            &index,
            None,
            "tags",
            TimeCode::DEFAULT,
            InterpolationType::Held
        ),
        Some(Value::TokenArray(vec![Token::new("b"), Token::new("c")]))
    );
}

#[test]
fn dictionaries_merge_key_wise() {
    let root = Layer::create_anonymous("res_dict");
    root.create_prim_spec(&p("/cls"), Specifier::Class, "")
        .unwrap();
    def(&root, "/foo");
    root.set_field(
        &p("/foo"),
        fields::INHERITS,
        Value::PathListOp(ListOp::prepended(vec![p("/cls")])),
    )
    .unwrap();
    let dict = |pairs: &[(&str, i64)]| {
        Value::Dictionary(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::Int(*v)))
                .collect(),
        )
    };
    root.set_field(&p("/cls"), "customData", dict(&[("a", 1), ("b", 1)]))
        .unwrap();
    root.set_field(&p("/foo"), "customData", dict(&[("b", 2)]))
        .unwrap();

    let cache = cache_for(&root);
    let index = cache.prim_index(&p("/foo"));
    assert_eq!(
        resolve_field(&index, None, "customData"),
        Some(dict(&[("a", 1), ("b", 2)]))
    );
}

#[test]
fn samples_are_retimed_through_reference_offsets() {
    let root = Layer::create_anonymous("res_offset");
    let other = Layer::create_new("res_offset_target.usda").unwrap();
    def(&other, "/target");
    let name = attr(&other, "/target.size");
    other.set_time_sample(&p("/target.size"), 0.0, 0.0).unwrap();
    other
        .set_time_sample(&p("/target.size"), 10.0, 10.0)
        .unwrap();
    def(&root, "/foo");
    reference(
        &root,
        "/foo",
        Reference::new("res_offset_target.usda", Some(p("/target")))
            .with_layer_offset(LayerOffset::new(10.0, 2.0).unwrap()),
    );

    let cache = cache_for(&root);
    let index = cache.prim_index(&p("/foo"));
    let at = |t: f64, mode| get_value(&index, Some(&name), fields::DEFAULT, TimeCode::new(t), mode);
    assert_eq!(
        at(20.0, InterpolationType::Linear),
        Some(Value::Double(5.0))
    );
    assert_eq!(at(20.0, InterpolationType::Held), Some(Value::Double(0.0)));
    assert_eq!(
        at(100.0, InterpolationType::Linear),
        Some(Value::Double(10.0))
    );

    let samples = resolve_time_samples(&index, Some(&name)).unwrap();
    assert_eq!(samples.times(), vec![10.0, 30.0]);
    assert_eq!(
        get_bracketing_time_samples(&index, Some(&name), 15.0),
        Some((10.0, 30.0))
    );
    assert_eq!(
        get_bracketing_time_samples(&index, Some(&name), 0.0),
        Some((10.0, 10.0))
    );
}

#[test]
fn stronger_default_shadows_weaker_samples() {
    let root = Layer::create_anonymous("res_shadow");
    def(&root, "/target");
    let name = attr(&root, "/target.size");
    root.set_time_sample(&p("/target.size"), 1.0, 1.0).unwrap();
    def(&root, "/foo");
    attr(&root, "/foo.size");
    root.set_field(&p("/foo.size"), fields::DEFAULT, 7.0)
        .unwrap();
    reference(&root, "/foo", Reference::internal(p("/target")));

    let cache = cache_for(&root);
    let index = cache.prim_index(&p("/foo"));
    assert_eq!(
        get_value(
            &index,
            Some(&name),
            fields::DEFAULT,
            TimeCode::new(1.0),
            InterpolationType::Linear
        ),
        Some(Value::Double(7.0))
    );
    assert!(resolve_time_samples(&index, Some(&name)).is_none());
    assert!(get_bracketing_time_samples(&index, Some(&name), 1.0).is_none());

    let target = cache.prim_index(&p("/target"));
    assert_eq!(
        get_value(
            &target,
            Some(&name),
            fields::DEFAULT,
            TimeCode::DEFAULT,
            InterpolationType::Linear
        ),
        None
    );
}

#[test]
fn children_union_then_prim_order() {
    let root = Layer::create_anonymous("res_children");
    for path in ["/target/y", "/target/x", "/foo/x", "/foo/z"] {
        def(&root, path);
    }
    reference(&root, "/foo", Reference::internal(p("/target")));
    let cache = cache_for(&root);
    let index = cache.prim_index(&p("/foo"));
    let names = |v: Vec<Token>| v.iter().map(|t| t.to_string()).collect::<Vec<_>>();
    assert_eq!(names(compose_children(&index)), ["x", "z", "y"]);

    root.set_field(
        &p("/foo"),
        fields::PRIM_ORDER,
        Value::TokenArray(vec![Token::new("y"), Token::new("x")]),
    )
    .unwrap();
    assert_eq!(names(compose_children(&index)), ["y", "x", "z"]);

    attr(&root, "/target.b");
    attr(&root, "/foo.a");
    assert_eq!(names(compose_properties(&index)), ["a", "b"]);
    assert_eq!(
        property_spec_type(&index, &Token::new("b")),
        Some(SpecType::Attribute)
    );
    assert_eq!(property_spec_type(&index, &Token::new("nope")), None);
}

#[test]
fn relationship_targets_map_into_the_stage() {
    let root = Layer::create_anonymous("res_rel");
    def(&root, "/target/child");
    def(&root, "/foo");
    let rel = p("/target.look");
    root.create_property_spec(&rel, SpecType::Relationship, "")
        .unwrap();
    root.set_field(
        &rel,
        fields::TARGET_PATHS,
        Value::PathListOp(ListOp::prepended(vec![p("/target/child"), p("/elsewhere")])),
    )
    .unwrap();
    root.create_property_spec(&p("/foo.look"), SpecType::Relationship, "")
        .unwrap();
    root.set_field(
        &p("/foo.look"),
        fields::TARGET_PATHS,
        Value::PathListOp(ListOp::prepended(vec![p("/bar")])),
    )
    .unwrap();
    reference(&root, "/foo", Reference::internal(p("/target")));

    let cache = cache_for(&root);
    let index = cache.prim_index(&p("/foo"));
    assert_eq!(
        relationship_targets(&index, &Token::new("look")),
        vec![p("/bar"), p("/foo/child")]
    );
    let target = cache.prim_index(&p("/target"));
    assert_eq!(
        relationship_targets(&target, &Token::new("look")),
        vec![p("/target/child"), p("/elsewhere")]
    );
}

#[test]
fn specifier_and_activation() {
    let root = Layer::create_anonymous("res_spec");
    def(&root, "/target");
    root.create_prim_spec(&p("/foo"), Specifier::Over, "")
        .unwrap();
    root.create_prim_spec(&p("/bare"), Specifier::Over, "")
        .unwrap();
    root.create_prim_spec(&p("/cls"), Specifier::Class, "Xform")
        .unwrap();
    reference(&root, "/foo", Reference::internal(p("/target")));

    let cache = cache_for(&root);
    let foo = cache.prim_index(&p("/foo"));
    assert_eq!(resolve_specifier(&foo), Some(Specifier::Def));
    assert!(is_defined(&foo));
    assert!(is_active(&foo));

    let bare = cache.prim_index(&p("/bare"));
    assert_eq!(resolve_specifier(&bare), Some(Specifier::Over));
    assert!(!is_defined(&bare));

    let cls = cache.prim_index(&p("/cls"));
    assert!(is_abstract(&cls));
    assert_eq!(type_name(&cls), "Xform");

    assert_eq!(resolve_specifier(&cache.prim_index(&p("/missing"))), None);

    root.set_field(&p("/foo"), fields::ACTIVE, false).unwrap();
    assert!(!is_active(&foo));
}

#[test]
fn variant_selection_comes_from_the_strongest_opinion() {
    let root = Layer::create_anonymous("res_vsel");
    def(&root, "/foo");
    root.create_variant_spec(&p("/foo"), "look", "red").unwrap();
    root.set_field(
        &p("/foo"),
        fields::VARIANT_SELECTION,
        Value::Dictionary(BTreeMap::from([("look".to_string(), Value::from("red"))])),
    )
    .unwrap();
    root.set_field(&p("/foo{look=red}"), fields::DOCUMENTATION, "red doc")
        .unwrap();

    let cache = cache_for(&root);
    let index = cache.prim_index(&p("/foo"));
    assert_eq!(variant_selection(&index, "look"), Some("red".to_string()));
    assert_eq!(variant_selection(&index, "other"), None);
    assert_eq!(
        resolve_field(&index, None, fields::DOCUMENTATION),
        Some(Value::from("red doc"))
    );
}
