use super::*;
use crate::layer::Specifier;

#[test]
fn sublayers_resolve_strongest_first() {
    let root = Layer::create_new("ls_root.usda").unwrap();
    let a = Layer::create_new("ls_a.usda").unwrap();
    let b = Layer::create_new("ls_b.usda").unwrap();
    let c = Layer::create_new("ls_c.usda").unwrap();
    root.set_sublayers(vec!["ls_a.usda".into(), "ls_b.usda".into()])
        .unwrap();
    a.set_sublayers(vec!["ls_c.usda".into()]).unwrap();

    let stack = LayerStack::build(Arc::clone(&root), None);
    let ids: Vec<&str> = stack.layers().iter().map(|l| l.identifier()).collect();
    assert_eq!(ids, ["ls_root.usda", "ls_a.usda", "ls_c.usda", "ls_b.usda"]);
    assert!(stack.contains(c.id()));
    assert!(stack.contains(b.id()));
    assert!(stack.diagnostics().is_empty());

    c.create_prim_spec(&Path::new("/deep").unwrap(), Specifier::Def, "")
        .unwrap();
    assert!(stack.has_spec(&Path::new("/deep").unwrap()));
}

#[test]
fn session_layer_is_strongest() {
    let root = Layer::create_anonymous("root");
    let session = Layer::create_anonymous("session");
    let stack = LayerStack::build(Arc::clone(&root), Some(Arc::clone(&session)));
    assert_eq!(stack.layers()[0].id(), session.id());
    assert_eq!(stack.root_layer().id(), root.id());
}

#[test]
fn missing_and_cyclic_sublayers_are_diagnosed() {
    let x = Layer::create_new("ls_cycle_x.usda").unwrap();
    let y = Layer::create_new("ls_cycle_y.usda").unwrap();
    x.set_sublayers(vec!["ls_cycle_y.usda".into(), "ls_missing.usda".into()])
        .unwrap();
    y.set_sublayers(vec!["ls_cycle_x.usda".into()]).unwrap();

    let stack = LayerStack::build(Arc::clone(&x), None);
    assert_eq!(stack.layers().len(), 2);
    let kinds: Vec<CompositionErrorKind> = stack.diagnostics().iter().map(|d| d.kind).collect();
    assert!(kinds.contains(&CompositionErrorKind::SublayerCycle));
    assert!(kinds.contains(&CompositionErrorKind::UnresolvedLayer));
}
