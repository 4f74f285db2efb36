use super::*;

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn explicit_replaces_weaker_items() {
    let mut cur = names(&["a", "b"]);
    ListOp::explicit(names(&["c", "c", "d"])).apply(&mut cur);
    assert_eq!(cur, names(&["c", "d"]));
}

#[test]
fn delete_then_prepend_then_append() {
    let mut cur = names(&["a", "b", "c"]);
    let op = ListOp {
        deleted: names(&["b"]),
        prepended: names(&["c", "x"]),
        appended: names(&["a"]),
        ..ListOp::default()
    };
    op.apply(&mut cur);
    assert_eq!(cur, names(&["c", "x", "a"]));
}

#[test]
fn added_items_are_not_duplicated() {
    let mut cur = names(&["a"]);
    let op = ListOp {
        added: names(&["a", "b"]),
        ..ListOp::default()
    };
    op.apply(&mut cur);
    assert_eq!(cur, names(&["a", "b"]));
}

#[test]
fn reorder_moves_unlisted_items_with_their_predecessor() {
    let mut cur = names(&["z", "a", "a1", "b", "b1"]);
    let op = ListOp {
        ordered: names(&["b", "a", "missing"]),
        ..ListOp::default()
    };
    op.apply(&mut cur);
    assert_eq!(cur, names(&["z", "b", "b1", "a", "a1"]));
}

#[test]
fn editor_positions_set_relative_strength() {
    let mut op: ListOp<String> = ListOp::default();
    op.add("t1".into(), ListPosition::FrontOfPrependList);
    op.add("t2".into(), ListPosition::FrontOfPrependList);
    assert_eq!(op.applied(), names(&["t2", "t1"]));

    let mut op: ListOp<String> = ListOp::default();
    op.add("t1".into(), ListPosition::BackOfAppendList);
    op.add("t2".into(), ListPosition::BackOfAppendList);
    assert_eq!(op.applied(), names(&["t1", "t2"]));
}

#[test]
fn remove_records_a_delete_unless_explicit() {
    let mut op = ListOp::prepended(names(&["a", "b"]));
    op.remove(&"a".to_string());
    assert_eq!(op.prepended, names(&["b"]));
    assert_eq!(op.deleted, names(&["a"]));

    let mut ex = ListOp::explicit(names(&["a", "b"]));
    ex.remove(&"a".to_string());
    assert_eq!(ex.explicit, Some(names(&["b"])));
    assert!(ex.deleted.is_empty());

    ex.clear();
    assert!(ex.is_empty());
    assert!(!ex.is_explicit());
}

#[test]
fn reference_defaults() {
    let r = Reference::internal(Path::new("/cls").unwrap());
    assert!(r.is_internal());
    assert!(r.layer_offset.is_identity());
    let json = serde_json::to_string(&r).unwrap();
    let back: Reference = serde_json::from_str(&json).unwrap();
    assert_eq!(back, r);
}

#[test]
fn shorthand_editors_and_item_mapping() {
    let mut op: ListOp<String> = ListOp::default();
    op.prepend("a".to_string());
    op.append("z".to_string());
    op.prepend("b".to_string());
    assert_eq!(op.applied(), names(&["a", "b", "z"]));

    let upper = op.filter_map_items(|s| (s != "z").then(|| s.to_uppercase()));
    assert_eq!(upper.prepended, names(&["A", "B"]));
    assert!(upper.appended.is_empty());
}
