use super::*;

#[test]
fn equal_text_shares_allocation() {
    let a = Token::new("points");
    let b = Token::new("points");
    assert_eq!(a, b);
    assert!(Arc::ptr_eq(&a.0, &b.0));
    assert_ne!(a, Token::new("velocities"));
}

#[test]
fn compares_with_str_and_orders_by_text() {
    let t = Token::new(fields::TYPE_NAME);
    assert!(t == "typeName");
    let mut v = vec![Token::new("b"), Token::new("a"), Token::new("c")];
    v.sort();
    let names: Vec<&str> = v.iter().map(Token::as_str).collect();
    assert_eq!(names, ["a", "b", "c"]);
}

#[test]
fn serde_uses_plain_strings() {
    let t = Token::new("Scope");
    let s = serde_json::to_string(&t).unwrap();
    assert_eq!(s, "\"Scope\"");
    let back: Token = serde_json::from_str(&s).unwrap();
    assert_eq!(back, t);
}
