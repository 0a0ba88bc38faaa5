use super::*;

fn noop(_: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
    Ok(Element::Empty)
}

fn other(_: &mut Hooks<'_>, _: &Props) -> Result<Element, ComponentError> {
    Ok(Element::Empty)
}

#[test]
fn children_fold_by_count() {
    assert!(Props::new().children_element().is_empty());
    assert!(matches!(
        Props::new().child("hi").children_element(),
        Element::Text(text) if &*text == "hi"
    ));
    let many = Props::new().child("a").child("b").children_element();
    assert!(matches!(many, Element::List(items) if items.len() == 2));
}

#[test]
fn props_clones_share_identity() {
    let props = Props::new().attr("id", "x");
    let clone = props.clone();
    assert!(props.ptr_eq(&clone));
    assert!(!props.ptr_eq(&Props::new().attr("id", "x")));

    let extended = clone.attr("class", "y");
    assert!(!props.ptr_eq(&extended));
    assert_eq!(props.get("class"), None);
    assert_eq!(extended.get_str("class"), Some("y"));
}

#[test]
fn component_identity_follows_the_function_type() {
    let a = ComponentType::new(noop);
    let b = ComponentType::new(noop);
    let c = ComponentType::new(other);
    assert!(a.same_type(&b));
    assert!(!a.same_type(&c));
    assert!(a.name().ends_with("noop"));
}

#[test]
fn keys_hash_stably_and_skip_text() {
    let first = h("li", Props::new()).with_key("row-1");
    let again = h("li", Props::new()).with_key("row-1");
    let second = h("li", Props::new()).with_key("row-2");
    assert_eq!(first.key(), again.key());
    assert_ne!(first.key(), second.key());
    assert_eq!(text("t").with_key(&1).key(), None);
}

#[test]
fn any_values_compare_by_identity() {
    let callback = PropValue::any(|| 1);
    assert_eq!(callback, callback.clone());
    assert_ne!(callback, PropValue::any(|| 1));
    assert_eq!(PropValue::from(3), PropValue::Int(3));
    assert_eq!(callback.to_markup(), None);
}

#[test]
fn booleans_and_unit_become_empty() {
    assert!(Element::from(true).is_empty());
    assert!(Element::from(false).is_empty());
    assert!(Element::from(()).is_empty());
    let children = Props::new().child("a").child(false).children_element();
    assert!(matches!(children, Element::List(items) if items.len() == 2 && items[1].is_empty()));
}

#[test]
fn oversized_counts_saturate() {
    assert_eq!(PropValue::from(7usize), PropValue::Int(7));
    #[cfg(target_pointer_width = "64")]
    assert_eq!(PropValue::from(usize::MAX), PropValue::Int(i64::MAX));
}
