//! Cast, identity and null sentinel tests
//!
//! Tests for typed bindings and the host attribute protocol:
//! - Checked casts accept descendants and reject everything else
//! - The null sentinel never reaches native state
//! - Visibility decides what host attribute access can see
//!
//! Run with: `cargo test --test cast_test`

mod common;

use strata::{
    Binding, DefinitionError, Error, FieldDescriptor, NativeKind, NativeView, TypeBuilder, Value,
    cast_unchecked,
};

// ============================================================================
// Checked Casts
// ============================================================================

#[test]
fn test_upcast_succeeds_downcast_fails() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);

    let circle = Value::from(rt.instantiate(&shapes.circle, &[]).unwrap());
    let shape = Value::from(rt.instantiate(&shapes.shape, &[]).unwrap());

    let view = rt.cast(&circle, &Binding::new(&shapes.shape)).unwrap();
    assert!(view.object().unwrap().ptr_eq(circle.as_object().unwrap()));

    assert_eq!(
        rt.cast(&shape, &Binding::new(&shapes.circle)).unwrap_err(),
        Error::TypeMismatch {
            expected: "Circle".into(),
            found: "Shape".into(),
        }
    );
    assert!(matches!(
        rt.cast(&Value::Int(3), &Binding::new(&shapes.shape)),
        Err(Error::TypeMismatch { .. })
    ));
    // Siblings are unrelated.
    let square = Value::from(rt.instantiate(&shapes.square, &[]).unwrap());
    assert!(rt.cast(&square, &Binding::new(&shapes.circle)).is_err());
}

#[test]
fn test_null_binding_rules() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);

    assert!(matches!(
        rt.cast(&Value::Null, &Binding::new(&shapes.shape)),
        Err(Error::NullReference { .. })
    ));

    let view = rt
        .cast(&Value::Null, &Binding::nullable(&shapes.shape))
        .unwrap();
    assert!(view.is_null());
    assert!(view.to_value().is_null());
}

#[test]
fn test_unchecked_cast_and_upcast() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);
    let circle = Value::from(rt.instantiate(&shapes.circle, &[]).unwrap());

    // SAFETY: `circle` was just created as a Circle.
    let view = unsafe { cast_unchecked(&circle, &shapes.circle) };
    view.set("radius", Value::Float(5.0)).unwrap();

    let as_shape = view.upcast(&shapes.shape).unwrap();
    assert_eq!(as_shape.get("scale").unwrap(), Value::Float(1.0));
    assert!(as_shape.get("radius").is_err());
    assert!(as_shape.upcast(&shapes.circle).is_err());
}

#[test]
fn test_identity() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);

    let a = rt.instantiate(&shapes.shape, &[]).unwrap();
    let b = rt.instantiate(&shapes.shape, &[]).unwrap();
    let a2 = a.clone();

    assert!(a.ptr_eq(&a2));
    assert_eq!(a.id(), a2.id());
    assert!(!a.ptr_eq(&b));
    assert!(Value::from(a.clone()).is(&Value::from(a2)));
    assert!(!Value::from(a).is(&Value::from(b)));
    assert!(Value::Null.is(&Value::Null));
}

// ============================================================================
// Null Sentinel
// ============================================================================

#[test]
fn test_every_native_access_through_null_fails() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);
    let vectors = common::vectors(&rt);

    let null_shape = NativeView::null(&shapes.shape);
    let null_vector = NativeView::null(&vectors.vector);
    let scale = NativeView::null(&shapes.shape).field("scale").unwrap();

    let area = rt.bind_static(&shapes.shape, "area").unwrap();
    let rescale = rt.bind_static(&shapes.shape, "rescale").unwrap();
    let describe = rt.bind_static(&shapes.shape, "describe").unwrap();

    let attempts: Vec<(&str, strata::Result<Value>)> = vec![
        ("get", null_shape.get("scale")),
        ("get unknown", null_shape.get("no_such_field")),
        ("set", null_shape.set("scale", Value::Float(1.0)).map(|()| Value::Null)),
        ("read", null_shape.read(&scale)),
        ("write", null_shape.write(&scale, Value::Float(2.0)).map(|()| Value::Null)),
        ("buffer", null_vector.with_buffer("data", |_| Value::Null)),
        ("hybrid call", null_shape.call(&rt, &area, &[])),
        ("native-only call", null_shape.call(&rt, &rescale, &[Value::Float(1.0)])),
        ("host-visible call", null_shape.call(&rt, &describe, &[])),
        ("call_method", rt.call_method(&Value::Null, "area", &[])),
        ("dynamic site", rt.bind_dynamic("area").invoke(&rt, &Value::Null, &[])),
        ("static site", strata::CallSite::from(area.clone()).invoke(&rt, &Value::Null, &[])),
        ("get_attr", rt.get_attr(&Value::Null, "label")),
        ("set_attr", rt.set_attr(&Value::Null, "label", Value::Int(1)).map(|()| Value::Null)),
        ("iter", rt.iter(&Value::Null)),
    ];

    for (what, result) in attempts {
        assert!(
            matches!(result, Err(Error::NullReference { .. })),
            "{what} through null should be a null reference, got {result:?}"
        );
    }
}

#[test]
fn test_ref_fields_accept_null_and_subtypes_only() {
    let rt = common::runtime();
    let vectors = common::vectors(&rt);
    let shapes = common::shapes(&rt);

    let it = rt.instantiate(&vectors.iter, &[]).unwrap();
    let vector = Value::from(rt.instantiate(&vectors.vector, &[]).unwrap());
    let circle = Value::from(rt.instantiate(&shapes.circle, &[]).unwrap());

    it.set_attr("source", vector.clone()).unwrap();
    assert!(it.get_attr("source").unwrap().is(&vector));
    assert!(matches!(
        it.set_attr("source", circle),
        Err(Error::TypeMismatch { .. })
    ));
    it.set_attr("source", Value::Null).unwrap();
    assert!(it.get_attr("source").unwrap().is_null());
}

// ============================================================================
// Host Attribute Protocol
// ============================================================================

#[test]
fn test_visibility_controls_host_access() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);
    let circle = rt.instantiate(&shapes.circle, &[]).unwrap();

    // Private: invisible to host code, visible natively.
    assert!(matches!(
        circle.get_attr("scale"),
        Err(Error::NoSuchAttribute { .. })
    ));
    assert!(matches!(
        circle.set_attr("scale", Value::Float(9.0)),
        Err(Error::NoSuchAttribute { .. })
    ));
    let view = rt
        .cast(&Value::from(circle.clone()), &Binding::new(&shapes.circle))
        .unwrap();
    assert_eq!(view.get("scale").unwrap(), Value::Float(1.0));

    // Read-only: readable, not writable from host code.
    assert_eq!(circle.get_attr("sides").unwrap(), Value::Int(0));
    assert_eq!(
        circle.set_attr("sides", Value::Int(3)).unwrap_err(),
        Error::ReadOnlyAttribute {
            type_name: "Circle".into(),
            name: "sides".into(),
        }
    );
    view.set("sides", Value::Int(3)).unwrap();
    assert_eq!(circle.get_attr("sides").unwrap(), Value::Int(3));

    // Public: both ways.
    circle.set_attr("label", Value::from("round")).unwrap();
    assert_eq!(circle.get_attr("label").unwrap(), Value::from("round"));

    // No dictionary on a native-only chain.
    assert!(!circle.has_dict());
    assert!(matches!(
        circle.set_attr("color", Value::from("red")),
        Err(Error::NoSuchAttribute { .. })
    ));
}

#[test]
fn test_native_types_stay_closed() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);

    let err = rt
        .register(
            TypeBuilder::native("Badge")
                .base("Circle")
                .field(FieldDescriptor::native("rank", NativeKind::I64).public())
                .field(FieldDescriptor::dynamic("notes")),
        )
        .unwrap_err();
    assert_eq!(
        err,
        Error::Definition(DefinitionError::DynamicFieldInNativeType {
            type_name: "Badge".into(),
            field: "notes".into(),
        })
    );
    assert!(rt.lookup_type("Badge").is_none());

    let disc = rt
        .register(
            TypeBuilder::native("Disc")
                .base("Circle")
                .field(FieldDescriptor::native("rank", NativeKind::I64).public()),
        )
        .unwrap();
    assert!(!disc.has_dict());
    let obj = rt.instantiate(&disc, &[]).unwrap();
    obj.set_attr("rank", Value::Int(2)).unwrap();
    assert!(matches!(
        obj.set_attr("notes", Value::from("x")),
        Err(Error::NoSuchAttribute { .. })
    ));
    assert!(obj.dict_keys().unwrap().is_empty());
    assert!(!shapes.circle.has_dict());
}

#[test]
fn test_dynamic_instance_dictionary() {
    let rt = common::runtime();
    let shapes = common::shapes(&rt);
    let square = rt.instantiate(&shapes.square, &[]).unwrap();

    assert!(square.has_dict());
    assert_eq!(square.get_attr("side").unwrap(), Value::Null);

    square.set_attr("color", Value::from("red")).unwrap();
    assert_eq!(square.get_attr("color").unwrap(), Value::from("red"));

    // The private native field stays out of reach; the write lands in the
    // dictionary instead.
    assert!(square.get_attr("scale").is_err());
    square.set_attr("scale", Value::Float(7.0)).unwrap();
    assert_eq!(square.get_attr("scale").unwrap(), Value::Float(7.0));
    let view = rt
        .cast(&Value::from(square.clone()), &Binding::new(&shapes.shape))
        .unwrap();
    assert_eq!(view.get("scale").unwrap(), Value::Float(1.0));

    // Generated accessors still win over the dictionary.
    square.set_attr("label", Value::Int(4)).unwrap();
    assert_eq!(view.get("label").unwrap(), Value::Int(4));

    let keys: Vec<&str> = square
        .dict_keys()
        .unwrap()
        .into_iter()
        .map(|s| s.as_str())
        .collect();
    assert_eq!(keys, vec!["color", "scale", "side"]);
}

#[test]
fn test_scalar_attribute_access() {
    let rt = common::runtime();
    assert!(matches!(
        rt.get_attr(&Value::Int(1), "real"),
        Err(Error::NoSuchAttribute { .. })
    ));
    assert!(matches!(
        rt.call_method(&Value::from("s"), "upper", &[]),
        Err(Error::NoSuchMethod { .. })
    ));
}
