use std::sync::Arc;

use hintguard::{CallableSig, CheckError, ClassRef, Engine, Hint, HintErrorKind, ModuleTable, Value};

mod hint_testutil;

use hint_testutil::CountingLoader;

#[test]
fn relative_reference_resolves_against_the_callable_module() {
    let table = Arc::new(ModuleTable::new());
    let engine = Engine::new(table.clone());
    let hint = Hint::forward_ref("Widget");

    let in_app = engine
        .wrap(&CallableSig::new("app", "f").param("w", hint.clone()))
        .expect("wrap app.f");
    let in_lib = engine
        .wrap(&CallableSig::new("lib", "g").param("w", hint))
        .expect("wrap lib.g");
    // Both callables share one generated check.
    assert_eq!(engine.cache().len(), 1);

    // Defined after wrapping.
    let app_widget = ClassRef::builder("app", "Widget").build();
    let lib_widget = ClassRef::builder("lib", "Widget").build();
    table.module("app").define_class(&app_widget);
    table.module("lib").define_class(&lib_widget);

    assert!(in_app.check_args(&[Value::instance(&app_widget)]).is_ok());
    assert!(in_app.check_args(&[Value::instance(&lib_widget)]).is_err());
    assert!(in_lib.check_args(&[Value::instance(&lib_widget)]).is_ok());
    assert!(in_lib.check_args(&[Value::instance(&app_widget)]).is_err());
}

#[test]
fn proxies_are_memoized_and_import_once() {
    let table = Arc::new(ModuleTable::new());
    let loader = CountingLoader::new(table.clone());
    let engine = Engine::new(loader.clone());
    let thing = ClassRef::builder("pkg.mod", "Thing").build();
    table.module("pkg.mod").define_class(&thing);

    let hint = Hint::list(Hint::forward_ref("pkg.mod.Thing"));
    let f = engine
        .wrap(&CallableSig::new("app", "f").param("xs", hint.clone()))
        .expect("wrap f");
    let g = engine
        .wrap(&CallableSig::new("app", "g").param("ys", hint))
        .expect("wrap g");
    assert_eq!(engine.registry().proxy_count(), 1);
    assert_eq!(loader.imports(), 0);

    let good = Value::list(vec![Value::instance(&thing)]);
    for _ in 0..10 {
        assert!(f.check_args(&[good.clone()]).is_ok());
        assert!(g.check_args(&[good.clone()]).is_ok());
    }
    assert_eq!(loader.imports(), 1);
    assert!(f.check_args(&[Value::list(vec![Value::Int(1)])]).is_err());
}

#[test]
fn missing_referent_fails_at_check_time_not_wrap_time() {
    let table = Arc::new(ModuleTable::new());
    let engine = Engine::new(table.clone());
    table.module("app");
    let f = engine
        .wrap(&CallableSig::new("app", "f").param("x", Hint::forward_ref("Missing")))
        .expect("wrap succeeds before the class exists");

    let err = f.check_args(&[Value::Int(1)]).expect_err("unresolvable");
    let CheckError::Hint(err) = err else {
        panic!("expected a hint error, got {err}");
    };
    assert_eq!(err.kind, HintErrorKind::ForwardRefResolution);
    assert!(err.message.starts_with("Function app.f() parameter \"x\" "));

    let late = ClassRef::builder("app", "Missing").build();
    table.module("app").define_class(&late);
    assert!(f.check_args(&[Value::instance(&late)]).is_ok());
}

#[test]
fn type_of_forward_reference_checks_subclasses() {
    let table = Arc::new(ModuleTable::new());
    let engine = Engine::new(table.clone());
    let hint = Hint::subscript(&hintguard::builtins().type_, vec![Hint::forward_ref("Base")]);
    let f = engine
        .wrap(&CallableSig::new("app", "f").param("cls", hint))
        .expect("wrap");

    let base = ClassRef::builder("app", "Base").build();
    let sub = ClassRef::builder("app", "Sub").base(&base).build();
    table.module("app").define_class(&base);

    assert!(f.check_args(&[Value::Class(sub)]).is_ok());
    assert!(f.check_args(&[Value::Class(hintguard::builtins().int.clone())]).is_err());
}
