use std::sync::Arc;

use hintguard::{builtins, CallableSig, ClassRef, Engine, Hint, ModuleTable, Value};

mod hint_testutil;

use hint_testutil::ints;

#[test]
fn one_engine_wraps_shared_hints_from_many_threads() {
    let table = Arc::new(ModuleTable::new());
    let engine = Engine::new(table.clone());
    let widget = ClassRef::builder("app", "Widget").build();
    table.module("app").define_class(&widget);

    let numbers = Hint::list(Hint::class(&builtins().int));
    let widget_ref = Hint::forward_ref("Widget");

    std::thread::scope(|s| {
        for i in 0..8 {
            let engine = &engine;
            let numbers = numbers.clone();
            let widget_ref = widget_ref.clone();
            let widget = widget.clone();
            s.spawn(move || {
                let sig = CallableSig::new("app", &format!("f{i}"))
                    .param("xs", numbers)
                    .param("w", widget_ref);
                let f = engine.wrap(&sig).expect("wrap");
                for _ in 0..50 {
                    f.check_args(&[ints(&[1, 2, 3]), Value::instance(&widget)])
                        .expect("valid arguments");
                    assert!(f
                        .check_args(&[ints(&[1]), Value::Int(0)])
                        .is_err());
                }
            });
        }
    });

    assert_eq!(engine.cache().len(), 2);
    assert_eq!(engine.registry().proxy_count(), 1);
}
