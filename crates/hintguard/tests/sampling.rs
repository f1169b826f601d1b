use hintguard::random::XorShiftRandom;
use hintguard::{builtins, Hint, Value};

mod hint_testutil;

use hint_testutil::{checker, engine, ints, passes};

#[test]
fn one_bad_item_is_caught_at_roughly_one_over_n() {
    let (_table, engine) = engine();
    let c = checker(&engine, &Hint::list(Hint::class(&builtins().int)), "xs");

    let mut items: Vec<Value> = (0..1000).map(Value::Int).collect();
    items[617] = Value::str("bad");
    let pith = Value::list(items);

    let runs = 20_000;
    let caught = runs - passes(&c, &pith, 0x5eed, runs);
    assert!(
        (1..=100).contains(&caught),
        "caught {caught} of {runs}; expected about {}",
        runs / 1000
    );
}

#[test]
fn short_list_with_one_bad_item_fails_intermittently() {
    let (_table, engine) = engine();
    let c = checker(&engine, &Hint::list(Hint::class(&builtins().int)), "xs");

    let bad = Value::list(vec![Value::Int(1), Value::Int(2), Value::str("x")]);
    let ok = passes(&c, &bad, 11, 300);
    assert!(ok > 0 && ok < 300, "passed {ok} of 300");

    assert_eq!(passes(&c, &ints(&[1, 2, 3]), 11, 300), 300);
}

#[test]
fn reported_index_is_the_sampled_one() {
    let (_table, engine) = engine();
    let c = checker(&engine, &Hint::list(Hint::class(&builtins().int)), "xs");
    let pith = Value::list(vec![Value::str("a"), Value::Int(2)]);

    let mut rng = XorShiftRandom::seeded(3);
    let mut saw_violation = false;
    for _ in 0..50 {
        if let Err(err) = c.check_with(&pith, &mut rng) {
            let v = err.as_violation().expect("violation");
            assert!(v.message.ends_with("(sampled item at index 0)"), "{}", v.message);
            saw_violation = true;
        }
    }
    assert!(saw_violation);
}

#[test]
fn empty_sequences_always_pass() {
    let (_table, engine) = engine();
    let c = checker(&engine, &Hint::list(Hint::class(&builtins().int)), "xs");
    assert_eq!(passes(&c, &Value::list(Vec::new()), 1, 20), 20);
}

#[test]
fn nested_sequences_sample_each_level() {
    let (_table, engine) = engine();
    let c = checker(
        &engine,
        &Hint::list(Hint::list(Hint::class(&builtins().int))),
        "xss",
    );
    assert!(c.source().contains("__pith_0 :="), "{}", c.source());
    let good = Value::list(vec![ints(&[1]), ints(&[]), ints(&[2, 3])]);
    assert_eq!(passes(&c, &good, 5, 100), 100);
    let bad = Value::list(vec![Value::list(vec![Value::str("x")])]);
    assert_eq!(passes(&c, &bad, 5, 10), 0);
}
