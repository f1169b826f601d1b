#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hintguard::random::XorShiftRandom;
use hintguard::runtime::{ImportError, Module};
use hintguard::{Checker, Engine, Hint, ModuleLoader, ModuleTable, Value};

pub fn engine() -> (Arc<ModuleTable>, Engine) {
    let table = Arc::new(ModuleTable::new());
    let engine = Engine::new(table.clone());
    (table, engine)
}

pub fn checker(engine: &Engine, hint: &Hint, slot: &str) -> Checker {
    engine
        .checker(hint, slot, "app", "")
        .expect("generate check")
        .expect("hint is not ignorable")
}

pub fn ints(values: &[i64]) -> Value {
    Value::list(values.iter().copied().map(Value::Int).collect())
}

/// How many of `runs` seeded checks of `pith` pass.
pub fn passes(checker: &Checker, pith: &Value, seed: u64, runs: usize) -> usize {
    let mut rng = XorShiftRandom::seeded(seed);
    (0..runs)
        .filter(|_| checker.check_with(pith, &mut rng).is_ok())
        .count()
}

/// Module loader that counts imports.
pub struct CountingLoader {
    pub table: Arc<ModuleTable>,
    imports: AtomicUsize,
}

impl CountingLoader {
    pub fn new(table: Arc<ModuleTable>) -> Arc<Self> {
        Arc::new(Self {
            table,
            imports: AtomicUsize::new(0),
        })
    }

    pub fn imports(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for CountingLoader {
    fn import_module(&self, name: &str) -> Result<Arc<Module>, ImportError> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        self.table.import_module(name)
    }
}
