//! Property-based invariant tests for observable objects.
//!
//! 1. Same-value equality is reflexive for every value, NaN included.
//! 2. Writing the current value again emits nothing; forcing always emits.
//! 3. Every effective write emits exactly one deps event, and one public event
//!    unless silent.
//! 4. `iter()` yields exactly the keys last written, in key order.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;
use tether_core::{Object, SetOptions, Value, change_event, deps_event};

// ── Helpers ─────────────────────────────────────────────────────────────

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000i64..1_000).prop_map(Value::Int),
        prop_oneof![Just(f64::NAN), -1e6f64..1e6].prop_map(Value::Float),
        "[a-z]{0,6}".prop_map(Value::Str),
    ]
}

fn key() -> impl Strategy<Value = String> {
    "[a-d]"
}

fn counter(obj: &Object, event: &str) -> (tether_core::Subscription, Rc<Cell<u32>>) {
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    let sub = obj.subscribe(event, move |_| {
        h.set(h.get() + 1);
        Ok(())
    });
    (sub, hits)
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Reflexive equality
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn same_value_equality_is_reflexive(value in scalar()) {
        prop_assert_eq!(&value, &value.clone());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2–3. Emission counts
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn rewriting_current_value_is_silent(k in key(), value in scalar()) {
        let obj = Object::new().with(k.clone(), value.clone());
        let (_deps, deps_hits) = counter(&obj, &deps_event(&k));
        obj.set(&k, value.clone()).expect("set");
        prop_assert_eq!(deps_hits.get(), 0);

        obj.set_with(&k, value, SetOptions::new().force(true)).expect("forced");
        prop_assert_eq!(deps_hits.get(), 1);
    }

    #[test]
    fn effective_writes_emit_once_per_channel(
        writes in proptest::collection::vec((scalar(), any::<bool>()), 1..20),
    ) {
        let obj = Object::new();
        let (_deps, deps_hits) = counter(&obj, &deps_event("k"));
        let (_public, public_hits) = counter(&obj, &change_event("k"));

        let mut current = Value::Null;
        let mut expected_deps = 0;
        let mut expected_public = 0;
        for (value, silent) in writes {
            let changed = value != current;
            obj.set_with("k", value.clone(), SetOptions::new().silent(silent))
                .expect("write");
            if changed {
                expected_deps += 1;
                if !silent {
                    expected_public += 1;
                }
                current = value;
            }
        }
        prop_assert_eq!(deps_hits.get(), expected_deps);
        prop_assert_eq!(public_hits.get(), expected_public);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Iteration matches a model map
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn iteration_matches_model(
        ops in proptest::collection::vec((key(), proptest::option::of(-50i64..50)), 0..30),
    ) {
        let obj = Object::new();
        let mut model: BTreeMap<String, Value> = BTreeMap::new();
        for (k, op) in ops {
            match op {
                Some(n) => {
                    obj.set(&k, n).expect("set");
                    model.insert(k, Value::Int(n));
                }
                None => {
                    obj.remove(&k).expect("remove");
                    model.remove(&k);
                }
            }
        }
        let seen: Vec<(String, Value)> = obj.iter().collect();
        let want: Vec<(String, Value)> = model.into_iter().collect();
        prop_assert_eq!(seen, want);
    }
}
