use std::collections::BTreeMap;

use kiln::cache::key::implementation_hash;
use kiln::cache::CacheKeyBuilder;
use kiln::snapshot::Hash;
use proptest::prelude::*;

fn inputs_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    proptest::collection::btree_map("[a-z]{1,8}", proptest::collection::vec(any::<u8>(), 0..16), 0..6)
}

fn key_for<'a>(
    implementation: &str,
    inputs: impl Iterator<Item = (&'a String, &'a Vec<u8>)>,
) -> kiln::cache::CacheKey {
    inputs
        .fold(CacheKeyBuilder::new(implementation_hash(implementation)), |builder, (name, value)| {
            builder.input(name.clone(), Hash::of(value))
        })
        .build()
}

proptest! {
    #[test]
    fn test_key_ignores_declaration_order(inputs in inputs_strategy()) {
        let forward = key_for("impl", inputs.iter());
        let backward = key_for("impl", inputs.iter().rev());
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn test_key_survives_text_round_trip(inputs in inputs_strategy()) {
        let key = key_for("impl", inputs.iter());
        let parsed: kiln::cache::CacheKey = key.to_hex().parse().unwrap();
        prop_assert_eq!(parsed, key);
    }

    #[test]
    fn test_changing_any_input_changes_the_key(
        inputs in inputs_strategy().prop_filter("need an input", |m| !m.is_empty()),
        index in any::<prop::sample::Index>(),
    ) {
        let original = key_for("impl", inputs.iter());

        let mut changed = inputs.clone();
        let name = index.get(&inputs.keys().cloned().collect::<Vec<_>>()).clone();
        changed.get_mut(&name).unwrap().push(0xff);
        prop_assert_ne!(key_for("impl", changed.iter()), original);

        let mut dropped = inputs.clone();
        dropped.remove(&name);
        prop_assert_ne!(key_for("impl", dropped.iter()), original);

        prop_assert_ne!(key_for("impl-v2", inputs.iter()), original);
    }
}
