//! Property tests over tables, maps and batches.

use nestdb_core::{keys, next_instance_id, Database, InstanceId, Value};
use nestdb_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn bytes_items_round_trip(
        prefix in table_prefix_strategy(),
        key in entry_key_strategy(),
        payload in payload_strategy(),
    ) {
        let db = Database::open_in_memory();
        let table = db.table(prefix).unwrap();

        table.put_item(&key, &mut Value::bytes(payload.clone())).unwrap();

        let loaded = table.get_item(&db.snapshot(), &key).unwrap();
        prop_assert_eq!(loaded, Some(Value::bytes(payload)));
    }

    #[test]
    fn distinct_prefixes_never_collide(
        (a, b) in distinct_prefix_pair_strategy(),
        key_a in entry_key_strategy(),
        key_b in entry_key_strategy(),
    ) {
        let db = Database::open_in_memory();
        let ta = db.table(a).unwrap();
        let tb = db.table(b).unwrap();

        prop_assert_ne!(
            ta.calc_key(keys::KeyTag::Item, &key_a),
            tb.calc_key(keys::KeyTag::Item, &key_b)
        );

        ta.put_item(&key_a, &mut Value::bytes(b"a".to_vec())).unwrap();
        prop_assert_eq!(tb.get_item(&db.snapshot(), &key_b).unwrap(), None);
    }

    #[test]
    fn table_matches_model(ops in prop::collection::vec(table_op_strategy(), 0..40)) {
        let db = Database::open_in_memory();
        let table = db.table(b"model".to_vec()).unwrap();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                TableOp::Put(key, payload) => {
                    table.put_item(&key, &mut Value::bytes(payload.clone())).unwrap();
                    model.insert(key, payload);
                }
                TableOp::Delete(key) => {
                    table.delete_item(&key).unwrap();
                    model.remove(&key);
                }
            }
        }

        let snapshot = db.snapshot();
        for a in 0u8..4 {
            for b in 0u8..4 {
                for key in [vec![a], vec![a, b]] {
                    let expected = model.get(&key).cloned().map(Value::bytes);
                    prop_assert_eq!(table.get_item(&snapshot, &key).unwrap(), expected);
                }
            }
        }
    }

    #[test]
    fn count_equals_distinct_keys(writes in map_writes_strategy(30)) {
        let db = Database::open_in_memory();
        let mut map = db.new_map();
        let mut distinct = BTreeSet::new();

        for (key, payload) in &writes {
            map.set_item(key, &mut Value::bytes(payload.clone())).unwrap();
            distinct.insert(key.clone());
        }

        if writes.is_empty() {
            prop_assert!(!map.is_bound());
        } else {
            let snapshot = db.snapshot();
            prop_assert_eq!(map.count(&snapshot).unwrap(), distinct.len() as u64);

            let iterated = map.get_iterator(&snapshot).unwrap().entries().count();
            prop_assert_eq!(iterated, distinct.len());
        }
    }

    #[test]
    fn batched_count_equals_distinct_keys(writes in map_writes_strategy(30)) {
        let db = Database::open_in_memory();
        let mut map = db.new_map();
        let mut model = BTreeMap::new();

        let mut batch = db.batch();
        for (key, payload) in &writes {
            map.batch_set_item(&mut batch, key, &mut Value::bytes(payload.clone())).unwrap();
            model.insert(key.clone(), payload.clone());
        }
        batch.apply().unwrap();

        if !writes.is_empty() {
            let snapshot = db.snapshot();
            prop_assert_eq!(map.count(&snapshot).unwrap(), model.len() as u64);

            let entries: Vec<_> = map
                .get_iterator(&snapshot)
                .unwrap()
                .entries()
                .collect::<Result<_, _>>()
                .unwrap();
            let expected: Vec<_> = model
                .into_iter()
                .map(|(k, v)| (k, Value::bytes(v)))
                .collect();
            prop_assert_eq!(entries, expected);
        }
    }

    #[test]
    fn iteration_stays_inside_its_map(
        first in map_writes_strategy(15),
        second in map_writes_strategy(15),
    ) {
        let db = Database::open_in_memory();
        let mut a = db.new_map();
        let mut b = db.new_map();
        let mut model_a = BTreeMap::new();

        // Bind both up front so they are adjacent instances.
        a.set_item(b"", &mut Value::bytes(b"seed".to_vec())).unwrap();
        model_a.insert(Vec::new(), b"seed".to_vec());
        b.set_item(b"", &mut Value::bytes(b"seed".to_vec())).unwrap();

        for (key, payload) in first {
            a.set_item(&key, &mut Value::bytes(payload.clone())).unwrap();
            model_a.insert(key, payload);
        }
        for (key, payload) in second {
            b.set_item(&key, &mut Value::bytes(payload)).unwrap();
        }

        let keys: Vec<Vec<u8>> = a
            .get_iterator(&db.snapshot())
            .unwrap()
            .entries()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(keys, model_a.into_keys().collect::<Vec<_>>());
    }

    #[test]
    fn allocated_ids_are_unique(maps in 1usize..20, batched in any::<bool>()) {
        let db = Database::open_in_memory();
        let table = db.table(b"ids".to_vec()).unwrap();
        let mut ids = BTreeSet::new();

        let mut values: Vec<Value> = (0..maps).map(|_| Value::from(db.new_map())).collect();
        if batched {
            let mut batch = db.batch();
            for (i, value) in values.iter_mut().enumerate() {
                table.batch_put_item(&mut batch, &i.to_le_bytes(), value).unwrap();
            }
            batch.apply().unwrap();
        } else {
            for (i, value) in values.iter_mut().enumerate() {
                table.put_item(&i.to_le_bytes(), value).unwrap();
            }
        }

        for value in &values {
            let id = value.as_map().unwrap().instance_id().unwrap();
            prop_assert!(id >= InstanceId::FIRST);
            prop_assert!(ids.insert(id));
        }
        prop_assert_eq!(
            next_instance_id(&db.snapshot()).unwrap(),
            InstanceId::new(maps as u64 + 1)
        );
    }
}
