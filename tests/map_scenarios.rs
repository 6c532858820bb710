use std::collections::{BTreeMap, BTreeSet};

use salient::{hash::HashCode, ConcurrentMap, ConcurrentMapBuilder, StringMap};

fn s(v: &str) -> String {
    v.to_string()
}

#[test]
fn two_tabs_then_update() {
    let map = StringMap::new();

    assert_eq!(map.put(s("TAB1"), s("A")), None);
    assert_eq!(map.put(s("TAB2"), s("A")), None);

    assert_eq!(map.size(), 2);
    let keys: BTreeSet<_> = map.key_set().iter().collect();
    assert_eq!(keys, BTreeSet::from([Some(s("TAB1")), Some(s("TAB2"))]));
    assert_eq!(map.values().iter().collect::<Vec<_>>(), vec![s("A"), s("A")]);
    let entries: BTreeSet<_> = map.entry_set().iter().collect();
    assert_eq!(
        entries,
        BTreeSet::from([(Some(s("TAB1")), s("A")), (Some(s("TAB2")), s("A"))])
    );

    assert_eq!(map.put(s("TAB1"), s("B")), Some(s("A")));
    assert_eq!(map.size(), 2);
    assert_eq!(map.key_set().iter().collect::<BTreeSet<_>>(), keys);

    let rendered = map.to_string();
    assert!(
        rendered == "{TAB1=B, TAB2=A}" || rendered == "{TAB2=A, TAB1=B}",
        "{rendered}"
    );
}

#[test]
fn key_uniqueness() {
    let map = ConcurrentMap::new();
    let mut expected = BTreeMap::new();

    // A sequence with many repeated keys.
    for i in 0..5_000u32 {
        let key = format!("key-{}", (i * 7919) % 1_237);
        map.put(key.clone(), i);
        expected.insert(key, i);
    }

    assert_eq!(map.size(), expected.len());
    let actual: BTreeMap<_, _> = map
        .iter()
        .map(|(k, v)| (k.expect("no absent key was put"), v))
        .collect();
    assert_eq!(actual, expected);
}

#[test]
fn update_returns_previous_value() {
    let map = ConcurrentMap::new();

    assert_eq!(map.put(s("k"), 1), None);
    assert_eq!(map.put(s("k"), 2), Some(1));
    assert_eq!(map.put(s("k"), 3), Some(2));
    assert_eq!(map.put(None, 4), None);
    assert_eq!(map.put(None, 5), Some(4));
    assert_eq!(map.size(), 2);
}

#[test]
fn resize_keeps_every_entry() {
    let map = ConcurrentMap::new();
    let mut capacity = map.capacity();

    for i in 0..10_000u32 {
        map.put(i.to_string(), i);

        let threshold = (capacity as f64 * 0.75) as usize;
        if i as usize + 1 > threshold {
            // This put crossed the load factor.
            assert!(map.capacity() >= capacity * 2);
            for j in 0..=i {
                assert_eq!(map.get(j.to_string().as_str()), Some(j));
            }
        }
        capacity = map.capacity();
    }

    assert_eq!(map.size(), 10_000);
}

#[test]
fn absent_key_survives_resizes() {
    let map = StringMap::new();
    map.put(None, s("null value"));

    for i in 0..1_000 {
        map.put(format!("k{i}"), format!("v{i}"));
    }

    assert!(map.contains_null_key());
    assert!(map.key_set().contains_null());
    assert_eq!(map.get_null_key(), Some(s("null value")));
    assert_eq!(map.key_set().iter().filter(Option::is_none).count(), 1);
    assert_eq!(map.size(), 1_001);
}

#[test]
fn many_colliding_keys() {
    // Every string made of "Aa" and "BB" blocks of the same length has the
    // same hash code.
    let keys: Vec<String> = (0..1u32 << 10)
        .map(|bits| {
            (0..10)
                .map(|i| if bits & (1 << i) == 0 { "Aa" } else { "BB" })
                .collect()
        })
        .collect();
    assert!(keys.iter().all(|k| k.hash_code() == keys[0].hash_code()));

    let map = ConcurrentMap::new();
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(map.put(key.clone(), i), None);
    }

    assert_eq!(map.size(), keys.len());
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(map.get(key.as_str()), Some(i));
    }
}

#[test]
fn custom_configuration() {
    let map = ConcurrentMapBuilder::new()
        .initial_capacity(3)
        .load_factor(1.0)
        .build();
    assert_eq!(map.capacity(), 4);

    for i in 0..4u64 {
        map.put(i, i);
    }
    assert_eq!(map.capacity(), 4);

    map.put(4, 4);
    assert_eq!(map.capacity(), 8);
}

#[test]
fn collect_and_extend() {
    let mut map: StringMap = [("a", "1"), ("b", "2")]
        .into_iter()
        .map(|(k, v)| (s(k), s(v)))
        .collect();
    map.extend([(s("c"), s("3")), (s("a"), s("4"))]);

    assert_eq!(map.size(), 3);
    assert_eq!(map.get("a"), Some(s("4")));
    assert_eq!(map.get("c"), Some(s("3")));
}
