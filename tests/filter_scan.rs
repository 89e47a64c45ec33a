//! Integration test: skip-jump scans vs brute-force linear scans.
//!
//! Drives `FilteredScan` (which seeks via `KeyFilter::traverse`) over a
//! populated `MemStore` and checks it visits exactly the same keys, in
//! the same order, as a linear scan that tests every stored key with
//! `selected` — forward and backward, across mixed-type and mixed-depth
//! key populations.

use keyspan::{FilteredScan, Key, KeyFilter, MemStore, Value};
use time::macros::datetime;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn int_store(range: std::ops::Range<i64>) -> MemStore {
    let mut store = MemStore::new();
    for i in range {
        store.insert(&Key::with_segments([i]).unwrap());
    }
    store
}

/// A population mixing types and depths: int keys, city/float/word
/// tuples, and a few oddballs (bools, bytes, dates, deep keys).
fn mixed_store() -> MemStore {
    let mut store = MemStore::new();
    for i in 0..50i64 {
        store.insert(&Key::with_segments([i]).unwrap());
    }
    for city in ["arctic", "atlantic", "baltic", "pacific"] {
        for f in [0.5f64, 1.3, 2.25, 9.75] {
            for word in ["w", "x", "xx", "y", "yzzz", "z", "z0"] {
                let mut key = Key::with_segments([city]).unwrap();
                key.append(f).unwrap();
                key.append(word).unwrap();
                store.insert(&key);
                let mut deep = key.clone();
                deep.append(i64::from(word.len() as u32)).unwrap();
                store.insert(&deep);
            }
        }
        store.insert(&Key::with_segments([city]).unwrap());
    }
    let mut key = Key::new();
    key.append(true).unwrap();
    store.insert(&key);
    let mut key = Key::new();
    key.append(vec![0x00u8, 0x42]).unwrap();
    store.insert(&key);
    let mut key = Key::new();
    key.append(datetime!(2011-03-07 12:00:00 UTC)).unwrap();
    store.insert(&key);
    store
}

fn skip_scan(store: &MemStore, filter: &KeyFilter, forward: bool) -> Vec<Key> {
    FilteredScan::new(store, filter, forward)
        .collect::<keyspan::Result<Vec<Key>>>()
        .expect("scan over a valid store cannot hit decode errors")
}

fn linear_scan(store: &MemStore, filter: &KeyFilter, forward: bool) -> Vec<Key> {
    let mut hits: Vec<Key> = store
        .keys()
        .filter(|k| filter.selected(k).unwrap())
        .collect();
    if !forward {
        hits.reverse();
    }
    hits
}

fn assert_scans_agree(store: &MemStore, filter: &KeyFilter) {
    for forward in [true, false] {
        let jumped = skip_scan(store, filter, forward);
        let linear = linear_scan(store, filter, forward);
        assert_eq!(
            jumped,
            linear,
            "skip-jump and linear scans disagree for {} (forward={})",
            filter,
            forward
        );
    }
}

fn first_int(key: &Key) -> i64 {
    match key.segment(0).unwrap().0 {
        Value::Int(i) => i,
        other => panic!("expected int segment, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Tests: scan equivalence
// ---------------------------------------------------------------------------

#[test]
fn union_scan_visits_exactly_the_predicate() {
    init_tracing();
    let store = int_store(0..100);
    let filter = KeyFilter::parse("{{[10:20),[50:60),(80:90]}}").unwrap();

    let expected: Vec<i64> = (0..100)
        .filter(|&k| (10..20).contains(&k) || (50..60).contains(&k) || (k > 80 && k <= 90))
        .collect();

    let forward: Vec<i64> = skip_scan(&store, &filter, true).iter().map(first_int).collect();
    assert_eq!(forward, expected);

    let mut backward: Vec<i64> = skip_scan(&store, &filter, false).iter().map(first_int).collect();
    backward.reverse();
    assert_eq!(backward, expected);

    // selected() agrees with the predicate pointwise.
    for k in 0..100i64 {
        let key = Key::with_segments([k]).unwrap();
        let want = (10..20).contains(&k) || (50..60).contains(&k) || (k > 80 && k <= 90);
        assert_eq!(filter.selected(&key).unwrap(), want, "k={}", k);
    }
}

#[test]
fn mixed_population_equivalence() {
    init_tracing();
    let store = mixed_store();
    for src in [
        "{}",
        "{\"atlantic\"}",
        "{\"atlantic\",*,[\"x\":\"z\"]}",
        "{\"atlantic\",1.3,[\"x\":\"z\")}",
        "{[\"arctic\":\"baltic\"],[1.0:2.25],*}",
        "{{[5:15],[30:40)},*<}",
        "{*,[1.3:9.75)}",
        "{[10:)}",
        "{(:\"b\")}",
        "{\"atlantic\",>1.3,\"x\":\"z\",{[100:150),[200:250)},*<}",
        "{\"pacific\",*,>*<}",
    ] {
        let filter = KeyFilter::parse(src).unwrap();
        assert_scans_agree(&store, &filter);
    }
}

#[test]
fn derived_filters_stay_independent() {
    let store = mixed_store();
    let mut base_key = Key::with_segments(["atlantic"]).unwrap();
    base_key.append(1.3).unwrap();
    let base = KeyFilter::from_key(&base_key).unwrap();

    let narrow = base.append(keyspan::Term::Range(
        keyspan::Range::half_open("x", "z").unwrap(),
    ));
    let wide = base.limit(0, keyspan::filter::UNBOUNDED).unwrap();

    assert_scans_agree(&store, &base);
    assert_scans_agree(&store, &narrow);
    assert_scans_agree(&store, &wide);

    // The wide scan is a superset of the narrow one.
    let narrow_hits = skip_scan(&store, &narrow, true);
    let wide_hits = skip_scan(&store, &wide, true);
    assert!(narrow_hits.iter().all(|k| wide_hits.contains(k)));
    assert!(narrow_hits.len() < wide_hits.len());
}

#[test]
fn depth_window_scan() {
    let store = mixed_store();
    // Depth 2 through 3, city fixed: depth-1 ["atlantic"] is excluded,
    // tuples and their depth-4 extensions are included (segments past
    // max_depth are don't-care).
    let filter = KeyFilter::parse("{\"atlantic\",>*,*<}").unwrap();
    assert_scans_agree(&store, &filter);

    let hits = skip_scan(&store, &filter, true);
    assert!(!hits.contains(&Key::with_segments(["atlantic"]).unwrap()));
    assert!(hits.iter().all(|k| k.depth() >= 2));
    assert!(hits.iter().any(|k| k.depth() == 4));
}

// ---------------------------------------------------------------------------
// Tests: traversal behavior at the ends
// ---------------------------------------------------------------------------

#[test]
fn exhaustion_lands_on_terminal_sentinel() {
    let filter = KeyFilter::parse("{[10:20)}").unwrap();

    let mut key = Key::with_segments([25i64]).unwrap();
    assert!(!filter.traverse(&mut key, true).unwrap());
    assert!(key.is_after());

    let mut key = Key::with_segments([5i64]).unwrap();
    assert!(!filter.traverse(&mut key, false).unwrap());
    assert!(key.is_before());
}

#[test]
fn traverse_from_sentinel_starts_finds_first_candidate() {
    let store = int_store(0..100);
    let filter = KeyFilter::parse("{[42:45]}").unwrap();

    // A fresh forward scan seeds from {before}; first hit must be 42
    // without visiting 0..41.
    let hits: Vec<i64> = skip_scan(&store, &filter, true).iter().map(first_int).collect();
    assert_eq!(hits, vec![42, 43, 44, 45]);

    let hits: Vec<i64> = skip_scan(&store, &filter, false).iter().map(first_int).collect();
    assert_eq!(hits, vec![45, 44, 43, 42]);
}

#[test]
fn backward_scan_with_exclusive_high_skips_the_bound() {
    let store = mixed_store();
    let filter = KeyFilter::parse("{\"atlantic\",1.3,[\"x\":\"z\")}").unwrap();

    let hits = skip_scan(&store, &filter, false);
    assert!(!hits.is_empty());
    for key in &hits {
        let (word, _) = key.segment(2).unwrap();
        assert!(word >= Value::from("x") && word < Value::from("z"), "{}", key);
    }
}
