use std::collections::BTreeMap;
use std::io::Cursor;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use tenebra::{Collection, Engine, EngineError, Options};

type MemEngine = Engine<Cursor<Vec<u8>>>;

fn mem_engine(options: Options) -> MemEngine {
    Engine::create(Cursor::new(Vec::new()), options).expect("create engine")
}

fn keys_of(collection: &mut Collection<'_, Cursor<Vec<u8>>>) -> Vec<Vec<u8>> {
    collection
        .scan()
        .expect("scan")
        .into_iter()
        .map(|item| item.key)
        .collect()
}

#[test]
fn nine_keys_with_three_item_nodes_split_the_root() {
    let mut engine = mem_engine(Options::with_max_items(3));
    let id = engine.allocate_page();
    let mut numbers = Collection::create(&mut engine, id, "numbers").expect("create");
    let initial_root = numbers.root();

    for i in 1..=9 {
        let key = format!("Key{i}");
        let value = format!("Value{i}");
        numbers.insert(key.as_bytes(), value.as_bytes()).expect("insert");
    }

    assert_eq!(numbers.find(b"Key7").expect("find"), b"Value7");
    assert_ne!(numbers.root(), initial_root, "the root never split");
    assert_eq!(keys_of(&mut numbers).len(), 9);
}

#[test]
fn find_after_insert_and_after_delete() {
    let mut engine = mem_engine(Options::with_max_items(3));
    let id = engine.allocate_page();
    let mut pairs = Collection::create(&mut engine, id, "pairs").expect("create");

    pairs.insert(b"k", b"v").expect("insert");
    assert_eq!(pairs.find(b"k").expect("find"), b"v");

    pairs.delete(b"k").expect("delete");
    assert!(matches!(pairs.find(b"k").unwrap_err(), EngineError::KeyNotFound));
}

#[test]
fn delete_above_minimum_fill_skips_rebalancing() {
    let mut engine = mem_engine(Options::with_max_items(4));
    let id = engine.allocate_page();
    let mut letters = Collection::create(&mut engine, id, "letters").expect("create");
    for key in ["a", "b", "c", "d", "e"] {
        letters.insert(key.as_bytes(), b"v").expect("insert");
    }

    // The left leaf holds two items against a minimum of one; its loss of
    // one item must not move the root or reshuffle siblings.
    let root_before = letters.root();
    letters.delete(b"a").expect("delete");
    assert_eq!(letters.root(), root_before);
    assert_eq!(
        keys_of(&mut letters),
        vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]
    );
}

#[test]
fn merging_the_last_two_leaves_collapses_the_root() {
    let mut engine = mem_engine(Options::with_max_items(4));
    let id = engine.allocate_page();
    let mut letters = Collection::create(&mut engine, id, "letters").expect("create");
    for key in ["a", "b", "c", "d", "e"] {
        letters.insert(key.as_bytes(), b"v").expect("insert");
    }
    let split_root = letters.root();

    // Bring both leaves down to the minimum fill, then force the merge.
    letters.delete(b"e").expect("delete");
    letters.delete(b"b").expect("delete");
    letters.delete(b"d").expect("delete");

    assert_ne!(letters.root(), split_root, "the root never collapsed");
    assert_eq!(keys_of(&mut letters), vec![b"a".to_vec(), b"c".to_vec()]);
}

#[test]
fn interleaved_inserts_stay_strictly_ascending() {
    let mut engine = mem_engine(Options::with_max_items(3));
    let id = engine.allocate_page();
    let mut words = Collection::create(&mut engine, id, "words").expect("create");

    // Deliberately un-sorted insertion order.
    let input = [
        "pear", "apple", "quince", "fig", "banana", "olive", "grape", "date", "melon", "cherry",
        "lime", "kiwi",
    ];
    for word in input {
        words.insert(word.as_bytes(), b"fruit").expect("insert");
    }

    let scanned = keys_of(&mut words);
    let mut expected: Vec<Vec<u8>> = input.iter().map(|w| w.as_bytes().to_vec()).collect();
    expected.sort();
    assert_eq!(scanned, expected);
}

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, u8),
    Delete(u8),
    Find(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..40, any::<u8>()).prop_map(|(k, v)| Op::Insert(k, v)),
        (0u8..40).prop_map(Op::Delete),
        (0u8..40).prop_map(Op::Find),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Random insert/delete/find interleavings agree with a BTreeMap model
    /// and always leave the keys in strictly ascending order.
    #[test]
    fn tree_matches_a_btreemap_model(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let mut engine = mem_engine(Options::with_max_items(4));
        let id = engine.allocate_page();
        let mut tree = Collection::create(&mut engine, id, "model").expect("create");
        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let key = format!("key-{k:02}").into_bytes();
                    let value = vec![v];
                    match tree.insert(&key, &value) {
                        Ok(()) => {
                            prop_assert!(!model.contains_key(&key));
                            model.insert(key, value);
                        }
                        Err(EngineError::DuplicateKey) => {
                            prop_assert!(model.contains_key(&key));
                        }
                        Err(other) => return Err(TestCaseError::fail(other.to_string())),
                    }
                }
                Op::Delete(k) => {
                    let key = format!("key-{k:02}").into_bytes();
                    match tree.delete(&key) {
                        Ok(()) => {
                            prop_assert!(model.remove(&key).is_some());
                        }
                        Err(EngineError::KeyNotFound) => {
                            prop_assert!(!model.contains_key(&key));
                        }
                        Err(other) => return Err(TestCaseError::fail(other.to_string())),
                    }
                }
                Op::Find(k) => {
                    let key = format!("key-{k:02}").into_bytes();
                    match tree.find(&key) {
                        Ok(value) => prop_assert_eq!(Some(&value), model.get(&key)),
                        Err(EngineError::KeyNotFound) => {
                            prop_assert!(!model.contains_key(&key));
                        }
                        Err(other) => return Err(TestCaseError::fail(other.to_string())),
                    }
                }
            }
        }

        let scanned: Vec<(Vec<u8>, Vec<u8>)> = tree
            .scan()
            .expect("scan")
            .into_iter()
            .map(|item| (item.key, item.value))
            .collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> =
            model.into_iter().collect();
        prop_assert_eq!(scanned, expected);
    }
}
