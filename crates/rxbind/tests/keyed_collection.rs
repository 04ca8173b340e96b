//! Positional semantics of the observable dictionary.

use std::cell::RefCell;
use std::rc::Rc;

use rxbind::{BindError, ChangeTracking, ListChange, ObservableDictionary};

#[test]
fn positions_track_inserts_and_removals() {
    let dict = ObservableDictionary::new();
    dict.add(1u32, "one".to_string()).unwrap();
    dict.add(2, "two".to_string()).unwrap();

    assert!(dict.contains_key(&1));
    assert!(!dict.contains_key(&3));

    dict.insert(0, 3, "three".to_string()).unwrap();
    assert_eq!(dict.index_of(&3), Some(0));
    assert_eq!(dict.index_of(&1), Some(1));
    assert_eq!(dict.index_of(&2), Some(2));

    assert!(dict.remove(&2));
    assert_eq!(dict.index_of(&1), Some(1));
    assert_eq!(dict.index_of(&2), None);
    assert_eq!(dict.index_of(&3), Some(0));
    assert_eq!(dict.keys(), vec![3, 1]);
}

#[test]
fn duplicate_key_leaves_dictionary_untouched() {
    let dict = ObservableDictionary::new();
    dict.add("k".to_string(), 1u32).unwrap();

    let changes = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&changes);
    let _sub = dict.subscribe_changes(move |_| *sink.borrow_mut() += 1);

    assert!(matches!(
        dict.add("k".to_string(), 2),
        Err(BindError::DuplicateKey { .. })
    ));
    assert!(matches!(
        dict.insert(0, "k".to_string(), 2),
        Err(BindError::DuplicateKey { .. })
    ));

    assert_eq!(dict.len(), 1);
    assert_eq!(dict.get(&"k".to_string()), Some(1));
    assert_eq!(*changes.borrow(), 0);
}

#[test]
fn entry_events_flow_through_the_list_surface() {
    let dict = ObservableDictionary::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let _sub = dict.subscribe_changes(move |change| {
        sink.borrow_mut().push(match change {
            ListChange::Insert { index, .. } => format!("insert@{index}"),
            ListChange::Remove { index, .. } => format!("remove@{index}"),
            ListChange::Reset => "reset".to_string(),
            other => format!("{other:?}"),
        });
    });

    dict.add(10u32, 'a').unwrap();
    dict.add(20, 'b').unwrap();
    dict.remove(&10);
    dict.clear();

    assert_eq!(
        *log.borrow(),
        vec!["insert@0", "insert@1", "remove@0", "reset"]
    );
}

#[test]
fn value_rewrites_are_in_place() {
    let dict = ObservableDictionary::new();
    dict.add("score".to_string(), 10u32).unwrap();
    dict.accept_changes();

    dict.add_or_update("score".to_string(), 20);
    assert_eq!(dict.get(&"score".to_string()), Some(20));
    assert_eq!(dict.index_of(&"score".to_string()), Some(0));
    assert_eq!(dict.len(), 1);
    assert!(dict.is_changed());

    // Equal rewrite announces nothing.
    dict.accept_changes();
    dict.add_or_update("score".to_string(), 20);
    assert!(!dict.is_changed());
}

#[test]
fn reordering_keeps_lookups_exact() {
    let dict = ObservableDictionary::new();
    for (k, v) in [("b", 2u32), ("c", 3), ("a", 1)] {
        dict.add(k.to_string(), v).unwrap();
    }

    dict.sort_by(|x, y| x.key().cmp(y.key()));
    assert_eq!(dict.keys(), vec!["a", "b", "c"]);
    for key in ["a", "b", "c"] {
        let position = dict.index_of(&key.to_string()).unwrap();
        assert_eq!(dict.pair_at(position).unwrap().key(), key);
    }

    dict.move_item(0, 2);
    assert_eq!(dict.keys(), vec!["b", "c", "a"]);
    assert_eq!(dict.index_of(&"a".to_string()), Some(2));
}

#[test]
fn missing_key_reports_which_key() {
    let dict: ObservableDictionary<String, u32> = ObservableDictionary::new();
    let err = dict.value(&"ghost".to_string()).unwrap_err();
    assert!(err.to_string().contains("ghost"));
}
