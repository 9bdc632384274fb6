//! Adaptive RID bag behavior across its storage transitions.

use proptest::prelude::*;

use umbra::{class_with_properties, BagThresholds, Document, Engine, Rid, RidBag, Value};

fn rid(position: i64) -> Rid {
    Rid::new(9, position)
}

#[test]
fn behavior_is_identical_across_the_transition() {
    let mut adaptive = RidBag::with_thresholds(7, -1);
    let mut pinned_tree = RidBag::with_thresholds(-1, -1);

    for i in 0..20 {
        adaptive.add(rid(i % 5));
        pinned_tree.add(rid(i % 5));
    }
    assert!(!adaptive.is_embedded());
    assert_eq!(adaptive, pinned_tree);
    assert_eq!(adaptive.size(), 20);
    assert_eq!(adaptive.multiplicity(rid(0)), 4);

    adaptive.remove(rid(0));
    pinned_tree.remove(rid(0));
    assert_eq!(adaptive, pinned_tree);
}

#[test]
fn serde_round_trip_preserves_the_multiset() {
    for size in [0, 1, 6, 7, 8, 40] {
        let mut bag = RidBag::with_thresholds(7, -1);
        for i in 0..size {
            bag.add(rid(i % 10));
        }
        let json = serde_json::to_string(&bag).unwrap();
        let restored: RidBag = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, bag, "round trip at size {size}");
    }
}

#[test]
fn cursor_removal_targets_the_yielded_occurrence() {
    let mut bag = RidBag::with_thresholds(40, -1);
    for i in 0..6 {
        bag.add(rid(i));
    }

    // Remove every even element through the cursor.
    let mut cursor = bag.cursor();
    while let Some(current) = cursor.next() {
        if current.position % 2 == 0 {
            cursor.remove_current(&mut bag);
        }
    }
    assert_eq!(bag.size(), 3);
    for i in 0..6 {
        assert_eq!(bag.contains(rid(i)), i % 2 == 1);
    }
}

#[test]
fn tracking_rollback_and_clear_are_independent_cycles() {
    let mut bag = RidBag::with_thresholds(40, -1);
    bag.add(rid(0));
    bag.begin_tracking();

    bag.add(rid(1));
    bag.clear_changes();
    assert!(!bag.is_transaction_modified());

    // Changes after the commit point roll back to it, not to the start.
    bag.add(rid(2));
    bag.remove(rid(0));
    bag.rollback_changes();
    assert_eq!(bag.size(), 2);
    assert!(bag.contains(rid(0)));
    assert!(bag.contains(rid(1)));
    assert!(!bag.contains(rid(2)));
}

#[test]
fn global_thresholds_apply_to_new_bags_only() {
    let previous = BagThresholds::embedded_to_tree();
    BagThresholds::set_embedded_to_tree(2);
    let eager = RidBag::new();
    BagThresholds::set_embedded_to_tree(previous);
    let normal = RidBag::new();

    let mut eager = eager;
    let mut normal = normal;
    for i in 0..3 {
        eager.add(rid(i));
        normal.add(rid(i));
    }
    assert!(!eager.is_embedded());
    assert!(normal.is_embedded());
}

#[test]
fn bags_in_documents_get_temporary_links_rewritten() {
    let engine = Engine::new();
    engine.register_class(class_with_properties("Person", None, &["name"]));
    engine.register_class(class_with_properties("Group", None, &["members"]));

    let mut tx = engine.begin();
    let ada = tx
        .insert_into(1, Document::new("Person").with("name", "ada"))
        .unwrap();
    let grace = tx
        .insert_into(1, Document::new("Person").with("name", "grace"))
        .unwrap();

    let mut members = RidBag::with_thresholds(40, -1);
    members.add(ada);
    members.add(grace);
    members.add(grace);
    tx.insert_into(2, Document::new("Group").with("members", Value::Bag(members)))
        .unwrap();
    tx.commit().unwrap();

    let (_, group) = engine.store().scan_collection(2).pop().unwrap();
    let Value::Bag(bag) = group.get("members") else {
        panic!("members should be a bag");
    };
    assert_eq!(bag.size(), 3);
    for member in bag.to_vec() {
        assert!(member.is_persistent());
        assert!(engine.read(member).is_some());
    }
}

proptest! {
    // Whatever the thresholds and operation mix, a bag behaves exactly
    // like a plain multiset.
    #[test]
    fn bag_matches_a_multiset_model(
        ops in proptest::collection::vec((0i64..16, any::<bool>()), 0..200),
        top in -1i32..12,
    ) {
        let mut bag = RidBag::with_thresholds(top, -1);
        let mut model: Vec<i64> = Vec::new();
        for (position, add) in ops {
            if add {
                bag.add(rid(position));
                model.push(position);
            } else {
                bag.remove(rid(position));
                if let Some(found) = model.iter().position(|p| *p == position) {
                    model.remove(found);
                }
            }
        }

        prop_assert_eq!(bag.size(), model.len());
        let mut actual: Vec<i64> = bag.to_vec().iter().map(|r| r.position).collect();
        actual.sort_unstable();
        model.sort_unstable();
        prop_assert_eq!(actual, model);
    }
}
