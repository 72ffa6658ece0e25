//! Property tests over randomly shaped customer graphs.

use std::collections::HashMap;

use memento_snapshot::{NodeKind, SnapshotNode};
use memento_test_utils::{customer_registry, persistent_order, transient_customer, Heap, Live};
use memento_walk::{Marshaller, Unmarshaller};
use proptest::prelude::*;

/// Graph shape: per customer an age, an optional friend index and a set of
/// order keys drawn from a small shared pool
#[derive(Debug, Clone)]
struct Shape {
    customers: Vec<(i64, Option<usize>, Vec<i64>)>,
}

fn graph_shape(max_customers: usize) -> impl Strategy<Value = Shape> {
    (1..=max_customers).prop_flat_map(|n| {
        prop::collection::vec(
            (
                0_i64..120,
                prop::option::of(0..n),
                prop::collection::vec(1_i64..=4, 0..4),
            ),
            n,
        )
        .prop_map(|customers| Shape { customers })
    })
}

/// Build the graph and return the free list holding every customer
fn build(heap: &Heap, shape: &Shape) -> Live {
    let orders: Vec<Live> = (1..=4).map(|key| persistent_order(heap, key)).collect();
    let customers: Vec<Live> = shape
        .customers
        .iter()
        .enumerate()
        .map(|(i, (age, _, _))| transient_customer(heap, &format!("c{i}"), *age))
        .collect();

    for (customer, (_, friend, keys)) in customers.iter().zip(&shape.customers) {
        if let Some(friend) = friend {
            heap.put(customer, "friend", Some(customers[*friend].clone()));
        }
        let mut seen = Vec::new();
        for key in keys {
            if !seen.contains(key) {
                seen.push(*key);
                heap.push(customer, "orders", orders[usize::try_from(*key - 1).unwrap()].clone());
            }
        }
    }

    let list = heap.new_list("CustomerList");
    for customer in customers {
        heap.push_list(&list, customer);
    }
    list
}

/// Structural equality of two customer graphs up to transient identity
fn assert_isomorphic(heap: &Heap, original: &Live, copy: &Live, map: &mut HashMap<Live, Live>) {
    if let Some(seen) = map.get(original) {
        assert_eq!(seen, copy);
        return;
    }
    if heap.oid_of(original).is_some_and(|oid| oid.is_persistent()) {
        assert_eq!(original, copy);
        return;
    }
    map.insert(original.clone(), copy.clone());

    for field in ["name", "age", "nickname"] {
        assert_eq!(heap.prop(original, field), heap.prop(copy, field), "field {field}");
    }
    match (heap.prop(original, "friend"), heap.prop(copy, "friend")) {
        (Some(a), Some(b)) => assert_isomorphic(heap, &a, &b, map),
        (None, None) => {}
        (a, b) => panic!("friend differs: {a:?} vs {b:?}"),
    }
    assert_eq!(heap.items(original, "orders"), heap.items(copy, "orders"));
}

proptest! {
    #[test]
    fn reconstruct_preserves_graph_structure(shape in graph_shape(6)) {
        let heap = Heap::new();
        let registry = customer_registry();
        let list = build(&heap, &shape);

        let node = Marshaller::new(&registry, &heap).capture(&list).unwrap();
        let copy = Unmarshaller::new(&registry, &heap).reconstruct(&node).unwrap().unwrap();

        let originals = heap.list(&list);
        let copies = heap.list(&copy);
        prop_assert_eq!(originals.len(), copies.len());

        let mut map = HashMap::new();
        for (original, copied) in originals.iter().zip(&copies) {
            assert_isomorphic(&heap, original, copied, &mut map);
        }
    }

    #[test]
    fn every_transient_object_is_embedded_exactly_once(shape in graph_shape(8)) {
        let heap = Heap::new();
        let registry = customer_registry();
        let list = build(&heap, &shape);

        let node = Marshaller::new(&registry, &heap).capture(&list).unwrap();

        let mut embedded = HashMap::new();
        node.visit(&mut |n| {
            if let SnapshotNode::Object(data) = n {
                *embedded.entry(data.oid.clone()).or_insert(0_usize) += 1;
            }
        });

        prop_assert_eq!(embedded.len(), shape.customers.len());
        prop_assert!(embedded.values().all(|count| *count == 1));
    }

    #[test]
    fn recapture_of_unchanged_graph_is_stable(shape in graph_shape(5)) {
        let heap = Heap::new();
        let registry = customer_registry();
        let list = build(&heap, &shape);
        let marshaller = Marshaller::new(&registry, &heap);

        let before = marshaller.capture(&list).unwrap();
        Unmarshaller::new(&registry, &heap).update(&list, &before).unwrap();
        let after = marshaller.capture(&list).unwrap();

        prop_assert_eq!(before.kind(), NodeKind::Collection);
        prop_assert_eq!(before, after);
    }
}
