//! Reconstruct and update walks against the in-memory heap.

use memento_snapshot::{
    CollectionData, EncodedValue, NodeKind, ObjectData, Oid, SnapshotNode, StoreError,
};
use memento_test_utils::{
    customer_registry, init_test_tracing, persistent_customer, persistent_order,
    transient_customer, Call, Heap, Live,
};
use memento_walk::{Marshaller, Unmarshaller, WalkConfig, WalkError};
use pretty_assertions::assert_eq;

fn ann_oid() -> Oid {
    Oid::persistent("Customer", 1_i64)
}

fn orders_oid(owner: &Oid) -> Oid {
    Oid::parented(owner, "Order", "orders")
}

fn order_bare(key: i64) -> SnapshotNode {
    SnapshotNode::bare(Oid::persistent("Order", key), "Order")
}

fn sets_of(heap: &Heap, name: &str) -> usize {
    heap.count_calls(|c| matches!(c, Call::Set { field, .. } if field == name))
}

#[test]
fn value_leaf_round_trips() {
    init_test_tracing();
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    let copy = Unmarshaller::new(&registry, &heap)
        .reconstruct(&node)
        .unwrap()
        .unwrap();

    assert_ne!(copy, ann);
    assert_eq!(heap.prop(&copy, "age"), Some(Live::Int(42)));
    assert_eq!(heap.prop(&copy, "name"), Some(Live::text("Ann")));
}

#[test]
fn collection_update_applies_minimal_delta() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let a = persistent_order(&heap, 1);
    let b = persistent_order(&heap, 2);
    let c = persistent_order(&heap, 3);
    let d = persistent_order(&heap, 4);
    for order in [&a, &b, &c] {
        heap.push(&ann, "orders", order.clone());
    }

    let incoming = CollectionData::new(orders_oid(&ann_oid()), "Order")
        .with_element(order_bare(2))
        .with_element(order_bare(3))
        .with_element(order_bare(4));
    let node: SnapshotNode = ObjectData::new(ann_oid(), "Customer")
        .with_field("orders", SnapshotNode::from(incoming))
        .into();

    heap.reset_calls();
    let report = Unmarshaller::new(&registry, &heap)
        .update_with_report(&ann, &node)
        .unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Add { .. })), 1);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Remove { .. })), 1);
    assert!(heap.calls().contains(&Call::Remove {
        owner: ann.clone(),
        field: "orders".to_string(),
        element: a,
    }));
    assert_eq!(heap.items(&ann, "orders"), vec![b, c, d]);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Set { .. })), 0);
}

#[test]
fn unchanged_references_do_not_invoke_setters() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let bob = persistent_customer(&heap, 2, "Bob", 50);
    heap.put(&ann, "friend", Some(bob.clone()));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    heap.reset_calls();
    let report = Unmarshaller::new(&registry, &heap)
        .update_with_report(&ann, &node)
        .unwrap();

    assert_eq!(report.setter_calls, 0);
    assert_eq!(report.setter_skips, 2);
    assert_eq!(report.values_written, 3);
    assert_eq!(sets_of(&heap, "friend"), 0);
    assert_eq!(sets_of(&heap, "address"), 0);
    assert_eq!(heap.prop(&ann, "friend"), Some(bob));
}

#[test]
fn changed_reference_is_written_back() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let bob = persistent_customer(&heap, 2, "Bob", 50);
    let carl = persistent_customer(&heap, 3, "Carl", 60);
    heap.put(&ann, "friend", Some(bob.clone()));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    heap.put(&ann, "friend", Some(carl));
    heap.reset_calls();
    Unmarshaller::new(&registry, &heap).update(&ann, &node).unwrap();

    assert_eq!(sets_of(&heap, "friend"), 1);
    assert_eq!(heap.prop(&ann, "friend"), Some(bob));
}

#[test]
fn value_fields_are_always_overwritten() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    heap.put(&ann, "age", Some(Live::Int(43)));
    heap.reset_calls();
    Unmarshaller::new(&registry, &heap).update(&ann, &node).unwrap();

    assert_eq!(heap.prop(&ann, "age"), Some(Live::Int(42)));
    assert_eq!(sets_of(&heap, "age"), 1);
    assert_eq!(sets_of(&heap, "name"), 1);
}

#[test]
fn writable_non_persisted_member_round_trips() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    heap.put(&ann, "nickname", Some(Live::text("annie")));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    heap.put(&ann, "nickname", Some(Live::text("changed")));
    Unmarshaller::new(&registry, &heap).update(&ann, &node).unwrap();

    assert_eq!(heap.prop(&ann, "nickname"), Some(Live::text("annie")));
}

#[test]
fn excluded_members_are_never_written() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    heap.put(&ann, "summary", Some(Live::text("computed")));
    heap.put(&ann, "rank", Some(Live::Int(1)));

    let node: SnapshotNode = ObjectData::new(ann_oid(), "Customer")
        .with_field("name", EncodedValue::new("Anna"))
        .with_field("summary", EncodedValue::new("forged"))
        .with_field("rank", EncodedValue::new("99"))
        .into();

    heap.reset_calls();
    let report = Unmarshaller::new(&registry, &heap)
        .update_with_report(&ann, &node)
        .unwrap();

    assert_eq!(report.skipped_fields, 2);
    assert_eq!(sets_of(&heap, "summary"), 0);
    assert_eq!(sets_of(&heap, "rank"), 0);
    assert_eq!(heap.prop(&ann, "name"), Some(Live::text("Anna")));
    assert_eq!(heap.prop(&ann, "summary"), Some(Live::text("computed")));
    assert_eq!(heap.prop(&ann, "rank"), Some(Live::Int(1)));
}

#[test]
fn unknown_fields_follow_strictness() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let node: SnapshotNode = ObjectData::new(ann_oid(), "Customer")
        .with_field("shoe_size", EncodedValue::new("44"))
        .into();

    let strict = Unmarshaller::new(&registry, &heap).update(&ann, &node);
    assert!(matches!(strict, Err(WalkError::Malformed(_))));

    let lenient = Unmarshaller::new(&registry, &heap)
        .with_config(WalkConfig::new().with_strict_fields(false))
        .update_with_report(&ann, &node)
        .unwrap();
    assert_eq!(lenient.skipped_fields, 1);
}

#[test]
fn update_against_wrong_object_is_rejected() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let bob = persistent_customer(&heap, 2, "Bob", 50);

    let node = Marshaller::new(&registry, &heap).capture(&bob).unwrap();
    heap.reset_calls();
    let result = Unmarshaller::new(&registry, &heap).update(&ann, &node);

    assert!(matches!(
        result,
        Err(WalkError::IdentityMismatch { expected, .. }) if expected == Oid::persistent("Customer", 2_i64)
    ));
    assert!(heap.calls().is_empty());
}

#[test]
fn update_from_leaf_node_is_malformed() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);

    let result = Unmarshaller::new(&registry, &heap).update(&ann, &SnapshotNode::bare(ann_oid(), "Customer"));
    assert!(matches!(result, Err(WalkError::Malformed(_))));
}

#[test]
fn bare_transient_without_embedding_is_malformed() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let node: SnapshotNode = ObjectData::new(ann_oid(), "Customer")
        .with_field(
            "friend",
            SnapshotNode::bare(Oid::transient("Customer", 999_i64), "Customer"),
        )
        .into();

    let result = Unmarshaller::new(&registry, &heap).update(&ann, &node);
    assert!(matches!(result, Err(WalkError::Malformed(_))));
}

#[test]
fn missing_persistent_reference_propagates_not_found() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let missing = Oid::persistent("Customer", 404_i64);
    let node: SnapshotNode = ObjectData::new(ann_oid(), "Customer")
        .with_field("friend", SnapshotNode::bare(missing.clone(), "Customer"))
        .into();

    let err = Unmarshaller::new(&registry, &heap)
        .update(&ann, &node)
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err, WalkError::Store(StoreError::NotFound(missing)));
}

#[test]
fn forgotten_object_cannot_be_resolved() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let bob = persistent_customer(&heap, 2, "Bob", 50);
    heap.put(&ann, "friend", Some(bob.clone()));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    heap.forget(&bob);

    let err = Unmarshaller::new(&registry, &heap)
        .reconstruct(&node)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn object_node_for_collection_type_is_kind_mismatch() {
    let heap = Heap::new();
    let registry = customer_registry();
    let node: SnapshotNode =
        ObjectData::new(Oid::transient("CustomerList", 1_i64), "CustomerList").into();

    let result = Unmarshaller::new(&registry, &heap).reconstruct(&node);
    assert!(matches!(
        result,
        Err(WalkError::KindMismatch { expected: NodeKind::Collection, found: NodeKind::Object, .. })
    ));
}

#[test]
fn non_collection_node_for_one_to_many_is_kind_mismatch() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let node: SnapshotNode = ObjectData::new(ann_oid(), "Customer")
        .with_field("orders", order_bare(1))
        .into();

    let result = Unmarshaller::new(&registry, &heap).update(&ann, &node);
    assert!(matches!(
        result,
        Err(WalkError::KindMismatch { expected: NodeKind::Collection, found: NodeKind::Bare, .. })
    ));
}

#[test]
fn embedded_transient_is_updated_in_place() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let address = heap.new_object("Address");
    heap.put(&address, "city", Some(Live::text("Oslo")));
    heap.put(&ann, "address", Some(address.clone()));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    heap.put(&address, "city", Some(Live::text("Bergen")));
    heap.reset_calls();
    let objects = heap.object_count();
    Unmarshaller::new(&registry, &heap).update(&ann, &node).unwrap();

    assert_eq!(heap.object_count(), objects);

    assert_eq!(heap.prop(&ann, "address"), Some(address.clone()));
    assert_eq!(heap.prop(&address, "city"), Some(Live::text("Oslo")));
    assert_eq!(sets_of(&heap, "address"), 0);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Create { .. })), 0);
}

#[test]
fn replaced_transient_is_recreated() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let original = heap.new_object("Address");
    heap.put(&original, "city", Some(Live::text("Oslo")));
    heap.put(&ann, "address", Some(original.clone()));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    heap.put(&ann, "address", Some(heap.new_object("Address")));
    heap.reset_calls();
    Unmarshaller::new(&registry, &heap).update(&ann, &node).unwrap();

    let restored = heap.prop(&ann, "address").unwrap();
    assert_ne!(restored, original);
    assert_eq!(heap.prop(&restored, "city"), Some(Live::text("Oslo")));
    assert_eq!(sets_of(&heap, "address"), 1);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Create { .. })), 1);
}

#[test]
fn reconstructed_back_reference_points_at_the_copy() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = transient_customer(&heap, "Ann", 42);
    let address = heap.new_object("Address");
    heap.put(&address, "resident", Some(ann.clone()));
    heap.put(&ann, "address", Some(address));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    let copy = Unmarshaller::new(&registry, &heap)
        .reconstruct(&node)
        .unwrap()
        .unwrap();

    let copied_address = heap.prop(&copy, "address").unwrap();
    assert_eq!(heap.prop(&copied_address, "resident"), Some(copy));
}

#[test]
fn serialized_standalone_is_restored() {
    let heap = Heap::new();
    let registry = customer_registry();
    let order = persistent_order(&heap, 10);
    heap.put(&order, "note", Some(Live::Blob(vec![0xca, 0xfe])));

    let node = Marshaller::new(&registry, &heap).capture(&order).unwrap();
    heap.put(&order, "note", None);
    Unmarshaller::new(&registry, &heap).update(&order, &node).unwrap();

    assert_eq!(heap.prop(&order, "note"), Some(Live::Blob(vec![0xca, 0xfe])));
}

#[test]
fn free_list_update_applies_delta() {
    let heap = Heap::new();
    let registry = customer_registry();
    let a = persistent_customer(&heap, 1, "A", 1);
    let b = persistent_customer(&heap, 2, "B", 2);
    let c = persistent_customer(&heap, 3, "C", 3);
    let d = persistent_customer(&heap, 4, "D", 4);
    let list = heap.new_list("CustomerList");
    for customer in [&a, &b, &c] {
        heap.push_list(&list, customer.clone());
    }

    let node: SnapshotNode = CollectionData::new(Oid::transient("CustomerList", "list-1"), "CustomerList")
        .with_element(SnapshotNode::bare(Oid::persistent("Customer", 2_i64), "Customer"))
        .with_element(SnapshotNode::bare(Oid::persistent("Customer", 3_i64), "Customer"))
        .with_element(SnapshotNode::bare(Oid::persistent("Customer", 4_i64), "Customer"))
        .into();

    heap.reset_calls();
    Unmarshaller::new(&registry, &heap).update(&list, &node).unwrap();

    assert_eq!(heap.list(&list), vec![b, c, d]);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Push { .. })), 1);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Pull { .. })), 1);
}

#[test]
fn free_list_reconstruct_skips_null_elements() {
    let heap = Heap::new();
    let registry = customer_registry();
    let a = persistent_customer(&heap, 1, "A", 1);
    let node: SnapshotNode = CollectionData::new(Oid::transient("CustomerList", "list-1"), "CustomerList")
        .with_element(SnapshotNode::bare(Oid::persistent("Customer", 1_i64), "Customer"))
        .with_element(SnapshotNode::Null)
        .into();

    let list = Unmarshaller::new(&registry, &heap)
        .reconstruct(&node)
        .unwrap()
        .unwrap();
    assert_eq!(heap.list(&list), vec![a]);
}

#[test]
fn duplicate_full_node_is_malformed() {
    let heap = Heap::new();
    let registry = customer_registry();
    let twin = Oid::transient("Customer", 7_i64);
    let node: SnapshotNode = CollectionData::new(Oid::transient("CustomerList", "list-1"), "CustomerList")
        .with_element(ObjectData::new(twin.clone(), "Customer").into())
        .with_element(ObjectData::new(twin, "Customer").into())
        .into();

    let result = Unmarshaller::new(&registry, &heap).reconstruct(&node);
    assert!(matches!(result, Err(WalkError::Malformed(_))));
}

#[test]
fn null_root_reconstructs_to_nothing() {
    let heap = Heap::new();
    let registry = customer_registry();

    let result = Unmarshaller::new(&registry, &heap)
        .reconstruct(&SnapshotNode::Null)
        .unwrap();
    assert_eq!(result, None);
}

#[test]
fn reconstruct_report_counts_creations_and_lookups() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = transient_customer(&heap, "Ann", 42);
    heap.put(&ann, "friend", Some(persistent_customer(&heap, 2, "Bob", 50)));
    heap.push(&ann, "orders", persistent_order(&heap, 10));

    let node = Marshaller::new(&registry, &heap).capture(&ann).unwrap();
    let (_, report) = Unmarshaller::new(&registry, &heap)
        .reconstruct_with_report(&node)
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.added, 1);
    assert_eq!(report.setter_calls, 1);
}

fn team_with_members(heap: &Heap, members: &[Live]) -> (Live, Live) {
    let team = heap.new_persistent("Team", 1);
    let list = heap.new_list("CustomerList");
    for member in members {
        heap.push_list(&list, member.clone());
    }
    heap.put(&team, "members", Some(list.clone()));
    (team, list)
}

#[test]
fn list_valued_member_round_trips() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let (team, members) = team_with_members(&heap, &[ann.clone()]);

    let node = Marshaller::new(&registry, &heap).capture(&team).unwrap();
    let copy = Unmarshaller::new(&registry, &heap)
        .reconstruct(&node)
        .unwrap()
        .unwrap();

    let copied = heap.prop(&copy, "members").unwrap();
    assert_ne!(copied, members);
    assert_eq!(heap.list(&copied), vec![ann]);
}

#[test]
fn list_valued_member_is_reconciled_in_place() {
    let heap = Heap::new();
    let registry = customer_registry();
    let a = persistent_customer(&heap, 1, "A", 1);
    let b = persistent_customer(&heap, 2, "B", 2);
    let c = persistent_customer(&heap, 3, "C", 3);
    let (team, members) = team_with_members(&heap, &[a.clone(), b.clone()]);

    let node = Marshaller::new(&registry, &heap).capture(&team).unwrap();
    heap.push_list(&members, c);
    heap.reset_calls();
    let objects = heap.object_count();
    let report = Unmarshaller::new(&registry, &heap)
        .update_with_report(&team, &node)
        .unwrap();

    assert_eq!(heap.prop(&team, "members"), Some(members.clone()));
    assert_eq!(heap.list(&members), vec![a, b]);
    assert_eq!(report.removed, 1);
    assert_eq!(report.added, 0);
    assert_eq!(sets_of(&heap, "members"), 0);
    assert_eq!(heap.object_count(), objects);
}

#[test]
fn collection_node_on_object_member_is_kind_mismatch() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let node: SnapshotNode = ObjectData::new(ann_oid(), "Customer")
        .with_field(
            "friend",
            SnapshotNode::from(CollectionData::new(
                Oid::transient("CustomerList", "list-1"),
                "CustomerList",
            )),
        )
        .into();

    let result = Unmarshaller::new(&registry, &heap).update(&ann, &node);
    assert!(matches!(
        result,
        Err(WalkError::KindMismatch { expected: NodeKind::Object, found: NodeKind::Collection, .. })
    ));
}

fn account_held_by(heap: &Heap, holder: &Live) -> Live {
    let account = heap.new_persistent("Account", 1);
    heap.put(&account, "balance", Some(Live::Int(100)));
    heap.put(&account, "opened", Some(Live::Int(2020)));
    heap.put(&account, "holder", Some(holder.clone()));
    account
}

#[test]
fn read_only_members_survive_self_update() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let account = account_held_by(&heap, &ann);

    let node = Marshaller::new(&registry, &heap).capture(&account).unwrap();
    let SnapshotNode::Object(data) = &node else {
        panic!("expected an object node, got {node:?}");
    };
    assert!(data.fields.contains_key("opened"));
    assert!(data.fields.contains_key("holder"));

    heap.reset_calls();
    let report = Unmarshaller::new(&registry, &heap)
        .update_with_report(&account, &node)
        .unwrap();

    assert_eq!(sets_of(&heap, "opened"), 0);
    assert_eq!(sets_of(&heap, "holder"), 0);
    assert_eq!(sets_of(&heap, "balance"), 1);
    assert_eq!(report.withheld, 1);
    assert_eq!(report.setter_skips, 1);
    assert_eq!(heap.prop(&account, "opened"), Some(Live::Int(2020)));
}

#[test]
fn read_only_members_are_never_written() {
    let heap = Heap::new();
    let registry = customer_registry();
    let ann = persistent_customer(&heap, 1, "Ann", 42);
    let bob = persistent_customer(&heap, 2, "Bob", 50);
    let account = account_held_by(&heap, &ann);

    let node = Marshaller::new(&registry, &heap).capture(&account).unwrap();
    heap.put(&account, "balance", Some(Live::Int(0)));
    heap.put(&account, "opened", Some(Live::Int(1999)));
    heap.put(&account, "holder", Some(bob.clone()));
    heap.reset_calls();
    let report = Unmarshaller::new(&registry, &heap)
        .update_with_report(&account, &node)
        .unwrap();

    assert_eq!(report.withheld, 2);
    assert_eq!(heap.count_calls(|c| matches!(c, Call::Set { .. })), 1);
    assert_eq!(heap.prop(&account, "balance"), Some(Live::Int(100)));
    assert_eq!(heap.prop(&account, "opened"), Some(Live::Int(1999)));
    assert_eq!(heap.prop(&account, "holder"), Some(bob));
}
