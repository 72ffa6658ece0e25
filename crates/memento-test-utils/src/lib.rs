//! Testing utilities for the memento workspace
//!
//! Shared test helpers, fixtures, and an in-memory [`Heap`] session.

#![allow(missing_docs)]

mod heap;

pub use heap::{Call, Heap, Live, ObjectRef, BLOB, INT, TEXT};

use memento_snapshot::{Association, DescriptorTable, TypeDescriptor};

/// Descriptor table for the customer/order domain used across tests
///
/// - `Customer`: `name`, `age` values; `address` (aggregated, usually
///   transient); `friend` (self reference, for cycles); `orders`
///   (one-to-many); `nickname` (not persisted but writable);
///   `summary` (not persisted, no setter); `rank` (derived)
/// - `Address`: `city`, and a back-reference `resident`
/// - `Order`: `number`, `note` (identity-less serializable blob)
/// - `CustomerList`: free collection of customers
/// - `Team`: `name`, and `members`, a one-to-one member holding a
///   `CustomerList`
/// - `Account`: `balance`, plus `opened` and `holder`, persisted but
///   without setters
pub fn customer_registry() -> DescriptorTable {
    let mut table = DescriptorTable::new();
    let descriptors = [
        TypeDescriptor::value(INT),
        TypeDescriptor::value(TEXT),
        TypeDescriptor::serializable(BLOB),
        TypeDescriptor::entity("Customer")
            .with(Association::one_to_one("name", TEXT))
            .with(Association::one_to_one("age", INT))
            .with(Association::one_to_one("address", "Address"))
            .with(Association::one_to_one("friend", "Customer"))
            .with(Association::one_to_many("orders", "Order"))
            .with(Association::one_to_one("nickname", TEXT).not_persisted())
            .with(Association::one_to_one("summary", TEXT).not_persisted().read_only())
            .with(Association::one_to_one("rank", INT).derived()),
        TypeDescriptor::entity("Address")
            .with(Association::one_to_one("city", TEXT))
            .with(Association::one_to_one("resident", "Customer")),
        TypeDescriptor::entity("Order")
            .with(Association::one_to_one("number", INT))
            .with(Association::one_to_one("note", BLOB)),
        TypeDescriptor::collection("CustomerList", "Customer"),
        TypeDescriptor::entity("Team")
            .with(Association::one_to_one("name", TEXT))
            .with(Association::one_to_one("members", "CustomerList")),
        TypeDescriptor::entity("Account")
            .with(Association::one_to_one("balance", INT))
            .with(Association::one_to_one("opened", INT).read_only())
            .with(Association::one_to_one("holder", "Customer").read_only()),
    ];
    for descriptor in descriptors {
        table.register(descriptor).unwrap();
    }
    table
}

/// Persistent customer with a name and age
pub fn persistent_customer(heap: &Heap, key: i64, name: &str, age: i64) -> Live {
    let customer = heap.new_persistent("Customer", key);
    heap.put(&customer, "name", Some(Live::text(name)));
    heap.put(&customer, "age", Some(Live::Int(age)));
    customer
}

/// Transient customer with a name and age
pub fn transient_customer(heap: &Heap, name: &str, age: i64) -> Live {
    let customer = heap.new_object("Customer");
    heap.put(&customer, "name", Some(Live::text(name)));
    heap.put(&customer, "age", Some(Live::Int(age)));
    customer
}

/// Persistent order with a number
pub fn persistent_order(heap: &Heap, key: i64) -> Live {
    let order = heap.new_persistent("Order", key);
    heap.put(&order, "number", Some(Live::Int(key)));
    order
}

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
