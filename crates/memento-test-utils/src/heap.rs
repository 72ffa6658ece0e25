//! In-memory object heap implementing [`Session`]
//!
//! Objects live in an arena addressed by [`ObjectRef`]; handle equality is
//! arena identity for objects and value equality for scalars. Every mutating
//! session call is counted so tests can assert exactly which writes a
//! reconciliation performed.

use indexmap::IndexMap;
use memento_snapshot::{EncodedValue, Oid, StoreError, TypeName};
use memento_walk::{Resolved, Session};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Value type names understood by the heap codec
pub const INT: &str = "i64";
/// Text value type
pub const TEXT: &str = "String";
/// Opaque, serializable, identity-less type
pub const BLOB: &str = "Blob";

/// Arena index of a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(usize);

/// Live handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Live {
    /// Heap object or list
    Object(ObjectRef),
    /// Integer value
    Int(i64),
    /// Text value
    Text(String),
    /// Opaque bytes without identity
    Blob(Vec<u8>),
}

impl Live {
    /// Text value
    #[must_use]
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One mutating session call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Property write
    Set { owner: Live, field: String },
    /// Association add
    Add { owner: Live, field: String, element: Live },
    /// Association remove
    Remove { owner: Live, field: String, element: Live },
    /// Free-list append
    Push { list: Live, element: Live },
    /// Free-list remove
    Pull { list: Live, element: Live },
    /// Instantiation
    Create { type_name: TypeName },
    /// Identifier lookup
    Resolve { oid: Oid },
}

#[derive(Debug, Clone)]
struct Slot {
    type_name: TypeName,
    oid: Option<Oid>,
    title: Option<String>,
    properties: IndexMap<String, Option<Live>>,
    collections: IndexMap<String, Vec<Live>>,
    list: Vec<Live>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct HeapState {
    slots: Vec<Slot>,
    by_oid: HashMap<Oid, usize>,
    versions: HashMap<Oid, u64>,
    next_key: i64,
    strict_versions: bool,
    calls: Vec<Call>,
}

impl HeapState {
    fn slot(&self, handle: &Live) -> Result<&Slot, StoreError> {
        match handle {
            Live::Object(ObjectRef(index)) => self
                .slots
                .get(*index)
                .filter(|slot| !slot.deleted)
                .ok_or_else(|| StoreError::InvalidHandle(format!("{handle:?}"))),
            other => Err(StoreError::InvalidHandle(format!("{other:?} is not an object"))),
        }
    }

    fn slot_mut(&mut self, handle: &Live) -> Result<&mut Slot, StoreError> {
        match handle {
            Live::Object(ObjectRef(index)) => self
                .slots
                .get_mut(*index)
                .filter(|slot| !slot.deleted)
                .ok_or_else(|| StoreError::InvalidHandle(format!("{handle:?}"))),
            other => Err(StoreError::InvalidHandle(format!("{other:?} is not an object"))),
        }
    }

    fn alloc(&mut self, type_name: TypeName, oid: Option<Oid>) -> Live {
        let index = self.slots.len();
        if let Some(oid) = &oid {
            self.by_oid.insert(oid.clone(), index);
            self.versions.insert(oid.clone(), 1);
        }
        self.slots.push(Slot {
            type_name,
            oid,
            title: None,
            properties: IndexMap::new(),
            collections: IndexMap::new(),
            list: Vec::new(),
            deleted: false,
        });
        Live::Object(ObjectRef(index))
    }

    fn next_transient(&mut self, type_name: &TypeName) -> Oid {
        self.next_key += 1;
        Oid::transient(type_name.clone(), self.next_key)
    }

    fn versioned(&self, oid: &Oid) -> Oid {
        match self.versions.get(oid) {
            Some(version) => oid.clone().with_version(*version),
            None => oid.clone(),
        }
    }
}

/// In-memory heap session
#[derive(Debug, Default)]
pub struct Heap {
    state: Mutex<HeapState>,
}

impl Heap {
    /// Empty heap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject lookups carrying a stale version token
    pub fn set_strict_versions(&self, strict: bool) {
        self.state.lock().strict_versions = strict;
    }

    /// New transient object
    pub fn new_object(&self, type_name: &str) -> Live {
        let mut state = self.state.lock();
        let type_name = TypeName::new(type_name);
        let oid = state.next_transient(&type_name);
        state.alloc(type_name, Some(oid))
    }

    /// New persistent object with a numeric key
    pub fn new_persistent(&self, type_name: &str, key: i64) -> Live {
        let mut state = self.state.lock();
        let oid = Oid::persistent(type_name, key);
        state.alloc(TypeName::new(type_name), Some(oid))
    }

    /// New free list without an identifier
    pub fn new_list(&self, type_name: &str) -> Live {
        self.state.lock().alloc(TypeName::new(type_name), None)
    }

    /// Make a transient object persistent under `key`
    ///
    /// # Panics
    /// Panics if `handle` is not a live object
    pub fn persist(&self, handle: &Live, key: i64) -> Oid {
        let mut state = self.state.lock();
        let slot = state.slot(handle).expect("live object");
        let type_name = slot.type_name.clone();
        let old = slot.oid.clone();
        let oid = Oid::persistent(type_name, key);
        if let Some(old) = old {
            state.by_oid.remove(&old);
            state.versions.remove(&old);
        }
        if let Live::Object(ObjectRef(index)) = handle {
            state.by_oid.insert(oid.clone(), *index);
        }
        state.versions.insert(oid.clone(), 1);
        state.slot_mut(handle).expect("live object").oid = Some(oid.clone());
        oid
    }

    /// Simulate a concurrent modification elsewhere
    ///
    /// # Panics
    /// Panics if `handle` has no identifier
    pub fn bump_version(&self, handle: &Live) -> Oid {
        let mut state = self.state.lock();
        let oid = state.slot(handle).ok().and_then(|s| s.oid.clone()).expect("identified object");
        let version = state.versions.entry(oid.clone()).or_insert(1);
        *version += 1;
        let version = *version;
        oid.with_version(version)
    }

    /// Delete an object so later lookups fail
    pub fn forget(&self, handle: &Live) {
        let mut state = self.state.lock();
        let oid = match state.slot_mut(handle) {
            Ok(slot) => {
                slot.deleted = true;
                slot.oid.clone()
            }
            Err(_) => return,
        };
        if let Some(oid) = oid {
            state.by_oid.remove(&oid);
        }
    }

    /// Set the display title
    pub fn set_title(&self, handle: &Live, title: &str) {
        if let Ok(slot) = self.state.lock().slot_mut(handle) {
            slot.title = Some(title.to_string());
        }
    }

    /// Write a property without recording a call
    pub fn put(&self, owner: &Live, field: &str, value: Option<Live>) {
        if let Ok(slot) = self.state.lock().slot_mut(owner) {
            slot.properties.insert(field.to_string(), value);
        }
    }

    /// Append to an association without recording a call
    pub fn push(&self, owner: &Live, field: &str, element: Live) {
        if let Ok(slot) = self.state.lock().slot_mut(owner) {
            slot.collections.entry(field.to_string()).or_default().push(element);
        }
    }

    /// Append to a free list without recording a call
    pub fn push_list(&self, list: &Live, element: Live) {
        if let Ok(slot) = self.state.lock().slot_mut(list) {
            slot.list.push(element);
        }
    }

    /// Read a property
    #[must_use]
    pub fn prop(&self, owner: &Live, field: &str) -> Option<Live> {
        let state = self.state.lock();
        state
            .slot(owner)
            .ok()
            .and_then(|slot| slot.properties.get(field).cloned().flatten())
    }

    /// Read an association's elements
    #[must_use]
    pub fn items(&self, owner: &Live, field: &str) -> Vec<Live> {
        let state = self.state.lock();
        state
            .slot(owner)
            .ok()
            .and_then(|slot| slot.collections.get(field).cloned())
            .unwrap_or_default()
    }

    /// Read a free list
    #[must_use]
    pub fn list(&self, list: &Live) -> Vec<Live> {
        let state = self.state.lock();
        state.slot(list).map(|slot| slot.list.clone()).unwrap_or_default()
    }

    /// Identifier of an object, without version
    #[must_use]
    pub fn oid_of(&self, handle: &Live) -> Option<Oid> {
        let state = self.state.lock();
        state.slot(handle).ok().and_then(|slot| slot.oid.clone())
    }

    /// Number of objects ever allocated
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Recorded mutating calls
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Count recorded calls matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

fn codec_error(type_name: &TypeName, reason: impl Into<String>) -> StoreError {
    StoreError::Codec {
        type_name: type_name.clone(),
        reason: reason.into(),
    }
}

impl Session for Heap {
    type Handle = Live;

    fn identify(&self, handle: &Live) -> Result<Option<Oid>, StoreError> {
        match handle {
            Live::Object(_) => {
                let state = self.state.lock();
                let slot = state.slot(handle)?;
                Ok(slot.oid.as_ref().map(|oid| state.versioned(oid)))
            }
            _ => Ok(None),
        }
    }

    fn type_of(&self, handle: &Live) -> Result<TypeName, StoreError> {
        Ok(match handle {
            Live::Object(_) => self.state.lock().slot(handle)?.type_name.clone(),
            Live::Int(_) => TypeName::new(INT),
            Live::Text(_) => TypeName::new(TEXT),
            Live::Blob(_) => TypeName::new(BLOB),
        })
    }

    fn title(&self, handle: &Live) -> Option<String> {
        let state = self.state.lock();
        state.slot(handle).ok().and_then(|slot| slot.title.clone())
    }

    fn resolve(&self, oid: &Oid) -> Result<Resolved<Live>, StoreError> {
        self.record(Call::Resolve { oid: oid.clone() });
        let state = self.state.lock();
        let index = *state
            .by_oid
            .get(oid)
            .ok_or_else(|| StoreError::NotFound(oid.clone()))?;
        let current = state.versioned(oid);

        if state.strict_versions {
            if let (Some(requested), Some(actual)) = (oid.version(), current.version()) {
                if requested != actual {
                    return Err(StoreError::Conflict {
                        requested: oid.clone(),
                        current,
                    });
                }
            }
        }

        Ok(Resolved {
            handle: Live::Object(ObjectRef(index)),
            oid: current,
        })
    }

    fn create(&self, type_name: &TypeName) -> Result<Live, StoreError> {
        if [INT, TEXT, BLOB].contains(&type_name.as_str()) {
            return Err(StoreError::Creation {
                type_name: type_name.clone(),
                reason: "value types are decoded, not created".to_string(),
            });
        }
        self.record(Call::Create {
            type_name: type_name.clone(),
        });
        let mut state = self.state.lock();
        let oid = state.next_transient(type_name);
        Ok(state.alloc(type_name.clone(), Some(oid)))
    }

    fn encode(&self, type_name: &TypeName, value: &Live) -> Result<EncodedValue, StoreError> {
        match value {
            Live::Int(n) => Ok(EncodedValue::new(n.to_string())),
            Live::Text(text) => Ok(EncodedValue::new(text.clone())),
            other => Err(codec_error(type_name, format!("{other:?} is not encodable"))),
        }
    }

    fn decode(&self, type_name: &TypeName, encoded: &EncodedValue) -> Result<Live, StoreError> {
        match type_name.as_str() {
            INT => encoded
                .as_str()
                .parse()
                .map(Live::Int)
                .map_err(|e| codec_error(type_name, format!("{e}"))),
            TEXT => Ok(Live::Text(encoded.as_str().to_string())),
            _ => Err(codec_error(type_name, "no codec")),
        }
    }

    fn serialize(&self, handle: &Live) -> Result<Vec<u8>, StoreError> {
        match handle {
            Live::Blob(bytes) => Ok(bytes.clone()),
            other => Err(codec_error(&self.type_of(other)?, "not serializable")),
        }
    }

    fn deserialize(&self, type_name: &TypeName, bytes: &[u8]) -> Result<Live, StoreError> {
        if type_name.as_str() == BLOB {
            Ok(Live::Blob(bytes.to_vec()))
        } else {
            Err(codec_error(type_name, "not serializable"))
        }
    }

    fn get(&self, owner: &Live, name: &str) -> Result<Option<Live>, StoreError> {
        let state = self.state.lock();
        Ok(state.slot(owner)?.properties.get(name).cloned().flatten())
    }

    fn set(&self, owner: &Live, name: &str, value: Option<Live>) -> Result<(), StoreError> {
        self.record(Call::Set {
            owner: owner.clone(),
            field: name.to_string(),
        });
        let mut state = self.state.lock();
        state.slot_mut(owner)?.properties.insert(name.to_string(), value);
        Ok(())
    }

    fn elements(&self, owner: &Live, name: &str) -> Result<Vec<Live>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .slot(owner)?
            .collections
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    fn add_element(&self, owner: &Live, name: &str, element: Live) -> Result<(), StoreError> {
        self.record(Call::Add {
            owner: owner.clone(),
            field: name.to_string(),
            element: element.clone(),
        });
        let mut state = self.state.lock();
        state
            .slot_mut(owner)?
            .collections
            .entry(name.to_string())
            .or_default()
            .push(element);
        Ok(())
    }

    fn remove_element(&self, owner: &Live, name: &str, element: &Live) -> Result<(), StoreError> {
        self.record(Call::Remove {
            owner: owner.clone(),
            field: name.to_string(),
            element: element.clone(),
        });
        let mut state = self.state.lock();
        if let Some(items) = state.slot_mut(owner)?.collections.get_mut(name) {
            items.retain(|e| e != element);
        }
        Ok(())
    }

    fn create_list(&self, type_name: &TypeName) -> Result<Live, StoreError> {
        self.record(Call::Create {
            type_name: type_name.clone(),
        });
        Ok(self.state.lock().alloc(type_name.clone(), None))
    }

    fn list_elements(&self, list: &Live) -> Result<Vec<Live>, StoreError> {
        Ok(self.state.lock().slot(list)?.list.clone())
    }

    fn list_push(&self, list: &Live, element: Live) -> Result<(), StoreError> {
        self.record(Call::Push {
            list: list.clone(),
            element: element.clone(),
        });
        self.state.lock().slot_mut(list)?.list.push(element);
        Ok(())
    }

    fn list_remove(&self, list: &Live, element: &Live) -> Result<(), StoreError> {
        self.record(Call::Pull {
            list: list.clone(),
            element: element.clone(),
        });
        self.state.lock().slot_mut(list)?.list.retain(|e| e != element);
        Ok(())
    }
}
