//! Unmarshaller and reconciler: snapshot node tree -> live object graph
//!
//! Provides [`Unmarshaller`], which either builds fresh live objects from a
//! node tree ([`Unmarshaller::reconstruct`]) or re-applies a node tree onto an
//! existing live object ([`Unmarshaller::update`]).
//!
//! Reconciliation is field-level: a one-to-one setter is only called when the
//! resolved value actually differs, value-typed fields are always rewritten,
//! and one-to-many associations receive a [`CollectionDelta`] instead of a
//! clear-and-refill. A one-to-one member holding a free collection gets the
//! same delta against the list it already points at.
//!
//! Members declared without a setter are never written. Objects they point
//! at are still reconciled in place.

use std::collections::HashMap;

use memento_snapshot::{
    Association, CollectionData, FieldValue, NodeKind, ObjectData, Oid, Payload, SnapshotNode,
    TypeDescriptor, TypeName, TypeRegistry,
};

use crate::config::WalkConfig;
use crate::delta::{dedup_ordered, CollectionDelta};
use crate::error::WalkError;
use crate::session::Session;

/// Counters collected during one apply walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Objects and collections instantiated
    pub created: usize,

    /// Bare references resolved through the session
    pub resolved: usize,

    /// Existing objects updated in place
    pub reconciled: usize,

    /// One-to-one setter invocations
    pub setter_calls: usize,

    /// One-to-one writes skipped because the value was unchanged
    pub setter_skips: usize,

    /// Value-typed fields rewritten
    pub values_written: usize,

    /// Elements added to collections
    pub added: usize,

    /// Elements removed from collections
    pub removed: usize,

    /// Snapshot fields ignored (excluded members, or unknown when lenient)
    pub skipped_fields: usize,

    /// Writes not made because the member has no setter
    pub withheld: usize,
}

/// Graph-walking unmarshaller and reconciler
#[derive(Debug)]
pub struct Unmarshaller<'a, R: TypeRegistry + ?Sized, S: Session> {
    registry: &'a R,
    session: &'a S,
    config: WalkConfig,
}

impl<'a, R: TypeRegistry + ?Sized, S: Session> Unmarshaller<'a, R, S> {
    /// Create an unmarshaller with default configuration
    #[inline]
    #[must_use]
    pub fn new(registry: &'a R, session: &'a S) -> Self {
        Self {
            registry,
            session,
            config: WalkConfig::default(),
        }
    }

    /// Replace the configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: WalkConfig) -> Self {
        self.config = config;
        self
    }

    /// Build live objects from a node tree
    ///
    /// Returns `None` for a [`SnapshotNode::Null`] root.
    ///
    /// # Errors
    /// Returns error on malformed snapshots, lookup failures or session
    /// failures
    pub fn reconstruct(&self, node: &SnapshotNode) -> Result<Option<S::Handle>, WalkError> {
        self.reconstruct_with_report(node).map(|(handle, _)| handle)
    }

    /// Build live objects and return walk counters
    ///
    /// # Errors
    /// See [`Unmarshaller::reconstruct`]
    pub fn reconstruct_with_report(
        &self,
        node: &SnapshotNode,
    ) -> Result<(Option<S::Handle>, ApplyReport), WalkError> {
        let mut walk = self.walk();
        let handle = walk.resolve_node(node, None, 0)?;
        tracing::debug!(
            "Reconstructed {} objects, resolved {} references",
            walk.report.created,
            walk.report.resolved
        );
        Ok((handle, walk.report))
    }

    /// Re-apply a node tree onto an existing live object or collection
    ///
    /// # Errors
    /// [`WalkError::IdentityMismatch`] if `existing` is not the object the
    /// node describes; otherwise as [`Unmarshaller::reconstruct`]
    pub fn update(&self, existing: &S::Handle, node: &SnapshotNode) -> Result<(), WalkError> {
        self.update_with_report(existing, node).map(|_| ())
    }

    /// Re-apply a node tree and return walk counters
    ///
    /// # Errors
    /// See [`Unmarshaller::update`]
    pub fn update_with_report(
        &self,
        existing: &S::Handle,
        node: &SnapshotNode,
    ) -> Result<ApplyReport, WalkError> {
        let mut walk = self.walk();
        match node {
            SnapshotNode::Object(data) => {
                walk.verify_identity(existing, &data.oid)?;
                walk.reconcile_object(existing, data, 0)?;
            }
            SnapshotNode::Collection(data) => {
                if let Some(actual) = self.session.identify(existing)? {
                    if actual != data.oid && !data.oid.is_transient() {
                        return Err(WalkError::IdentityMismatch {
                            expected: data.oid.clone(),
                            actual: actual.to_string(),
                        });
                    }
                }
                walk.reconcile_list(existing, data, 0)?;
            }
            other => {
                return Err(WalkError::Malformed(format!(
                    "cannot update a live object from a {} node",
                    other.kind()
                )));
            }
        }
        tracing::debug!(
            "Reconciled: {} set, {} unchanged, {} added, {} removed",
            walk.report.setter_calls,
            walk.report.setter_skips,
            walk.report.added,
            walk.report.removed
        );
        Ok(walk.report)
    }

    fn walk(&self) -> ApplyWalk<'_, R, S> {
        ApplyWalk {
            registry: self.registry,
            session: self.session,
            config: &self.config,
            materialised: HashMap::new(),
            report: ApplyReport::default(),
        }
    }
}

/// State of a single apply walk
struct ApplyWalk<'w, R: TypeRegistry + ?Sized, S: Session> {
    registry: &'w R,
    session: &'w S,
    config: &'w WalkConfig,
    /// Objects built or resolved so far in this walk, by identifier
    materialised: HashMap<Oid, S::Handle>,
    report: ApplyReport,
}

impl<'w, R: TypeRegistry + ?Sized, S: Session> ApplyWalk<'w, R, S> {
    /// Resolve any node to a live handle
    ///
    /// `candidate` is the live object currently occupying the slot the node
    /// is applied to; an object node with the same identifier updates it in
    /// place instead of creating a new one.
    fn resolve_node(
        &mut self,
        node: &SnapshotNode,
        candidate: Option<&S::Handle>,
        depth: usize,
    ) -> Result<Option<S::Handle>, WalkError> {
        self.check_depth(depth)?;
        match node {
            SnapshotNode::Null => Ok(None),
            SnapshotNode::Standalone { type_name, payload } => {
                self.decode_payload(type_name, payload).map(Some)
            }
            SnapshotNode::Bare { oid, .. } => self.resolve_bare(oid).map(Some),
            SnapshotNode::Object(data) => self.resolve_object(data, candidate, depth).map(Some),
            SnapshotNode::Collection(data) => self.resolve_list(data, depth).map(Some),
        }
    }

    fn resolve_bare(&mut self, oid: &Oid) -> Result<S::Handle, WalkError> {
        if let Some(handle) = self.materialised.get(oid) {
            return Ok(handle.clone());
        }
        if oid.is_transient() {
            return Err(WalkError::Malformed(format!(
                "bare reference to transient {oid} that was not embedded earlier in the snapshot"
            )));
        }

        let resolved = self.session.resolve(oid)?;
        tracing::trace!("Resolved {} as {}", oid, resolved.oid);
        self.report.resolved += 1;
        self.materialised.insert(oid.clone(), resolved.handle.clone());
        Ok(resolved.handle)
    }

    fn resolve_object(
        &mut self,
        data: &ObjectData,
        candidate: Option<&S::Handle>,
        depth: usize,
    ) -> Result<S::Handle, WalkError> {
        if self.materialised.contains_key(&data.oid) {
            return Err(WalkError::Malformed(format!(
                "object {} is captured in full more than once",
                data.oid
            )));
        }

        if let Some(existing) = candidate {
            if self.session.identify(existing)?.as_ref() == Some(&data.oid) {
                self.reconcile_object(existing, data, depth)?;
                return Ok(existing.clone());
            }
        }

        let descriptor = self.object_descriptor(data)?;
        let handle = self.session.create(&data.type_name)?;
        tracing::trace!("Created {} for {}", data.type_name, data.oid);
        self.report.created += 1;
        self.materialised.insert(data.oid.clone(), handle.clone());
        self.apply_fields(&handle, data, descriptor, depth)?;
        Ok(handle)
    }

    fn reconcile_object(
        &mut self,
        existing: &S::Handle,
        data: &ObjectData,
        depth: usize,
    ) -> Result<(), WalkError> {
        let descriptor = self.object_descriptor(data)?;
        self.report.reconciled += 1;
        self.materialised.insert(data.oid.clone(), existing.clone());
        self.apply_fields(existing, data, descriptor, depth)
    }

    fn resolve_list(&mut self, data: &CollectionData, depth: usize) -> Result<S::Handle, WalkError> {
        self.list_descriptor(data)?;
        if self.materialised.contains_key(&data.oid) {
            return Err(WalkError::Malformed(format!(
                "collection {} is captured in full more than once",
                data.oid
            )));
        }

        let list = self.session.create_list(&data.type_name)?;
        self.report.created += 1;
        self.materialised.insert(data.oid.clone(), list.clone());
        for element in &data.elements {
            if let Some(handle) = self.resolve_node(element, None, depth + 1)? {
                self.session.list_push(&list, handle)?;
                self.report.added += 1;
            }
        }
        Ok(list)
    }

    fn reconcile_list(
        &mut self,
        list: &S::Handle,
        data: &CollectionData,
        depth: usize,
    ) -> Result<(), WalkError> {
        self.list_descriptor(data)?;
        self.materialised.insert(data.oid.clone(), list.clone());

        let current = self.session.list_elements(list)?;
        let incoming = self.resolve_elements(&data.elements, &current, depth)?;
        let delta = CollectionDelta::compute(&current, &incoming);

        for element in delta.removed() {
            self.session.list_remove(list, element)?;
        }
        for element in delta.added() {
            self.session.list_push(list, element.clone())?;
        }
        self.report.removed += delta.removed().len();
        self.report.added += delta.added().len();
        Ok(())
    }

    fn apply_fields(
        &mut self,
        handle: &S::Handle,
        data: &ObjectData,
        descriptor: &TypeDescriptor,
        depth: usize,
    ) -> Result<(), WalkError> {
        for (name, value) in &data.fields {
            let Some(association) = descriptor.association(name) else {
                if self.config.strict_fields {
                    return Err(WalkError::Malformed(format!(
                        "{} has no member named '{name}'",
                        descriptor.name
                    )));
                }
                tracing::warn!("Ignoring unknown field '{}' on {}", name, descriptor.name);
                self.report.skipped_fields += 1;
                continue;
            };

            if !association.is_captured() {
                tracing::warn!(
                    "Ignoring excluded field '{}' on {}",
                    name,
                    descriptor.name
                );
                self.report.skipped_fields += 1;
                continue;
            }

            if association.is_collection() {
                self.apply_collection(handle, association, value, depth)?;
            } else {
                self.apply_property(handle, association, value, depth)?;
            }
        }
        Ok(())
    }

    fn apply_property(
        &mut self,
        owner: &S::Handle,
        association: &Association,
        value: &FieldValue,
        depth: usize,
    ) -> Result<(), WalkError> {
        let registry: &'w R = self.registry;
        let target = registry.describe(&association.type_name)?;

        if target.is_value() {
            let decoded = match value {
                FieldValue::Encoded(encoded) => {
                    Some(self.session.decode(&association.type_name, encoded)?)
                }
                FieldValue::Node(SnapshotNode::Null) => None,
                FieldValue::Node(SnapshotNode::Standalone { type_name, payload }) => {
                    Some(self.decode_payload(type_name, payload)?)
                }
                FieldValue::Node(other) => {
                    return Err(WalkError::KindMismatch {
                        type_name: association.type_name.clone(),
                        expected: NodeKind::Standalone,
                        found: other.kind(),
                    });
                }
            };
            if !association.has_setter {
                self.withhold(association);
                return Ok(());
            }
            self.session.set(owner, &association.name, decoded)?;
            self.report.values_written += 1;
            return Ok(());
        }

        let node = match value {
            FieldValue::Node(SnapshotNode::Collection(data)) if target.is_collection() => {
                return self.apply_list_property(owner, association, data, depth);
            }
            FieldValue::Node(SnapshotNode::Collection(_)) => {
                return Err(WalkError::KindMismatch {
                    type_name: association.type_name.clone(),
                    expected: NodeKind::Object,
                    found: NodeKind::Collection,
                });
            }
            FieldValue::Node(node) => node,
            FieldValue::Encoded(_) => {
                return Err(WalkError::Malformed(format!(
                    "reference field '{}' carries an inline value",
                    association.name
                )));
            }
        };

        let current = self.session.get(owner, &association.name)?;
        let resolved = self.resolve_node(node, current.as_ref(), depth + 1)?;
        self.write_property(owner, association, current, resolved)
    }

    /// One-to-one member typed as a free collection
    ///
    /// The list currently held by the member is reconciled in place when it
    /// is the list the node describes; otherwise a fresh list is built and
    /// assigned.
    fn apply_list_property(
        &mut self,
        owner: &S::Handle,
        association: &Association,
        data: &CollectionData,
        depth: usize,
    ) -> Result<(), WalkError> {
        self.check_depth(depth + 1)?;
        let current = self.session.get(owner, &association.name)?;
        if let Some(list) = &current {
            if self.same_list(list, data)? {
                self.reconcile_list(list, data, depth + 1)?;
                self.report.setter_skips += 1;
                return Ok(());
            }
        }

        let list = self.resolve_list(data, depth + 1)?;
        self.write_property(owner, association, current, Some(list))
    }

    fn write_property(
        &mut self,
        owner: &S::Handle,
        association: &Association,
        current: Option<S::Handle>,
        resolved: Option<S::Handle>,
    ) -> Result<(), WalkError> {
        if resolved == current {
            self.report.setter_skips += 1;
        } else if !association.has_setter {
            self.withhold(association);
        } else {
            self.session.set(owner, &association.name, resolved)?;
            self.report.setter_calls += 1;
        }
        Ok(())
    }

    fn withhold(&mut self, association: &Association) {
        tracing::debug!("'{}' has no setter, keeping its current value", association.name);
        self.report.withheld += 1;
    }

    fn apply_collection(
        &mut self,
        owner: &S::Handle,
        association: &Association,
        value: &FieldValue,
        depth: usize,
    ) -> Result<(), WalkError> {
        let data = match value {
            FieldValue::Node(SnapshotNode::Collection(data)) => data,
            FieldValue::Node(other) => {
                return Err(WalkError::KindMismatch {
                    type_name: association.type_name.clone(),
                    expected: NodeKind::Collection,
                    found: other.kind(),
                });
            }
            FieldValue::Encoded(_) => {
                return Err(WalkError::Malformed(format!(
                    "collection field '{}' carries an inline value",
                    association.name
                )));
            }
        };

        let current = self.session.elements(owner, &association.name)?;
        let incoming = self.resolve_elements(&data.elements, &current, depth + 1)?;
        let delta = CollectionDelta::compute(&current, &incoming);
        if !delta.is_empty() && !association.has_setter {
            self.withhold(association);
            return Ok(());
        }
        if !delta.is_empty() {
            tracing::trace!(
                "Applying delta to '{}': +{} -{}",
                association.name,
                delta.added().len(),
                delta.removed().len()
            );
        }

        for element in delta.removed() {
            self.session.remove_element(owner, &association.name, element)?;
        }
        for element in delta.added() {
            self.session
                .add_element(owner, &association.name, element.clone())?;
        }
        self.report.removed += delta.removed().len();
        self.report.added += delta.added().len();
        Ok(())
    }

    /// Resolve element nodes into an ordered, duplicate-free handle list
    ///
    /// Embedded elements whose identifier matches a current element update
    /// that element in place.
    fn resolve_elements(
        &mut self,
        elements: &[SnapshotNode],
        current: &[S::Handle],
        depth: usize,
    ) -> Result<Vec<S::Handle>, WalkError> {
        let mut incoming = Vec::with_capacity(elements.len());
        for element in elements {
            let candidate = match element {
                SnapshotNode::Object(data) => self.find_by_oid(current, &data.oid)?,
                _ => None,
            };
            if let Some(handle) = self.resolve_node(element, candidate.as_ref(), depth + 1)? {
                incoming.push(handle);
            }
        }
        Ok(dedup_ordered(incoming))
    }

    /// Whether `list` is the live counterpart of `data`
    ///
    /// Synthesized (transient) list identifiers match any list of the same
    /// type.
    fn same_list(&self, list: &S::Handle, data: &CollectionData) -> Result<bool, WalkError> {
        if self.session.type_of(list)? != data.type_name {
            return Ok(false);
        }
        Ok(match self.session.identify(list)? {
            Some(actual) => actual == data.oid || data.oid.is_transient(),
            None => true,
        })
    }

    fn find_by_oid(
        &self,
        handles: &[S::Handle],
        oid: &Oid,
    ) -> Result<Option<S::Handle>, WalkError> {
        for handle in handles {
            if self.session.identify(handle)?.as_ref() == Some(oid) {
                return Ok(Some(handle.clone()));
            }
        }
        Ok(None)
    }

    fn decode_payload(
        &self,
        type_name: &TypeName,
        payload: &Payload,
    ) -> Result<S::Handle, WalkError> {
        Ok(match payload {
            Payload::Encoded(encoded) => self.session.decode(type_name, encoded)?,
            Payload::Serialized(bytes) => self.session.deserialize(type_name, bytes)?,
        })
    }

    fn verify_identity(&self, existing: &S::Handle, expected: &Oid) -> Result<(), WalkError> {
        match self.session.identify(existing)? {
            Some(actual) if actual == *expected => Ok(()),
            Some(actual) => Err(WalkError::IdentityMismatch {
                expected: expected.clone(),
                actual: actual.to_string(),
            }),
            None => Err(WalkError::IdentityMismatch {
                expected: expected.clone(),
                actual: "<value without identity>".to_string(),
            }),
        }
    }

    fn object_descriptor(&self, data: &ObjectData) -> Result<&'w TypeDescriptor, WalkError> {
        let registry: &'w R = self.registry;
        let descriptor = registry.describe(&data.type_name)?;
        if descriptor.is_value() {
            return Err(WalkError::KindMismatch {
                type_name: data.type_name.clone(),
                expected: NodeKind::Standalone,
                found: NodeKind::Object,
            });
        }
        if descriptor.is_collection() {
            return Err(WalkError::KindMismatch {
                type_name: data.type_name.clone(),
                expected: NodeKind::Collection,
                found: NodeKind::Object,
            });
        }
        Ok(descriptor)
    }

    fn list_descriptor(&self, data: &CollectionData) -> Result<(), WalkError> {
        let descriptor = self.registry.describe(&data.type_name)?;
        if !descriptor.is_collection() {
            return Err(WalkError::KindMismatch {
                type_name: data.type_name.clone(),
                expected: NodeKind::Object,
                found: NodeKind::Collection,
            });
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<(), WalkError> {
        if depth > self.config.max_depth {
            return Err(WalkError::DepthExceeded(self.config.max_depth));
        }
        Ok(())
    }
}
