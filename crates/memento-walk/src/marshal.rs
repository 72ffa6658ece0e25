//! Marshaller: live object graph -> snapshot node tree
//!
//! Provides [`Marshaller`], which walks a live graph depth-first from a root
//! handle. Each walk owns a fresh captured-identifier set: the first
//! encounter of a transient or parented object embeds its full state, every
//! later encounter (and every persistent reference) becomes a bare
//! reference. This is what makes the walk terminate on cyclic graphs.

use std::collections::HashSet;

use memento_snapshot::{
    Association, CollectionData, FieldValue, ObjectData, Oid, Payload, SnapshotNode,
    TypeDescriptor, TypeName, TypeRegistry,
};

use crate::config::WalkConfig;
use crate::error::WalkError;
use crate::session::Session;

/// Counters collected during one capture walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Full object nodes emitted
    pub objects: usize,

    /// Full collection nodes emitted
    pub collections: usize,

    /// Bare references emitted
    pub bare: usize,

    /// Standalone values emitted
    pub standalone: usize,

    /// Value-typed fields encoded inline
    pub inline_values: usize,

    /// Associations left out (derived, or neither persisted nor writable)
    pub skipped_fields: usize,
}

/// Graph-walking marshaller
///
/// Holds the collaborators for the duration of any number of walks; the
/// per-walk state is created fresh by every [`Marshaller::capture`] call.
#[derive(Debug)]
pub struct Marshaller<'a, R: TypeRegistry + ?Sized, S: Session> {
    registry: &'a R,
    session: &'a S,
    config: WalkConfig,
}

impl<'a, R: TypeRegistry + ?Sized, S: Session> Marshaller<'a, R, S> {
    /// Create a marshaller with default configuration
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

    /// Capture the graph reachable from `root`
    ///
    /// # Errors
    /// Returns error on unknown types, unsupported standalone values,
    /// excessive depth or session failures
    pub fn capture(&self, root: &S::Handle) -> Result<SnapshotNode, WalkError> {
        self.capture_with_report(root).map(|(node, _)| node)
    }

    /// Capture and return walk counters
    ///
    /// # Errors
    /// See [`Marshaller::capture`]
    pub fn capture_with_report(
        &self,
        root: &S::Handle,
    ) -> Result<(SnapshotNode, CaptureReport), WalkError> {
        let mut walk = CaptureWalk {
            registry: self.registry,
            session: self.session,
            config: &self.config,
            captured: HashSet::new(),
            report: CaptureReport::default(),
            synthesized: 0,
        };
        let node = walk.capture_root(root)?;
        tracing::debug!(
            "Captured {} objects, {} collections, {} bare references",
            walk.report.objects,
            walk.report.collections,
            walk.report.bare
        );
        tracing::trace!("Snapshot:\n{}", node.describe());
        Ok((node, walk.report))
    }
}

/// State of a single capture walk
struct CaptureWalk<'w, R: TypeRegistry + ?Sized, S: Session> {
    registry: &'w R,
    session: &'w S,
    config: &'w WalkConfig,
    captured: HashSet<Oid>,
    report: CaptureReport,
    synthesized: u64,
}

impl<'w, R: TypeRegistry + ?Sized, S: Session> CaptureWalk<'w, R, S> {
    fn capture_root(&mut self, root: &S::Handle) -> Result<SnapshotNode, WalkError> {
        let registry: &'w R = self.registry;
        let type_name = self.session.type_of(root)?;
        let descriptor = registry.describe(&type_name)?;

        if descriptor.is_value() {
            return self.standalone(root, descriptor);
        }

        match self.session.identify(root)? {
            Some(oid) => {
                tracing::debug!("Capturing root {}", oid);
                self.captured.insert(oid.clone());
                self.capture_full(root, oid, descriptor, 0)
            }
            None if descriptor.is_collection() => {
                let oid = self.synthesize(&type_name);
                self.captured.insert(oid.clone());
                self.capture_list(root, oid, type_name, 0)
            }
            None => self.standalone(root, descriptor),
        }
    }

    /// Embed an object or free collection whose identifier is already marked
    fn capture_full(
        &mut self,
        handle: &S::Handle,
        oid: Oid,
        descriptor: &TypeDescriptor,
        depth: usize,
    ) -> Result<SnapshotNode, WalkError> {
        if descriptor.is_collection() {
            self.capture_list(handle, oid, descriptor.name.clone(), depth)
        } else {
            self.capture_object(handle, oid, descriptor, depth)
        }
    }

    fn capture_object(
        &mut self,
        handle: &S::Handle,
        oid: Oid,
        descriptor: &TypeDescriptor,
        depth: usize,
    ) -> Result<SnapshotNode, WalkError> {
        self.check_depth(depth)?;
        self.report.objects += 1;
        self.report.skipped_fields +=
            descriptor.associations.len() - descriptor.captured_associations().count();

        let mut data = ObjectData::new(oid, descriptor.name.clone());
        for association in descriptor.captured_associations() {
            let value = if association.is_collection() {
                self.capture_association_collection(handle, &data.oid, association, depth)?
            } else {
                self.capture_property(handle, association, depth)?
            };
            data.fields.insert(association.name.clone(), value);
        }
        Ok(SnapshotNode::Object(data))
    }

    fn capture_property(
        &mut self,
        owner: &S::Handle,
        association: &Association,
        depth: usize,
    ) -> Result<FieldValue, WalkError> {
        let value = self.session.get(owner, &association.name)?;
        let target = self.registry.describe(&association.type_name)?;

        if target.is_value() {
            return Ok(match value {
                Some(value) => {
                    self.report.inline_values += 1;
                    FieldValue::Encoded(self.session.encode(&association.type_name, &value)?)
                }
                None => FieldValue::Node(SnapshotNode::Null),
            });
        }

        Ok(FieldValue::Node(self.capture_reference(value.as_ref(), depth + 1)?))
    }

    fn capture_association_collection(
        &mut self,
        owner: &S::Handle,
        owner_oid: &Oid,
        association: &Association,
        depth: usize,
    ) -> Result<FieldValue, WalkError> {
        self.check_depth(depth + 1)?;
        let oid = Oid::parented(owner_oid, association.type_name.clone(), &association.name);
        let elements = self.session.elements(owner, &association.name)?;

        let mut data = CollectionData::new(oid, association.type_name.clone());
        for element in &elements {
            data.elements.push(self.capture_reference(Some(element), depth + 2)?);
        }
        self.report.collections += 1;
        Ok(FieldValue::Node(SnapshotNode::Collection(data)))
    }

    fn capture_list(
        &mut self,
        list: &S::Handle,
        oid: Oid,
        type_name: TypeName,
        depth: usize,
    ) -> Result<SnapshotNode, WalkError> {
        self.check_depth(depth)?;
        let elements = self.session.list_elements(list)?;

        let mut data = CollectionData::new(oid, type_name);
        for element in &elements {
            data.elements.push(self.capture_reference(Some(element), depth + 1)?);
        }
        self.report.collections += 1;
        Ok(SnapshotNode::Collection(data))
    }

    /// Reference-capture of a nullable handle
    fn capture_reference(
        &mut self,
        handle: Option<&S::Handle>,
        depth: usize,
    ) -> Result<SnapshotNode, WalkError> {
        let Some(handle) = handle else {
            return Ok(SnapshotNode::Null);
        };

        let registry: &'w R = self.registry;
        let type_name = self.session.type_of(handle)?;
        let descriptor = registry.describe(&type_name)?;
        if descriptor.is_value() {
            return self.standalone(handle, descriptor);
        }

        let oid = match self.session.identify(handle)? {
            Some(oid) => oid,
            None if descriptor.is_collection() => self.synthesize(&type_name),
            None => return self.standalone(handle, descriptor),
        };

        let embeddable = oid.is_transient() || oid.is_parented();
        if embeddable && self.captured.insert(oid.clone()) {
            tracing::trace!("Embedding {}", oid);
            return self.capture_full(handle, oid, descriptor, depth);
        }

        self.report.bare += 1;
        Ok(SnapshotNode::Bare { oid, type_name })
    }

    fn standalone(
        &mut self,
        handle: &S::Handle,
        descriptor: &TypeDescriptor,
    ) -> Result<SnapshotNode, WalkError> {
        let payload = if descriptor.is_value() {
            Payload::Encoded(self.session.encode(&descriptor.name, handle)?)
        } else if descriptor.serializable {
            Payload::Serialized(self.session.serialize(handle)?)
        } else {
            return Err(WalkError::UnsupportedType(descriptor.name.clone()));
        };
        self.report.standalone += 1;
        Ok(SnapshotNode::Standalone {
            type_name: descriptor.name.clone(),
            payload,
        })
    }

    fn synthesize(&mut self, type_name: &TypeName) -> Oid {
        self.synthesized += 1;
        Oid::transient(type_name.clone(), format!("list-{}", self.synthesized))
    }

    fn check_depth(&self, depth: usize) -> Result<(), WalkError> {
        if depth > self.config.max_depth {
            return Err(WalkError::DepthExceeded(self.config.max_depth));
        }
        Ok(())
    }
}
