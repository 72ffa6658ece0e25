//! Scalar and vector mementos
//!
//! A [`Memento`] is a serializable stand-in for one live handle or an
//! ordered sequence of them. It is cheap to store and transport; turning it
//! back into live handles happens lazily in [`Memento::resolve`].

use std::fmt::{self, Display, Formatter};

use memento_snapshot::{Oid, TypeName, TypeRegistry};
use memento_walk::Session;
use serde::{Deserialize, Serialize};

use crate::error::MementoError;
use crate::strategy::{Recreation, StrategyKind};

/// Memento of a single handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarMemento {
    /// Runtime type of the captured handle
    #[serde(rename = "type")]
    type_name: TypeName,

    /// Recreation strategy, fixed at construction
    recreation: Recreation,
}

impl ScalarMemento {
    /// Capture `handle`, selecting its strategy now
    ///
    /// # Errors
    /// [`MementoError::UnsupportedType`] if the handle is neither
    /// value-typed, identifiable nor serializable
    pub fn capture<R, S>(registry: &R, session: &S, handle: &S::Handle) -> Result<Self, MementoError>
    where
        R: TypeRegistry + ?Sized,
        S: Session,
    {
        let type_name = session.type_of(handle)?;
        let recreation = Recreation::select(registry, session, &type_name, handle)?;
        tracing::trace!("Memento of {} uses {} strategy", type_name, recreation.kind());
        Ok(Self {
            type_name,
            recreation,
        })
    }

    /// Assemble from parts
    #[inline]
    #[must_use]
    pub fn from_parts(type_name: impl Into<TypeName>, recreation: Recreation) -> Self {
        Self {
            type_name: type_name.into(),
            recreation,
        }
    }

    /// Set the UI hint key of a lookup; no effect on other strategies
    #[must_use]
    pub fn with_hint_key(mut self, key: impl Into<String>) -> Self {
        if let Recreation::Lookup { hint_key, .. } = &mut self.recreation {
            *hint_key = Some(key.into());
        }
        self
    }

    /// Runtime type of the captured handle
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Strategy
    #[inline]
    #[must_use]
    pub fn recreation(&self) -> &Recreation {
        &self.recreation
    }

    /// Strategy discriminant
    #[inline]
    #[must_use]
    pub fn strategy_kind(&self) -> StrategyKind {
        self.recreation.kind()
    }

    /// Stored identifier, for lookups
    #[inline]
    #[must_use]
    pub fn oid(&self) -> Option<&Oid> {
        self.recreation.oid()
    }

    /// Title hint, for lookups that captured one
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match &self.recreation {
            Recreation::Lookup { title, .. } => title.as_deref(),
            _ => None,
        }
    }

    /// UI hint key, for lookups that were given one
    #[must_use]
    pub fn hint_key(&self) -> Option<&str> {
        match &self.recreation {
            Recreation::Lookup { hint_key, .. } => hint_key.as_deref(),
            _ => None,
        }
    }

    /// Overwrite the stored identifier of a lookup
    ///
    /// Returns `false` for other strategies.
    pub fn refresh_oid(&mut self, fresh: Oid) -> bool {
        self.recreation.refresh_oid(fresh)
    }

    /// Recreate the live handle
    ///
    /// # Errors
    /// Session errors are propagated; after a version conflict the stored
    /// identifier is already current
    pub fn resolve<S: Session>(&mut self, session: &S) -> Result<S::Handle, MementoError> {
        self.recreation.resolve(&self.type_name, session)
    }

    /// Recreate the live handle through a shared reference
    ///
    /// `None` for a lookup; see [`Recreation::resolve_shared`].
    pub fn resolve_shared<S: Session>(&self, session: &S) -> Option<Result<S::Handle, MementoError>> {
        self.recreation.resolve_shared(&self.type_name, session)
    }
}

impl Display for ScalarMemento {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.recreation.kind(),
            self.type_name,
            self.recreation
        )
    }
}

/// Result of resolving a [`Memento`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recreated<H> {
    /// One handle
    Single(H),

    /// Freshly built list of handles, in memento order
    List(Vec<H>),
}

impl<H> Recreated<H> {
    /// The handle of a scalar memento
    #[must_use]
    pub fn single(self) -> Option<H> {
        match self {
            Self::Single(handle) => Some(handle),
            Self::List(_) => None,
        }
    }

    /// All handles, a scalar one as a one-element list
    #[must_use]
    pub fn into_vec(self) -> Vec<H> {
        match self {
            Self::Single(handle) => vec![handle],
            Self::List(handles) => handles,
        }
    }
}

/// Serializable stand-in for a handle or an ordered sequence of handles
///
/// Equality and hashing are structural: a vector equals another vector with
/// pairwise equal children in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", content = "memento", rename_all = "snake_case")]
pub enum Memento {
    /// Single handle
    Scalar(ScalarMemento),

    /// Ordered sequence
    Vector(Vec<ScalarMemento>),
}

impl Memento {
    /// Memento of `handle`
    ///
    /// A collection-typed handle becomes a vector of its current elements,
    /// anything else a scalar.
    ///
    /// # Errors
    /// See [`ScalarMemento::capture`]
    pub fn capture<R, S>(registry: &R, session: &S, handle: &S::Handle) -> Result<Self, MementoError>
    where
        R: TypeRegistry + ?Sized,
        S: Session,
    {
        let type_name = session.type_of(handle)?;
        if registry.describe(&type_name)?.is_collection() {
            return Self::of_list(registry, session, handle);
        }
        ScalarMemento::capture(registry, session, handle).map(Self::Scalar)
    }

    /// Vector memento of `handles`, in order
    ///
    /// # Errors
    /// Fails on the first element no strategy applies to
    pub fn vector<R, S>(registry: &R, session: &S, handles: &[S::Handle]) -> Result<Self, MementoError>
    where
        R: TypeRegistry + ?Sized,
        S: Session,
    {
        handles
            .iter()
            .map(|handle| ScalarMemento::capture(registry, session, handle))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Vector)
    }

    /// Vector memento of a free collection's current elements
    ///
    /// # Errors
    /// See [`Memento::vector`]
    pub fn of_list<R, S>(registry: &R, session: &S, list: &S::Handle) -> Result<Self, MementoError>
    where
        R: TypeRegistry + ?Sized,
        S: Session,
    {
        let elements = session.list_elements(list)?;
        Self::vector(registry, session, &elements)
    }

    /// Strategy of a scalar memento
    #[must_use]
    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        match self {
            Self::Scalar(scalar) => Some(scalar.strategy_kind()),
            Self::Vector(_) => None,
        }
    }

    /// Stored identifier of a scalar lookup
    #[must_use]
    pub fn oid(&self) -> Option<&Oid> {
        match self {
            Self::Scalar(scalar) => scalar.oid(),
            Self::Vector(_) => None,
        }
    }

    /// Children of a vector, or the scalar itself
    #[must_use]
    pub fn scalars(&self) -> &[ScalarMemento] {
        match self {
            Self::Scalar(scalar) => std::slice::from_ref(scalar),
            Self::Vector(children) => children,
        }
    }

    /// Number of handles this memento resolves to
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scalars().len()
    }

    /// True for an empty vector
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recreate the live handle(s)
    ///
    /// A vector resolves its children in order and stops at the first
    /// failure; children already refreshed keep their new identifiers.
    ///
    /// # Errors
    /// See [`ScalarMemento::resolve`]
    pub fn resolve<S: Session>(&mut self, session: &S) -> Result<Recreated<S::Handle>, MementoError> {
        let recreated = match self {
            Self::Scalar(scalar) => Recreated::Single(scalar.resolve(session)?),
            Self::Vector(children) => Recreated::List(
                children
                    .iter_mut()
                    .map(|child| child.resolve(session))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        tracing::debug!("Resolved memento {}", self);
        Ok(recreated)
    }

    /// True when no child is a lookup, so [`Memento::resolve_shared`] applies
    #[must_use]
    pub fn is_shareable(&self) -> bool {
        self.scalars()
            .iter()
            .all(|scalar| scalar.strategy_kind() != StrategyKind::Lookup)
    }

    /// Recreate the live handle(s) through a shared reference
    ///
    /// Returns `None` if the memento holds a lookup.
    pub fn resolve_shared<S: Session>(
        &self,
        session: &S,
    ) -> Option<Result<Recreated<S::Handle>, MementoError>> {
        if !self.is_shareable() {
            return None;
        }
        Some(match self {
            Self::Scalar(scalar) => scalar.resolve_shared(session)?.map(Recreated::Single),
            Self::Vector(children) => children
                .iter()
                .map(|child| child.resolve_shared(session))
                .collect::<Option<Result<Vec<_>, _>>>()?
                .map(Recreated::List),
        })
    }

    /// Serialize to JSON
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, MementoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    ///
    /// # Errors
    /// Returns error on malformed input
    pub fn from_json(source: &str) -> Result<Self, MementoError> {
        Ok(serde_json::from_str(source)?)
    }
}

impl From<ScalarMemento> for Memento {
    fn from(scalar: ScalarMemento) -> Self {
        Self::Scalar(scalar)
    }
}

impl Display for Memento {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Vector(children) => {
                f.write_str("[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str("]")
            }
        }
    }
}
