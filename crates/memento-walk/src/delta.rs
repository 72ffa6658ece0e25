//! Collection deltas
//!
//! Provides [`CollectionDelta`], the add/remove difference between the
//! current and the incoming contents of a collection. Elements present on
//! both sides are left alone so that observers bound to element positions
//! keep stable rows.

/// Delta operations on a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOperation<H> {
    /// Element present in incoming but not in current
    Add(H),

    /// Element present in current but not in incoming
    Remove(H),
}

/// Difference between two ordered element sets
///
/// # Invariants
/// - No element appears in both `added` and `removed`
/// - Elements common to both sides appear in neither
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDelta<H> {
    added: Vec<H>,
    removed: Vec<H>,
}

impl<H: Clone + PartialEq> CollectionDelta<H> {
    /// Compute the delta that turns `current` into `incoming`
    ///
    /// Order of `added` follows `incoming`, order of `removed` follows
    /// `current`. Duplicates on either side are collapsed, since both sides
    /// are treated as ordered sets.
    ///
    /// # Performance
    /// O(n * m) with only `PartialEq` available on handles
    #[must_use]
    pub fn compute(current: &[H], incoming: &[H]) -> Self {
        let mut added: Vec<H> = Vec::new();
        for element in incoming {
            if !current.contains(element) && !added.contains(element) {
                added.push(element.clone());
            }
        }

        let mut removed: Vec<H> = Vec::new();
        for element in current {
            if !incoming.contains(element) && !removed.contains(element) {
                removed.push(element.clone());
            }
        }

        Self { added, removed }
    }

    /// Elements to add
    #[inline]
    #[must_use]
    pub fn added(&self) -> &[H] {
        &self.added
    }

    /// Elements to remove
    #[inline]
    #[must_use]
    pub fn removed(&self) -> &[H] {
        &self.removed
    }

    /// True if the collections already match
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of operations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Operations in application order: removals first, then additions
    #[must_use]
    pub fn operations(&self) -> Vec<DeltaOperation<H>> {
        self.removed
            .iter()
            .cloned()
            .map(DeltaOperation::Remove)
            .chain(self.added.iter().cloned().map(DeltaOperation::Add))
            .collect()
    }
}

/// Collapse duplicates, keeping first occurrence order
pub(crate) fn dedup_ordered<H: PartialEq>(items: Vec<H>) -> Vec<H> {
    let mut out: Vec<H> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
