//! The storage collaborator: executes queries with eager loads and exposes
//! materialized instances.

use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::planner::EagerLoadDirective;
use crate::query::Query;
use crate::types::ResourceKey;

/// Result of reading one relationship off an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Related<M> {
    /// A to-one relationship with nothing on the other side.
    Unset,
    One(M),
    Many(Vec<M>),
}

impl<M> Related<M> {
    /// Flatten into the related instances, in read order.
    pub fn into_vec(self) -> Vec<M> {
        match self {
            Related::Unset => Vec::new(),
            Related::One(m) => vec![m],
            Related::Many(ms) => ms,
        }
    }

    /// Borrow the related instances as a slice.
    pub fn as_slice(&self) -> &[M] {
        match self {
            Related::Unset => &[],
            Related::One(m) => std::slice::from_ref(m),
            Related::Many(ms) => ms,
        }
    }

    pub fn map<N>(self, mut f: impl FnMut(M) -> N) -> Related<N> {
        match self {
            Related::Unset => Related::Unset,
            Related::One(m) => Related::One(f(m)),
            Related::Many(ms) => Related::Many(ms.into_iter().map(f).collect()),
        }
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self, Related::Many(_))
    }
}

/// A materialized resource handed out by a [`Store`].
pub trait Instance: Clone {
    fn resource_type(&self) -> &str;

    fn identifier(&self) -> &str;

    /// Attribute members, in a stable order.
    fn attributes(&self) -> Map<String, Value>;

    /// Read a relationship.
    ///
    /// When the relationship was covered by an eager-load directive this
    /// must answer from the loaded state without another query.
    fn read_relationship(&self, name: &str) -> Result<Related<Self>, StoreError>;

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type(), self.identifier())
    }
}

/// Query execution backend.
pub trait Store {
    type Instance: Instance;

    /// Run `query` and eager-load every directive, parents first.
    fn execute_with_eager_loads(
        &self,
        query: &Query,
        directives: &[EagerLoadDirective],
    ) -> Result<Vec<Self::Instance>, StoreError>;

    /// Number of rows `query` matches, ignoring its window.
    fn count(&self, query: &Query) -> Result<usize, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_into_vec() {
        assert!(Related::<u8>::Unset.into_vec().is_empty());
        assert_eq!(Related::One(1).into_vec(), vec![1]);
        assert_eq!(Related::Many(vec![1, 2]).into_vec(), vec![1, 2]);
        assert!(Related::Many(Vec::<u8>::new()).is_to_many());
        assert!(!Related::One(1).is_to_many());
        assert_eq!(Related::One(2).map(|n| n * 2), Related::One(4));
        assert_eq!(Related::Many(vec![1, 2]).as_slice(), &[1, 2]);
    }
}
