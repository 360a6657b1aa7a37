use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::RowId;

/// Kind of mutation requested for a batch, also used as notification parameter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Add,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_static_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_static_str())
    }
}

/// Row ids touched by one batch application.
///
/// The three sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSet {
    pub added: BTreeSet<RowId>,
    pub updated: BTreeSet<RowId>,
    pub deleted: BTreeSet<RowId>,
}

impl DeltaSet {
    pub fn added(ids: impl IntoIterator<Item = RowId>) -> Self {
        Self {
            added: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn deleted(ids: impl IntoIterator<Item = RowId>) -> Self {
        Self {
            deleted: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }
}
