//! Policy-group markers attached to adapter methods

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::adapter::MethodKey;
use super::operation::Classification;
use crate::constants::{IDEMPOTENT_GROUP, NON_IDEMPOTENT_GROUP};

/// Interceptable marker naming the policy group guarding one call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMarker {
    pub group_name: String,
    pub group_key: String,
    pub is_async: bool,
    pub result_type: String,
}

impl GroupMarker {
    /// Default group name for a classification
    ///
    /// Returns `None` for [`Classification::Unclassified`], which never
    /// receives a marker.
    pub fn group_for(classification: Classification) -> Option<&'static str> {
        match classification {
            Classification::Idempotent => Some(IDEMPOTENT_GROUP),
            Classification::NonIdempotent => Some(NON_IDEMPOTENT_GROUP),
            Classification::Unclassified => None,
        }
    }

    pub fn shape(&self) -> &'static str {
        if self.is_async {
            "async"
        } else {
            "sync"
        }
    }
}

/// In-memory marker metadata, ordered per method
#[derive(Debug, Clone, Default)]
pub struct MarkerTable {
    markers: BTreeMap<MethodKey, Vec<GroupMarker>>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, method: MethodKey, marker: GroupMarker) {
        self.markers.entry(method).or_default().push(marker);
    }

    /// Active markers on a method, in attachment order
    pub fn markers(&self, method: &MethodKey) -> &[GroupMarker] {
        self.markers.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodKey, &[GroupMarker])> {
        self.markers.iter().map(|(key, markers)| (key, markers.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
