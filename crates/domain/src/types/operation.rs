//! Operations, verbs and idempotency classifications

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::impl_token_conversions;

/// Semantic verb of a declared remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Head,
    Options,
    Put,
    Delete,
    Post,
    Patch,
}

impl_token_conversions!(Verb {
    Get => "GET",
    Head => "HEAD",
    Options => "OPTIONS",
    Put => "PUT",
    Delete => "DELETE",
    Post => "POST",
    Patch => "PATCH",
});

impl Verb {
    /// Classification applied when the operation carries no explicit override
    ///
    /// Read-only and idempotent-by-convention verbs are safe to retry; verbs
    /// that create new state are not.
    pub fn default_classification(self) -> Classification {
        match self {
            Self::Get | Self::Head | Self::Options | Self::Put | Self::Delete => {
                Classification::Idempotent
            }
            Self::Post | Self::Patch => Classification::NonIdempotent,
        }
    }
}

/// Idempotency classification of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Idempotent,
    NonIdempotent,
    #[default]
    Unclassified,
}

impl_token_conversions!(Classification {
    Idempotent => "idempotent",
    NonIdempotent => "non_idempotent",
    Unclassified => "unclassified",
});

impl Classification {
    pub fn is_classified(self) -> bool {
        self != Self::Unclassified
    }
}

/// Explicit idempotency marker declared on an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyOverride {
    Idempotent,
    NonIdempotent,
}

impl_token_conversions!(IdempotencyOverride {
    Idempotent => "idempotent",
    NonIdempotent => "non_idempotent",
});

impl From<IdempotencyOverride> for Classification {
    fn from(value: IdempotencyOverride) -> Self {
        match value {
            IdempotencyOverride::Idempotent => Self::Idempotent,
            IdempotencyOverride::NonIdempotent => Self::NonIdempotent,
        }
    }
}

/// Method signature: name plus ordered parameter type names
///
/// Two methods match across an interface and its call adapters when their
/// signatures are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), params: Vec::new() }
    }

    pub fn with_params<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: name.into(), params: params.into_iter().map(Into::into).collect() }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// Identity of a declared operation: declaring interface plus signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId {
    pub interface: String,
    pub signature: MethodSignature,
}

impl OperationId {
    pub fn new(interface: impl Into<String>, signature: MethodSignature) -> Self {
        Self { interface: interface.into(), signature }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.interface, self.signature)
    }
}
