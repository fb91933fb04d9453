//! Dimension specifications: the structural identity of a single named axis of a space.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
struct DimensionSpecData {
    name: String,
    kind: DimensionKind,
    extra: String,
}

/// The four dimension kinds a [`crate::space_spec::SpaceSpec`] may carry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum DimensionKind {
    /// A continuous Euclidean axis.
    Euclidean,
    /// A discrete, unordered set of labels.
    Categorical,
    /// An angular axis wrapping at `2π`.
    Circular,
    /// A 1-D axis addressed through a precomputed lookup table.
    Encoded,
}

impl DimensionKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Categorical => "categorical",
            Self::Circular => "circular",
            Self::Encoded => "encoded",
        }
    }
}

/// An immutable record describing one dimension: its name, kind, and an opaque `extra`
/// descriptor (e.g. the kernel tag for a Euclidean dimension, or the label list for a
/// categorical one).
///
/// Identity is the hash of `name(kind)[extra]`: two dimensions are equal iff that hash matches,
/// which in particular means two `DimensionSpec`s with the same name, kind and extra compare
/// equal regardless of construction order.
#[derive(Clone, Debug)]
pub struct DimensionSpec {
    name: String,
    kind: DimensionKind,
    extra: String,
    hash: u64,
}

impl Serialize for DimensionSpec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        DimensionSpecData {
            name: self.name.clone(),
            kind: self.kind,
            extra: self.extra.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DimensionSpec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let data = DimensionSpecData::deserialize(deserializer)?;
        Ok(Self::new(data.name, data.kind, data.extra))
    }
}

impl DimensionSpec {
    /// Builds a dimension spec, computing and caching its identity hash.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DimensionKind, extra: impl Into<String>) -> Self {
        let name = name.into();
        let extra = extra.into();
        let hash = Self::hash_detail(&name, kind, &extra);
        Self {
            name,
            kind,
            extra,
            hash,
        }
    }

    fn hash_detail(name: &str, kind: DimensionKind, extra: &str) -> u64 {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        kind.hash(&mut hasher);
        extra.hash(&mut hasher);
        hasher.finish()
    }

    /// The dimension's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dimension's kind.
    #[must_use]
    pub const fn kind(&self) -> DimensionKind {
        self.kind
    }

    /// The dimension's opaque extra descriptor.
    #[must_use]
    pub fn extra(&self) -> &str {
        &self.extra
    }

    /// `name(kind)[extra]`, the string whose hash is this dimension's identity.
    #[must_use]
    pub fn detail(&self) -> String {
        format!("{}({})[{}]", self.name, self.kind.as_str(), self.extra)
    }

    /// The cached identity hash.
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for DimensionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for DimensionSpec {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_iff_same_detail() {
        let a = DimensionSpec::new("x", DimensionKind::Euclidean, "kernel=gaussian");
        let b = DimensionSpec::new("x", DimensionKind::Euclidean, "kernel=gaussian");
        let c = DimensionSpec::new("x", DimensionKind::Euclidean, "kernel=box");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn detail_format() {
        let d = DimensionSpec::new("theta", DimensionKind::Circular, "");
        assert_eq!(d.detail(), "theta(circular)[]");
    }
}
