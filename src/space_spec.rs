//! `SpaceSpec`: an ordered sequence of [`DimensionSpec`] with globally unique names.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::dimension::DimensionSpec;
use crate::error::{Error, Result};

/// The structural identity of a space: an ordered list of named, typed dimensions.
///
/// Dimension names must be unique within a `SpaceSpec`; this is checked at every construction
/// point and violations roll back to the pre-call state rather than leaving a partially-mutated
/// spec behind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpaceSpec {
    dims: Vec<DimensionSpec>,
}

fn names_unique(dims: &[DimensionSpec]) -> bool {
    let mut seen = FxHashSet::default();
    dims.iter().all(|d| seen.insert(d.name()))
}

impl SpaceSpec {
    /// Builds a spec from a vector of dimensions, failing if any two names collide.
    pub fn new(dims: Vec<DimensionSpec>) -> Result<Self> {
        if !names_unique(&dims) {
            return Err(Error::InvalidSpec(
                "non-unique dimension names".to_string(),
            ));
        }
        Ok(Self { dims })
    }

    /// An empty spec.
    #[must_use]
    pub fn empty() -> Self {
        Self { dims: Vec::new() }
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// The dimension at `index`.
    pub fn dim(&self, index: usize) -> Result<&DimensionSpec> {
        self.dims
            .get(index)
            .ok_or_else(|| Error::OutOfBounds(format!("dimension index {index} out of bound")))
    }

    /// All dimensions, in order.
    #[must_use]
    pub fn dims(&self) -> &[DimensionSpec] {
        &self.dims
    }

    /// The names of all dimensions, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.dims.iter().map(DimensionSpec::name).collect()
    }

    /// Appends dimensions, rolling back on a uniqueness violation.
    pub fn append(&mut self, dims: impl IntoIterator<Item = DimensionSpec>) -> Result<()> {
        let n = self.dims.len();
        self.dims.extend(dims);
        if !names_unique(&self.dims) {
            self.dims.truncate(n);
            return Err(Error::InvalidSpec(
                "non-unique dimension names".to_string(),
            ));
        }
        Ok(())
    }

    /// Appends another spec's dimensions, rolling back on a uniqueness violation.
    pub fn append_spec(&mut self, other: &Self) -> Result<()> {
        self.append(other.dims.iter().cloned())
    }

    /// Prepends dimensions, rolling back on a uniqueness violation.
    pub fn prepend(&mut self, dims: impl IntoIterator<Item = DimensionSpec>) -> Result<()> {
        let n = self.dims.len();
        let mut new_dims: Vec<DimensionSpec> = dims.into_iter().collect();
        new_dims.extend(self.dims.drain(..));
        if !names_unique(&new_dims) {
            // roll back: new_dims is [prepended..., original...]; keep only the last n.
            let original = new_dims.split_off(new_dims.len() - n);
            self.dims = original;
            return Err(Error::InvalidSpec(
                "non-unique dimension names".to_string(),
            ));
        }
        self.dims = new_dims;
        Ok(())
    }

    /// Prepends another spec's dimensions, rolling back on a uniqueness violation.
    pub fn prepend_spec(&mut self, other: &Self) -> Result<()> {
        self.prepend(other.dims.iter().cloned())
    }

    /// Derives a boolean mask over `self`'s dimensions marking the positions matched by `other`,
    /// in left-to-right order.
    ///
    /// `other`'s dimensions must appear as an order-preserving (not necessarily contiguous)
    /// subsequence of `self`'s dimensions; otherwise `other` is not a proper subspace and this
    /// fails.
    pub fn selection(&self, other: &Self) -> Result<Vec<bool>> {
        let mut sel = vec![false; self.ndim()];
        let mut m = 0usize;

        for k in 0..other.ndim() {
            let mut matched = false;
            while m < self.ndim() {
                if self.dims[m] == other.dims[k] {
                    sel[m] = true;
                    m += 1;
                    matched = true;
                    break;
                }
                m += 1;
            }
            if !matched {
                return Err(Error::InvalidSpec("not a proper subspace".to_string()));
            }
        }

        Ok(sel)
    }

    /// Whether `other` is a proper subspace of `self`.
    #[must_use]
    pub fn issubspace(&self, other: &Self) -> bool {
        self.selection(other).is_ok()
    }

    /// Selects the dimensions marked `true` in `selection`, producing a new spec.
    pub fn select(&self, selection: &[bool]) -> Result<Self> {
        if selection.len() != self.ndim() {
            return Err(Error::OutOfBounds(
                "selection mask size does not match ndim".to_string(),
            ));
        }
        let dims = self
            .dims
            .iter()
            .zip(selection)
            .filter_map(|(d, &s)| s.then(|| d.clone()))
            .collect();
        Ok(Self { dims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionKind;

    fn dim(name: &str) -> DimensionSpec {
        DimensionSpec::new(name, DimensionKind::Euclidean, "")
    }

    #[test]
    fn rejects_duplicate_names() {
        assert!(SpaceSpec::new(vec![dim("x"), dim("x")]).is_err());
    }

    #[test]
    fn append_rolls_back_on_collision() {
        let mut spec = SpaceSpec::new(vec![dim("x"), dim("y")]).unwrap();
        assert!(spec.append(vec![dim("z"), dim("x")]).is_err());
        assert_eq!(spec.ndim(), 2);
    }

    #[test]
    fn selection_is_left_to_right_order_preserving() {
        let full = SpaceSpec::new(vec![dim("a"), dim("b"), dim("c"), dim("d")]).unwrap();
        let sub = SpaceSpec::new(vec![dim("b"), dim("d")]).unwrap();
        let sel = full.selection(&sub).unwrap();
        assert_eq!(sel, vec![false, true, false, true]);
    }

    #[test]
    fn selection_fails_on_out_of_order_subsequence() {
        let full = SpaceSpec::new(vec![dim("a"), dim("b"), dim("c")]).unwrap();
        let sub = SpaceSpec::new(vec![dim("c"), dim("a")]).unwrap();
        assert!(full.selection(&sub).is_err());
    }

    #[test]
    fn select_builds_matching_subspec() {
        let full = SpaceSpec::new(vec![dim("a"), dim("b"), dim("c")]).unwrap();
        let sub = full.select(&[true, false, true]).unwrap();
        assert_eq!(sub.names(), vec!["a", "c"]);
    }
}
