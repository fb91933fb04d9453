//! Grid: a discrete evaluation set over a space, with an optional validity mask.

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::space_spec::SpaceSpec;

fn check_valid_len(shape: &[usize], valid: &[bool]) -> Result<()> {
    let size: usize = shape.iter().product();
    if valid.is_empty() || valid.len() == size {
        Ok(())
    } else {
        Err(Error::ShapeMismatch(format!(
            "validity mask length {} does not match grid size {size}",
            valid.len()
        )))
    }
}

/// Shared contract for all grid kinds.
#[enum_dispatch]
pub trait GridOps {
    /// The space this grid evaluates over.
    fn spec(&self) -> &SpaceSpec;

    /// The grid's shape, one entry per logical axis (not necessarily `ndim` many — an array
    /// grid's shape indexes its flat sample list rather than mirroring dimensions).
    fn shape(&self) -> &[usize];

    /// Per-point validity, or `&[]` meaning every point is valid.
    fn valid(&self) -> &[bool];

    /// Total number of points (`∏shape`).
    fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the point at flat index `i` is valid.
    fn is_valid(&self, i: usize) -> bool {
        self.valid().is_empty() || self.valid()[i]
    }

    /// The `ndim`-length coordinate of the point at flat index `i`.
    fn point(&self, i: usize) -> Vec<f64>;
}

fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut idx = vec![0usize; shape.len()];
    for k in (0..shape.len()).rev() {
        idx[k] = flat % shape[k];
        flat /= shape[k];
    }
    idx
}

/// Per-dimension coordinate vectors; the grid is their outer product.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VectorGrid {
    spec: SpaceSpec,
    dims: Vec<Vec<f64>>,
    shape: Vec<usize>,
    valid: Vec<bool>,
}

impl VectorGrid {
    /// Builds a vector-product grid from one coordinate vector per dimension.
    pub fn new(spec: SpaceSpec, dims: Vec<Vec<f64>>, valid: Vec<bool>) -> Result<Self> {
        if dims.len() != spec.ndim() {
            return Err(Error::ShapeMismatch(format!(
                "vector grid has {} coordinate vectors, space has {} dimensions",
                dims.len(),
                spec.ndim()
            )));
        }
        let shape: Vec<usize> = dims.iter().map(Vec::len).collect();
        check_valid_len(&shape, &valid)?;
        Ok(Self {
            spec,
            dims,
            shape,
            valid,
        })
    }
}

impl GridOps for VectorGrid {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn valid(&self) -> &[bool] {
        &self.valid
    }

    fn point(&self, i: usize) -> Vec<f64> {
        let idx = unravel(i, &self.shape);
        idx.iter()
            .zip(&self.dims)
            .map(|(&k, dim)| dim[k])
            .collect()
    }
}

/// A flat `(n, ndim)` table of explicit points. `shape` may have any number of axes as long as
/// their product equals `n`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ArrayGrid {
    spec: SpaceSpec,
    points: Vec<f64>,
    shape: Vec<usize>,
    valid: Vec<bool>,
}

impl ArrayGrid {
    /// Builds an array grid from a row-major `(n, ndim)` point table.
    pub fn new(spec: SpaceSpec, points: Vec<f64>, shape: Vec<usize>, valid: Vec<bool>) -> Result<Self> {
        let ndim = spec.ndim();
        let n: usize = shape.iter().product();
        if points.len() != n * ndim {
            return Err(Error::ShapeMismatch(format!(
                "array grid has {} point values, expected {n} * {ndim}",
                points.len()
            )));
        }
        check_valid_len(&shape, &valid)?;
        Ok(Self {
            spec,
            points,
            shape,
            valid,
        })
    }
}

impl GridOps for ArrayGrid {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn valid(&self) -> &[bool] {
        &self.valid
    }

    fn point(&self, i: usize) -> Vec<f64> {
        let ndim = self.spec.ndim();
        self.points[i * ndim..(i + 1) * ndim].to_vec()
    }
}

/// Product of child grids, flattening nested `Multi` grids. Validity is the conjunction of all
/// child validities at the corresponding sub-index.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MultiGrid {
    spec: SpaceSpec,
    children: Vec<Grid>,
    shape: Vec<usize>,
    child_shape_len: Vec<usize>,
}

impl MultiGrid {
    /// Builds a multi grid from its children, flattening any children that are themselves
    /// `Multi` grids.
    pub fn new(children: Vec<Grid>) -> Result<Self> {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Grid::Multi(inner) => flat.extend(inner.children),
                other => flat.push(other),
            }
        }
        if flat.is_empty() {
            return Err(Error::InvalidSpec("multi grid needs at least one child".to_string()));
        }

        let mut spec = SpaceSpec::empty();
        let mut shape = Vec::new();
        let mut child_shape_len = Vec::with_capacity(flat.len());
        for child in &flat {
            spec.append_spec(child.spec())?;
            shape.extend_from_slice(child.shape());
            child_shape_len.push(child.shape().len());
        }

        Ok(Self {
            spec,
            children: flat,
            shape,
            child_shape_len,
        })
    }

    fn child_shape_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges = Vec::with_capacity(self.children.len());
        let mut start = 0;
        for &len in &self.child_shape_len {
            ranges.push((start, len));
            start += len;
        }
        ranges
    }
}

impl GridOps for MultiGrid {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn valid(&self) -> &[bool] {
        &[]
    }

    fn is_valid(&self, i: usize) -> bool {
        let idx = unravel(i, &self.shape);
        self.children
            .iter()
            .zip(self.child_shape_ranges())
            .all(|(child, (start, len))| {
                let sub_idx = &idx[start..start + len];
                let sub_shape = &child.shape()[..len];
                let flat = ravel(sub_idx, sub_shape);
                child.is_valid(flat)
            })
    }

    fn point(&self, i: usize) -> Vec<f64> {
        let idx = unravel(i, &self.shape);
        let mut out = Vec::with_capacity(self.spec.ndim());
        for (child, (start, len)) in self.children.iter().zip(self.child_shape_ranges()) {
            let sub_idx = &idx[start..start + len];
            let sub_shape = &child.shape()[..len];
            let flat = ravel(sub_idx, sub_shape);
            out.extend(child.point(flat));
        }
        out
    }
}

fn ravel(idx: &[usize], shape: &[usize]) -> usize {
    let mut flat = 0;
    for (&k, &s) in idx.iter().zip(shape) {
        flat = flat * s + k;
    }
    flat
}

/// Tagged union of the grid kinds this crate supports.
///
/// Two grids compare equal when their `(shape, spec)` pair matches — never their point values —
/// matching the mixture-evaluation caches that key on grid identity rather than content.
#[enum_dispatch(GridOps)]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Grid {
    /// Per-dimension coordinate vectors, outer-producted.
    Vector(VectorGrid),
    /// A flat explicit point table.
    Array(ArrayGrid),
    /// A product of child grids.
    Multi(MultiGrid),
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.spec() == other.spec()
    }
}

impl Eq for Grid {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};

    fn spec1() -> SpaceSpec {
        SpaceSpec::new(vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")]).unwrap()
    }

    #[test]
    fn vector_grid_enumerates_outer_product() {
        let spec = SpaceSpec::new(vec![
            DimensionSpec::new("x", DimensionKind::Euclidean, ""),
            DimensionSpec::new("y", DimensionKind::Euclidean, ""),
        ])
        .unwrap();
        let g = VectorGrid::new(spec, vec![vec![0.0, 1.0], vec![10.0, 20.0, 30.0]], Vec::new()).unwrap();
        assert_eq!(g.size(), 6);
        assert_eq!(g.point(0), vec![0.0, 10.0]);
        assert_eq!(g.point(4), vec![1.0, 20.0]);
    }

    #[test]
    fn array_grid_indexes_flat_points() {
        let spec = spec1();
        let g = ArrayGrid::new(spec, vec![1.0, 2.0, 3.0], vec![3], Vec::new()).unwrap();
        assert_eq!(g.point(1), vec![2.0]);
    }

    #[test]
    fn array_grid_rejects_mismatched_point_count() {
        let spec = spec1();
        assert!(ArrayGrid::new(spec, vec![1.0, 2.0], vec![3], Vec::new()).is_err());
    }

    #[test]
    fn grids_compare_equal_on_shape_and_spec_not_values() {
        let spec = spec1();
        let a: Grid = ArrayGrid::new(spec.clone(), vec![1.0, 2.0, 3.0], vec![3], Vec::new())
            .unwrap()
            .into();
        let b: Grid = ArrayGrid::new(spec, vec![9.0, 9.0, 9.0], vec![3], Vec::new())
            .unwrap()
            .into();
        assert_eq!(a, b);
    }

    #[test]
    fn multi_grid_flattens_nested_multi() {
        let spec = spec1();
        let leaf = |v: f64| -> Grid { ArrayGrid::new(spec.clone(), vec![v], vec![1], Vec::new()).unwrap().into() };
        let inner = MultiGrid::new(vec![leaf(1.0), leaf(2.0)]).unwrap();
        let outer = MultiGrid::new(vec![Grid::Multi(inner), leaf(3.0)]).unwrap();
        assert_eq!(outer.children.len(), 3);
        assert_eq!(outer.size(), 1);
    }
}
