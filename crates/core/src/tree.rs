//! Gradient trees: named, nested collections of parameter tensors.
//!
//! Models and guides expose their parameters as a tree mapping names to
//! tensors or nested sub-trees. Clipping, aggregation and noise injection all
//! walk this structure through one concrete flatten/unflatten pair instead of
//! ad-hoc recursion at every call site.

use std::collections::BTreeMap;

use crate::error::{DpError, Result};
use crate::tensor::{l2_norm, Scalar, Tensor};

/// A tree of named parameter tensors.
///
/// Interior nodes are ordered maps, so flattening visits leaves in a stable
/// order and two trees with equal structure flatten identically.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamTree {
    /// A single tensor.
    Leaf(Tensor),
    /// Named children.
    Node(BTreeMap<String, ParamTree>),
}

/// Structural description of a [`ParamTree`], independent of leaf values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeSpec {
    /// A single leaf position.
    Leaf,
    /// Named children in flattening order.
    Node(Vec<(String, TreeSpec)>),
}

impl ParamTree {
    /// Wrap a tensor as a leaf.
    pub fn leaf(tensor: Tensor) -> Self {
        Self::Leaf(tensor)
    }

    /// Build an interior node from named children.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, ParamTree)>,
        S: Into<String>,
    {
        Self::Node(
            entries
                .into_iter()
                .map(|(name, child)| (name.into(), child))
                .collect(),
        )
    }

    /// Look up a tensor by a `.`-separated path.
    pub fn tensor_at(&self, path: &str) -> Option<&Tensor> {
        let mut node = self;
        for segment in path.split('.') {
            match node {
                ParamTree::Node(children) => node = children.get(segment)?,
                ParamTree::Leaf(_) => return None,
            }
        }
        match node {
            ParamTree::Leaf(tensor) => Some(tensor),
            ParamTree::Node(_) => None,
        }
    }

    /// Structural description of this tree.
    pub fn spec(&self) -> TreeSpec {
        match self {
            ParamTree::Leaf(_) => TreeSpec::Leaf,
            ParamTree::Node(children) => TreeSpec::Node(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.spec()))
                    .collect(),
            ),
        }
    }

    /// Flatten into leaf tensors plus the structure needed to rebuild.
    pub fn flatten(&self) -> (Vec<Tensor>, TreeSpec) {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        (leaves, self.spec())
    }

    fn collect_leaves(&self, out: &mut Vec<Tensor>) {
        match self {
            ParamTree::Leaf(tensor) => out.push(tensor.clone()),
            ParamTree::Node(children) => {
                for child in children.values() {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Rebuild a tree from a spec and flattened leaves.
    pub fn unflatten(spec: &TreeSpec, leaves: Vec<Tensor>) -> Result<Self> {
        let expected = spec.leaf_count();
        if leaves.len() != expected {
            return Err(DpError::shape_mismatch(format!(
                "expected {expected} leaves, got {}",
                leaves.len()
            )));
        }
        let mut iter = leaves.into_iter();
        Self::rebuild(spec, &mut iter)
    }

    fn rebuild(spec: &TreeSpec, leaves: &mut impl Iterator<Item = Tensor>) -> Result<Self> {
        match spec {
            TreeSpec::Leaf => leaves
                .next()
                .map(ParamTree::Leaf)
                .ok_or_else(|| DpError::shape_mismatch("ran out of leaves while rebuilding")),
            TreeSpec::Node(children) => {
                let mut map = BTreeMap::new();
                for (name, child_spec) in children {
                    map.insert(name.clone(), Self::rebuild(child_spec, leaves)?);
                }
                Ok(ParamTree::Node(map))
            }
        }
    }

    /// Borrow every leaf tensor in flattening order.
    pub fn leaves(&self) -> Vec<&Tensor> {
        let mut out = Vec::new();
        self.visit_leaves(&mut out);
        out
    }

    fn visit_leaves<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        match self {
            ParamTree::Leaf(tensor) => out.push(tensor),
            ParamTree::Node(children) => {
                for child in children.values() {
                    child.visit_leaves(out);
                }
            }
        }
    }

    /// Number of leaf tensors.
    pub fn leaf_count(&self) -> usize {
        match self {
            ParamTree::Leaf(_) => 1,
            ParamTree::Node(children) => children.values().map(ParamTree::leaf_count).sum(),
        }
    }

    /// Apply a function to every leaf, preserving structure.
    pub fn map(&self, mut f: impl FnMut(&Tensor) -> Tensor) -> Self {
        self.map_inner(&mut f)
    }

    fn map_inner(&self, f: &mut impl FnMut(&Tensor) -> Tensor) -> Self {
        match self {
            ParamTree::Leaf(tensor) => ParamTree::Leaf(f(tensor)),
            ParamTree::Node(children) => ParamTree::Node(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.map_inner(f)))
                    .collect(),
            ),
        }
    }

    /// Combine two trees leaf-wise, failing on any structural difference.
    pub fn try_zip_with(
        &self,
        other: &Self,
        mut f: impl FnMut(&Tensor, &Tensor) -> Tensor,
    ) -> Result<Self> {
        self.zip_inner(other, &mut f)
    }

    fn zip_inner(
        &self,
        other: &Self,
        f: &mut impl FnMut(&Tensor, &Tensor) -> Tensor,
    ) -> Result<Self> {
        match (self, other) {
            (ParamTree::Leaf(a), ParamTree::Leaf(b)) => {
                if a.raw_dim() != b.raw_dim() {
                    return Err(DpError::shape_mismatch(format!(
                        "leaf shapes differ: {:?} vs {:?}",
                        a.shape(),
                        b.shape()
                    )));
                }
                Ok(ParamTree::Leaf(f(a, b)))
            }
            (ParamTree::Node(left), ParamTree::Node(right)) => {
                if left.len() != right.len()
                    || left.keys().zip(right.keys()).any(|(a, b)| a != b)
                {
                    return Err(DpError::shape_mismatch(
                        "node children differ between trees",
                    ));
                }
                let mut map = BTreeMap::new();
                for ((name, a), b) in left.iter().zip(right.values()) {
                    map.insert(name.clone(), a.zip_inner(b, f)?);
                }
                Ok(ParamTree::Node(map))
            }
            _ => Err(DpError::shape_mismatch("leaf/node kind differs between trees")),
        }
    }

    /// A tree of zeros with this tree's structure and shapes.
    pub fn zeros_like(&self) -> Self {
        self.map(|leaf| Tensor::zeros(leaf.raw_dim()))
    }

    /// Scale every element by a factor.
    pub fn scale(&self, factor: f64) -> Self {
        let s = factor as Scalar;
        self.map(|leaf| leaf.mapv(|v| v * s))
    }

    /// L2 norm across all leaves combined.
    pub fn global_l2_norm(&self) -> f64 {
        let mut sum_sq = 0.0_f64;
        for leaf in self.leaves() {
            let norm = l2_norm(leaf);
            if !norm.is_finite() {
                return norm;
            }
            sum_sq += norm * norm;
        }
        sum_sq.sqrt()
    }
}

impl TreeSpec {
    /// Number of leaves described by this spec.
    pub fn leaf_count(&self) -> usize {
        match self {
            TreeSpec::Leaf => 1,
            TreeSpec::Node(children) => {
                children.iter().map(|(_, child)| child.leaf_count()).sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_tree() -> ParamTree {
        ParamTree::from_entries([
            ("loc", ParamTree::leaf(array![1.0, 2.0].into_dyn())),
            (
                "scale",
                ParamTree::from_entries([(
                    "raw",
                    ParamTree::leaf(array![[3.0], [4.0]].into_dyn()),
                )]),
            ),
        ])
    }

    #[test]
    fn flatten_unflatten_roundtrip() {
        let tree = sample_tree();
        let (leaves, spec) = tree.flatten();
        assert_eq!(leaves.len(), 2);
        let rebuilt = ParamTree::unflatten(&spec, leaves).unwrap();
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn unflatten_rejects_wrong_leaf_count() {
        let (mut leaves, spec) = sample_tree().flatten();
        leaves.pop();
        let err = ParamTree::unflatten(&spec, leaves).unwrap_err();
        assert!(matches!(err, DpError::ShapeMismatch { .. }));
    }

    #[test]
    fn tensor_at_walks_paths() {
        let tree = sample_tree();
        assert!(tree.tensor_at("loc").is_some());
        assert!(tree.tensor_at("scale.raw").is_some());
        assert!(tree.tensor_at("scale.missing").is_none());
        assert!(tree.tensor_at("loc.too_deep").is_none());
    }

    #[test]
    fn global_norm_combines_leaves() {
        let tree = sample_tree();
        // sqrt(1 + 4 + 9 + 16)
        assert!((tree.global_l2_norm() - 30.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn zip_adds_elementwise() {
        let tree = sample_tree();
        let doubled = tree.try_zip_with(&tree, |a, b| a + b).unwrap();
        assert_eq!(doubled, tree.scale(2.0));
    }

    #[test]
    fn zip_rejects_mismatched_names() {
        let a = ParamTree::from_entries([("w", ParamTree::leaf(array![1.0].into_dyn()))]);
        let b = ParamTree::from_entries([("b", ParamTree::leaf(array![1.0].into_dyn()))]);
        let err = a.try_zip_with(&b, |x, _| x.clone()).unwrap_err();
        assert!(matches!(err, DpError::ShapeMismatch { .. }));
    }

    #[test]
    fn zip_rejects_mismatched_shapes() {
        let a = ParamTree::leaf(array![1.0, 2.0].into_dyn());
        let b = ParamTree::leaf(array![1.0, 2.0, 3.0].into_dyn());
        let err = a.try_zip_with(&b, |x, _| x.clone()).unwrap_err();
        assert!(matches!(err, DpError::ShapeMismatch { .. }));
    }
}
