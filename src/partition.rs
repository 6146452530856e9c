//! Units and partitions of the fibre set.
//!
//! A [`Partition`] is the common currency of the pipeline: the community
//! detector produces one per sweep step, the synthetic pool and the annotated
//! specimens supply reference ones, and the comparator reduces them to a size
//! multiset.
//!
//! Members are fibre ids, not graph node positions, so partitions computed on
//! different subsets of the same specimen can be compared directly.

use hashbrown::{HashMap, HashSet};

use crate::error::{AnalysisError, Result};

/// One motor unit: a non-empty set of fibres.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    /// Position of the unit within its partition.
    pub id: usize,
    /// Member fibre ids, ascending.
    pub members: Vec<usize>,
    /// Innervation number the unit was generated with (synthetic pools only).
    pub innervation: Option<f64>,
}

impl Unit {
    /// Number of member fibres.
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Ordered sequence of pairwise disjoint units.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Partition {
    units: Vec<Unit>,
}

impl Partition {
    /// A partition with no units.
    pub fn empty() -> Self {
        Self { units: Vec::new() }
    }

    /// Build from groups of fibre ids, keeping the given group order.
    ///
    /// Unit ids are assigned `0..groups.len()`. Empty groups and fibres that
    /// appear in more than one group are rejected.
    pub fn new(groups: Vec<Vec<usize>>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut units = Vec::with_capacity(groups.len());
        for (id, mut members) in groups.into_iter().enumerate() {
            if members.is_empty() {
                return Err(AnalysisError::config(format!("unit {id} has no fibres")));
            }
            members.sort_unstable();
            for &fibre in &members {
                if !seen.insert(fibre) {
                    return Err(AnalysisError::config(format!(
                        "fibre {fibre} belongs to more than one unit"
                    )));
                }
            }
            units.push(Unit { id, members, innervation: None });
        }
        Ok(Self { units })
    }

    /// Build from groups and order units by their smallest member.
    ///
    /// This is the canonical order reported by the community detector.
    pub fn canonical(groups: Vec<Vec<usize>>) -> Result<Self> {
        let mut groups: Vec<Vec<usize>> = groups
            .into_iter()
            .map(|mut g| {
                g.sort_unstable();
                g
            })
            .collect();
        groups.sort_by_key(|g| g.first().copied().unwrap_or(usize::MAX));
        Self::new(groups)
    }

    /// Build from a per-node label vector; `fibre_ids[i]` is the fibre of node `i`.
    pub fn from_labels(labels: &[usize], fibre_ids: &[usize]) -> Result<Self> {
        if labels.len() != fibre_ids.len() {
            return Err(AnalysisError::config(format!(
                "{} labels for {} fibres",
                labels.len(),
                fibre_ids.len()
            )));
        }
        let mut index: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (&label, &fibre) in labels.iter().zip(fibre_ids) {
            let slot = *index.entry(label).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(fibre);
        }
        Self::canonical(groups)
    }

    /// Attach innervation values to units in order.
    pub fn with_innervation(mut self, values: &[f64]) -> Self {
        for (unit, &v) in self.units.iter_mut().zip(values) {
            unit.innervation = Some(v);
        }
        self
    }

    /// Units in order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True when there are no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit sizes in unit order.
    pub fn sizes(&self) -> Vec<usize> {
        self.units.iter().map(Unit::size).collect()
    }

    /// Total number of fibres covered.
    pub fn fibre_count(&self) -> usize {
        self.units.iter().map(Unit::size).sum()
    }

    /// Id of the unit containing `fibre`.
    pub fn unit_of(&self, fibre: usize) -> Option<usize> {
        self.units.iter().find(|u| u.members.binary_search(&fibre).is_ok()).map(|u| u.id)
    }

    /// Keep only the given fibres; units left empty are dropped and ids renumbered.
    pub fn restricted_to(&self, fibres: &[usize]) -> Self {
        let keep: HashSet<usize> = fibres.iter().copied().collect();
        let units = self
            .units
            .iter()
            .filter_map(|u| {
                let members: Vec<usize> =
                    u.members.iter().copied().filter(|f| keep.contains(f)).collect();
                (!members.is_empty()).then(|| Unit { id: 0, members, innervation: u.innervation })
            })
            .enumerate()
            .map(|(id, u)| Unit { id, ..u })
            .collect();
        Self { units }
    }

    /// Adjusted Rand index between two partitions over the fibres they share.
    ///
    /// Returns `None` when fewer than two fibres are shared. 1.0 means identical
    /// groupings, values near 0 mean chance-level agreement.
    pub fn agreement(&self, other: &Partition) -> Option<f64> {
        let mut ours: HashMap<usize, usize> = HashMap::new();
        for u in &self.units {
            for &f in &u.members {
                ours.insert(f, u.id);
            }
        }
        let mut contingency: HashMap<(usize, usize), u64> = HashMap::new();
        let mut row_totals: HashMap<usize, u64> = HashMap::new();
        let mut col_totals: HashMap<usize, u64> = HashMap::new();
        let mut shared = 0u64;
        for u in &other.units {
            for f in &u.members {
                if let Some(&a) = ours.get(f) {
                    *contingency.entry((a, u.id)).or_insert(0) += 1;
                    *row_totals.entry(a).or_insert(0) += 1;
                    *col_totals.entry(u.id).or_insert(0) += 1;
                    shared += 1;
                }
            }
        }
        if shared < 2 {
            return None;
        }
        let pairs = |n: u64| (n * n.saturating_sub(1)) as f64 / 2.0;
        let index: f64 = contingency.values().map(|&n| pairs(n)).sum();
        let a: f64 = row_totals.values().map(|&n| pairs(n)).sum();
        let b: f64 = col_totals.values().map(|&n| pairs(n)).sum();
        let expected = a * b / pairs(shared);
        let max = 0.5 * (a + b);
        if (max - expected).abs() < f64::EPSILON {
            return Some(1.0);
        }
        Some((index - expected) / (max - expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_units_rejected() {
        let err = Partition::new(vec![vec![1, 2], vec![2, 3]]).unwrap_err();
        assert!(err.to_string().contains("fibre 2"));
    }

    #[test]
    fn test_empty_unit_rejected() {
        assert!(Partition::new(vec![vec![1], vec![]]).is_err());
    }

    #[test]
    fn test_canonical_orders_by_smallest_member() {
        let p = Partition::canonical(vec![vec![9, 4], vec![2], vec![7, 3]]).unwrap();
        assert_eq!(p.units()[0].members, vec![2]);
        assert_eq!(p.units()[1].members, vec![3, 7]);
        assert_eq!(p.units()[2].members, vec![4, 9]);
        assert_eq!(p.units()[2].id, 2);
        assert_eq!(p.sizes(), vec![1, 2, 2]);
    }

    #[test]
    fn test_from_labels_maps_fibre_ids() {
        let p = Partition::from_labels(&[5, 5, 1, 5], &[10, 11, 12, 13]).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.unit_of(13), Some(0));
        assert_eq!(p.unit_of(12), Some(1));
        assert_eq!(p.unit_of(99), None);
    }

    #[test]
    fn test_restricted_to_drops_empty_units() {
        let p = Partition::new(vec![vec![1, 2], vec![3], vec![4, 5]]).unwrap();
        let r = p.restricted_to(&[2, 4, 5]);
        assert_eq!(r.sizes(), vec![1, 2]);
        assert_eq!(r.units()[1].id, 1);
    }

    #[test]
    fn test_agreement_identical_is_one() {
        let a = Partition::new(vec![vec![0, 1, 2], vec![3, 4]]).unwrap();
        let b = Partition::new(vec![vec![3, 4], vec![2, 1, 0]]).unwrap();
        let ari = a.agreement(&b).unwrap();
        assert!((ari - 1.0).abs() < 1e-12, "ari = {ari}");
    }

    #[test]
    fn test_agreement_disagreement_is_low() {
        let a = Partition::new(vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]).unwrap();
        let b = Partition::new(vec![vec![0, 4], vec![1, 5], vec![2, 6], vec![3, 7]]).unwrap();
        let ari = a.agreement(&b).unwrap();
        assert!(ari < 0.1, "ari = {ari}");
    }

    #[test]
    fn test_agreement_needs_shared_fibres() {
        let a = Partition::new(vec![vec![0, 1]]).unwrap();
        let b = Partition::new(vec![vec![5, 6]]).unwrap();
        assert_eq!(a.agreement(&b), None);
    }
}
