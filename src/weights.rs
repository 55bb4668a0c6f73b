use std::sync::Arc;

use ahash::AHashMap;
use anyhow::Result;
use log::warn;
use sha2::{Digest, Sha256};

use crate::geometry::PlanarUnits;
use crate::types::{ContiguityMode, UnitId};

/// Row-standardized contiguity weights in compressed sparse row format.
///
/// `offsets[i]..offsets[i+1]` indexes into `neighbors`/`weights` to give the
/// sorted neighbor list of row `i`. Row weights are 1/deg(i) and sum to 1 for
/// every non-island row. Immutable once built; rows map 1:1, in order, onto
/// the unit set the weights were built from — the fingerprint ties the two
/// together so a cached instance is never applied to a different ordering.
#[derive(Debug)]
pub struct SpatialWeights {
    ids: Vec<UnitId>,
    index: AHashMap<UnitId, u32>,
    offsets: Vec<u32>,
    neighbors: Vec<u32>,
    weights: Vec<f64>,
    islands: Vec<u32>,
    mode: ContiguityMode,
    fingerprint: String,
}

impl SpatialWeights {
    /// Build weights for a screened unit set under the given contiguity mode.
    pub fn build(units: &PlanarUnits, mode: ContiguityMode) -> Result<Self> {
        let adjacency = units.contiguity(mode)?;
        Ok(Self::from_adjacency(units.ids().to_vec(), &adjacency, mode))
    }

    /// Assemble CSR storage from symmetric adjacency lists.
    pub(crate) fn from_adjacency(ids: Vec<UnitId>, adjacency: &[Vec<u32>], mode: ContiguityMode) -> Self {
        assert!(adjacency.len() == ids.len(), "adjacency.len() must equal ids.len()");

        let islands: Vec<u32> = adjacency
            .iter()
            .enumerate()
            .filter(|(_, nbrs)| nbrs.is_empty())
            .map(|(i, _)| i as u32)
            .collect();
        if !islands.is_empty() {
            warn!(
                "weights graph has {} island unit(s): {:?}",
                islands.len(),
                islands.iter().take(8).map(|&i| ids[i as usize].as_str()).collect::<Vec<_>>()
            );
        }

        let fingerprint = fingerprint_ids(&ids);
        let index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i as u32)).collect();

        Self {
            offsets: std::iter::once(0u32)
                .chain(adjacency.iter().map(|v| v.len() as u32).scan(0u32, |acc, len| {
                    *acc += len;
                    Some(*acc)
                }))
                .collect(),
            neighbors: adjacency.iter().flatten().copied().collect(),
            weights: adjacency
                .iter()
                .flat_map(|nbrs| {
                    let w = if nbrs.is_empty() { 0.0 } else { 1.0 / nbrs.len() as f64 };
                    std::iter::repeat(w).take(nbrs.len())
                })
                .collect(),
            ids,
            index,
            islands,
            mode,
            fingerprint,
        }
    }

    /// Number of rows (units).
    #[inline] pub fn n(&self) -> usize { self.ids.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    /// Unit ids in row order.
    #[inline] pub fn ids(&self) -> &[UnitId] { &self.ids }

    /// Contiguity mode the weights were built under.
    #[inline] pub fn mode(&self) -> ContiguityMode { self.mode }

    /// Digest of the ordered id list; see [`fingerprint_ids`].
    #[inline] pub fn fingerprint(&self) -> &str { &self.fingerprint }

    /// Row position of `id`, if present.
    #[inline]
    pub fn index_of(&self, id: &UnitId) -> Option<usize> {
        self.index.get(id).map(|&i| i as usize)
    }

    #[inline]
    fn range(&self, row: usize) -> std::ops::Range<usize> {
        self.offsets[row] as usize..self.offsets[row + 1] as usize
    }

    /// Number of neighbors of `row`.
    #[inline] pub fn degree(&self, row: usize) -> usize { self.range(row).len() }

    /// Sorted neighbor rows of `row`.
    #[inline]
    pub fn neighbors(&self, row: usize) -> &[u32] {
        &self.neighbors[self.range(row)]
    }

    /// Iterator over `(neighbor_row, weight)` pairs of `row`.
    #[inline]
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.range(row).map(move |v| (self.neighbors[v] as usize, self.weights[v]))
    }

    /// Rows with no neighbors. A valid but noteworthy state: islands make the
    /// lag term degenerate and can break the likelihood fit downstream.
    #[inline] pub fn islands(&self) -> &[u32] { &self.islands }

    #[inline] pub fn has_islands(&self) -> bool { !self.islands.is_empty() }

    /// Sum of all weights; equals the number of non-island rows.
    #[inline]
    pub fn total_weight(&self) -> f64 {
        (self.n() - self.islands.len()) as f64
    }

    /// Spatial lag `W v`: per row, the weighted average of neighbor values.
    /// Island rows lag to 0.
    pub fn lag(&self, values: &[f64]) -> Vec<f64> {
        assert!(values.len() == self.n(), "values.len() must equal weights row count");
        (0..self.n())
            .map(|i| self.row(i).map(|(j, w)| w * values[j]).sum())
            .collect()
    }
}

/// SHA-256 digest over the ordered id list.
///
/// Cache keys must prove id-set *and order* equality before a weights object
/// is reused; a count or a sampled prefix is not enough, since exposure and
/// regression subsets can differ silently for the same count.
pub fn fingerprint_ids(ids: &[UnitId]) -> String {
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_str().as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

/// Explicit cache for built weights, keyed by contiguity mode and the ordered
/// id fingerprint. Passed by reference into pipeline functions; weights are
/// expensive to rebuild and safely reusable across metrics for the same unit
/// subset.
#[derive(Debug, Default)]
pub struct WeightsCache {
    entries: AHashMap<String, Arc<SpatialWeights>>,
}

impl WeightsCache {
    pub fn new() -> Self {
        Self { entries: AHashMap::new() }
    }

    /// Fetch cached weights for exactly this unit ordering, building and
    /// storing them on a miss.
    pub fn get_or_build(&mut self, units: &PlanarUnits, mode: ContiguityMode) -> Result<Arc<SpatialWeights>> {
        let key = format!("{:?}:{}", mode, fingerprint_ids(units.ids()));
        if let Some(weights) = self.entries.get(&key) {
            return Ok(Arc::clone(weights));
        }
        let weights = Arc::new(SpatialWeights::build(units, mode)?);
        self.entries.insert(key, Arc::clone(&weights));
        Ok(weights)
    }

    #[inline] pub fn len(&self) -> usize { self.entries.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Drop every cached entry (e.g. after the unit universe changes).
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}
