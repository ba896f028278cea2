use ahash::AHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{AdId, Error, Result, Vector};

const LAYER_SEED: u64 = 0x5eed_ad5e;

/// Bit vector for visited node tracking during one search
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; (capacity + 63) / 64],
        }
    }

    /// Returns true if `idx` was not visited before
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        let word = idx / 64;
        let mask = 1u64 << (idx % 64);
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let was_set = self.bits[word] & mask != 0;
        self.bits[word] |= mask;
        !was_set
    }
}

/// Candidate for search with distance, nearest first in a BinaryHeap
#[derive(Clone, Copy)]
struct Candidate {
    idx: usize,
    dist: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Furthest first, for the bounded result heap
#[derive(Clone, Copy)]
struct ReverseCandidate {
    idx: usize,
    dist: f32,
}

impl PartialEq for ReverseCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReverseCandidate {}

impl Ord for ReverseCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.idx.cmp(&other.idx))
    }
}

impl PartialOrd for ReverseCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    ad_id: AdId,
    layers: Vec<Vec<usize>>,
    deleted: bool,
}

/// HNSW graph over advertisement targeting embeddings.
///
/// Vectors are normalized on insert, so distance is `1 - dot`, i.e. cosine distance.
/// Deletes leave a tombstone that still routes searches; callers compact with
/// [`HnswIndex::rebuild`] once [`HnswIndex::tombstone_ratio`] grows.
pub struct HnswIndex {
    nodes: Vec<HnswNode>,
    /// Contiguous storage for all vectors
    vectors: Vec<f32>,
    dim: usize,
    id_to_index: AHashMap<AdId, usize>,
    entry_point: Option<usize>,
    top_layer: usize,
    max_connections: usize,
    max_layers: usize,
    ef_construction: usize,
    tombstones: usize,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(dim: usize, max_connections: usize, max_layers: usize) -> Self {
        Self {
            nodes: Vec::new(),
            vectors: Vec::new(),
            dim,
            id_to_index: AHashMap::new(),
            entry_point: None,
            top_layer: 0,
            max_connections: max_connections.max(2),
            max_layers: max_layers.max(1),
            ef_construction: 200,
            tombstones: 0,
            rng: StdRng::seed_from_u64(LAYER_SEED),
        }
    }

    #[inline]
    fn get_vector(&self, idx: usize) -> &[f32] {
        let start = idx * self.dim;
        &self.vectors[start..start + self.dim]
    }

    #[inline]
    fn distance_to_node(&self, query: &[f32], idx: usize) -> f32 {
        1.0 - crate::simd::dot_product_simd(query, self.get_vector(idx))
    }

    /// Select layer using exponential decay
    fn select_layer(&mut self) -> usize {
        let mut layer = 0;
        while layer < self.max_layers - 1 && self.rng.random::<f32>() < 0.5 {
            layer += 1;
        }
        layer
    }

    /// Best-first search of one layer, nearest first in the returned vec
    fn search_layer(&self, query: &[f32], entry: usize, ef: usize, layer: usize) -> Vec<(usize, f32)> {
        let mut visited = VisitedSet::new(self.nodes.len());
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<ReverseCandidate> = BinaryHeap::with_capacity(ef + 1);

        let entry_dist = self.distance_to_node(query, entry);
        candidates.push(Candidate { idx: entry, dist: entry_dist });
        results.push(ReverseCandidate { idx: entry, dist: entry_dist });
        visited.insert(entry);

        while let Some(Candidate { idx, dist }) = candidates.pop() {
            let worst = results.peek().map(|c| c.dist).unwrap_or(f32::INFINITY);
            if results.len() >= ef && dist > worst {
                break;
            }

            let Some(neighbors) = self.nodes[idx].layers.get(layer) else {
                continue;
            };

            for &neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = self.distance_to_node(query, neighbor);
                let worst = results.peek().map(|c| c.dist).unwrap_or(f32::INFINITY);
                if results.len() < ef || d < worst {
                    candidates.push(Candidate { idx: neighbor, dist: d });
                    results.push(ReverseCandidate { idx: neighbor, dist: d });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<(usize, f32)> = results.into_iter().map(|c| (c.idx, c.dist)).collect();
        found.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        found
    }

    /// Greedy descent from the entry point down to `target_layer + 1`
    fn descend(&self, query: &[f32], target_layer: usize) -> Option<usize> {
        let mut current = self.entry_point?;
        let mut layer = self.top_layer;
        while layer > target_layer {
            if let Some(&(nearest, _)) = self.search_layer(query, current, 1, layer).first() {
                current = nearest;
            }
            layer -= 1;
        }
        Some(current)
    }

    fn prune(&mut self, idx: usize, layer: usize) {
        let limit = self.max_connections * 2;
        if self.nodes[idx].layers[layer].len() <= limit {
            return;
        }
        let base = self.get_vector(idx).to_vec();
        let mut connections = std::mem::take(&mut self.nodes[idx].layers[layer]);
        connections.sort_by(|&a, &b| {
            let da = self.distance_to_node(&base, a);
            let db = self.distance_to_node(&base, b);
            da.total_cmp(&db).then_with(|| a.cmp(&b))
        });
        connections.truncate(limit);
        self.nodes[idx].layers[layer] = connections;
    }

    /// Insert or replace the embedding of an advertisement
    pub fn insert(&mut self, ad_id: AdId, vector: &Vector) -> Result<()> {
        if vector.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: vector.dim(),
            });
        }
        self.remove(ad_id);

        let normalized = vector.normalized();
        let query = normalized.as_slice();
        let level = self.select_layer();
        let idx = self.nodes.len();

        self.vectors.extend_from_slice(query);
        self.nodes.push(HnswNode {
            ad_id,
            layers: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.id_to_index.insert(ad_id, idx);

        let Some(mut entry) = self.descend(query, level) else {
            self.entry_point = Some(idx);
            self.top_layer = level;
            return Ok(());
        };

        for layer in (0..=level.min(self.top_layer)).rev() {
            let found = self.search_layer(query, entry, self.ef_construction, layer);
            let neighbors: Vec<usize> = found
                .iter()
                .map(|&(n, _)| n)
                .filter(|&n| n != idx)
                .take(self.max_connections)
                .collect();

            for &neighbor in &neighbors {
                if layer < self.nodes[neighbor].layers.len() {
                    self.nodes[neighbor].layers[layer].push(idx);
                    self.prune(neighbor, layer);
                }
            }
            self.nodes[idx].layers[layer] = neighbors;

            if let Some(&(nearest, _)) = found.first() {
                entry = nearest;
            }
        }

        if level > self.top_layer {
            self.top_layer = level;
            self.entry_point = Some(idx);
        }
        Ok(())
    }

    /// Tombstone an advertisement; returns false if it was not indexed
    pub fn remove(&mut self, ad_id: AdId) -> bool {
        match self.id_to_index.remove(&ad_id) {
            Some(idx) => {
                self.nodes[idx].deleted = true;
                self.tombstones += 1;
                true
            }
            None => false,
        }
    }

    /// k nearest live advertisements
    pub fn search(&self, query: &Vector, k: usize, ef: Option<usize>) -> Vec<(AdId, f32)> {
        self.search_filtered(query, k, ef, |_| true)
    }

    /// k nearest live advertisements accepted by `accept`.
    /// Approximate: may return fewer than k rows when `accept` is selective.
    pub fn search_filtered<F>(&self, query: &Vector, k: usize, ef: Option<usize>, accept: F) -> Vec<(AdId, f32)>
    where
        F: Fn(AdId) -> bool,
    {
        if k == 0 || query.dim() != self.dim {
            return Vec::new();
        }
        let normalized = query.normalized();
        let query = normalized.as_slice();
        let Some(entry) = self.descend(query, 0) else {
            return Vec::new();
        };

        let ef = ef.unwrap_or_else(|| (k + k / 2).max(16)).max(k);
        self.search_layer(query, entry, ef, 0)
            .into_iter()
            .filter(|&(idx, _)| !self.nodes[idx].deleted && accept(self.nodes[idx].ad_id))
            .take(k)
            .map(|(idx, dist)| (self.nodes[idx].ad_id, dist))
            .collect()
    }

    /// Compact away tombstones by re-inserting the live nodes
    pub fn rebuild(&mut self) -> Result<()> {
        let live: Vec<(AdId, Vector)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.deleted)
            .map(|(idx, node)| (node.ad_id, Vector::from_slice(self.get_vector(idx))))
            .collect();

        *self = HnswIndex::new(self.dim, self.max_connections, self.max_layers);
        for (ad_id, vector) in live {
            self.insert(ad_id, &vector)?;
        }
        Ok(())
    }

    /// Fraction of graph nodes that are tombstones
    pub fn tombstone_ratio(&self) -> f32 {
        if self.nodes.is_empty() {
            0.0
        } else {
            self.tombstones as f32 / self.nodes.len() as f32
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of live advertisements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_index.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_to_index.is_empty()
    }
}
