//! Identity matching against a gallery of labeled face embeddings.
//!
//! The gallery is loaded once at startup and never mutated during a run; one
//! label may own several entries (multiple enrollment images of the same
//! person). Matching is a pure nearest-neighbor query in embedding space.

use serde::{Deserialize, Serialize};

/// A fixed-length face embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One enrolled (embedding, label) pair.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

/// Ordered, read-only collection of enrolled embeddings.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingGallery {
    entries: Vec<GalleryEntry>,
}

impl EmbeddingGallery {
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Strategy seam for identity matching.
pub trait Matcher {
    /// Return the label of the best gallery match within `tolerance`, or
    /// `None` when the gallery is empty or nothing is close enough.
    fn best_match<'g>(
        &self,
        gallery: &'g EmbeddingGallery,
        query: &Embedding,
        tolerance: f32,
    ) -> Option<&'g str>;
}

/// Euclidean-distance nearest-neighbor matcher.
///
/// Tie policy: when several entries share the exact minimum distance, the
/// first one in gallery order wins (strict `<` while scanning).
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match<'g>(
        &self,
        gallery: &'g EmbeddingGallery,
        query: &Embedding,
        tolerance: f32,
    ) -> Option<&'g str> {
        let mut best: Option<(&'g str, f32)> = None;

        for entry in gallery.entries() {
            // Entries of a different dimensionality cannot be compared
            let Some(dist) = euclidean_distance(&entry.embedding.values, &query.values) else {
                continue;
            };
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((entry.label.as_str(), dist)),
            }
        }

        match best {
            Some((label, dist)) if dist <= tolerance => Some(label),
            _ => None,
        }
    }
}

/// Euclidean distance between two vectors, `None` if their lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}
