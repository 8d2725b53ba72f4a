//! Two-center k-means over neighbor normals

use sharpcrate_core::Vector3d;

/// Outcome of a 2-means run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TwoMeans {
    /// Two centers were found
    Separated(Vector3d, Vector3d),
    /// Fewer than two distinct inputs, no split exists
    Degenerate,
}

impl TwoMeans {
    /// Seed directions for the bi-normal fit.
    ///
    /// A degenerate run seeds both groups with `fallback`.
    pub fn seeds(&self, fallback: Vector3d) -> (Vector3d, Vector3d) {
        match *self {
            TwoMeans::Separated(a, b) => (a, b),
            TwoMeans::Degenerate => (fallback, fallback),
        }
    }
}

/// Lloyd's algorithm with `k = 2` and farthest-first initialization.
///
/// The first center is `vectors[0]`, the second the input farthest from it.
/// Runs at most `max_iterations` assignment/update rounds. A center that loses
/// all its members keeps its previous position.
pub fn two_means(vectors: &[Vector3d], max_iterations: usize) -> TwoMeans {
    let Some(&first) = vectors.first() else {
        return TwoMeans::Degenerate;
    };

    let (farthest, spread) = vectors
        .iter()
        .map(|v| (v, (v - first).norm_squared()))
        .fold((first, 0.0), |best, (v, d)| if d > best.1 { (*v, d) } else { best });

    if spread == 0.0 {
        return TwoMeans::Degenerate;
    }

    let mut centers = [first, farthest];
    let mut assignment = vec![usize::MAX; vectors.len()];

    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for (slot, v) in assignment.iter_mut().zip(vectors) {
            let nearest = if (v - centers[0]).norm_squared() <= (v - centers[1]).norm_squared() {
                0
            } else {
                1
            };
            if *slot != nearest {
                *slot = nearest;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        let mut sums = [Vector3d::zeros(); 2];
        let mut counts = [0usize; 2];
        for (&cluster, v) in assignment.iter().zip(vectors) {
            sums[cluster] += v;
            counts[cluster] += 1;
        }
        for cluster in 0..2 {
            if counts[cluster] > 0 {
                centers[cluster] = sums[cluster] / counts[cluster] as f64;
            }
        }
    }

    TwoMeans::Separated(centers[0], centers[1])
}
