// Train/test split
//
// A seeded permutation; the first ceil(n * test_ratio) rows are held out.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `n_samples` row indices into train and test sets
pub fn train_test_split(n_samples: usize, test_ratio: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        bail!("test ratio must be between 0 and 1, got {}", test_ratio);
    }

    let n_test = (n_samples as f64 * test_ratio).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        bail!(
            "cannot split {} samples with test ratio {}: one side would be empty",
            n_samples,
            test_ratio
        );
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: indices,
    })
}
