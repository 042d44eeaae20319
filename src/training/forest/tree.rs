// CART classification tree (Gini impurity)

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        /// Class proportions of the training samples that reached this leaf
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        /// Samples with `value <= threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features examined per split (at least one valid split is always searched for)
    pub max_features: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    n_classes: usize,
    /// Impurity decrease per feature, normalized to sum to 1
    importances: Vec<f64>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    /// n_left * gini_left + n_right * gini_right
    child_impurity: f64,
}

struct Builder<'a> {
    x: ArrayView2<'a, f64>,
    y: &'a [usize],
    n_classes: usize,
    params: &'a TreeParams,
    rng: &'a mut StdRng,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

/// Gini impurity of a class histogram holding `total` samples
pub fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

impl<'a> Builder<'a> {
    fn class_counts(&self, samples: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &s in samples {
            counts[self.y[s]] += 1.0;
        }
        counts
    }

    fn leaf(&mut self, counts: &[f64], total: f64) -> usize {
        let distribution = counts.iter().map(|c| c / total).collect();
        self.nodes.push(TreeNode::Leaf { distribution });
        self.nodes.len() - 1
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&samples);
        let total = samples.len() as f64;
        let impurity = gini(&counts, total);

        let depth_reached = self.params.max_depth.map_or(false, |max| depth >= max);
        if impurity <= 0.0 || samples.len() < self.params.min_samples_split || depth_reached {
            return self.leaf(&counts, total);
        }

        let Some(split) = self.best_split(&samples, &counts) else {
            return self.leaf(&counts, total);
        };

        self.importances[split.feature] += (total * impurity - split.child_impurity).max(0.0);

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| self.x[[s, split.feature]] <= split.threshold);

        // Reserve the slot so children get higher indices
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            distribution: Vec::new(),
        });
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);
        self.nodes[idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(&mut self, samples: &[usize], counts: &[f64]) -> Option<Candidate> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut *self.rng);

        let total = samples.len() as f64;
        let mut best: Option<Candidate> = None;
        let mut sorted = samples.to_vec();

        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }

            let column = self.x.column(feature);
            sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut left = vec![0.0; self.n_classes];
            let mut right = counts.to_vec();
            for i in 0..sorted.len().saturating_sub(1) {
                let class = self.y[sorted[i]];
                left[class] += 1.0;
                right[class] -= 1.0;

                let value = column[sorted[i]];
                let next = column[sorted[i + 1]];
                if next <= value {
                    continue;
                }

                let n_left = (i + 1) as f64;
                let n_right = total - n_left;
                let child_impurity = n_left * gini(&left, n_left) + n_right * gini(&right, n_right);

                if best
                    .as_ref()
                    .map_or(true, |b| child_impurity < b.child_impurity)
                {
                    let mut threshold = value / 2.0 + next / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(Candidate {
                        feature,
                        threshold,
                        child_impurity,
                    });
                }
            }
        }

        best
    }
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `samples` (duplicates allowed)
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        samples: Vec<usize>,
        n_classes: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = Builder {
            x,
            y,
            n_classes,
            params,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; x.ncols()],
        };
        builder.build(samples, 0);

        let mut importances = builder.importances;
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        Self {
            nodes: builder.nodes,
            n_classes,
            importances,
        }
    }

    /// Class distribution of the leaf `row` falls into
    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn params(max_depth: Option<usize>) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            max_features: 2,
        }
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5.0, 0.0], 5.0), 0.0);
        assert!((gini(&[2.0, 2.0], 4.0) - 0.5).abs() < 1e-12);
        assert_eq!(gini(&[0.0, 0.0], 0.0), 0.0);
    }

    #[test]
    fn test_separable_data_is_fit_exactly() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [10.0, 0.0], [11.0, 0.0]];
        let y = vec![0, 0, 0, 1, 1];
        let mut rng = StdRng::seed_from_u64(42);

        let tree = DecisionTree::fit(x.view(), &y, (0..5).collect(), 2, &params(None), &mut rng);

        for (i, row) in x.rows().into_iter().enumerate() {
            let proba = tree.predict_proba_row(row);
            assert_eq!(proba[y[i]], 1.0);
        }
        // Only the first feature carries signal
        assert_eq!(tree.feature_importances(), &[1.0, 0.0]);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_threshold_is_midpoint() {
        let x = array![[1.0], [3.0]];
        let y = vec![0, 1];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(x.view(), &y, vec![0, 1], 2, &params(None), &mut rng);

        assert_eq!(tree.predict_proba_row(array![1.99].view())[0], 1.0);
        assert_eq!(tree.predict_proba_row(array![2.01].view())[1], 1.0);
    }

    #[test]
    fn test_depth_limit_produces_mixed_leaves() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = vec![0, 1, 0, 1];
        let mut rng = StdRng::seed_from_u64(3);
        let tree = DecisionTree::fit(x.view(), &y, (0..4).collect(), 2, &params(Some(0)), &mut rng);

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict_proba_row(array![1.0].view()), &[0.5, 0.5]);
    }

    #[test]
    fn test_constant_features_make_a_leaf() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = vec![0, 1, 1];
        let mut rng = StdRng::seed_from_u64(3);
        let tree = DecisionTree::fit(x.view(), &y, (0..3).collect(), 2, &params(None), &mut rng);

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.feature_importances(), &[0.0]);
    }
}
