use std::ops::Range;

use ndarray::Array1;

use crate::error::{RegressionError, Result};

/// Sorted, unique split points and the segment lookup built on them.
///
/// `n` split points define `n + 1` segments. Binning is right-open: a value
/// equal to a split point belongs to the segment that starts at it, so segment
/// `i` covers `[splits[i-1], splits[i])`, the first segment is unbounded on the
/// left and the last one on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndex {
    splits: Array1<f64>,
}

impl SplitIndex {
    /// Validates and sorts user split points.
    ///
    /// # Errors
    /// `NonFinite` if any split is NaN or infinite, `DuplicateSplit` if a value
    /// appears more than once.
    pub fn new(splits: &Array1<f64>) -> Result<Self> {
        if let Some(index) = splits.iter().position(|s| !s.is_finite()) {
            return Err(RegressionError::NonFinite { name: "splits", index });
        }

        let mut sorted = splits.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(RegressionError::DuplicateSplit(pair[0]));
        }

        Ok(SplitIndex {
            splits: Array1::from(sorted),
        })
    }

    /// A single segment covering the whole real line.
    pub fn empty() -> Self {
        SplitIndex {
            splits: Array1::zeros(0),
        }
    }

    pub fn splits(&self) -> &Array1<f64> {
        &self.splits
    }

    pub fn n_splits(&self) -> usize {
        self.splits.len()
    }

    pub fn n_bins(&self) -> usize {
        self.splits.len() + 1
    }

    /// Segment of `x`: the number of split points `<= x`.
    pub fn bin_of(&self, x: f64) -> usize {
        self.splits.iter().take_while(|&&split| split <= x).count()
    }

    /// Segment of every value in `xs`.
    pub fn assign(&self, xs: &Array1<f64>) -> Vec<usize> {
        xs.iter().map(|&x| self.bin_of(x)).collect()
    }

    /// Contiguous index ranges of each segment within ascending `sorted_xs`.
    ///
    /// Always returns `n_bins()` ranges; a segment without samples gets an
    /// empty range.
    pub fn segment_ranges(&self, sorted_xs: &Array1<f64>) -> Vec<Range<usize>> {
        let xs = sorted_xs.to_vec();
        let mut ranges = Vec::with_capacity(self.n_bins());
        let mut start = 0;
        for &split in self.splits.iter() {
            let end = start + xs[start..].partition_point(|&x| x < split);
            ranges.push(start..end);
            start = end;
        }
        ranges.push(start..xs.len());
        ranges
    }

    /// Interval `[lo, hi]` of every segment, clamped on the outside to the
    /// observed data range `[x_min, x_max]`.
    pub fn segment_ends(&self, x_min: f64, x_max: f64) -> Vec<(f64, f64)> {
        let n_bins = self.n_bins();
        (0..n_bins)
            .map(|i| {
                let lo = if i == 0 { x_min } else { self.splits[i - 1] };
                let hi = if i == n_bins - 1 { x_max } else { self.splits[i] };
                (lo, hi)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_new_sorts_splits() {
        let index = SplitIndex::new(&arr1(&[3.0, 1.0, 2.0])).unwrap();
        assert_eq!(index.splits(), &arr1(&[1.0, 2.0, 3.0]));
        assert_eq!(index.n_splits(), 3);
        assert_eq!(index.n_bins(), 4);
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let result = SplitIndex::new(&arr1(&[2.0, 1.0, 2.0]));
        assert_eq!(result, Err(RegressionError::DuplicateSplit(2.0)));
    }

    #[test]
    fn test_new_rejects_non_finite() {
        let result = SplitIndex::new(&arr1(&[1.0, f64::NAN]));
        assert_eq!(result, Err(RegressionError::NonFinite { name: "splits", index: 1 }));
        assert!(SplitIndex::new(&arr1(&[f64::NEG_INFINITY])).is_err());
    }

    #[test]
    fn test_bin_of_is_right_open() {
        let index = SplitIndex::new(&arr1(&[1.0, 2.0])).unwrap();
        assert_eq!(index.bin_of(0.5), 0);
        assert_eq!(index.bin_of(1.0), 1); // equal to a split: segment starting there
        assert_eq!(index.bin_of(1.5), 1);
        assert_eq!(index.bin_of(2.0), 2);
        assert_eq!(index.bin_of(100.0), 2);
        assert_eq!(index.bin_of(-100.0), 0);
    }

    #[test]
    fn test_empty_splits_single_segment() {
        let index = SplitIndex::new(&Array1::zeros(0)).unwrap();
        assert_eq!(index, SplitIndex::empty());
        assert_eq!(index.n_bins(), 1);
        assert_eq!(index.assign(&arr1(&[-1.0, 0.0, 5.0])), vec![0, 0, 0]);
        assert_eq!(index.segment_ranges(&arr1(&[-1.0, 0.0, 5.0])), vec![0..3]);
    }

    #[test]
    fn test_segment_ranges_match_assign() {
        let index = SplitIndex::new(&arr1(&[2.0, 4.0])).unwrap();
        let xs = arr1(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let ranges = index.segment_ranges(&xs);
        assert_eq!(ranges, vec![0..2, 2..4, 4..7]);

        let bins = index.assign(&xs);
        for (segment, range) in ranges.iter().enumerate() {
            for i in range.clone() {
                assert_eq!(bins[i], segment);
            }
        }
    }

    #[test]
    fn test_segment_ranges_with_empty_segments() {
        let index = SplitIndex::new(&arr1(&[-5.0, 10.0, 20.0])).unwrap();
        let xs = arr1(&[0.0, 1.0, 2.0]);
        assert_eq!(index.segment_ranges(&xs), vec![0..0, 0..3, 3..3, 3..3]);
    }

    #[test]
    fn test_segment_ends() {
        let index = SplitIndex::new(&arr1(&[2.0, 4.0])).unwrap();
        assert_eq!(index.segment_ends(0.0, 6.0), vec![(0.0, 2.0), (2.0, 4.0), (4.0, 6.0)]);
        assert_eq!(SplitIndex::empty().segment_ends(-1.0, 1.0), vec![(-1.0, 1.0)]);
    }
}
