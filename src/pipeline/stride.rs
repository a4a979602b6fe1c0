use std::collections::BTreeSet;

/// Frame sub-sampling policy.
///
/// Frame `id` is eligible when the stride is 1 or `id % stride` is one of the
/// accepted residues. An empty residue set accepts every residue.
#[derive(Debug, Clone)]
pub struct StrideFilter {
    stride: u64,
    accepted: Vec<bool>,
}

impl StrideFilter {
    pub fn new(stride: u64, residues: &BTreeSet<u64>) -> Self {
        let stride = stride.max(1);
        let accepted = (0..stride)
            .map(|r| residues.is_empty() || residues.contains(&r))
            .collect();
        Self { stride, accepted }
    }

    /// Every frame is eligible.
    pub fn all() -> Self {
        Self::new(1, &BTreeSet::new())
    }

    #[inline]
    pub fn admits(&self, id: u64) -> bool {
        self.stride <= 1 || self.accepted[(id % self.stride) as usize]
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_three_keeps_residues_zero_and_one() {
        let filter = StrideFilter::new(3, &BTreeSet::from([0, 1]));
        let admitted: Vec<u64> = (0..9).filter(|&id| filter.admits(id)).collect();
        assert_eq!(admitted, vec![0, 1, 3, 4, 6, 7]);
        assert!(!filter.admits(2));
        assert!(!filter.admits(5));
        assert!(!filter.admits(8));
    }

    #[test]
    fn unit_stride_admits_everything() {
        let filter = StrideFilter::new(1, &BTreeSet::from([0]));
        assert!((0..100).all(|id| filter.admits(id)));
        assert!((0..100).all(|id| StrideFilter::all().admits(id)));
    }

    #[test]
    fn empty_residue_set_means_every_residue() {
        let filter = StrideFilter::new(4, &BTreeSet::new());
        assert!((0..16).all(|id| filter.admits(id)));
    }

    #[test]
    fn zero_stride_behaves_like_one() {
        let filter = StrideFilter::new(0, &BTreeSet::new());
        assert_eq!(filter.stride(), 1);
        assert!(filter.admits(u64::MAX));
    }
}
