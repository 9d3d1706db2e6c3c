use num_traits::{Float, Zero};
use std::ops::AddAssign;

/// A memory-bounded approximation of a growing stream: a ring of 20 means,
/// doubling the number of raw samples folded into each mean once the ring
/// fills up, so that an arbitrarily long stream of samples still reports at
/// most 20 points.
///
/// `ticks_per_mean` starts at 1 (each pushed value is its own mean) and
/// doubles every time the ring fills, at which point the existing 20 means
/// are squashed pairwise into 10 (the mean of adjacent pairs), freeing up
/// room for 10 more at the new resolution.
pub struct MeanList<T = f64>
where
    T: Float + AddAssign + Zero + From<u8>,
{
    period_sum: T,
    period_count: u8,
    mean_index: u8,
    means: [T; 20],
    ticks_per_mean: u8,
}

impl<T> Default for MeanList<T>
where
    T: Float + AddAssign + Zero + From<u8>,
{
    fn default() -> MeanList<T> {
        MeanList {
            period_sum: T::zero(),
            period_count: 0,
            mean_index: 0,
            means: [T::zero(); 20],
            ticks_per_mean: 1,
        }
    }
}

impl<T> MeanList<T>
where
    T: Float + AddAssign + Zero + From<u8>,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slice(&self) -> &[T] {
        &self.means[..usize::from(self.mean_index)]
    }

    /// Push a raw sample. Returns `true` iff a new decimated mean was
    /// produced (i.e. the caller should treat this as a reportable sample).
    pub fn push(&mut self, val: T) -> bool {
        if self.mean_index == 20 && self.ticks_per_mean < 32 {
            self.squash_means();
        }

        self.period_sum += val;
        self.period_count += 1;

        if self.period_count == self.ticks_per_mean {
            self.push_mean();
            true
        } else {
            false
        }
    }

    fn push_mean(&mut self) {
        let mean = self.period_sum / T::from(self.period_count);

        if self.mean_index == 20 && self.ticks_per_mean == 32 {
            self.means.rotate_left(1);
            self.means[19] = mean;
        } else {
            self.means[usize::from(self.mean_index)] = mean;
            self.mean_index += 1;
        }

        self.period_sum = T::zero();
        self.period_count = 0;
    }

    fn squash_means(&mut self) {
        self.ticks_per_mean *= 2;
        self.mean_index = 10;

        for i in 0..10 {
            let i2 = i * 2;

            self.means[i] = (self.means[i2] + self.means[i2 + 1]) / T::from(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_twenty_values() {
        let mut list: MeanList<f64> = MeanList::new();

        for i in 0..1000 {
            list.push(i as f64);
        }

        assert!(list.slice().len() <= 20);
    }

    #[test]
    fn first_twenty_are_raw() {
        let mut list: MeanList<f64> = MeanList::new();

        for i in 0..20 {
            assert!(list.push(i as f64));
        }

        let expected: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(list.slice(), expected.as_slice());
    }

    #[test]
    fn squashes_pairwise_on_overflow() {
        let mut list: MeanList<f64> = MeanList::new();

        for i in 0..20 {
            list.push(i as f64);
        }

        // 21st sample forces a squash: means become the pairwise means of
        // [0,1],[2,3],...,[18,19], i.e. [0.5, 2.5, 4.5, ..., 18.5], then the
        // 21st/22nd raw samples (20, 21) are folded into one new mean.
        list.push(20.0);
        let not_yet = list.push(21.0);

        assert!(not_yet);
        assert_eq!(
            list.slice()[..10],
            [0.5, 2.5, 4.5, 6.5, 8.5, 10.5, 12.5, 14.5, 16.5, 18.5]
        );
        assert_eq!(list.slice()[10], 20.5);
    }

    #[test]
    fn slides_window_after_deep_overflow() {
        let mut list: MeanList<f64> = MeanList::new();

        // Push far more than 20 * 32 raw samples; the ring should keep
        // sliding (rotate_left) rather than growing unboundedly.
        for i in 0..(20 * 32 + 50) {
            list.push(i as f64);
        }

        assert_eq!(list.slice().len(), 20);
    }
}
