/// Fixed-length history that slides left as new samples arrive.
///
/// The length is fixed at construction; every operation preserves it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftBuffer<T> {
    data: Vec<T>,
}

impl<T: Copy + Default> ShiftBuffer<T> {
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![T::default(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Newest `n` samples (all of them if `n` exceeds the length).
    pub fn tail(&self, n: usize) -> &[T] {
        let start = self.data.len().saturating_sub(n);
        &self.data[start..]
    }

    pub fn tail_mut(&mut self, n: usize) -> &mut [T] {
        let start = self.data.len().saturating_sub(n);
        &mut self.data[start..]
    }

    /// Drops the oldest `n` samples and zero-fills the vacated tail.
    pub fn shift(&mut self, n: usize) {
        let len = self.data.len();
        if n >= len {
            self.data.fill(T::default());
            return;
        }
        self.data.copy_within(n.., 0);
        self.data[len - n..].fill(T::default());
    }

    /// Overwrites the newest `samples.len()` samples in place.
    pub fn write_tail(&mut self, samples: &[T]) {
        let len = self.data.len();
        if samples.len() >= len {
            self.data.copy_from_slice(&samples[samples.len() - len..]);
        } else {
            self.data[len - samples.len()..].copy_from_slice(samples);
        }
    }

    /// Shifts by `samples.len()` and appends `samples`.
    pub fn shift_and_append(&mut self, samples: &[T]) {
        self.push_overlapped(samples, samples.len());
    }

    /// Shifts by `advance`, then writes `samples` over the tail. When
    /// `samples` is longer than `advance`, the extra leading samples rewrite
    /// the end of the previous contents.
    pub fn push_overlapped(&mut self, samples: &[T], advance: usize) {
        self.shift(advance);
        self.write_tail(samples);
    }

    /// Copies `other` into `self`. Both must have the same length.
    pub fn copy_from(&mut self, other: &Self) {
        self.data.copy_from_slice(&other.data);
    }

    pub fn clear(&mut self) {
        self.data.fill(T::default());
    }
}
