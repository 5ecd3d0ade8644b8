//! Fixed-capacity look-behind buffer.
//!
//! Holds the most recent samples seen while the detector is idle. Storage is
//! allocated once; pushing into a full buffer overwrites the oldest sample,
//! so the length can never exceed the capacity.

/// Ring buffer of the samples preceding a potential event.
#[derive(Debug, Clone)]
pub struct PreEventBuffer {
    /// Backing storage, length == capacity
    slots: Box<[f64]>,
    /// Index of the oldest sample
    head: usize,
    /// Number of valid samples
    len: usize,
}

impl PreEventBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append a sample, evicting the oldest one when full.
    ///
    /// A zero-capacity buffer discards everything.
    pub fn push(&mut self, sample: f64) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        if self.len < capacity {
            self.slots[(self.head + self.len) % capacity] = sample;
            self.len += 1;
        } else {
            self.slots[self.head] = sample;
            self.head = (self.head + 1) % capacity;
        }
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let capacity = self.capacity();
        (0..self.len).map(move |i| self.slots[(self.head + i) % capacity])
    }

    /// Average of the buffered samples, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len as f64)
    }

    /// Copy the contents in chronological order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut buffer = PreEventBuffer::new(3);
        buffer.push(1.0);
        buffer.push(2.0);

        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_full());
        assert_eq!(buffer.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut buffer = PreEventBuffer::new(3);
        for v in 1..=5 {
            buffer.push(v as f64);
            assert!(buffer.len() <= buffer.capacity());
        }

        assert!(buffer.is_full());
        assert_eq!(buffer.to_vec(), vec![3.0, 4.0, 5.0]);
        assert_eq!(buffer.mean(), Some(4.0));
    }

    #[test]
    fn test_clear_resets() {
        let mut buffer = PreEventBuffer::new(2);
        buffer.push(1.0);
        buffer.push(2.0);
        buffer.push(3.0);
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.mean(), None);

        buffer.push(9.0);
        assert_eq!(buffer.to_vec(), vec![9.0]);
    }

    #[test]
    fn test_zero_capacity() {
        let mut buffer = PreEventBuffer::new(0);
        buffer.push(1.0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.mean(), None);
    }
}
