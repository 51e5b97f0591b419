//! Generation-stamped visited set for graph traversal.

/// Each `clear()` bumps a generation counter instead of zeroing the array; the full reset
/// only happens when the `u16` generation wraps.
#[derive(Debug)]
pub struct VisitedSet {
    data: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u16; capacity],
            generation: 1,
        }
    }

    pub fn clear(&mut self) {
        if self.generation >= u16::MAX - 1 {
            self.data.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    pub fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.data.len() {
            self.data.resize(capacity, 0);
        }
    }

    /// Returns `true` if `id` was not yet visited in this generation.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let idx = id as usize;
        if idx >= self.data.len() {
            self.data.resize(idx + 1, 0);
        }
        if self.data[idx] == self.generation {
            false
        } else {
            self.data[idx] = self.generation;
            true
        }
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_clear() {
        let mut visited = VisitedSet::new(8);
        assert!(visited.insert(3));
        assert!(!visited.insert(3));

        visited.clear();
        assert!(visited.insert(3));
    }

    #[test]
    fn test_grows_on_demand() {
        let mut visited = VisitedSet::default();
        visited.clear();
        assert!(visited.insert(40));
        assert!(!visited.insert(40));
    }

    #[test]
    fn test_generation_wrap_resets() {
        let mut visited = VisitedSet::new(4);
        visited.insert(2);
        for _ in 0..u16::MAX as usize + 3 {
            visited.clear();
        }
        assert!(visited.insert(2));
        assert!(!visited.insert(2));
    }
}
