//! # Weighted Selection
//!
//! Generic weighted-random choice over `{item, weight}` pairs.
//!
//! Weights are pre-summed into a cumulative table when entries are pushed, so
//! a pick is one RNG draw plus a binary search. Non-positive and non-finite
//! weights are dropped at insertion: such an entry could never be chosen.

use rand::Rng;

/// A weighted table of choices.
#[derive(Clone, Debug)]
pub struct WeightedSelector<T> {
    /// Items paired with the cumulative weight up to and including them.
    entries: Vec<(T, f64)>,
    /// Sum of all accepted weights.
    total_weight: f64,
}

impl<T> WeightedSelector<T> {
    /// Creates an empty selector.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            total_weight: 0.0,
        }
    }

    /// Adds a choice. Weights that are not finite and positive are ignored.
    pub fn push(&mut self, item: T, weight: f64) {
        if !weight.is_finite() || weight <= 0.0 {
            return;
        }
        self.total_weight += weight;
        self.entries.push((item, self.total_weight));
    }

    /// Number of selectable entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing can be selected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all weights.
    #[inline]
    #[must_use]
    pub const fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Picks one entry with probability proportional to its weight.
    ///
    /// Returns `None` only when the selector is empty.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        let index = self.pick_index(rng)?;
        self.entries.get(index).map(|(item, _)| item)
    }

    /// Consumes the selector and returns the picked item by value.
    pub fn pick_owned<R: Rng + ?Sized>(mut self, rng: &mut R) -> Option<T> {
        let index = self.pick_index(rng)?;
        Some(self.entries.swap_remove(index).0)
    }

    fn pick_index<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let roll = rng.gen::<f64>() * self.total_weight;
        let index = self.entries.partition_point(|(_, cumulative)| *cumulative <= roll);
        // Floating point can land exactly on the total; clamp to the last entry
        Some(index.min(self.entries.len() - 1))
    }
}

impl<T> Default for WeightedSelector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(T, f64)> for WeightedSelector<T> {
    fn from_iter<I: IntoIterator<Item = (T, f64)>>(iter: I) -> Self {
        let mut selector = Self::new();
        for (item, weight) in iter {
            selector.push(item, weight);
        }
        selector
    }
}
