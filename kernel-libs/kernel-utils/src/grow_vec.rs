use core::ops::{Deref, DerefMut};

use alloc::{collections::TryReserveError, vec::Vec};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrowError {
    #[error("capacity limit reached")]
    LimitReached,
    #[error("allocation failed: {0}")]
    AllocFailed(#[from] TryReserveError),
}

/// How a [`GrowVec`] grows: the first allocation reserves `initial`
/// elements, every later one doubles, and nothing grows past `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Growth {
    pub initial: usize,
    pub limit: usize,
}

impl Growth {
    pub const fn new(initial: usize, limit: usize) -> Self {
        Self { initial, limit }
    }

    /// The capacity to grow to so that at least `min` elements fit.
    pub fn next_capacity(&self, current: usize, min: usize) -> Result<usize, GrowError> {
        if min > self.limit {
            return Err(GrowError::LimitReached);
        }
        let doubled = if current == 0 {
            self.initial
        } else {
            current.saturating_mul(2)
        };
        Ok(doubled.max(min).min(self.limit))
    }
}

/// A vector whose allocations are fallible and follow a [`Growth`] policy.
///
/// Every allocation goes through `try_reserve_exact`, so running out of
/// heap is reported instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowVec<T> {
    data: Vec<T>,
    growth: Growth,
}

impl<T> GrowVec<T> {
    pub const fn new(growth: Growth) -> Self {
        Self {
            data: Vec::new(),
            growth,
        }
    }

    /// Create with room for exactly `capacity` elements (clamped to the limit).
    pub fn with_capacity(growth: Growth, capacity: usize) -> Result<Self, GrowError> {
        let mut this = Self::new(growth);
        if capacity > growth.limit {
            return Err(GrowError::LimitReached);
        }
        this.data.try_reserve_exact(capacity)?;
        Ok(this)
    }

    pub const fn growth(&self) -> Growth {
        self.growth
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Make sure at least `min` elements fit without reallocating.
    pub fn grow_to(&mut self, min: usize) -> Result<(), GrowError> {
        if min <= self.data.capacity() {
            return Ok(());
        }
        let target = self.growth.next_capacity(self.data.capacity(), min)?;
        self.data.try_reserve_exact(target - self.data.len())?;
        Ok(())
    }

    /// Push, doubling the allocation first when it is full.
    pub fn try_push(&mut self, value: T) -> Result<(), GrowError> {
        if self.data.len() == self.data.capacity() {
            self.grow_to(self.data.len() + 1)?;
        }
        self.data.push(value);
        Ok(())
    }

    /// Resize to `new_len`, filling new elements with `f`.
    pub fn try_resize_with<F: FnMut() -> T>(
        &mut self,
        new_len: usize,
        f: F,
    ) -> Result<(), GrowError> {
        self.grow_to(new_len)?;
        self.data.resize_with(new_len, f);
        Ok(())
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Remove in O(1) by moving the last element into `index`.
    pub fn swap_remove(&mut self, index: usize) -> T {
        self.data.swap_remove(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Clone> GrowVec<T> {
    pub fn try_extend_from_slice(&mut self, other: &[T]) -> Result<(), GrowError> {
        self.grow_to(self.data.len() + other.len())?;
        self.data.extend_from_slice(other);
        Ok(())
    }

    pub fn try_resize(&mut self, new_len: usize, value: T) -> Result<(), GrowError> {
        self.grow_to(new_len)?;
        self.data.resize(new_len, value);
        Ok(())
    }
}

impl<T> Deref for GrowVec<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T> DerefMut for GrowVec<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::{GrowError, GrowVec, Growth};

    const SMALL: Growth = Growth::new(4, 16);

    #[test]
    fn first_growth_uses_initial() {
        let mut v = GrowVec::new(SMALL);
        v.try_push(1u8).unwrap();
        assert!(v.capacity() >= 4);
        assert_eq!(1, v.len());
    }

    #[test]
    fn doubles_when_full() {
        assert_eq!(Ok(8), SMALL.next_capacity(4, 5));
        assert_eq!(Ok(16), SMALL.next_capacity(8, 9));
        assert_eq!(Ok(12), Growth::new(4, 12).next_capacity(8, 9));
    }

    #[test]
    fn large_request_wins_over_doubling() {
        assert_eq!(Ok(13), SMALL.next_capacity(4, 13));
    }

    #[test]
    fn limit_is_enforced() {
        let mut v = GrowVec::new(SMALL);
        for i in 0..16u32 {
            v.try_push(i).unwrap();
        }
        assert_eq!(Err(GrowError::LimitReached), v.try_push(16));
        assert_eq!(16, v.len());
    }

    #[test]
    fn resize_zero_fills() {
        let mut v = GrowVec::new(SMALL);
        v.try_extend_from_slice(b"ab").unwrap();
        v.try_resize(5, 0).unwrap();
        assert_eq!(b"ab\0\0\0", v.as_slice());
    }

    #[test]
    fn swap_remove_moves_last() {
        let mut v = GrowVec::new(SMALL);
        v.try_extend_from_slice(&[1, 2, 3, 4]).unwrap();
        assert_eq!(2, v.swap_remove(1));
        assert_eq!(&[1, 4, 3], v.as_slice());
    }

    #[test]
    fn with_capacity_over_limit() {
        assert_eq!(
            Err(GrowError::LimitReached),
            GrowVec::<u8>::with_capacity(SMALL, 17)
        );
    }
}
