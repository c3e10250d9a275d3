use allocator_api2::{alloc::Allocator, vec::Vec};
use std::{
    fmt,
    ops::{Deref, DerefMut},
};

/// In debug mode or feature unsafe-optim not enabled, same as assert! otherwise does nothing.
#[cfg(any(debug_assertions, not(feature = "unsafe-optim")))]
macro_rules! safe_assert {
    ( $cond: expr ) => {
        assert!($cond)
    };
}

/// In debug mode or feature unsafe-optim not enabled, same as assert! otherwise does nothing.
#[cfg(all(not(debug_assertions), feature = "unsafe-optim"))]
macro_rules! safe_assert {
    ( $cond: expr ) => {};
}

/// Vec with fixed capacity.
///
/// The capacity is reserved once through the allocator when the vec is created
/// and is never exceeded, so none of the operations below reallocate.
pub(crate) struct FixedCapVec<T, A: Allocator> {
    cap: usize,
    v: Vec<T, A>,
}

impl<T, A: Allocator> FixedCapVec<T, A> {
    /// Reserve exactly `cap` slots. Returns `None` if the allocator fails.
    pub fn try_new_in(cap: usize, alloc: A) -> Option<Self> {
        let mut v = Vec::new_in(alloc);
        v.try_reserve_exact(cap).ok()?;
        Some(Self { cap, v })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.v.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.v.len() == self.cap
    }

    #[inline]
    pub fn cap(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        safe_assert!(self.v.len() < self.cap);
        self.v.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.v.pop()
    }

    pub fn insert(&mut self, at: usize, value: T) {
        safe_assert!(self.v.len() < self.cap && at <= self.v.len());
        self.v.insert(at, value);
    }

    pub fn remove(&mut self, at: usize) -> T {
        safe_assert!(at < self.v.len());
        self.v.remove(at)
    }

    /// Move elements `at..` to the end of `dst`.
    pub fn split_off_into(&mut self, at: usize, dst: &mut Self) {
        safe_assert!(at <= self.v.len());
        safe_assert!(dst.v.len() + (self.v.len() - at) <= dst.cap);
        dst.v.extend(self.v.drain(at..));
    }

    /// Move all elements of `other` to the end of `self`.
    pub fn append(&mut self, other: &mut Self) {
        other.split_off_into(0, self);
    }

    /// Get reference to ith element.
    #[inline]
    pub fn ix(&self, ix: usize) -> &T {
        safe_assert!(ix < self.v.len());
        &self.v[ix]
    }

    /// Get mutable reference to ith element.
    #[inline]
    pub fn ixm(&mut self, ix: usize) -> &mut T {
        safe_assert!(ix < self.v.len());
        &mut self.v[ix]
    }
}

impl<T, A: Allocator> Deref for FixedCapVec<T, A> {
    type Target = [T];
    #[inline]
    fn deref(&self) -> &[T] {
        &self.v
    }
}

impl<T, A: Allocator> DerefMut for FixedCapVec<T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.v
    }
}

impl<T, A: Allocator> fmt::Debug for FixedCapVec<T, A>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
