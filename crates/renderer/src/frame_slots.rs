//! Fixed-capacity per-frame storage.

use std::ops::Index;

use smallvec::SmallVec;
use triangle_rhi::{RhiError, RhiResult};

use crate::MAX_CONCURRENT_FRAMES;

/// One `T` per frame slot, between 1 and [`MAX_CONCURRENT_FRAMES`] of them.
///
/// The slot count is fixed when the container is built and matches the
/// presentation layer's concurrent frame count.
#[derive(Clone, Debug)]
pub struct FrameSlots<T> {
    slots: SmallVec<[T; MAX_CONCURRENT_FRAMES]>,
}

impl<T> FrameSlots<T> {
    /// Checks that `count` is a usable number of frame slots.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FrameCountOutOfRange`] if `count` is zero or above
    /// [`MAX_CONCURRENT_FRAMES`].
    pub fn check_count(count: usize) -> RhiResult<usize> {
        if (1..=MAX_CONCURRENT_FRAMES).contains(&count) {
            Ok(count)
        } else {
            Err(RhiError::FrameCountOutOfRange {
                requested: count,
                max: MAX_CONCURRENT_FRAMES,
            })
        }
    }

    /// Builds `count` slots, calling `f` with each slot index in order.
    ///
    /// Stops at the first error; slots built so far are dropped.
    pub fn try_from_fn<F>(count: usize, mut f: F) -> RhiResult<Self>
    where
        F: FnMut(usize) -> RhiResult<T>,
    {
        Self::check_count(count)?;
        let slots = (0..count).map(&mut f).collect::<RhiResult<_>>()?;
        Ok(Self { slots })
    }

    /// Wraps already built per-slot values.
    pub fn from_vec(items: Vec<T>) -> RhiResult<Self> {
        Self::check_count(items.len())?;
        Ok(Self {
            slots: SmallVec::from_vec(items),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false for a successfully built container.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot)
    }

    /// Maps a host frame index onto a slot, wrapping modulo the slot count.
    #[inline]
    pub fn slot_for_frame(&self, frame: usize) -> usize {
        frame % self.slots.len().max(1)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.slots
    }
}

impl<T> Index<usize> for FrameSlots<T> {
    type Output = T;

    fn index(&self, slot: usize) -> &T {
        &self.slots[slot]
    }
}

impl<'a, T> IntoIterator for &'a FrameSlots<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}
