//! Shared flat buffers and zero-copy views
//!
//! [`NativeArray`] is a reference-counted flat buffer. Cloning it or slicing it
//! never copies elements: every clone and every view aliases the same storage.
//! This is what lets partitions of one job write into disjoint parts of a
//! caller-owned buffer without synchronization.
//!
//! Disjointness is the caller's obligation. Views are bounds-checked when they
//! are built, but nothing checks whether two live views overlap. Mutation is
//! therefore `unsafe`: the writer promises that no other view touches the same
//! elements while the write is in flight.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use crate::runtime::error::{Result, ScheduleError};

/// Backing storage shared by every view.
struct Storage<T> {
    cells: Box<[UnsafeCell<T>]>,
}

// Access to the cells goes through `NativeArray`, whose mutating methods are
// `unsafe` and require disjoint access.
unsafe impl<T: Send + Sync> Sync for Storage<T> {}

/// A flat buffer, or a view into one.
pub struct NativeArray<T> {
    storage: Arc<Storage<T>>,
    offset: usize,
    len: usize,
}

impl<T> NativeArray<T> {
    /// Create a buffer of `len` copies of `value`.
    pub fn new(
        len: usize,
        value: T,
    ) -> Self
    where
        T: Clone,
    {
        Self::from_vec(vec![value; len])
    }

    /// Take ownership of `values` as a new buffer.
    pub fn from_vec(values: Vec<T>) -> Self {
        let len = values.len();
        let cells: Box<[UnsafeCell<T>]> = values.into_iter().map(UnsafeCell::new).collect();
        Self {
            storage: Arc::new(Storage { cells }),
            offset: 0,
            len,
        }
    }

    /// Number of elements visible through this view.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the view is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of this view within the backing buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the whole backing buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.cells.len()
    }

    /// Check if no other clone or view of the backing buffer is alive.
    #[inline]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.storage) == 1
    }

    /// Zero-copy view over `[offset, offset + len)` of this view.
    ///
    /// Fails with [`ScheduleError::OutOfRange`] when the range does not fit.
    pub fn slice(
        &self,
        offset: usize,
        len: usize,
    ) -> Result<Self> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(Self {
                storage: Arc::clone(&self.storage),
                offset: self.offset + offset,
                len,
            }),
            _ => Err(ScheduleError::OutOfRange {
                offset,
                len,
                capacity: self.len,
            }),
        }
    }

    /// Row `row` of this view read as a flattened 2-D array of `width` columns.
    ///
    /// Returns the view over `[row * width, (row + 1) * width)`.
    pub fn slice_2d(
        &self,
        row: usize,
        width: usize,
    ) -> Result<Self> {
        let offset = row.checked_mul(width).ok_or(ScheduleError::OutOfRange {
            offset: usize::MAX - width,
            len: width,
            capacity: self.len,
        })?;
        self.slice(offset, width)
    }

    /// Read the element at `index` of this view.
    #[inline]
    pub fn get(
        &self,
        index: usize,
    ) -> Option<T>
    where
        T: Copy,
    {
        if index < self.len {
            // SAFETY: in bounds; writers guarantee no concurrent write to this element.
            Some(unsafe { *self.cell(index).get() })
        } else {
            None
        }
    }

    /// Copy the visible elements out.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Copy,
    {
        (0..self.len)
            // SAFETY: as in `get`.
            .map(|i| unsafe { *self.cell(i).get() })
            .collect()
    }

    /// Write `value` at `index` of this view.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    ///
    /// # Safety
    ///
    /// No other clone or view may read or write the same element while this
    /// call runs. Partitions scheduled together must hold disjoint views.
    #[inline]
    pub unsafe fn set(
        &self,
        index: usize,
        value: T,
    ) {
        assert!(
            index < self.len,
            "index {index} out of bounds for view of length {}",
            self.len
        );
        *self.cell(index).get() = value;
    }

    /// Mutable access to every element of this view.
    ///
    /// # Safety
    ///
    /// For the lifetime of the returned slice, no other clone or view may read
    /// or write any element it covers.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [T] {
        let base = self.storage.cells.as_ptr().add(self.offset);
        std::slice::from_raw_parts_mut(UnsafeCell::raw_get(base), self.len)
    }

    /// Recover the elements by value.
    ///
    /// Succeeds only when this value is the last reference to the backing
    /// buffer and views all of it; otherwise returns `self` unchanged.
    pub fn into_vec(self) -> std::result::Result<Vec<T>, Self> {
        if self.offset != 0 || self.len != self.capacity() {
            return Err(self);
        }
        match Arc::try_unwrap(self.storage) {
            Ok(storage) => Ok(storage
                .cells
                .into_vec()
                .into_iter()
                .map(UnsafeCell::into_inner)
                .collect()),
            Err(storage) => Err(Self {
                storage,
                offset: 0,
                len: self.len,
            }),
        }
    }

    #[inline]
    fn cell(
        &self,
        index: usize,
    ) -> &UnsafeCell<T> {
        &self.storage.cells[self.offset + index]
    }
}

/// Cloning aliases: the clone views the same elements.
impl<T> Clone for NativeArray<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset,
            len: self.len,
        }
    }
}

impl<T> From<Vec<T>> for NativeArray<T> {
    fn from(values: Vec<T>) -> Self {
        Self::from_vec(values)
    }
}

impl<T> fmt::Debug for NativeArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeArray")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
