//! I/O buffers.

use std::fmt;

use crate::error::{IbError, Result};

/// An owned packet buffer with headroom and tailroom tracking.
///
/// The storage is laid out as `[headroom | data | tailroom]`. Ownership of an
/// `IoBuffer` moves into a work queue slot on post and back out through the
/// completion callback, so at any time exactly one party owns it.
pub struct IoBuffer {
    buf: Vec<u8>,
    data: usize,
    tail: usize,
}

impl IoBuffer {
    /// Allocate a buffer with `len` bytes of tailroom and no headroom.
    ///
    /// Fails with [`IbError::NoMemory`] instead of aborting when the
    /// allocation cannot be satisfied.
    pub fn alloc(len: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| IbError::NoMemory)?;
        buf.resize(len, 0);
        Ok(Self {
            buf,
            data: 0,
            tail: 0,
        })
    }

    /// Build a buffer holding a copy of `payload`.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let mut iobuf = Self::alloc(payload.len())?;
        iobuf.put(payload.len()).copy_from_slice(payload);
        Ok(iobuf)
    }

    /// Get the length of the data area.
    #[inline]
    pub fn len(&self) -> usize {
        self.tail - self.data
    }

    /// Check whether the data area is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the space available before the data area.
    #[inline]
    pub fn headroom(&self) -> usize {
        self.data
    }

    /// Get the space available after the data area.
    #[inline]
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.tail
    }

    /// View the data area.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.data..self.tail]
    }

    /// View the data area mutably.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.data..self.tail]
    }

    /// Move an empty data area `len` bytes forward, turning tailroom into
    /// headroom.
    ///
    /// # Panics
    ///
    /// Panic if the tailroom is smaller than `len`.
    pub fn reserve(&mut self, len: usize) {
        assert!(len <= self.tailroom(), "reserve beyond end of buffer");
        self.data += len;
        self.tail += len;
    }

    /// Extend the data area by `len` bytes at its end and return the new bytes.
    ///
    /// # Panics
    ///
    /// Panic if the tailroom is smaller than `len`.
    pub fn put(&mut self, len: usize) -> &mut [u8] {
        assert!(len <= self.tailroom(), "put beyond end of buffer");
        let start = self.tail;
        self.tail += len;
        &mut self.buf[start..self.tail]
    }

    /// Shrink the data area by `len` bytes at its end.
    ///
    /// # Panics
    ///
    /// Panic if the data area is shorter than `len`.
    pub fn unput(&mut self, len: usize) {
        assert!(len <= self.len(), "unput beyond start of data");
        self.tail -= len;
    }

    /// Extend the data area by `len` bytes at its start and return the new
    /// bytes.
    ///
    /// # Panics
    ///
    /// Panic if the headroom is smaller than `len`.
    pub fn push(&mut self, len: usize) -> &mut [u8] {
        assert!(len <= self.headroom(), "push beyond start of buffer");
        self.data -= len;
        &mut self.buf[self.data..self.data + len]
    }

    /// Remove `len` bytes from the start of the data area and return them.
    ///
    /// # Panics
    ///
    /// Panic if the data area is shorter than `len`.
    pub fn pull(&mut self, len: usize) -> &[u8] {
        assert!(len <= self.len(), "pull beyond end of data");
        let start = self.data;
        self.data += len;
        &self.buf[start..self.data]
    }
}

impl fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuffer")
            .field("headroom", &self.headroom())
            .field("len", &self.len())
            .field("tailroom", &self.tailroom())
            .finish()
    }
}
