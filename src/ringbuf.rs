use crate::error::Error;
use crate::memory::Memory;
use nix::unistd;
use std::fmt;
use std::os::fd::AsFd;
use tracing::trace;

/// Circular byte buffer over a double-mapped memory region.
///
/// One slot is sacrificed to tell full from empty, so a buffer of
/// capacity `C` holds at most `C - 1` bytes. Reader and writer offsets
/// always stay in `[0, capacity)`; because the second half of the
/// mapping aliases the first, every transfer is a single contiguous
/// copy regardless of where it wraps.
///
/// The buffer is single-threaded by design: it is `Send` but not
/// `Sync`, and performs no locking of its own.
pub struct RingBuffer {
    memory: Memory,
    reader: usize,
    writer: usize,
}

impl RingBuffer {
    /// Maps a buffer of `capacity` bytes.
    ///
    /// `capacity` must be a positive multiple of the page size, or the
    /// call fails with [`Error::InvalidSize`] before anything is mapped.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        let memory = Memory::new(capacity)?;
        Ok(RingBuffer {
            memory,
            reader: 0,
            writer: 0,
        })
    }

    /// Releases the mappings in strict sequence instead of relying on
    /// `Drop`, surfacing [`Error::UnmapFailed`] if the kernel refuses a
    /// release step.
    pub fn destroy(mut self) -> Result<(), Error> {
        self.memory.unmap()
    }

    pub fn capacity(&self) -> usize {
        self.memory.size()
    }

    /// Page size the capacity was validated against, queried once at
    /// construction.
    pub fn page_size(&self) -> usize {
        self.memory.page_size()
    }

    /// Bytes currently buffered.
    pub fn used(&self) -> usize {
        let capacity = self.capacity();
        (self.writer + capacity - self.reader) % capacity
    }

    /// Bytes that can still be written.
    pub fn available(&self) -> usize {
        self.capacity() - 1 - self.used()
    }

    pub fn is_empty(&self) -> bool {
        self.reader == self.writer
    }

    pub fn is_full(&self) -> bool {
        self.used() == self.capacity() - 1
    }

    /// Copies up to `source.len()` bytes in, truncating to the space
    /// available. Returns the number of bytes copied; never fails.
    pub fn put(&mut self, source: &[u8]) -> usize {
        let amount = source.len().min(self.available());
        let writer = self.writer;
        self.slice_at_mut(writer, amount)
            .copy_from_slice(&source[..amount]);
        self.writer = (writer + amount) % self.capacity();
        amount
    }

    /// Copies `source` in whole, or not at all.
    ///
    /// Fails with [`Error::InsufficientSpace`] and leaves the buffer
    /// untouched when the payload does not fit.
    pub fn put_all(&mut self, source: &[u8]) -> Result<(), Error> {
        if source.len() > self.available() {
            return Err(Error::InsufficientSpace);
        }
        self.put(source);
        Ok(())
    }

    /// Copies up to `dest.len()` bytes out, truncating to the data
    /// buffered. Returns the number of bytes copied; never fails.
    pub fn get(&mut self, dest: &mut [u8]) -> usize {
        let amount = dest.len().min(self.used());
        let reader = self.reader;
        dest[..amount].copy_from_slice(self.slice_at(reader, amount));
        self.reader = (reader + amount) % self.capacity();
        amount
    }

    /// Reads up to `dest.len()` bytes starting `offset` bytes past the
    /// reader without consuming anything. Returns the number of bytes
    /// read; 0 when `offset` is at or beyond the buffered data.
    pub fn peek(&self, offset: usize, dest: &mut [u8]) -> usize {
        let used = self.used();
        if offset >= used {
            return 0;
        }
        let amount = dest.len().min(used - offset);
        let start = (self.reader + offset) % self.capacity();
        dest[..amount].copy_from_slice(self.slice_at(start, amount));
        amount
    }

    /// Like [`get`](Self::get), but refuses to consume anything until at
    /// least `min_size` bytes are buffered.
    ///
    /// Fails with [`Error::InsufficientData`] (no mutation) below the
    /// threshold, and with [`Error::InvalidArgument`] when `dest` itself
    /// cannot hold `min_size` bytes.
    pub fn get_min(&mut self, dest: &mut [u8], min_size: usize) -> Result<usize, Error> {
        if dest.len() < min_size {
            return Err(Error::InvalidArgument(
                "destination shorter than the requested minimum",
            ));
        }
        if self.used() < min_size {
            return Err(Error::InsufficientData);
        }
        Ok(self.get(dest))
    }

    /// Discards `amount` buffered bytes without copying them out.
    ///
    /// Fails with [`Error::InsufficientData`] and leaves the buffer
    /// untouched when fewer than `amount` bytes are buffered.
    pub fn skip(&mut self, amount: usize) -> Result<(), Error> {
        if self.used() < amount {
            return Err(Error::InsufficientData);
        }
        self.reader = (self.reader + amount) % self.capacity();
        Ok(())
    }

    /// Moves the reader backward by `amount`, re-exposing the most
    /// recently consumed bytes as unread.
    ///
    /// Un-consuming may not grow the buffered amount past
    /// `capacity - 1`, so `amount` is bounded by
    /// [`available`](Self::available); beyond that the call fails with
    /// [`Error::InsufficientSpace`] and nothing moves. The bytes behind
    /// the reader are whatever the writer last stored there, so rolling
    /// back further than what was actually consumed since the last wrap
    /// re-reads stale data.
    pub fn rollback(&mut self, amount: usize) -> Result<(), Error> {
        if amount > self.available() {
            return Err(Error::InsufficientSpace);
        }
        let capacity = self.capacity();
        self.reader = (self.reader + capacity - amount) % capacity;
        Ok(())
    }

    /// Formats directly into the buffer, truncating at the space
    /// available. Returns the number of bytes written, which the writer
    /// offset advanced by; callers that must not lose output should
    /// compare it against the length they expected.
    pub fn put_fmt(&mut self, args: fmt::Arguments) -> usize {
        let available = self.available();
        let writer = self.writer;
        let mut sink = TruncatingSink {
            buf: self.slice_at_mut(writer, available),
            written: 0,
        };
        // The sink never errors; overflow is truncated instead.
        let _ = fmt::Write::write_fmt(&mut sink, args);
        let written = sink.written;
        self.writer = (writer + written) % self.capacity();
        written
    }

    /// Issues one `read(2)` on `fd` into the buffer, for up to
    /// `min(size, available())` bytes, and advances the writer by the
    /// amount transferred.
    ///
    /// Returns `Ok(0)` at end-of-input; other outcomes of the
    /// descriptor surface unmodified as [`Error::Io`] (see
    /// [`Error::is_would_block`]). Never loops, never blocks beyond
    /// what the descriptor itself does. A full buffer shrinks the
    /// window to zero bytes, which is indistinguishable from
    /// end-of-input here, so check [`available`](Self::available) first
    /// when that matters.
    pub fn read_from<Fd: AsFd>(&mut self, fd: Fd, size: usize) -> Result<usize, Error> {
        let amount = size.min(self.available());
        let writer = self.writer;
        let count = unistd::read(fd.as_fd(), self.slice_at_mut(writer, amount))?;
        self.writer = (writer + count) % self.capacity();
        trace!(
            requested = size,
            window = amount,
            transferred = count,
            "filled from descriptor"
        );
        Ok(count)
    }

    /// Issues one `write(2)` on `fd` from the buffer, for up to
    /// `min(size, used())` bytes, and advances the reader by the amount
    /// transferred. Single-shot like [`read_from`](Self::read_from).
    pub fn write_to<Fd: AsFd>(&mut self, fd: Fd, size: usize) -> Result<usize, Error> {
        let amount = size.min(self.used());
        let reader = self.reader;
        let count = unistd::write(fd.as_fd(), self.slice_at(reader, amount))?;
        self.reader = (reader + count) % self.capacity();
        trace!(
            requested = size,
            window = amount,
            transferred = count,
            "drained to descriptor"
        );
        Ok(count)
    }

    /// Finds the first occurrence of `pattern` in the buffered data,
    /// beginning `start` bytes past the reader, within a window of
    /// `limit` bytes (`0` or an oversized limit searches to the end of
    /// the buffered data).
    ///
    /// Returns the match offset relative to the reader, or `None`.
    /// Fails with [`Error::InvalidArgument`] for an empty pattern or a
    /// `start` at or beyond the buffered data. The window is one
    /// contiguous slice through the doubled mapping, so a match
    /// straddling the physical end of the buffer is found like any
    /// other.
    pub fn search(&self, pattern: &[u8], start: usize, limit: usize) -> Result<Option<usize>, Error> {
        if pattern.is_empty() {
            return Err(Error::InvalidArgument("empty search pattern"));
        }
        let used = self.used();
        if start >= used {
            return Err(Error::InvalidArgument("search start beyond buffered data"));
        }
        let mut window = used - start;
        if limit != 0 {
            window = window.min(limit);
        }
        if pattern.len() > window {
            return Ok(None);
        }
        let haystack = self.slice_at((self.reader + start) % self.capacity(), window);
        Ok(haystack
            .windows(pattern.len())
            .position(|candidate| candidate == pattern)
            .map(|pos| start + pos))
    }

    /// Contiguous view of `len` bytes starting at physical `offset`.
    /// Valid for any `offset < capacity` and `len <= capacity`; the
    /// range `[offset, offset + len)` always lies inside the doubled
    /// mapping.
    fn slice_at(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset < self.capacity());
        debug_assert!(len <= self.capacity());
        unsafe { std::slice::from_raw_parts(self.memory.as_ptr().as_ptr().add(offset), len) }
    }

    fn slice_at_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        debug_assert!(offset < self.capacity());
        debug_assert!(len <= self.capacity());
        unsafe { std::slice::from_raw_parts_mut(self.memory.as_ptr().as_ptr().add(offset), len) }
    }
}

/// `fmt::Write` sink over a fixed window that drops whatever does not
/// fit instead of erroring, so formatting machinery runs to completion
/// and `written` reflects exactly the bytes stored.
struct TruncatingSink<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl fmt::Write for TruncatingSink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let amount = s.len().min(self.buf.len() - self.written);
        self.buf[self.written..self.written + amount].copy_from_slice(&s.as_bytes()[..amount]);
        self.written += amount;
        Ok(())
    }
}
