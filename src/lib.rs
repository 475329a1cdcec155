//! # magicbuf - Magic Ring Buffer
//!
//! Circular byte buffer backed by one physical memory region mapped
//! twice, contiguously, into virtual address space. The second mapping
//! mirrors the first, so a read or write that logically wraps past the
//! end of the buffer is still a single contiguous memory operation;
//! none of the data paths ever split a transfer in two.
//!
//! Uses `memfd` for the backing pages and `mmap` with fixed addresses
//! for the two views. Capacity must be a positive multiple of the page
//! size (typically 4096 bytes), and the buffer holds at most
//! `capacity - 1` bytes, one slot being reserved to distinguish a full
//! buffer from an empty one.
//!
//! ## Creating a Buffer
//!
//! ```rust
//! use magicbuf::RingBuffer;
//!
//! let buffer = RingBuffer::new(64 * 1024)?; // 64KB, page-aligned
//! assert!(buffer.is_empty());
//! assert_eq!(buffer.available(), 64 * 1024 - 1);
//! # Ok::<(), magicbuf::Error>(())
//! ```
//!
//! ## Moving Bytes
//!
//! [`RingBuffer::put`] and [`RingBuffer::get`] truncate to whatever
//! fits and report the amount moved; [`RingBuffer::put_all`] and
//! [`RingBuffer::get_min`] are the all-or-nothing variants:
//!
//! ```rust
//! use magicbuf::RingBuffer;
//!
//! let mut buffer = RingBuffer::new(64 * 1024)?;
//!
//! assert_eq!(buffer.put(b"hello world"), 11);
//!
//! let mut frame = [0u8; 5];
//! assert_eq!(buffer.get(&mut frame), 5);
//! assert_eq!(&frame, b"hello");
//! # Ok::<(), magicbuf::Error>(())
//! ```
//!
//! ## Parsing Without Consuming
//!
//! [`RingBuffer::peek`] reads ahead without moving the reader,
//! [`RingBuffer::search`] locates a delimiter, [`RingBuffer::skip`]
//! discards, and [`RingBuffer::rollback`] un-consumes:
//!
//! ```rust
//! use magicbuf::RingBuffer;
//!
//! let mut buffer = RingBuffer::new(64 * 1024)?;
//! buffer.put(b"HEADER\r\nbody");
//!
//! let end = buffer.search(b"\r\n", 0, 0)?.expect("delimiter buffered");
//! assert_eq!(end, 6);
//!
//! let mut header = vec![0u8; end];
//! buffer.peek(0, &mut header);
//! assert_eq!(header, b"HEADER");
//!
//! buffer.skip(end + 2)?; // header and delimiter
//! assert_eq!(buffer.used(), 4);
//! # Ok::<(), magicbuf::Error>(())
//! ```
//!
//! ## Descriptor Fill and Drain
//!
//! [`RingBuffer::read_from`] and [`RingBuffer::write_to`] issue exactly
//! one transfer on a caller-supplied descriptor and return the raw
//! outcome; `Ok(0)` from a read is end-of-input, and a would-block
//! outcome is distinguishable via [`Error::is_would_block`]:
//!
//! ```rust
//! use magicbuf::RingBuffer;
//!
//! let mut buffer = RingBuffer::new(64 * 1024)?;
//! let (rx, tx) = nix::unistd::pipe()?;
//!
//! nix::unistd::write(&tx, b"from the pipe")?;
//! let filled = buffer.read_from(&rx, 4096)?;
//! assert_eq!(filled, 13);
//! # Ok::<(), eyre::Report>(())
//! ```
//!
//! ## What This Buffer Is Not
//!
//! There is no internal synchronization: a `RingBuffer` is `Send` but
//! not `Sync`, and one producer plus one consumer sharing it across
//! threads need external coordination. Nothing blocks, nothing retries,
//! and the backing pages live exactly as long as the buffer does.

pub use error::Error;
pub use ringbuf::RingBuffer;

pub mod error;
pub(crate) mod memory;
pub(crate) mod ringbuf;
