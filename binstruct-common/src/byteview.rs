//! A wrapper type providing random, read-only access to binary data.
//!
//! See the [`ByteView`] struct for more documentation.

use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::ops::{Deref, Range};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use thiserror::Error;

/// A read that does not fit into the bounds of a [`ByteView`].
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("cannot read {len} bytes at offset {offset:#x} from a buffer of {size} bytes")]
pub struct OutOfBounds {
    /// The absolute offset of the read.
    pub offset: usize,
    /// The number of bytes requested.
    pub len: usize,
    /// The size of the buffer that was read from.
    pub size: usize,
}

/// The owner of data behind a ByteView.
///
/// This can either be an mmapped file, an owned buffer or a borrowed binary slice.
#[derive(Debug)]
enum ByteViewBacking<'a> {
    Buf(Cow<'a, [u8]>),
    Mmap(Mmap),
}

impl Deref for ByteViewBacking<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match *self {
            ByteViewBacking::Buf(ref buf) => buf,
            ByteViewBacking::Mmap(ref mmap) => mmap,
        }
    }
}

/// A smart pointer for byte data.
///
/// This type can be used to uniformly access bytes that were created either from mmapping in a
/// path, a vector or a borrowed slice. A `ByteView` dereferences into a `&[u8]` and guarantees
/// random access to the underlying buffer or file.
///
/// All `read_*` methods take offsets that are absolute from the start of the view and decode
/// integers in little-endian byte order. A view is never mutated after construction; cloning it
/// shares the backing storage.
///
/// # Example
///
/// ```
/// use binstruct_common::ByteView;
///
/// let view = ByteView::from_slice(b"\x01\x02\x03\x04");
/// assert_eq!(view.read_u16(1), Ok(0x0302));
/// assert!(view.read_u32(1).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct ByteView<'a> {
    backing: Arc<ByteViewBacking<'a>>,
}

impl<'a> ByteView<'a> {
    fn with_backing(backing: ByteViewBacking<'a>) -> Self {
        ByteView {
            backing: Arc::new(backing),
        }
    }

    /// Constructs a `ByteView` from a `Cow`.
    pub fn from_cow(cow: Cow<'a, [u8]>) -> Self {
        ByteView::with_backing(ByteViewBacking::Buf(cow))
    }

    /// Constructs a `ByteView` from a byte slice.
    ///
    /// # Example
    ///
    /// ```
    /// use binstruct_common::ByteView;
    ///
    /// let view = ByteView::from_slice(b"1234");
    /// ```
    pub fn from_slice(buffer: &'a [u8]) -> Self {
        ByteView::from_cow(Cow::Borrowed(buffer))
    }

    /// Constructs a `ByteView` from a vector of bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use binstruct_common::ByteView;
    ///
    /// let vec = b"1234".to_vec();
    /// let view = ByteView::from_vec(vec);
    /// ```
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        ByteView::from_cow(Cow::Owned(buffer))
    }

    /// Constructs a `ByteView` from an open file handle by memory mapping the file.
    ///
    /// See [`ByteView::map_file_ref`] for a non-consuming version of this constructor.
    pub fn map_file(file: File) -> Result<Self, io::Error> {
        Self::map_file_ref(&file)
    }

    /// Constructs a `ByteView` from an open file handle by memory mapping the file.
    ///
    /// The main difference with [`ByteView::map_file`] is that this takes the [`File`] by
    /// reference rather than consuming it.
    pub fn map_file_ref(file: &File) -> Result<Self, io::Error> {
        let backing = match unsafe { Mmap::map(file) } {
            Ok(mmap) => ByteViewBacking::Mmap(mmap),
            Err(err) => {
                // this is raised on empty mmaps which we want to ignore. The 1006 Windows error
                // looks like "The volume for a file has been externally altered so that the opened
                // file is no longer valid."
                if err.kind() == io::ErrorKind::InvalidInput
                    || (cfg!(windows) && err.raw_os_error() == Some(1006))
                {
                    ByteViewBacking::Buf(Cow::Borrowed(b""))
                } else {
                    return Err(err);
                }
            }
        };

        Ok(ByteView::with_backing(backing))
    }

    /// Constructs a `ByteView` from any `std::io::Reader`.
    ///
    /// This consumes the entire reader and stores its data in an internal buffer. Prefer
    /// [`open`](Self::open) when reading from the file system.
    pub fn read<R: io::Read>(mut reader: R) -> Result<Self, io::Error> {
        let mut buffer = vec![];
        reader.read_to_end(&mut buffer)?;
        Ok(ByteView::from_vec(buffer))
    }

    /// Constructs a `ByteView` from a file path by memory mapping the file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use binstruct_common::ByteView;
    ///
    /// fn main() -> Result<(), std::io::Error> {
    ///     let view = ByteView::open("Example.dll")?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, io::Error> {
        let file = File::open(path)?;
        Self::map_file(file)
    }

    /// Returns a slice of the underlying data.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        self.backing.deref()
    }

    /// Returns `len` bytes starting at the absolute `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8], OutOfBounds> {
        let data = self.as_slice();
        offset
            .checked_add(len)
            .and_then(|end| data.get(offset..end))
            .ok_or(OutOfBounds {
                offset,
                len,
                size: data.len(),
            })
    }

    /// Returns the bytes covered by `range`.
    pub fn read_range(&self, range: Range<usize>) -> Result<&[u8], OutOfBounds> {
        self.read_bytes(range.start, range.end.saturating_sub(range.start))
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N], OutOfBounds> {
        let bytes = self.read_bytes(offset, N)?;
        let mut array = [0; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    /// Reads a byte at the absolute `offset`.
    pub fn read_u8(&self, offset: usize) -> Result<u8, OutOfBounds> {
        self.read_array::<1>(offset).map(|[b]| b)
    }

    /// Reads a little-endian `u16` at the absolute `offset`.
    pub fn read_u16(&self, offset: usize) -> Result<u16, OutOfBounds> {
        self.read_array(offset).map(u16::from_le_bytes)
    }

    /// Reads a little-endian 24-bit integer at the absolute `offset`.
    pub fn read_u24(&self, offset: usize) -> Result<u32, OutOfBounds> {
        let [b0, b1, b2] = self.read_array(offset)?;
        Ok(u32::from_le_bytes([b0, b1, b2, 0]))
    }

    /// Reads a little-endian `u32` at the absolute `offset`.
    pub fn read_u32(&self, offset: usize) -> Result<u32, OutOfBounds> {
        self.read_array(offset).map(u32::from_le_bytes)
    }

    /// Reads a little-endian `u64` at the absolute `offset`.
    pub fn read_u64(&self, offset: usize) -> Result<u64, OutOfBounds> {
        self.read_array(offset).map(u64::from_le_bytes)
    }
}

impl AsRef<[u8]> for ByteView<'_> {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for ByteView<'_> {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}
