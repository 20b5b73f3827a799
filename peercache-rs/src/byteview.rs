//! Provides the immutable byte sequence which is stored for each key.
//!
//! A [ByteView] is a cheap to clone, reference counted view on a byte buffer. As the underlying
//! buffer cannot be modified, a value handed out to a caller can never corrupt the data stored in
//! a cache. If a caller needs a mutable copy, [ByteView::to_vec] creates one.
//!
//! # Examples
//! ```
//! # use peercache::byteview::ByteView;
//! let view = ByteView::from("630");
//! assert_eq!(view.len(), 3);
//! assert_eq!(view.to_string(), "630");
//!
//! let mut copy = view.to_vec();
//! copy[0] = b'5';
//!
//! // The view itself is unaffected...
//! assert_eq!(view.as_slice(), b"630");
//! ```
use bytes::Bytes;
use std::fmt;
use std::fmt::Display;

use crate::lru::ByteSize;

/// Represents an immutable sequence of bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Returns the number of bytes in this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if this view is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Provides read access to the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Creates an owned copy of the underlying bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Returns the underlying buffer.
    ///
    /// This doesn't copy any data but only increments a reference counter.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }
}

impl From<Bytes> for ByteView {
    fn from(data: Bytes) -> Self {
        ByteView { data }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<String> for ByteView {
    fn from(data: String) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&'static str> for ByteView {
    fn from(data: &'static str) -> Self {
        ByteView {
            data: Bytes::from_static(data.as_bytes()),
        }
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}
