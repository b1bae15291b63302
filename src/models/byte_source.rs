//! Fully buffered, seekable payloads.
//!
//! Network bodies from either tier are read to the end as soon as they arrive
//! and wrapped here, so checksum recomputation and re-uploads can make as many
//! passes as they need.

use bytes::Bytes;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

#[derive(Debug, Clone, Default)]
pub struct ByteSource {
    inner: Cursor<Bytes>,
}

impl ByteSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            inner: Cursor::new(data.into()),
        }
    }

    /// Seek back to position zero.
    pub fn rewind(&mut self) {
        self.inner.set_position(0);
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    /// The whole payload, independent of the read position.
    pub fn as_bytes(&self) -> &Bytes {
        self.inner.get_ref()
    }

    /// Cheap clone of the underlying buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.inner.get_ref().clone()
    }

    pub fn into_bytes(self) -> Bytes {
        self.inner.into_inner()
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for ByteSource {
    fn from(value: Bytes) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&'static [u8]> for ByteSource {
    fn from(value: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(value))
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
