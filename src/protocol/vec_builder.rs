//! Helper to build a vector of a length announced by the peer without trusting
//! that length for the allocation.

use std::io::Read;

/// Upper bound for the up-front allocation, in elements.
const DEFAULT_BLOCK_SIZE: usize = 1024 * 10;

#[derive(Debug)]
pub struct VecBuilder<T> {
    data: Vec<T>,
    expected: usize,
}

impl<T> VecBuilder<T> {
    pub fn new(expected: usize) -> Self {
        Self {
            data: Vec::with_capacity(expected.min(DEFAULT_BLOCK_SIZE)),
            expected,
        }
    }

    pub fn push(&mut self, v: T) {
        self.data.push(v);
    }
}

impl VecBuilder<u8> {
    /// Fill the builder with exactly the announced number of bytes.
    ///
    /// Data is read block by block, so a bogus length fails with an EOF error
    /// once the reader runs dry instead of reserving the whole amount.
    pub fn read_exact<R: Read>(mut self, reader: &mut R) -> Result<Self, std::io::Error> {
        let mut remaining = self.expected - self.data.len();
        let mut buf = vec![0u8; remaining.min(DEFAULT_BLOCK_SIZE)];

        while remaining > 0 {
            let n = remaining.min(buf.len());
            reader.read_exact(&mut buf[..n])?;
            self.data.extend_from_slice(&buf[..n]);
            remaining -= n;
        }

        Ok(self)
    }
}

impl<T> From<VecBuilder<T>> for Vec<T> {
    fn from(builder: VecBuilder<T>) -> Self {
        builder.data
    }
}
