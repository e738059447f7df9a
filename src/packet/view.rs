use std::fmt;

use bytes::Bytes;

use crate::engine::error::BoundsError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// Read-only window over a shared packet buffer.
///
/// `captured_len` is what is physically present, `reported_len` is what the
/// protocol claims. Cloning or slicing a view never copies packet bytes.
#[derive(Clone)]
pub struct ByteView {
    backing: Bytes,
    offset: usize,
    captured_len: usize,
    reported_len: usize,
}

impl ByteView {
    pub fn new(backing: Bytes) -> Self {
        let len = backing.len();
        Self {
            backing,
            offset: 0,
            captured_len: len,
            reported_len: len,
        }
    }

    /// Root view for a frame that was cut short by the capture snaplen.
    /// A `reported_len` below the captured size is raised to it.
    pub fn with_reported_len(backing: Bytes, reported_len: usize) -> Self {
        let len = backing.len();
        Self {
            backing,
            offset: 0,
            captured_len: len,
            reported_len: reported_len.max(len),
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Absolute offset of this view inside the top-level buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn captured_len(&self) -> usize {
        self.captured_len
    }

    pub fn reported_len(&self) -> usize {
        self.reported_len
    }

    pub fn remaining_captured(&self) -> usize {
        self.captured_len
    }

    pub fn remaining_reported(&self) -> usize {
        self.reported_len
    }

    pub fn is_empty(&self) -> bool {
        self.captured_len == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.captured_len < self.reported_len
    }

    /// The captured bytes of this view.
    pub fn as_bytes(&self) -> &[u8] {
        self.backing
            .get(self.offset..self.offset + self.captured_len)
            .unwrap_or(&[])
    }

    /// Shares the captured bytes without copying, for data that has to
    /// outlive the dissection call.
    pub fn to_bytes(&self) -> Bytes {
        self.backing
            .slice(self.offset..self.offset + self.captured_len)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// New view starting `rel_offset` bytes in. `len = None` takes the rest
    /// of the reported length; a length past what was captured yields a
    /// truncated view rather than an error.
    pub fn slice(&self, rel_offset: usize, len: Option<usize>) -> Result<ByteView, BoundsError> {
        if rel_offset > self.captured_len {
            return Err(BoundsError::OffsetOutOfRange {
                offset: rel_offset,
                captured: self.captured_len,
            });
        }

        let reported_rest = self.reported_len - rel_offset;
        let reported = match len {
            None => reported_rest,
            Some(len) if len > reported_rest => {
                return Err(BoundsError::PastReported {
                    offset: rel_offset,
                    needed: len,
                    reported: self.reported_len,
                });
            }
            Some(len) => len,
        };

        Ok(ByteView {
            backing: self.backing.clone(),
            offset: self.offset + rel_offset,
            captured_len: reported.min(self.captured_len - rel_offset),
            reported_len: reported,
        })
    }

    pub fn tail(&self, rel_offset: usize) -> Result<ByteView, BoundsError> {
        self.slice(rel_offset, None)
    }

    pub fn bytes(&self, rel_offset: usize, len: usize) -> Result<&[u8], BoundsError> {
        let Some(end) = rel_offset.checked_add(len) else {
            return Err(BoundsError::PastReported {
                offset: rel_offset,
                needed: len,
                reported: self.reported_len,
            });
        };

        if end > self.captured_len {
            return Err(if end <= self.reported_len {
                BoundsError::Truncated {
                    offset: rel_offset,
                    needed: len,
                    captured: self.captured_len,
                }
            } else {
                BoundsError::PastReported {
                    offset: rel_offset,
                    needed: len,
                    reported: self.reported_len,
                }
            });
        }

        Ok(self.as_bytes().get(rel_offset..end).unwrap_or(&[]))
    }

    fn array<const N: usize>(&self, rel_offset: usize) -> Result<[u8; N], BoundsError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(rel_offset, N)?);
        Ok(out)
    }

    pub fn read_u8(&self, rel_offset: usize) -> Result<u8, BoundsError> {
        let [byte] = self.array::<1>(rel_offset)?;
        Ok(byte)
    }

    pub fn read_u16(&self, rel_offset: usize, endianness: Endianness) -> Result<u16, BoundsError> {
        let bytes = self.array::<2>(rel_offset)?;
        Ok(match endianness {
            Endianness::Big => u16::from_be_bytes(bytes),
            Endianness::Little => u16::from_le_bytes(bytes),
        })
    }

    pub fn read_u24(&self, rel_offset: usize, endianness: Endianness) -> Result<u32, BoundsError> {
        let [a, b, c] = self.array::<3>(rel_offset)?;
        Ok(match endianness {
            Endianness::Big => u32::from_be_bytes([0, a, b, c]),
            Endianness::Little => u32::from_le_bytes([a, b, c, 0]),
        })
    }

    pub fn read_u32(&self, rel_offset: usize, endianness: Endianness) -> Result<u32, BoundsError> {
        let bytes = self.array::<4>(rel_offset)?;
        Ok(match endianness {
            Endianness::Big => u32::from_be_bytes(bytes),
            Endianness::Little => u32::from_le_bytes(bytes),
        })
    }

    pub fn read_u64(&self, rel_offset: usize, endianness: Endianness) -> Result<u64, BoundsError> {
        let bytes = self.array::<8>(rel_offset)?;
        Ok(match endianness {
            Endianness::Big => u64::from_be_bytes(bytes),
            Endianness::Little => u64::from_le_bytes(bytes),
        })
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView")
            .field("offset", &self.offset)
            .field("captured_len", &self.captured_len)
            .field("reported_len", &self.reported_len)
            .finish()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.as_bytes().chunks(16).enumerate() {
            write!(f, "{:04x}   ", row * 16)?;

            let mut hex_part = String::with_capacity(48);
            let mut ascii_part = String::with_capacity(16);

            for byte in chunk {
                hex_part.push_str(&format!("{:02x} ", byte));
                ascii_part.push(if (32..=126).contains(byte) {
                    *byte as char
                } else {
                    '.'
                });
            }

            writeln!(f, "{:<48}  {}", hex_part, ascii_part)?;
        }

        Ok(())
    }
}
