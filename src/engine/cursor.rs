use crate::packet::{ByteView, Endianness};

use super::error::BoundsError;

/// Sequential reader over a [`ByteView`]. Offsets are relative to the view.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    view: &'a ByteView,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(view: &'a ByteView) -> Self {
        Self { view, pos: 0 }
    }

    pub fn with_pos(view: &'a ByteView, pos: usize) -> Option<Self> {
        if pos > view.captured_len() {
            return None;
        }
        Some(Self { view, pos })
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.view.captured_len().saturating_sub(self.pos)
    }

    pub fn advance(&mut self, bytes: usize) -> Result<(), BoundsError> {
        self.view.bytes(self.pos, bytes)?;
        self.pos += bytes;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BoundsError> {
        let value = self.view.read_u8(self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self, endianness: Endianness) -> Result<u16, BoundsError> {
        let value = self.view.read_u16(self.pos, endianness)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, BoundsError> {
        self.read_u16(Endianness::Big)
    }

    pub fn read_u24(&mut self, endianness: Endianness) -> Result<u32, BoundsError> {
        let value = self.view.read_u24(self.pos, endianness)?;
        self.pos += 3;
        Ok(value)
    }

    pub fn read_u32(&mut self, endianness: Endianness) -> Result<u32, BoundsError> {
        let value = self.view.read_u32(self.pos, endianness)?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self, endianness: Endianness) -> Result<u64, BoundsError> {
        let value = self.view.read_u64(self.pos, endianness)?;
        self.pos += 8;
        Ok(value)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BoundsError> {
        let out = self.view.bytes(self.pos, len)?;
        self.pos += len;
        Ok(out)
    }

    pub fn peek_u8_at(&self, offset: usize) -> Option<u8> {
        self.view.read_u8(self.pos.checked_add(offset)?).ok()
    }

    /// View over everything after the current position.
    pub fn rest(&self) -> Result<ByteView, BoundsError> {
        self.view.tail(self.pos)
    }
}
