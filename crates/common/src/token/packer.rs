//! Little-endian packing primitives.
//!
//! Strings and byte blobs are prefixed with a `u16` length. Privilege maps are
//! a `u16` count followed by `(u16, u32)` pairs in ascending key order.

use std::collections::BTreeMap;

use super::TokenError;

/// Appends packed values to an owned buffer.
#[derive(Debug, Default)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pack_u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn pack_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends a `u16` length followed by `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::FieldTooLong`] when `bytes` is longer than `u16::MAX`.
    pub fn pack_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, TokenError> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| TokenError::FieldTooLong { len: bytes.len() })?;
        self.pack_u16(len);
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns [`TokenError::FieldTooLong`] when `value` is longer than `u16::MAX` bytes.
    pub fn pack_string(&mut self, value: &str) -> Result<&mut Self, TokenError> {
        self.pack_bytes(value.as_bytes())
    }

    /// # Errors
    ///
    /// Returns [`TokenError::FieldTooLong`] when the map has more than `u16::MAX` entries.
    pub fn pack_map_u32(&mut self, map: &BTreeMap<u16, u32>) -> Result<&mut Self, TokenError> {
        let count =
            u16::try_from(map.len()).map_err(|_| TokenError::FieldTooLong { len: map.len() })?;
        self.pack_u16(count);
        for (key, value) in map {
            self.pack_u16(*key).pack_u32(*value);
        }
        Ok(self)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads packed values back out of a byte slice.
#[derive(Debug)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TokenError> {
        let end = self.pos.checked_add(len).ok_or(TokenError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(TokenError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Truncated`] if fewer than two bytes remain.
    pub fn read_u16(&mut self) -> Result<u16, TokenError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Truncated`] if fewer than four bytes remain.
    pub fn read_u32(&mut self) -> Result<u32, TokenError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Truncated`] if the declared length runs past the input.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], TokenError> {
        let len = self.read_u16()?;
        self.take(usize::from(len))
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Truncated`] on short input and
    /// [`TokenError::Malformed`] if the bytes are not UTF-8.
    pub fn read_string(&mut self) -> Result<String, TokenError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| TokenError::Malformed {
            message: format!("string field is not UTF-8: {e}"),
        })
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Truncated`] if the map runs past the input.
    pub fn read_map_u32(&mut self) -> Result<BTreeMap<u16, u32>, TokenError> {
        let count = self.read_u16()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_u16()?;
            let value = self.read_u32()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Bytes not consumed yet.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}
