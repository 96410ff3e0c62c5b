//! Byte-addressable storage for activation records.
//!
//! Locals, parameter buffers and return slots are flat byte arrays with
//! typed reads and writes at byte offsets; the resolver's layout decides
//! which offset holds what. Integers are little endian.

use crate::ExecError;

#[derive(Clone, Debug, Default)]
pub struct ByteBuf {
    bytes: Box<[u8]>,
}

impl ByteBuf {
    pub fn zeroed(size: i32) -> Self {
        Self {
            bytes: vec![0u8; size.max(0) as usize].into_boxed_slice(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec().into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }

    pub fn read_i32(&self, offset: i32) -> Result<i32, ExecError> {
        let bytes = self.range(offset, 4)?;
        Ok(i32::from_le_bytes(
            bytes.try_into().map_err(|_| ExecError::OutOfBounds)?,
        ))
    }

    pub fn write_i32(&mut self, offset: i32, value: i32) -> Result<(), ExecError> {
        let bytes = self.range_mut(offset, 4)?;
        bytes.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_u8(&self, offset: i32) -> Result<u8, ExecError> {
        Ok(self.range(offset, 1)?[0])
    }

    pub fn write_u8(&mut self, offset: i32, value: u8) -> Result<(), ExecError> {
        self.range_mut(offset, 1)?[0] = value;
        Ok(())
    }

    fn range(&self, offset: i32, size: usize) -> Result<&[u8], ExecError> {
        if offset < 0 {
            return Err(ExecError::OutOfBounds);
        }
        let start = offset as usize;
        self.bytes
            .get(start..start + size)
            .ok_or(ExecError::OutOfBounds)
    }

    fn range_mut(&mut self, offset: i32, size: usize) -> Result<&mut [u8], ExecError> {
        if offset < 0 {
            return Err(ExecError::OutOfBounds);
        }
        let start = offset as usize;
        self.bytes
            .get_mut(start..start + size)
            .ok_or(ExecError::OutOfBounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_round_trip_little_endian() {
        let mut buf = ByteBuf::zeroed(8);
        buf.write_i32(4, -7).unwrap();
        assert_eq!(buf.read_i32(4).unwrap(), -7);
        assert_eq!(buf.read_i32(0).unwrap(), 0);
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut buf = ByteBuf::zeroed(4);
        assert_eq!(buf.read_i32(1).unwrap_err(), ExecError::OutOfBounds);
        assert_eq!(buf.write_u8(4, 1).unwrap_err(), ExecError::OutOfBounds);
        assert_eq!(buf.read_i32(-1).unwrap_err(), ExecError::OutOfBounds);
    }

    #[test]
    fn bytes_sit_next_to_words() {
        let mut buf = ByteBuf::zeroed(5);
        buf.write_i32(0, 0x0403_0201).unwrap();
        buf.write_u8(4, 1).unwrap();
        assert_eq!(buf.read_u8(0).unwrap(), 1);
        assert_eq!(buf.read_u8(4).unwrap(), 1);
    }
}
