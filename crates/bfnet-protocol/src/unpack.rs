//! Cursor for hand-written `decode` implementations.
//!
//! Every read checks the remaining length first and reports
//! [`DecodeError::Truncated`] instead of panicking.

use bytes::Buf;

use crate::DecodeError;

#[derive(Debug)]
pub struct Unpacker<'a> {
    buf: &'a [u8],
}

impl<'a> Unpacker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn f64(&mut self) -> Result<f64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    /// A one-byte boolean; any non-zero byte is `true`.
    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8() != 0)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn text(&mut self, n: usize) -> Result<&'a str, DecodeError> {
        let raw = self.bytes(n)?;
        std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Everything not read yet. Leaves the cursor empty.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// Fails if unread bytes remain.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_in_order() {
        let mut payload = vec![0x00, 0x05, 0x00, 0x00, 0x9c, 0x40, 0x01];
        payload.extend_from_slice(b"hi");
        let mut u = Unpacker::new(&payload);
        assert_eq!(u.i16().unwrap(), 5);
        assert_eq!(u.i32().unwrap(), 40_000);
        assert!(u.bool().unwrap());
        assert_eq!(u.text(2).unwrap(), "hi");
        u.finish().unwrap();
    }

    #[test]
    fn test_truncated_read_does_not_consume() {
        let mut u = Unpacker::new(&[0x01]);
        assert_eq!(
            u.i16(),
            Err(DecodeError::Truncated { needed: 2, remaining: 1 })
        );
        assert_eq!(u.remaining(), 1);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut u = Unpacker::new(&[0xff, 0xfe]);
        assert_eq!(u.text(2), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_rest_and_trailing() {
        let mut u = Unpacker::new(b"abc");
        assert_eq!(u.bytes(1).unwrap(), b"a");
        assert_eq!(u.rest(), b"bc");
        u.finish().unwrap();

        let u = Unpacker::new(b"xy");
        assert_eq!(u.finish(), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn test_f64_and_i64() {
        let mut payload = 2.5f64.to_be_bytes().to_vec();
        payload.extend_from_slice(&(-1i64).to_be_bytes());
        let mut u = Unpacker::new(&payload);
        assert_eq!(u.f64().unwrap(), 2.5);
        assert_eq!(u.i64().unwrap(), -1);
    }
}
