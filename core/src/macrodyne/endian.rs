//! # Endian-Aware Primitive Codec
//!
//! Converts between wire bytes and in-memory primitives for a chosen byte order. Every
//! frame decoder and encoder in this crate reads and writes its fields through
//! `EndianOrder`.
//!
//! ## Key Components
//!
//! - `EndianOrder`: Plain value describing the wire byte order. `BigEndian` is the
//!   Macrodyne wire order; `LittleEndian` exists for completeness.
//! - `Primitive`: Implemented for `bool`, 8/16/32/64-bit integers, `Int24`, `UInt24`,
//!   `f32` and `f64`.
//! - `Int24` / `UInt24`: 24-bit integers; the signed form sign-extends from bit 23.
//!
//! Decoding never allocates. Any access with `offset + SIZE > buffer.len()` fails with
//! `FrameError::OutOfRange`.

use super::common::FrameError;
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Byte order of the wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EndianOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// A fixed-width value that can be read from and written to a byte slice.
///
/// `read_be`/`read_le` receive exactly `SIZE` bytes; `write_be`/`write_le` fill exactly
/// `SIZE` bytes.
pub trait Primitive: Copy {
    const SIZE: usize;

    fn read_be(bytes: &[u8]) -> Self;
    fn read_le(bytes: &[u8]) -> Self;
    fn write_be(self, out: &mut [u8]);
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_primitive {
    ($($ty:ty),*) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn read_be(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_be_bytes(raw)
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                fn write_be(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_be_bytes());
                }

                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

// f32/f64 from_*_bytes reinterpret the integer bit pattern, no rounding.
impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Primitive for bool {
    const SIZE: usize = 1;

    fn read_be(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn write_be(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    fn write_le(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }
}

/// Signed 24-bit integer held in an `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Int24(i32);

impl Int24 {
    pub const MIN: i32 = -(1 << 23);
    pub const MAX: i32 = (1 << 23) - 1;

    pub fn new(value: i32) -> Result<Self, FrameError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Int24(value))
        } else {
            Err(FrameError::OutOfRange {
                message: format!("{} does not fit in a signed 24-bit integer", value),
            })
        }
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    fn from_be_triplet(b: [u8; 3]) -> Self {
        // shift into the top of an i32 then arithmetic-shift back to sign-extend bit 23
        Int24(i32::from_be_bytes([b[0], b[1], b[2], 0]) >> 8)
    }

    fn to_be_triplet(self) -> [u8; 3] {
        let raw = self.0.to_be_bytes();
        [raw[1], raw[2], raw[3]]
    }
}

impl Primitive for Int24 {
    const SIZE: usize = 3;

    fn read_be(bytes: &[u8]) -> Self {
        Int24::from_be_triplet([bytes[0], bytes[1], bytes[2]])
    }

    fn read_le(bytes: &[u8]) -> Self {
        Int24::from_be_triplet([bytes[2], bytes[1], bytes[0]])
    }

    fn write_be(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_be_triplet());
    }

    fn write_le(self, out: &mut [u8]) {
        let be = self.to_be_triplet();
        out.copy_from_slice(&[be[2], be[1], be[0]]);
    }
}

/// Unsigned 24-bit integer held in a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UInt24(u32);

impl UInt24 {
    pub const MIN: u32 = 0;
    pub const MAX: u32 = (1 << 24) - 1;

    pub fn new(value: u32) -> Result<Self, FrameError> {
        if value <= Self::MAX {
            Ok(UInt24(value))
        } else {
            Err(FrameError::OutOfRange {
                message: format!("{} does not fit in an unsigned 24-bit integer", value),
            })
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Primitive for UInt24 {
    const SIZE: usize = 3;

    fn read_be(bytes: &[u8]) -> Self {
        UInt24(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    fn read_le(bytes: &[u8]) -> Self {
        UInt24(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    fn write_be(self, out: &mut [u8]) {
        out.copy_from_slice(&self.0.to_be_bytes()[1..]);
    }

    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.0.to_le_bytes()[..3]);
    }
}

impl EndianOrder {
    /// Byte order of the host running this code.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            EndianOrder::BigEndian
        } else {
            EndianOrder::LittleEndian
        }
    }

    pub fn is_native(&self) -> bool {
        *self == Self::native()
    }

    /// Decodes a `T` at `offset`.
    ///
    /// # Returns
    ///
    /// * `Ok(T)`: The decoded value.
    /// * `Err(FrameError::OutOfRange)`: If `offset + T::SIZE` exceeds the buffer.
    pub fn decode<T: Primitive>(&self, buffer: &[u8], offset: usize) -> Result<T, FrameError> {
        let bytes = Self::span(buffer.len(), offset, T::SIZE)
            .map(|range| &buffer[range])
            .ok_or_else(|| FrameError::OutOfRange {
                message: format!(
                    "reading {} bytes at offset {} from a {}-byte buffer",
                    T::SIZE,
                    offset,
                    buffer.len()
                ),
            })?;
        Ok(match self {
            EndianOrder::BigEndian => T::read_be(bytes),
            EndianOrder::LittleEndian => T::read_le(bytes),
        })
    }

    /// Encodes `value` into a new byte vector.
    pub fn encode<T: Primitive>(&self, value: T) -> Vec<u8> {
        let mut out = vec![0u8; T::SIZE];
        self.write(value, &mut out);
        out
    }

    /// Encodes `value` into `buffer` at `offset`, returning the number of bytes written.
    pub fn encode_into<T: Primitive>(
        &self,
        value: T,
        buffer: &mut [u8],
        offset: usize,
    ) -> Result<usize, FrameError> {
        let range = Self::span(buffer.len(), offset, T::SIZE).ok_or_else(|| {
            FrameError::OutOfRange {
                message: format!(
                    "writing {} bytes at offset {} into a {}-byte buffer",
                    T::SIZE,
                    offset,
                    buffer.len()
                ),
            }
        })?;
        self.write(value, &mut buffer[range]);
        Ok(T::SIZE)
    }

    /// Appends `value` to a growable buffer.
    pub fn put<T: Primitive, B: BufMut>(&self, value: T, buffer: &mut B) {
        let mut scratch = [0u8; 8];
        self.write(value, &mut scratch[..T::SIZE]);
        buffer.put_slice(&scratch[..T::SIZE]);
    }

    fn write<T: Primitive>(&self, value: T, out: &mut [u8]) {
        match self {
            EndianOrder::BigEndian => value.write_be(out),
            EndianOrder::LittleEndian => value.write_le(out),
        }
    }

    fn span(len: usize, offset: usize, size: usize) -> Option<std::ops::Range<usize>> {
        let end = offset.checked_add(size)?;
        (end <= len).then_some(offset..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: [EndianOrder; 2] = [EndianOrder::BigEndian, EndianOrder::LittleEndian];

    fn round_trip<T: Primitive + PartialEq + std::fmt::Debug>(values: &[T]) {
        for order in ORDERS {
            for value in values {
                let bytes = order.encode(*value);
                assert_eq!(bytes.len(), T::SIZE);
                assert_eq!(order.decode::<T>(&bytes, 0).unwrap(), *value);
            }
        }
    }

    #[test]
    fn test_integer_round_trips() {
        round_trip(&[false, true]);
        round_trip(&[u8::MIN, 0x7F, u8::MAX]);
        round_trip(&[i8::MIN, 0, i8::MAX]);
        round_trip(&[u16::MIN, 0x1234, u16::MAX]);
        round_trip(&[i16::MIN, -1, 0, i16::MAX]);
        round_trip(&[u32::MIN, 0xDEAD_BEEF, u32::MAX]);
        round_trip(&[i32::MIN, -1, 0, i32::MAX]);
        round_trip(&[u64::MIN, 0x0102_0304_0506_0708, u64::MAX]);
        round_trip(&[i64::MIN, -1, 0, i64::MAX]);
    }

    #[test]
    fn test_float_round_trips_preserve_bits() {
        round_trip(&[0.0f32, -0.0, f32::MIN, f32::MAX, f32::EPSILON, 60.001]);
        round_trip(&[0.0f64, f64::MIN, f64::MAX, f64::MIN_POSITIVE, -59.97]);

        let nan = f32::from_bits(0x7FC0_1234);
        for order in ORDERS {
            let decoded: f32 = order.decode(&order.encode(nan), 0).unwrap();
            assert_eq!(decoded.to_bits(), nan.to_bits());
        }
    }

    #[test]
    fn test_24_bit_round_trips() {
        let signed: Vec<Int24> = [Int24::MIN, -1, 0, 1, Int24::MAX]
            .iter()
            .map(|v| Int24::new(*v).unwrap())
            .collect();
        round_trip(&signed);

        let unsigned: Vec<UInt24> = [UInt24::MIN, 1, 0x00AB_CDEF, UInt24::MAX]
            .iter()
            .map(|v| UInt24::new(*v).unwrap())
            .collect();
        round_trip(&unsigned);

        assert!(Int24::new(Int24::MAX + 1).is_err());
        assert!(UInt24::new(UInt24::MAX + 1).is_err());
    }

    #[test]
    fn test_int24_sign_extends_from_bit_23() {
        let big = EndianOrder::BigEndian;
        assert_eq!(big.decode::<Int24>(&[0xFF, 0xFF, 0xFF], 0).unwrap().value(), -1);
        assert_eq!(
            big.decode::<Int24>(&[0x80, 0x00, 0x00], 0).unwrap().value(),
            Int24::MIN
        );
        assert_eq!(
            big.decode::<UInt24>(&[0x80, 0x00, 0x00], 0).unwrap().value(),
            0x80_0000
        );
        let little = EndianOrder::LittleEndian;
        assert_eq!(
            little.decode::<Int24>(&[0x00, 0x00, 0x80], 0).unwrap().value(),
            Int24::MIN
        );
    }

    #[test]
    fn test_byte_order_layout() {
        assert_eq!(EndianOrder::BigEndian.encode(0xCC3Au16), vec![0xCC, 0x3A]);
        assert_eq!(EndianOrder::LittleEndian.encode(0xCC3Au16), vec![0x3A, 0xCC]);
        assert_eq!(
            EndianOrder::BigEndian.decode::<u32>(&[0, 0x01, 0x02, 0x03, 0x04], 1).unwrap(),
            0x0102_0304
        );
    }

    #[test]
    fn test_out_of_range_access() {
        let buffer = [0u8; 4];
        let big = EndianOrder::BigEndian;
        assert!(matches!(
            big.decode::<u32>(&buffer, 1),
            Err(FrameError::OutOfRange { .. })
        ));
        assert!(matches!(
            big.decode::<u16>(&buffer, usize::MAX),
            Err(FrameError::OutOfRange { .. })
        ));
        assert!(big.decode::<u16>(&buffer, 2).is_ok());

        let mut out = [0u8; 2];
        assert!(matches!(
            big.encode_into(1u32, &mut out, 0),
            Err(FrameError::OutOfRange { .. })
        ));
        assert_eq!(big.encode_into(0xBEEFu16, &mut out, 0).unwrap(), 2);
        assert_eq!(out, [0xBE, 0xEF]);
    }

    #[test]
    fn test_put_appends() {
        let mut out: Vec<u8> = Vec::new();
        EndianOrder::BigEndian.put(0x1234u16, &mut out);
        EndianOrder::LittleEndian.put(0x1234u16, &mut out);
        EndianOrder::BigEndian.put(Int24::new(-2).unwrap(), &mut out);
        assert_eq!(out, vec![0x12, 0x34, 0x34, 0x12, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_native_order() {
        assert!(EndianOrder::native().is_native());
    }
}
