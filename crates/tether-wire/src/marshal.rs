//! The type marshalling layer.
//!
//! [`Marshal`] maps a Rust type onto the bit stream. Every RPC argument
//! type implements it, and an RPC call is serialized by marshalling its
//! arguments one after another in declaration order.
//!
//! Reads never fail: on a faulted stream they produce a zero/empty value
//! and the caller checks [`BitStream::is_valid`] once the structure is
//! decoded. Sequence decoding checks after every element and stops early.
//!
//! # Sequences
//!
//! A `Vec<T>` is its element count followed by the elements. The count uses
//! an escape encoding so that short lists stay cheap:
//!
//! ```text
//! count < 255    [count: 8 bits]
//! count >= 255   [255: 8 bits][count - 255: 16 bits]
//! ```
//!
//! A count of exactly 255 therefore takes the long form with an extension
//! of zero.
//!
//! # Context
//!
//! Some types cannot be marshalled on their own. A string-table entry needs
//! the connection's dictionary, for example. Those implement
//! [`MarshalWith<C>`] instead, which threads an explicit `&mut C` through
//! every read and write, elements of sequences included.

use crate::buffer::BYTE_BUFFER_LEN_BITS;
use crate::{
    BitStream, ByteBuffer, Float, Int, IpAddress, NONCE_SIZE, Nonce,
    RangedU32, SignedFloat, SignedInt,
};

/// Width of the base sequence-count field.
pub const SEQUENCE_BASE_BITS: u32 = 8;

/// Width of the extension field used once the base field escapes.
pub const SEQUENCE_EXT_BITS: u32 = 16;

/// Base-field value that announces an extension field.
pub const SEQUENCE_ESCAPE: usize = (1 << SEQUENCE_BASE_BITS) - 1;

/// Longest sequence the count encoding can carry.
pub const MAX_SEQUENCE_LEN: usize =
    SEQUENCE_ESCAPE + ((1 << SEQUENCE_EXT_BITS) - 1);

/// A type with a fixed wire representation.
pub trait Marshal: Sized {
    fn write(&self, stream: &mut BitStream);
    fn read(stream: &mut BitStream) -> Self;
}

/// A type whose wire representation depends on a context value.
pub trait MarshalWith<C: ?Sized>: Sized {
    fn write_with(&self, stream: &mut BitStream, ctx: &mut C);
    fn read_with(stream: &mut BitStream, ctx: &mut C) -> Self;
}

// ---------------------------------------------------------------------------
// Sequence header
// ---------------------------------------------------------------------------

/// Writes a sequence count, clamped to [`MAX_SEQUENCE_LEN`].
pub fn write_sequence_len(stream: &mut BitStream, count: usize) {
    let count = count.min(MAX_SEQUENCE_LEN);
    if count >= SEQUENCE_ESCAPE {
        stream.write_int(SEQUENCE_ESCAPE as u32, SEQUENCE_BASE_BITS);
        stream.write_int((count - SEQUENCE_ESCAPE) as u32, SEQUENCE_EXT_BITS);
    } else {
        stream.write_int(count as u32, SEQUENCE_BASE_BITS);
    }
}

/// Reads a sequence count written by [`write_sequence_len`].
pub fn read_sequence_len(stream: &mut BitStream) -> usize {
    let base = stream.read_int(SEQUENCE_BASE_BITS) as usize;
    if base == SEQUENCE_ESCAPE {
        base + stream.read_int(SEQUENCE_EXT_BITS) as usize
    } else {
        base
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    fn write(&self, stream: &mut BitStream) {
        let count = self.len().min(MAX_SEQUENCE_LEN);
        write_sequence_len(stream, count);
        for item in &self[..count] {
            item.write(stream);
        }
    }

    fn read(stream: &mut BitStream) -> Self {
        let count = read_sequence_len(stream);
        // Cap the preallocation; `count` comes off the wire.
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            if !stream.is_valid() {
                break;
            }
            let item = T::read(stream);
            if !stream.is_valid() {
                break;
            }
            out.push(item);
        }
        out
    }
}

impl<C: ?Sized, T: MarshalWith<C>> MarshalWith<C> for Vec<T> {
    fn write_with(&self, stream: &mut BitStream, ctx: &mut C) {
        let count = self.len().min(MAX_SEQUENCE_LEN);
        write_sequence_len(stream, count);
        for item in &self[..count] {
            item.write_with(stream, ctx);
        }
    }

    fn read_with(stream: &mut BitStream, ctx: &mut C) -> Self {
        let count = read_sequence_len(stream);
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            if !stream.is_valid() {
                break;
            }
            let item = T::read_with(stream, ctx);
            if !stream.is_valid() {
                break;
            }
            out.push(item);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

macro_rules! marshal_unsigned {
    ($($ty:ty),*) => {$(
        impl Marshal for $ty {
            fn write(&self, stream: &mut BitStream) {
                stream.write_int64(u64::from(*self), <$ty>::BITS);
            }

            fn read(stream: &mut BitStream) -> Self {
                stream.read_int64(<$ty>::BITS) as $ty
            }
        }
    )*};
}

macro_rules! marshal_signed {
    ($($ty:ty => $unsigned:ty),*) => {$(
        impl Marshal for $ty {
            fn write(&self, stream: &mut BitStream) {
                (*self as $unsigned).write(stream);
            }

            fn read(stream: &mut BitStream) -> Self {
                <$unsigned>::read(stream) as $ty
            }
        }
    )*};
}

marshal_unsigned!(u8, u16, u32, u64);
marshal_signed!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);

impl Marshal for bool {
    fn write(&self, stream: &mut BitStream) {
        stream.write_flag(*self);
    }

    fn read(stream: &mut BitStream) -> Self {
        stream.read_flag()
    }
}

impl Marshal for f32 {
    fn write(&self, stream: &mut BitStream) {
        self.to_bits().write(stream);
    }

    fn read(stream: &mut BitStream) -> Self {
        f32::from_bits(u32::read(stream))
    }
}

impl Marshal for f64 {
    fn write(&self, stream: &mut BitStream) {
        self.to_bits().write(stream);
    }

    fn read(stream: &mut BitStream) -> Self {
        f64::from_bits(u64::read(stream))
    }
}

impl Marshal for String {
    fn write(&self, stream: &mut BitStream) {
        stream.write_string(self);
    }

    fn read(stream: &mut BitStream) -> Self {
        stream.read_string()
    }
}

// ---------------------------------------------------------------------------
// Wire wrappers
// ---------------------------------------------------------------------------

impl<const N: u32> Marshal for Int<N> {
    fn write(&self, stream: &mut BitStream) {
        stream.write_int(self.0, N);
    }

    fn read(stream: &mut BitStream) -> Self {
        Self(stream.read_int(N))
    }
}

impl<const N: u32> Marshal for SignedInt<N> {
    fn write(&self, stream: &mut BitStream) {
        stream.write_signed_int(self.0, N);
    }

    fn read(stream: &mut BitStream) -> Self {
        Self(stream.read_signed_int(N))
    }
}

impl<const N: u32> Marshal for Float<N> {
    fn write(&self, stream: &mut BitStream) {
        stream.write_float(self.0, N);
    }

    fn read(stream: &mut BitStream) -> Self {
        Self(stream.read_float(N))
    }
}

impl<const N: u32> Marshal for SignedFloat<N> {
    fn write(&self, stream: &mut BitStream) {
        stream.write_signed_float(self.0, N);
    }

    fn read(stream: &mut BitStream) -> Self {
        Self(stream.read_signed_float(N))
    }
}

impl<const MIN: u32, const MAX: u32> Marshal for RangedU32<MIN, MAX> {
    fn write(&self, stream: &mut BitStream) {
        stream.write_ranged_u32(self.0, MIN, MAX);
    }

    fn read(stream: &mut BitStream) -> Self {
        Self(stream.read_ranged_u32(MIN, MAX))
    }
}

// ---------------------------------------------------------------------------
// Composite wire types
// ---------------------------------------------------------------------------

impl Marshal for ByteBuffer {
    fn write(&self, stream: &mut BitStream) {
        let bytes = self.wire_bytes();
        stream.write_int(bytes.len() as u32, BYTE_BUFFER_LEN_BITS);
        stream.write_bytes(bytes);
    }

    fn read(stream: &mut BitStream) -> Self {
        let len = stream.read_int(BYTE_BUFFER_LEN_BITS) as usize;
        ByteBuffer::new(stream.read_bytes(len))
    }
}

impl Marshal for IpAddress {
    fn write(&self, stream: &mut BitStream) {
        self.net_num.write(stream);
        self.port.write(stream);
    }

    fn read(stream: &mut BitStream) -> Self {
        let net_num = u32::read(stream);
        let port = u16::read(stream);
        IpAddress { net_num, port }
    }
}

impl Marshal for Nonce {
    fn write(&self, stream: &mut BitStream) {
        stream.write_bytes(self.as_bytes());
    }

    fn read(stream: &mut BitStream) -> Self {
        let bytes = stream.read_bytes(NONCE_SIZE);
        Nonce::from_slice(&bytes).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Marshal>(value: &T) -> T {
        let mut s = BitStream::new();
        value.write(&mut s);
        let mut r = BitStream::from_bytes(s.into_bytes());
        let back = T::read(&mut r);
        assert!(r.is_valid());
        back
    }

    #[test]
    fn test_sequence_len_255_uses_escape_with_zero_extension() {
        let mut s = BitStream::new();
        write_sequence_len(&mut s, 255);
        assert_eq!(s.bit_len(), 24);
        let mut r = BitStream::from_bytes(s.into_bytes());
        assert_eq!(r.read_int(8), 255);
        assert_eq!(r.read_int(16), 0);
    }

    #[test]
    fn test_sequence_len_254_uses_base_field_only() {
        let mut s = BitStream::new();
        write_sequence_len(&mut s, 254);
        assert_eq!(s.bit_len(), 8);
    }

    #[test]
    fn test_sequence_len_clamps_to_max() {
        let mut s = BitStream::new();
        write_sequence_len(&mut s, MAX_SEQUENCE_LEN + 10);
        let mut r = BitStream::from_bytes(s.into_bytes());
        assert_eq!(read_sequence_len(&mut r), MAX_SEQUENCE_LEN);
    }

    #[test]
    fn test_vec_read_stops_on_truncated_stream() {
        let mut s = BitStream::new();
        write_sequence_len(&mut s, 10);
        for i in 0..3u32 {
            i.write(&mut s);
        }
        let mut r = BitStream::from_bytes(s.into_bytes());
        let out = Vec::<u32>::read(&mut r);
        assert_eq!(out, vec![0, 1, 2]);
        assert!(!r.is_valid());
    }

    #[test]
    fn test_ranged_single_value_costs_zero_bits() {
        let mut s = BitStream::new();
        RangedU32::<7, 7>(7).write(&mut s);
        assert_eq!(s.bit_len(), 0);
        let mut r = BitStream::from_bytes(Vec::new());
        assert_eq!(RangedU32::<7, 7>::read(&mut r).0, 7);
        assert!(r.is_valid());
    }

    #[test]
    fn test_byte_buffer_truncates_to_max() {
        let big = ByteBuffer::new(vec![0x5A; 2000]);
        let back = roundtrip(&big);
        assert_eq!(back.len(), crate::MAX_BYTE_BUFFER_LEN);
        assert!(back.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_address_is_48_bits() {
        let addr: IpAddress = "192.168.1.20:28000".parse().unwrap();
        let mut s = BitStream::new();
        addr.write(&mut s);
        assert_eq!(s.bit_len(), 48);
        assert_eq!(roundtrip(&addr), addr);
    }

    #[test]
    fn test_nonce_roundtrip() {
        let n = Nonce::random();
        assert_eq!(roundtrip(&n), n);
    }

    struct Doubler;

    #[derive(Debug, PartialEq)]
    struct Scaled(u32);

    impl MarshalWith<Doubler> for Scaled {
        fn write_with(&self, stream: &mut BitStream, _ctx: &mut Doubler) {
            stream.write_int(self.0 / 2, 8);
        }

        fn read_with(stream: &mut BitStream, _ctx: &mut Doubler) -> Self {
            Scaled(stream.read_int(8) * 2)
        }
    }

    #[test]
    fn test_marshal_with_threads_context_through_vec() {
        let items = vec![Scaled(2), Scaled(40), Scaled(300)];
        let mut s = BitStream::new();
        items.write_with(&mut s, &mut Doubler);
        let mut r = BitStream::from_bytes(s.into_bytes());
        let back = Vec::<Scaled>::read_with(&mut r, &mut Doubler);
        assert_eq!(back, vec![Scaled(2), Scaled(40), Scaled(300)]);
    }
}
