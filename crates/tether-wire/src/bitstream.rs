//! The bit-level stream codec.
//!
//! A [`BitStream`] is a growable byte buffer with two independent cursors,
//! one for writing and one for reading, both measured in *bits*. Values are
//! packed back to back with no padding, so a 3-bit field followed by a
//! 10-bit field occupies exactly 13 bits.
//!
//! # Bit order
//!
//! Bit `i` of the stream lives in byte `i >> 3` at bit `i & 7` (LSB first).
//! Multi-bit integers are written least-significant bit first. Reader and
//! writer must agree on this; it is the wire contract.
//!
//! # Faults
//!
//! Reading past the last written bit marks the stream *invalid*. The flag
//! is sticky: every later read returns zero (or `false`, or an empty value)
//! without touching the cursor. Decoders call [`BitStream::is_valid`] after
//! variable-length content and stop instead of panicking.
//!
//! ```rust
//! use tether_wire::BitStream;
//!
//! let mut stream = BitStream::new();
//! stream.write_int(5, 3);
//! stream.write_flag(true);
//!
//! let mut reader = BitStream::from_bytes(stream.into_bytes());
//! assert_eq!(reader.read_int(3), 5);
//! assert!(reader.read_flag());
//! ```

use crate::WireError;

/// Maximum byte length of a string on the wire (8-bit length prefix).
pub const MAX_STRING_LEN: usize = 255;

/// Number of bits needed to encode every value in `min..=max`.
///
/// This is `ceil(log2(max - min + 1))`; a single-valued range needs zero
/// bits. `max < min` is treated as a single-valued range.
pub fn ranged_bit_count(min: u32, max: u32) -> u32 {
    let span = u64::from(max.saturating_sub(min)) + 1;
    if span <= 1 {
        0
    } else {
        64 - (span - 1).leading_zeros()
    }
}

/// A growable bit buffer with independent read and write cursors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitStream {
    data: Vec<u8>,
    /// Write cursor in bits. Also the logical end of the readable data.
    write_pos: usize,
    /// Read cursor in bits.
    read_pos: usize,
    /// Cleared on the first overrun; never set again.
    valid: bool,
}

impl BitStream {
    /// Creates an empty stream, ready for writing.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            write_pos: 0,
            read_pos: 0,
            valid: true,
        }
    }

    /// Creates an empty stream with room for `bytes` bytes before growing.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            ..Self::new()
        }
    }

    /// Wraps received bytes for reading. Every bit of `bytes` is readable.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let data = bytes.into();
        let write_pos = data.len() * 8;
        Self {
            data,
            write_pos,
            read_pos: 0,
            valid: true,
        }
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// `false` once any read has run past the end of the data.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Faults the stream. Used by decoders that find a value the bits
    /// alone cannot reject, such as a reference to an unknown slot.
    pub fn set_invalid(&mut self) {
        self.valid = false;
    }

    /// Converts the sticky fault flag into a `Result`.
    pub fn check(&self) -> Result<(), WireError> {
        if self.valid {
            Ok(())
        } else {
            Err(WireError::Overrun {
                position: self.read_pos,
                len: self.write_pos,
            })
        }
    }

    /// Read cursor, in bits.
    pub fn bit_position(&self) -> usize {
        self.read_pos
    }

    /// Moves the read cursor. Positions past the end fault the next read.
    pub fn set_bit_position(&mut self, position: usize) {
        self.read_pos = position;
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.write_pos
    }

    /// Number of bytes the written bits occupy.
    pub fn byte_len(&self) -> usize {
        self.write_pos.div_ceil(8)
    }

    /// Bits still available to read.
    pub fn remaining_bits(&self) -> usize {
        self.write_pos.saturating_sub(self.read_pos)
    }

    /// The written bytes. The final byte is zero-padded.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.byte_len()]
    }

    /// Consumes the stream, returning the written bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        let len = self.byte_len();
        self.data.truncate(len);
        self.data
    }

    /// Pads the write cursor with zero bits up to the next byte boundary.
    pub fn zero_to_byte_boundary(&mut self) {
        let pad = (8 - (self.write_pos & 7)) & 7;
        if pad > 0 {
            self.write_int(0, pad as u32);
        }
    }

    // -----------------------------------------------------------------------
    // Raw bit access
    // -----------------------------------------------------------------------

    fn put_bit(&mut self, position: usize, set: bool) {
        let byte = position >> 3;
        if byte >= self.data.len() {
            self.data.resize(byte + 1, 0);
        }
        let mask = 1u8 << (position & 7);
        if set {
            self.data[byte] |= mask;
        } else {
            self.data[byte] &= !mask;
        }
    }

    fn get_bit(&self, position: usize) -> bool {
        self.data[position >> 3] & (1u8 << (position & 7)) != 0
    }

    /// Reserves `bits` for reading, faulting the stream if they are not
    /// there. Returns the start position on success.
    fn take(&mut self, bits: usize) -> Option<usize> {
        if !self.valid {
            return None;
        }
        let end = match self.read_pos.checked_add(bits) {
            Some(end) if end <= self.write_pos => end,
            _ => {
                self.valid = false;
                return None;
            }
        };
        let start = self.read_pos;
        self.read_pos = end;
        Some(start)
    }

    fn put_u64(&mut self, position: usize, value: u64, bits: u32) {
        for i in 0..bits as usize {
            self.put_bit(position + i, (value >> i) & 1 == 1);
        }
    }

    // -----------------------------------------------------------------------
    // Integers
    // -----------------------------------------------------------------------

    /// Writes the low `bits` bits of `value` (`bits <= 64`).
    ///
    /// Higher bits are silently dropped. Peers rely on this truncation, so
    /// it is not an error.
    pub fn write_int64(&mut self, value: u64, bits: u32) {
        let bits = bits.min(64);
        self.put_u64(self.write_pos, value, bits);
        self.write_pos += bits as usize;
    }

    /// Reads a `bits`-wide unsigned value (`bits <= 64`).
    pub fn read_int64(&mut self, bits: u32) -> u64 {
        let bits = bits.min(64);
        let Some(start) = self.take(bits as usize) else {
            return 0;
        };
        let mut value = 0u64;
        for i in 0..bits as usize {
            if self.get_bit(start + i) {
                value |= 1 << i;
            }
        }
        value
    }

    /// Writes the low `bits` bits of `value` (`bits <= 32`).
    pub fn write_int(&mut self, value: u32, bits: u32) {
        self.write_int64(u64::from(value), bits.min(32));
    }

    /// Reads a `bits`-wide unsigned value (`bits <= 32`).
    pub fn read_int(&mut self, bits: u32) -> u32 {
        self.read_int64(bits.min(32)) as u32
    }

    /// Overwrites `bits` bits at bit `position` without moving the read
    /// cursor. The write cursor only moves if the patch extends the data.
    pub fn write_int_at(&mut self, value: u32, bits: u32, position: usize) {
        let bits = bits.min(32);
        self.put_u64(position, u64::from(value), bits);
        self.write_pos = self.write_pos.max(position + bits as usize);
    }

    /// Writes a two's complement value in `bits` bits.
    pub fn write_signed_int(&mut self, value: i32, bits: u32) {
        self.write_int(value as u32, bits);
    }

    /// Reads a two's complement value, sign-extending from `bits` bits.
    pub fn read_signed_int(&mut self, bits: u32) -> i32 {
        let bits = bits.clamp(1, 32);
        let raw = self.read_int(bits);
        let shift = 32 - bits;
        ((raw << shift) as i32) >> shift
    }

    /// Writes `value - min` in just enough bits to cover `min..=max`.
    pub fn write_ranged_u32(&mut self, value: u32, min: u32, max: u32) {
        let bits = ranged_bit_count(min, max);
        self.write_int(value.wrapping_sub(min), bits);
    }

    /// Reads a value written by [`write_ranged_u32`](Self::write_ranged_u32).
    pub fn read_ranged_u32(&mut self, min: u32, max: u32) -> u32 {
        let bits = ranged_bit_count(min, max);
        self.read_int(bits).wrapping_add(min)
    }

    // -----------------------------------------------------------------------
    // Flags and floats
    // -----------------------------------------------------------------------

    /// Writes a single bit and returns it, so callers can write
    /// `if stream.write_flag(x) { ... }` symmetric with the read side.
    pub fn write_flag(&mut self, flag: bool) -> bool {
        self.put_bit(self.write_pos, flag);
        self.write_pos += 1;
        flag
    }

    /// Reads a single bit. A faulted stream reads `false`.
    pub fn read_flag(&mut self) -> bool {
        match self.take(1) {
            Some(position) => self.get_bit(position),
            None => false,
        }
    }

    /// Quantizes `value` from `[0, 1]` onto `bits` bits. Out-of-range input
    /// is clamped.
    pub fn write_float(&mut self, value: f32, bits: u32) {
        let bits = bits.clamp(1, 32);
        let max = ((1u64 << bits) - 1) as f64;
        let scaled = (f64::from(value.clamp(0.0, 1.0)) * max + 0.5) as u64;
        self.write_int64(scaled, bits);
    }

    /// Reads a value written by [`write_float`](Self::write_float).
    pub fn read_float(&mut self, bits: u32) -> f32 {
        let bits = bits.clamp(1, 32);
        let max = ((1u64 << bits) - 1) as f64;
        (self.read_int64(bits) as f64 / max) as f32
    }

    /// Quantizes `value` from `[-1, 1]` onto `bits` bits, two's complement.
    ///
    /// The scale is `2^(bits-1) - 1` so that zero encodes exactly and the
    /// encoding is symmetric around it.
    pub fn write_signed_float(&mut self, value: f32, bits: u32) {
        let bits = bits.clamp(2, 32);
        let max = ((1u64 << (bits - 1)) - 1) as f64;
        let scaled = (f64::from(value.clamp(-1.0, 1.0)) * max).round() as i32;
        self.write_signed_int(scaled, bits);
    }

    /// Reads a value written by
    /// [`write_signed_float`](Self::write_signed_float).
    pub fn read_signed_float(&mut self, bits: u32) -> f32 {
        let bits = bits.clamp(2, 32);
        let max = ((1u64 << (bits - 1)) - 1) as f64;
        (f64::from(self.read_signed_int(bits)) / max) as f32
    }

    // -----------------------------------------------------------------------
    // Bytes and strings
    // -----------------------------------------------------------------------

    /// Writes raw bytes, 8 bits each, at the current (possibly unaligned)
    /// write position.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_int(u32::from(b), 8);
        }
    }

    /// Reads `len` raw bytes. Returns an empty vector on overrun.
    pub fn read_bytes(&mut self, len: usize) -> Vec<u8> {
        let Some(start) = self.take(len * 8) else {
            return Vec::new();
        };
        (0..len)
            .map(|i| {
                let mut byte = 0u8;
                for bit in 0..8 {
                    if self.get_bit(start + i * 8 + bit) {
                        byte |= 1 << bit;
                    }
                }
                byte
            })
            .collect()
    }

    /// Writes a string as an 8-bit byte length plus its UTF-8 bytes.
    ///
    /// Strings longer than [`MAX_STRING_LEN`] bytes are cut at the last
    /// character boundary that fits.
    pub fn write_string(&mut self, value: &str) {
        let mut end = value.len().min(MAX_STRING_LEN);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &value.as_bytes()[..end];
        self.write_int(bytes.len() as u32, 8);
        self.write_bytes(bytes);
    }

    /// Reads a string written by [`write_string`](Self::write_string).
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_string(&mut self) -> String {
        let len = self.read_int(8) as usize;
        let bytes = self.read_bytes(len);
        if !self.valid {
            return String::new();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
