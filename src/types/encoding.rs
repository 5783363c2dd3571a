//! Binary encoding and decoding traits for the module wire format.
//!
//! All integers are fixed-width and little-endian regardless of the host, so a
//! module written on one platform reads back identically on any other. There is
//! no length prefixing: composite values (see `#[derive(BinaryCodec)]`) are the
//! plain concatenation of their fields.

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counter for computing encoded size without allocating memory.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self { len: 0 }
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Trait for types that can be serialized to binary format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Returns the number of bytes `encode` writes.
    fn encoded_len(&self) -> usize {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);
        counter.len()
    }

    /// Serializes to a new byte buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before expected data was read.
    UnexpectedEof { needed: usize, available: usize },
}

/// Trait for types that can be deserialized from binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value from the input buffer.
    ///
    /// Advances the input slice past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub(crate) fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof {
            needed: n,
            available: input.len(),
        });
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, 1)?;
        Ok(bytes[0])
    }
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    const WIDTH: usize = std::mem::size_of::<$t>();
                    let bytes = read_bytes(input, WIDTH)?;
                    let mut raw = [0u8; WIDTH];
                    raw.copy_from_slice(bytes);
                    Ok(<$t>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_int!(u16, u32, u64, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        counter.write(&[1, 2, 3]);
        counter.write(&[4]);
        assert_eq!(counter.len(), 4);
    }

    #[test]
    fn encoded_len_matches_width() {
        assert_eq!(7u8.encoded_len(), 1);
        assert_eq!(7u16.encoded_len(), 2);
        assert_eq!(7u32.encoded_len(), 4);
        assert_eq!(7i64.encoded_len(), 8);
    }

    #[test]
    fn u16_little_endian() {
        assert_eq!(0x0102u16.to_bytes(), vec![0x02, 0x01]);
    }

    #[test]
    fn u32_little_endian() {
        assert_eq!(0x01020304u32.to_bytes(), vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn i64_negative_is_twos_complement() {
        assert_eq!((-1i64).to_bytes(), vec![0xFF; 8]);
        assert_eq!((-6i64).to_bytes()[0], 0xFA);
    }

    #[test]
    fn decode_advances_input() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0xAA];
        let mut input = &data[..];
        assert_eq!(u16::decode(&mut input).unwrap(), 1);
        assert_eq!(u32::decode(&mut input).unwrap(), 2);
        assert_eq!(input, &[0xAA]);
    }

    #[test]
    fn decode_i64_extremes() {
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            let bytes = v.to_bytes();
            let mut input = bytes.as_slice();
            assert_eq!(i64::decode(&mut input).unwrap(), v);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn unexpected_eof_reports_sizes() {
        let data = [0x01, 0x02];
        let mut input = &data[..];
        assert_eq!(
            u32::decode(&mut input),
            Err(DecodeError::UnexpectedEof {
                needed: 4,
                available: 2
            })
        );
        assert_eq!(input.len(), 2);
    }
}
