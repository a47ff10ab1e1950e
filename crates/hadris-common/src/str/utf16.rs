use crate::types::{
    endian::{BigEndian, Endian, Endianness, LittleEndian},
    number::U16,
};

#[cfg(feature = "alloc")]
use alloc::{string::String, vec::Vec};

/// A fixed-capacity string of `N` UTF-16 code units, tagged with an on-disk
/// endianness.
///
/// GPT partition names are little-endian (`FixedUtf16Str<36, LittleEndian>`);
/// Joliet directory records are big-endian UCS-2
/// (`FixedUtf16Str<N, BigEndian>`). Unpaired surrogates are rejected rather
/// than silently truncated, since a lossily-decoded name can no longer be
/// round-tripped back onto the same directory record.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FixedUtf16Str<const N: usize, E: Endianness = LittleEndian> {
    data: [U16<E>; N],
}

impl<const N: usize, E: Endianness> FixedUtf16Str<N, E> {
    /// Encodes `s`, right-padding the remainder with NUL code units.
    ///
    /// Returns `Err` if `s` has more UTF-16 code units than `N`.
    #[cfg(feature = "alloc")]
    pub fn encode(s: &str) -> Result<Self, Utf16Error> {
        let mut data = [U16::<E>::new(0); N];
        let mut i = 0;
        for unit in s.encode_utf16() {
            if i >= N {
                return Err(Utf16Error::TooLong);
            }
            data[i] = U16::new(unit);
            i += 1;
        }
        Ok(Self { data })
    }

    /// Decodes the stored code units up to the first NUL (or `N`, whichever
    /// is first) into an owned `String`.
    #[cfg(feature = "alloc")]
    pub fn decode(&self) -> Result<String, Utf16Error> {
        let units: Vec<u16> = self
            .data
            .iter()
            .map(|c| c.get())
            .take_while(|&c| c != 0)
            .collect();
        String::from_utf16(&units).map_err(|_| Utf16Error::InvalidSequence)
    }

    /// Deprecated alias for [`decode`](Self::decode) kept for call sites that
    /// pre-date the lossless rewrite.
    #[cfg(feature = "alloc")]
    pub fn to_string(&self) -> Result<String, Utf16Error> {
        self.decode()
    }

    pub fn as_units(&self) -> &[U16<E>; N] {
        &self.data
    }
}

impl<const N: usize, E: Endianness> Default for FixedUtf16Str<N, E> {
    fn default() -> Self {
        Self {
            data: [U16::<E>::new(0); N],
        }
    }
}

impl<const N: usize, E: Endianness> core::fmt::Debug for FixedUtf16Str<N, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        #[cfg(feature = "alloc")]
        {
            match self.decode() {
                Ok(s) => write!(f, "FixedUtf16Str({:?})", s),
                Err(_) => write!(f, "FixedUtf16Str(<invalid utf-16>)"),
            }
        }
        #[cfg(not(feature = "alloc"))]
        {
            f.debug_struct("FixedUtf16Str").finish_non_exhaustive()
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Utf16Error {
    TooLong,
    InvalidSequence,
}

impl core::fmt::Display for Utf16Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Utf16Error::TooLong => write!(f, "string has too many UTF-16 code units for field"),
            Utf16Error::InvalidSequence => write!(f, "invalid UTF-16 sequence"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Utf16Error {}

#[cfg(feature = "bytemuck")]
unsafe impl<const N: usize, E: Endianness> bytemuck::Pod for FixedUtf16Str<N, E> {}
#[cfg(feature = "bytemuck")]
unsafe impl<const N: usize, E: Endianness> bytemuck::Zeroable for FixedUtf16Str<N, E> {}

/// A UCS-2 big-endian string as used by Joliet directory records: an
/// allocated, variable-length counterpart to [`FixedUtf16Str`] for names
/// that don't fit a fixed on-disk field.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JolietString {
    units: Vec<U16<BigEndian>>,
}

#[cfg(feature = "alloc")]
impl JolietString {
    /// Joliet level 1-3 cap name length at 64, 101, and 110 characters
    /// respectively; the caller enforces the level-specific limit.
    pub fn encode(s: &str) -> Self {
        let units = s.encode_utf16().map(U16::new).collect();
        Self { units }
    }

    pub fn len_units(&self) -> usize {
        self.units.len()
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.units.len() * 2);
        for unit in &self.units {
            out.extend_from_slice(&unit.get().to_be_bytes());
        }
        out
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self, Utf16Error> {
        if bytes.len() % 2 != 0 {
            return Err(Utf16Error::InvalidSequence);
        }
        let units = bytes
            .chunks_exact(2)
            .map(|c| U16::new(u16::from_be_bytes([c[0], c[1]])))
            .collect();
        Ok(Self { units })
    }

    pub fn decode(&self) -> Result<String, Utf16Error> {
        let raw: Vec<u16> = self.units.iter().map(|u| u.get()).collect();
        String::from_utf16(&raw).map_err(|_| Utf16Error::InvalidSequence)
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ascii_through_fixed_field() {
        let encoded = FixedUtf16Str::<16, BigEndian>::encode("hello").unwrap();
        assert_eq!(encoded.decode().unwrap(), "hello");
    }

    #[test]
    fn rejects_strings_longer_than_capacity() {
        assert_eq!(
            FixedUtf16Str::<2, LittleEndian>::encode("abc").unwrap_err(),
            Utf16Error::TooLong
        );
    }

    #[test]
    fn joliet_string_round_trips_through_be_bytes() {
        let s = JolietString::encode("ROCK_RIDGE");
        let bytes = s.to_be_bytes();
        let back = JolietString::from_be_bytes(&bytes).unwrap();
        assert_eq!(back.decode().unwrap(), "ROCK_RIDGE");
    }

    #[test]
    fn empty_field_decodes_to_empty_string() {
        let empty = FixedUtf16Str::<8, LittleEndian>::default();
        assert_eq!(empty.decode().unwrap(), "");
    }
}
