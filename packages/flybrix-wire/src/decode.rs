use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    type_name: &'static str,
}

impl DecodeError {
    pub fn new<T>(kind: DecodeErrorKind) -> Self {
        Self {
            kind,
            type_name: core::any::type_name::<T>(),
        }
    }

    pub const fn kind(&self) -> DecodeErrorKind {
        self.kind
    }
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to decode {}: {}", self.type_name, self.kind)
    }
}

#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("Message was too short.")]
    UnexpectedEnd,

    #[error("Could not decode {name} with unexpected value. Found {value:#x}, expected one of: {expected:x?}.")]
    UnexpectedValue {
        name: &'static str,
        value: u32,
        expected: &'static [u32],
    },
}

/// A type that can be reconstructed (decoded) from a raw sequence of bytes.
///
/// Implementors of this trait define how to parse their binary representation
/// from an input buffer. The input slice will be advanced by the number of bytes
/// consumed during decoding. On failure the slice may have been partially
/// advanced; use [`FieldReader`] for all-or-nothing reads.
pub trait Decode {
    /// Attempts to decode `Self` from the beginning of the provided byte slice.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the input is malformed or insufficient
    /// to decode a complete value of this type.
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

impl Decode for () {
    fn decode(_data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! impl_decode_for_primitive {
    ($($t:ty),*) => {
        $(
            impl Decode for $t {
                fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
                    let (bytes, rest) = data
                        .split_first_chunk::<{ size_of::<$t>() }>()
                        .ok_or_else(|| DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd))?;
                    *data = rest;
                    Ok(Self::from_le_bytes(*bytes))
                }
            }
        )*
    };
}

impl_decode_for_primitive!(u8, u16, u32, u64, i8, i16, i32, i64, f32);

// TODO: Drop the `Default + Copy` bound with `core::array::try_from_fn` once stabilized.
impl<const N: usize, T: Decode + Default + Copy> Decode for [T; N] {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut arr = [T::default(); N];

        for slot in arr.iter_mut() {
            *slot = T::decode(data)?;
        }

        Ok(arr)
    }
}

macro_rules! impl_decode_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
                Ok(($($name::decode(data)?,)+))
            }
        }
    };
}

impl_decode_for_tuple!(A);
impl_decode_for_tuple!(A, B);
impl_decode_for_tuple!(A, B, C);
impl_decode_for_tuple!(A, B, C, D);
impl_decode_for_tuple!(A, B, C, D, E);
impl_decode_for_tuple!(A, B, C, D, E, F);
impl_decode_for_tuple!(A, B, C, D, E, F, G);
impl_decode_for_tuple!(A, B, C, D, E, F, G, H);
impl_decode_for_tuple!(A, B, C, D, E, F, G, H, I);

/// Sequential reader over the body of a decoded frame.
///
/// Every [`parse`](FieldReader::parse) call is atomic: the cursor only moves
/// when the whole requested value (which may be a tuple of fields) decodes.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    data: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Decodes the next value, leaving the cursor untouched on failure.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the remaining bytes do not hold a
    /// complete, well-formed `T`.
    pub fn parse<T: Decode>(&mut self) -> Result<T, DecodeError> {
        let mut cursor = self.data;
        let value = T::decode(&mut cursor)?;
        self.data = cursor;
        Ok(value)
    }

    pub const fn len(&self) -> usize {
        self.data.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
