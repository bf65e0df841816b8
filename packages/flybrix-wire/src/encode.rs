use alloc::vec::Vec;
use thiserror::Error;

use crate::{frame::encode_frame, message::MessageType};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Message of {needed} bytes does not fit in a {capacity} byte payload")]
    Overflow { needed: usize, capacity: usize },
}

/// A type that can be encoded into a sequence of bytes.
pub trait Encode {
    /// Returns the number of bytes this value will take when encoded.
    fn size(&self) -> usize;

    /// Encodes this instance into the provided byte slice.
    ///
    /// The slice must be at least [`size`](Encode::size) bytes long.
    fn encode(&self, data: &mut [u8]);
}

macro_rules! impl_encode_for_primitive {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn size(&self) -> usize {
                    size_of::<Self>()
                }

                fn encode(&self, data: &mut [u8]) {
                    data[..size_of::<Self>()].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_encode_for_primitive!(u8, u16, u32, u64, i8, i16, i32, i64, f32);

impl Encode for () {
    fn size(&self) -> usize {
        0
    }
    fn encode(&self, _data: &mut [u8]) {}
}

impl<T: Encode + ?Sized> Encode for &T {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn encode(&self, data: &mut [u8]) {
        (**self).encode(data)
    }
}

impl Encode for [u8] {
    fn size(&self) -> usize {
        self.len()
    }

    fn encode(&self, data: &mut [u8]) {
        data[..self.len()].copy_from_slice(self);
    }
}

impl<const N: usize, T: Encode> Encode for [T; N] {
    fn size(&self) -> usize {
        self.iter().map(Encode::size).sum()
    }

    fn encode(&self, data: &mut [u8]) {
        let mut offset = 0;
        for item in self {
            item.encode(&mut data[offset..]);
            offset += item.size();
        }
    }
}

macro_rules! impl_encode_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn size(&self) -> usize {
                let ($($name,)+) = self;
                0 $(+ $name.size())+
            }

            #[allow(non_snake_case)]
            fn encode(&self, data: &mut [u8]) {
                let ($($name,)+) = self;
                let mut offset = 0;
                $(
                    $name.encode(&mut data[offset..]);
                    offset += $name.size();
                )+
                let _ = offset;
            }
        }
    };
}

impl_encode_for_tuple!(A);
impl_encode_for_tuple!(A, B);
impl_encode_for_tuple!(A, B, C);
impl_encode_for_tuple!(A, B, C, D);
impl_encode_for_tuple!(A, B, C, D, E);
impl_encode_for_tuple!(A, B, C, D, E, F);
impl_encode_for_tuple!(A, B, C, D, E, F, G);
impl_encode_for_tuple!(A, B, C, D, E, F, G, H);
impl_encode_for_tuple!(A, B, C, D, E, F, G, H, I);

/// Fixed-capacity payload builder.
///
/// Fields are appended in order. A write that would exceed `N` bytes fails
/// with [`EncodeError::Overflow`] and leaves the payload as it was.
pub struct MessageEncoder<const N: usize> {
    data: [u8; N],
    position: usize,
}

impl<const N: usize> MessageEncoder<N> {
    /// Creates a payload that starts with the `{type, mask}` message header.
    pub fn new(message_type: MessageType, mask: u32) -> Result<Self, EncodeError> {
        let mut enc = Self::empty();
        enc.write(&(message_type, mask))?;
        Ok(enc)
    }

    /// Creates a payload with no header.
    pub const fn empty() -> Self {
        Self {
            data: [0; N],
            position: 0,
        }
    }

    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        let needed = self.position + value.size();
        if needed > N {
            return Err(EncodeError::Overflow {
                needed,
                capacity: N,
            });
        }

        value.encode(&mut self.data[self.position..needed]);
        self.position = needed;
        Ok(())
    }

    pub const fn len(&self) -> usize {
        self.position
    }

    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.position]
    }

    /// Returns the COBS-framed payload, delimiter included.
    pub fn finish(&self) -> Vec<u8> {
        encode_frame(self.as_bytes())
    }
}

impl<const N: usize> Default for MessageEncoder<N> {
    fn default() -> Self {
        Self::empty()
    }
}
