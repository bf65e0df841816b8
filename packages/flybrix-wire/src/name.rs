use core::fmt;

use thiserror::Error;

use crate::{
    decode::{Decode, DecodeError},
    encode::Encode,
};

/// Capacity of [`DeviceName`], terminator included.
#[cfg(not(feature = "short-name"))]
pub const DEVICE_NAME_CAPACITY: usize = 20;

/// Capacity of [`DeviceName`], terminator included.
#[cfg(feature = "short-name")]
pub const DEVICE_NAME_CAPACITY: usize = 9;

/// Name assigned to freshly initialized boards.
pub const DEFAULT_DEVICE_NAME: &str = "FLYBRIX";

/// A null-terminated device name with a fixed capacity of `N` bytes.
///
/// The name is stored exactly as it travels on the wire, so a decoded name
/// may hold anything. [`verify`](DeviceName::verify) decides whether it is
/// acceptable.
///
/// # Invariants of a valid name
///
/// - A zero byte occurs within the first `N` bytes; everything after the
///   first zero is ignored.
/// - Every byte before it is one of `0-9`, `a-z`, `A-Z`, `' '`, `'_'`, `'-'`.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct DeviceName<const N: usize = DEVICE_NAME_CAPACITY>([u8; N]);

impl<const N: usize> DeviceName<N> {
    /// Creates a name from a string slice.
    ///
    /// Copying stops at the end of `name` or at its first NUL, whichever
    /// comes first. Characters are not checked here; see
    /// [`verify`](DeviceName::verify).
    ///
    /// # Errors
    ///
    /// Returns [`NameError::TooLong`] if the name leaves no room for the
    /// terminator.
    pub fn new(name: impl AsRef<str>) -> Result<Self, NameError> {
        let bytes = name.as_ref().as_bytes();
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());

        if len >= N {
            return Err(NameError::TooLong { max: N.saturating_sub(1) });
        }

        let mut buf = [0; N];
        buf[..len].copy_from_slice(&bytes[..len]);

        Ok(Self(buf))
    }

    /// Wraps raw bytes without checking them.
    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Checks the name against the allowed character set and capacity.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::IllegalCharacter`] for the first byte outside the
    /// allowed set, or [`NameError::TooLong`] if no terminator is found.
    pub fn verify(&self) -> Result<(), NameError> {
        for (index, &byte) in self.0.iter().enumerate() {
            if byte == 0 {
                return Ok(());
            }
            if !is_legal(byte) {
                return Err(NameError::IllegalCharacter { index, byte });
            }
        }

        Err(NameError::TooLong { max: N.saturating_sub(1) })
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// The bytes before the first terminator.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..len]
    }

    /// The name as a string slice, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    /// The raw buffer, including whatever follows the terminator.
    pub const fn raw(&self) -> &[u8; N] {
        &self.0
    }
}

fn is_legal(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b' ' | b'_' | b'-')
}

impl<const N: usize> Default for DeviceName<N> {
    fn default() -> Self {
        let mut buf = [0; N];
        let len = DEFAULT_DEVICE_NAME.len().min(N.saturating_sub(1));
        buf[..len].copy_from_slice(&DEFAULT_DEVICE_NAME.as_bytes()[..len]);
        Self(buf)
    }
}

impl<const N: usize> TryFrom<&str> for DeviceName<N> {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, NameError> {
        Self::new(value)
    }
}

impl<const N: usize> fmt::Debug for DeviceName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceName")
            .field(&alloc::string::String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

impl<const N: usize> fmt::Display for DeviceName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&alloc::string::String::from_utf8_lossy(self.as_bytes()))
    }
}

impl<const N: usize> Encode for DeviceName<N> {
    fn size(&self) -> usize {
        N
    }

    fn encode(&self, data: &mut [u8]) {
        data[..N].copy_from_slice(&self.0);
    }
}

impl<const N: usize> Decode for DeviceName<N> {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self(<[u8; N]>::decode(data)?))
    }
}

#[cfg(feature = "serde")]
impl<const N: usize> serde::Serialize for DeviceName<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let name = self
            .as_str()
            .ok_or_else(|| serde::ser::Error::custom("device name is not valid UTF-8"))?;
        serializer.serialize_str(name)
    }
}

#[cfg(feature = "serde")]
impl<'de, const N: usize> serde::Deserialize<'de> for DeviceName<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = <alloc::string::String as serde::Deserialize>::deserialize(deserializer)?;
        Self::new(name).map_err(serde::de::Error::custom)
    }
}

/// Returned when a [`DeviceName`] is rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    #[error(
        "Illegal character {byte:#04x} at index {index}. Names are limited to 0-9, a-z, A-Z, ' ', '_', '-'."
    )]
    IllegalCharacter { index: usize, byte: u8 },

    #[error("Device name is too long (max {max} characters).")]
    TooLong { max: usize },
}
