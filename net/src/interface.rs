// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel network interface names and indexes.

use std::fmt::{Display, Formatter};
use std::num::NonZero;

/// A legal linux network interface name.
///
/// The kernel accepts at most [`InterfaceName::MAX_LEN`] bytes (`IFNAMSIZ` minus the null
/// terminator), refuses `.` and `..`, and refuses `/`, `:` and whitespace anywhere in the name.
/// We additionally require ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

/// Errors which can occur when validating an [`InterfaceName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    /// Empty names are not legal
    #[error("interface name may not be empty")]
    Empty,
    /// Name is longer than the kernel allows
    #[error("interface name '{0}' is longer than {max} bytes", max = InterfaceName::MAX_LEN)]
    TooLong(String),
    /// Name contains a character the kernel refuses
    #[error("interface name '{0}' contains an illegal character")]
    IllegalCharacter(String),
    /// `.` and `..`
    #[error("interface name '{0}' is reserved")]
    Reserved(String),
}

impl InterfaceName {
    /// The maximum length (in bytes) of a legal interface name.
    pub const MAX_LEN: usize = 15;

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if value.len() > InterfaceName::MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(value));
        }
        if value == "." || value == ".." {
            return Err(IllegalInterfaceName::Reserved(value));
        }
        if value
            .chars()
            .any(|c| !c.is_ascii() || c.is_ascii_whitespace() || c == '/' || c == ':')
        {
            return Err(IllegalInterfaceName::IllegalCharacter(value));
        }
        Ok(InterfaceName(value))
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        InterfaceName::try_from(value.to_string())
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A kernel interface index (`ifindex`).  Zero is never a valid index.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct InterfaceIndex(NonZero<u32>);

/// Zero is not a legal [`InterfaceIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("zero is not a legal interface index")]
pub struct InvalidInterfaceIndex;

impl InterfaceIndex {
    /// Validate a raw `ifindex`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInterfaceIndex`] if `index` is zero.
    pub fn try_new(index: u32) -> Result<Self, InvalidInterfaceIndex> {
        NonZero::new(index)
            .map(InterfaceIndex)
            .ok_or(InvalidInterfaceIndex)
    }

    /// The raw index.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for InterfaceIndex {
    type Error = InvalidInterfaceIndex;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        InterfaceIndex::try_new(value)
    }
}

impl From<InterfaceIndex> for u32 {
    fn from(value: InterfaceIndex) -> Self {
        value.to_u32()
    }
}

impl Display for InterfaceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
