// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN validation.

use core::num::NonZero;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A VLAN Identifier.
///
/// Zero is not representable: a VF without a VLAN tag is expressed as `Option::<Vid>::None`,
/// which keeps the "clear the tag" case distinct from a configured tag.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Vid(NonZero<u16>);

/// Errors which can occur when converting a `u16` to a validated [`Vid`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[must_use]
pub enum InvalidVid {
    /// 0 is a reserved [`Vid`] which basically means "the native vlan."
    #[error("Zero is a reserved Vid")]
    Zero,
    /// 4095 is a reserved [`Vid`] under IEEE 802.1Q.
    #[error("4095 is a reserved Vid")]
    Reserved,
    /// The value is too large to be a legal [`Vid`] (12-bit max).
    #[error("{0} is too large to be a legal Vid ({MAX} is max legal value)", MAX = Vid::MAX)]
    TooLarge(u16),
}

impl InvalidVid {
    /// The raw `u16` value of the reserved (4095) [`Vid`]
    pub const RESERVED: u16 = 4095;
}

impl Vid {
    /// The maximum legal [`Vid`] value (2^12 - 2).
    pub const MAX: u16 = 4094;

    /// Create a new [`Vid`] from a `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is 0, 4095 (reserved), or greater than [`Vid::MAX`].
    #[tracing::instrument(level = "trace")]
    pub fn new(vid: u16) -> Result<Self, InvalidVid> {
        match NonZero::new(vid) {
            None => Err(InvalidVid::Zero),
            Some(val) if val.get() == InvalidVid::RESERVED => Err(InvalidVid::Reserved),
            Some(val) if val.get() > InvalidVid::RESERVED => Err(InvalidVid::TooLarge(val.get())),
            Some(val) => Ok(Vid(val)),
        }
    }

    /// Get the value of the [`Vid`] as a `u16`.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0.get()
    }
}

impl TryFrom<u16> for Vid {
    type Error = InvalidVid;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Vid::new(value)
    }
}

impl From<Vid> for u16 {
    fn from(value: Vid) -> Self {
        value.as_u16()
    }
}

/// Errors which can occur when parsing a [`Vid`] from text (CNI args, annotations).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VidParseError {
    /// Not a number.
    #[error("'{0}' is not a vlan id")]
    NotANumber(String),
    /// A number, but not a legal [`Vid`].
    #[error(transparent)]
    Invalid(#[from] InvalidVid),
}

impl FromStr for Vid {
    type Err = VidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<u16>()
            .map_err(|_| VidParseError::NotANumber(s.to_string()))?;
        Ok(Vid::new(raw)?)
    }
}

impl Display for Vid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// A VLAN setting as written in text, where `0` asks for untagged traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VlanTag {
    /// Clear any tag.
    Untagged,
    /// Tag with this [`Vid`].
    Tagged(Vid),
}

impl VlanTag {
    /// The [`Vid`] to program, `None` for untagged.
    #[must_use]
    pub fn vid(self) -> Option<Vid> {
        match self {
            VlanTag::Untagged => None,
            VlanTag::Tagged(vid) => Some(vid),
        }
    }
}

impl TryFrom<u16> for VlanTag {
    type Error = InvalidVid;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VlanTag::Untagged),
            raw => Vid::new(raw).map(VlanTag::Tagged),
        }
    }
}

impl FromStr for VlanTag {
    type Err = VidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<u16>()
            .map_err(|_| VidParseError::NotANumber(s.to_string()))?;
        Ok(VlanTag::try_from(raw)?)
    }
}

impl Display for VlanTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VlanTag::Untagged => write!(f, "untagged"),
            VlanTag::Tagged(vid) => write!(f, "{vid}"),
        }
    }
}
