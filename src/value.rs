//! Registry-typed values a policy entry can hold.
//!
//! Policy files carry Windows registry data. The type code travels with
//! the raw bytes; the parser decodes the common types and keeps the rest
//! as opaque binary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry value types and their on-disk type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
#[allow(missing_docs)]
pub enum RegType {
    None = 0,
    Sz = 1,
    ExpandSz = 2,
    Binary = 3,
    Dword = 4,
    DwordBigEndian = 5,
    Link = 6,
    MultiSz = 7,
    Qword = 11,
}

impl RegType {
    /// Maps an on-disk type code. Unknown codes are `None`.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Sz),
            2 => Some(Self::ExpandSz),
            3 => Some(Self::Binary),
            4 => Some(Self::Dword),
            5 => Some(Self::DwordBigEndian),
            6 => Some(Self::Link),
            7 => Some(Self::MultiSz),
            11 => Some(Self::Qword),
            _ => None,
        }
    }

    /// Numeric registry type code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// A decoded registry value.
///
/// # Examples
///
/// ```
/// use gpoa::PolicyValue;
///
/// let enabled = PolicyValue::Dword(1);
/// assert_eq!(enabled.as_u64(), Some(1));
/// assert!(PolicyValue::String("sshd.service".into()).as_str().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum PolicyValue {
    String(String),
    ExpandString(String),
    Link(String),
    MultiString(Vec<String>),
    Dword(u32),
    DwordBigEndian(u32),
    Qword(u64),
    Binary(Vec<u8>),
    None,
}

impl PolicyValue {
    /// Registry type this value is encoded as.
    #[must_use]
    pub const fn reg_type(&self) -> RegType {
        match self {
            Self::String(_) => RegType::Sz,
            Self::ExpandString(_) => RegType::ExpandSz,
            Self::Link(_) => RegType::Link,
            Self::MultiString(_) => RegType::MultiSz,
            Self::Dword(_) => RegType::Dword,
            Self::DwordBigEndian(_) => RegType::DwordBigEndian,
            Self::Qword(_) => RegType::Qword,
            Self::Binary(_) => RegType::Binary,
            Self::None => RegType::None,
        }
    }

    /// String payload of string-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::ExpandString(v) | Self::Link(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric payload of DWORD and QWORD values.
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Dword(v) | Self::DwordBigEndian(v) => Some(*v as u64),
            Self::Qword(v) => Some(*v),
            _ => None,
        }
    }

    /// Items of a multi-string value.
    pub fn as_multi(&self) -> Option<&[String]> {
        match self {
            Self::MultiString(v) => Some(v),
            _ => None,
        }
    }

    /// True for `REG_NONE`.
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) | Self::ExpandString(v) | Self::Link(v) => write!(f, "{v}"),
            Self::MultiString(v) => write!(f, "[{}]", v.join(", ")),
            Self::Dword(v) | Self::DwordBigEndian(v) => write!(f, "{v}"),
            Self::Qword(v) => write!(f, "{v}"),
            Self::Binary(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::None => write!(f, "<none>"),
        }
    }
}
