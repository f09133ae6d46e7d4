//! Element kinds a colony can hold
//!
//! A colony stores fixed-width elements of exactly one kind, chosen at
//! creation. Typed callers go through the [`Element`] trait; the command line
//! and other dynamic callers go through [`Item`].

use crate::error::{ColonyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element kind tag, persisted in the colony record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Int = 1,
    #[serde(rename = "ref")]
    ObjectRef = 2,
}

impl ElementKind {
    /// Width of one element in bytes
    pub const fn size(self) -> u64 {
        match self {
            ElementKind::Int => 4,
            ElementKind::ObjectRef => 16,
        }
    }

    pub const fn tag(self) -> u64 {
        self as u64
    }

    pub fn from_tag(tag: u64) -> Result<Self> {
        match tag {
            1 => Ok(ElementKind::Int),
            2 => Ok(ElementKind::ObjectRef),
            other => Err(ColonyError::Corrupted(format!(
                "unknown element kind tag {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Int => write!(f, "int"),
            ElementKind::ObjectRef => write!(f, "ref"),
        }
    }
}

impl FromStr for ElementKind {
    type Err = ColonyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(ElementKind::Int),
            "ref" | "PMEMoid" => Ok(ElementKind::ObjectRef),
            other => Err(ColonyError::UnknownElementKind(other.to_string())),
        }
    }
}

/// Persistent reference to an object in some pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    pub pool_uuid_lo: u64,
    pub off: u64,
}

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef {
        pool_uuid_lo: 0,
        off: 0,
    };

    pub fn new(pool_uuid_lo: u64, off: u64) -> Self {
        ObjectRef { pool_uuid_lo, off }
    }

    pub fn is_null(&self) -> bool {
        self.off == 0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uuid: {}\t\toff: {}", self.pool_uuid_lo, self.off)
    }
}

/// A fixed-width value that can live in a colony slot
pub trait Element: Copy + Sized {
    const KIND: ElementKind;

    /// Write the value into exactly `KIND.size()` bytes
    fn encode(&self, out: &mut [u8]);

    /// Read a value from exactly `KIND.size()` bytes
    fn decode(bytes: &[u8]) -> Self;

    fn into_item(self) -> Item;
}

impl Element for i32 {
    const KIND: ElementKind = ElementKind::Int;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        i32::from_le_bytes(raw)
    }

    fn into_item(self) -> Item {
        Item::Int(self)
    }
}

impl Element for ObjectRef {
    const KIND: ElementKind = ElementKind::ObjectRef;

    fn encode(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.pool_uuid_lo.to_le_bytes());
        out[8..16].copy_from_slice(&self.off.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        let pool_uuid_lo = u64::from_le_bytes(word);
        word.copy_from_slice(&bytes[8..16]);
        ObjectRef {
            pool_uuid_lo,
            off: u64::from_le_bytes(word),
        }
    }

    fn into_item(self) -> Item {
        Item::Ref(self)
    }
}

/// An element of either kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Int(i32),
    Ref(ObjectRef),
}

impl Item {
    pub fn kind(&self) -> ElementKind {
        match self {
            Item::Int(_) => ElementKind::Int,
            Item::Ref(_) => ElementKind::ObjectRef,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        match self {
            Item::Int(v) => v.encode(out),
            Item::Ref(r) => r.encode(out),
        }
    }

    pub fn decode(kind: ElementKind, bytes: &[u8]) -> Self {
        match kind {
            ElementKind::Int => Item::Int(i32::decode(bytes)),
            ElementKind::ObjectRef => Item::Ref(ObjectRef::decode(bytes)),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Item::Int(v) => Some(*v),
            Item::Ref(_) => None,
        }
    }

    pub fn as_object_ref(&self) -> Option<ObjectRef> {
        match self {
            Item::Ref(r) => Some(*r),
            Item::Int(_) => None,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Int(v) => write!(f, "item: {}", v),
            Item::Ref(r) => write!(f, "{}", r),
        }
    }
}
