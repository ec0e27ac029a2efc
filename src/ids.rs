//! Generational node handle (slotmap-style).
//! u64 layout: low 32 bits = slot index (0 = nil, 1.. = slot), high 32 bits =
//! generation. Handles are created only by the owning [`NodeArena`]; slot
//! reuse bumps the generation so stale handles no longer match.
//!
//! [`NodeArena`]: crate::arena::NodeArena

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Node handle — allocated by `NodeArena`. Index + generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    #[inline]
    pub fn nil() -> Self {
        Self(0)
    }

    #[inline]
    pub fn index(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn from_parts(index: u32, generation: u32) -> Self {
        Self((index as u64) | ((generation as u64) << 32))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}:{})", self.index(), self.generation())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index(), self.generation())
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:016x}", self.0))
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = NodeId;
            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("hex string (8 or 16 chars) or u64")
            }
            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                let s = v.strip_prefix("0x").unwrap_or(v);
                if s.len() <= 8 {
                    u32::from_str_radix(s, 16)
                        .map(|u| NodeId::from_parts(u, 0))
                        .map_err(E::custom)
                } else {
                    u64::from_str_radix(s, 16)
                        .map(NodeId::from_u64)
                        .map_err(E::custom)
                }
            }
            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(NodeId::from_u64(v))
            }
        }
        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_nil() {
        assert!(NodeId::nil().is_nil());
        assert_eq!(NodeId::nil().index(), 0);
        assert_eq!(NodeId::nil().generation(), 0);
        assert_eq!(NodeId::default(), NodeId::nil());
    }

    #[test]
    fn node_id_parts() {
        let id = NodeId::from_parts(5, 2);
        assert_eq!(id.index(), 5);
        assert_eq!(id.generation(), 2);
        assert!(!id.is_nil());
    }

    #[test]
    fn node_id_roundtrip_u64() {
        let id = NodeId::from_parts(1, 1);
        assert_eq!(NodeId::from_u64(id.as_u64()), id);
    }

    #[test]
    fn node_id_serde_hex_roundtrip() {
        let id = NodeId::from_parts(42, 7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{:016x}\"", id.as_u64()));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn node_id_deserializes_short_hex() {
        let back: NodeId = serde_json::from_str("\"2a\"").unwrap();
        assert_eq!(back, NodeId::from_parts(42, 0));
    }
}
