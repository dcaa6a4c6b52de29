//! Global identifiers.

use std::fmt;
use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

/// An 128-bit identifier used to identify a port on a channel adapter, a port
/// on a router, or a multicast group.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Gid([u8; 16]);

/// One 64-bit half of a [`Gid`]: either the subnet prefix or the interface GUID.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GidHalf(pub [u8; 8]);

impl Gid {
    /// Build a GID from a subnet prefix and an interface GUID.
    #[inline]
    pub fn new(prefix: GidHalf, guid: GidHalf) -> Self {
        let mut raw = [0; 16];
        raw[..8].copy_from_slice(&prefix.0);
        raw[8..].copy_from_slice(&guid.0);
        Self(raw)
    }

    /// Get the subnet prefix half.
    #[inline]
    pub fn prefix(&self) -> GidHalf {
        let mut half = [0; 8];
        half.copy_from_slice(&self.0[..8]);
        GidHalf(half)
    }

    /// Get the interface GUID half.
    #[inline]
    pub fn guid(&self) -> GidHalf {
        let mut half = [0; 8];
        half.copy_from_slice(&self.0[8..]);
        GidHalf(half)
    }

    /// Determine whether this is a multicast GID.
    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.0[0] == 0xff
    }

    /// View the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Gid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gid = Ipv6Addr::from(*self);
        f.debug_tuple("Gid").field(&gid.to_string()).finish()
    }
}

impl fmt::Display for Gid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Ipv6Addr::from(*self), f)
    }
}

impl fmt::Debug for GidHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GidHalf({:016x})", u64::from_be_bytes(self.0))
    }
}

impl From<Ipv6Addr> for Gid {
    #[inline]
    fn from(addr: Ipv6Addr) -> Self {
        Self(addr.octets())
    }
}

impl From<Gid> for Ipv6Addr {
    #[inline]
    fn from(gid: Gid) -> Self {
        Ipv6Addr::from(gid.0)
    }
}

impl From<[u8; 16]> for Gid {
    #[inline]
    fn from(raw: [u8; 16]) -> Self {
        Self(raw)
    }
}

impl From<Gid> for [u8; 16] {
    #[inline]
    fn from(gid: Gid) -> Self {
        gid.0
    }
}

impl Serialize for Gid {
    #[inline]
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        <[u8; 16] as Serialize>::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Gid {
    #[inline]
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <[u8; 16] as Deserialize<'de>>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves() {
        let prefix = GidHalf([0xfe, 0x80, 0, 0, 0, 0, 0, 0]);
        let guid = GidHalf([0, 2, 0xc9, 3, 0, 1, 2, 3]);
        let gid = Gid::new(prefix, guid);
        assert_eq!(gid.prefix(), prefix);
        assert_eq!(gid.guid(), guid);
        assert!(!gid.is_multicast());
        assert_eq!(gid.to_string(), "fe80::2:c903:1:203");
    }

    #[test]
    fn multicast() {
        let gid = Gid::from("ff12:401b:ffff::ffff:ffff".parse::<Ipv6Addr>().unwrap());
        assert!(gid.is_multicast());
    }

    #[test]
    fn test_repr() {
        use std::mem::*;
        assert_eq!(size_of::<Gid>(), 16);
        assert_eq!(align_of::<Gid>(), 1);
    }
}
