//! Address vectors.

use serde::{Deserialize, Serialize};

use super::gid::Gid;
use super::type_alias::*;

/// Static rate of a path through the fabric.
///
/// The discriminants are the encodings used by the subnet administration
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum IbRate {
    /// 2.5 Gb/s, the baseline rate every link supports.
    #[default]
    #[serde(rename = "2.5")]
    Rate2_5 = 2,
    /// 10 Gb/s.
    #[serde(rename = "10")]
    Rate10 = 3,
    /// 30 Gb/s.
    #[serde(rename = "30")]
    Rate30 = 4,
    /// 5 Gb/s.
    #[serde(rename = "5")]
    Rate5 = 5,
    /// 20 Gb/s.
    #[serde(rename = "20")]
    Rate20 = 6,
    /// 40 Gb/s.
    #[serde(rename = "40")]
    Rate40 = 7,
    /// 60 Gb/s.
    #[serde(rename = "60")]
    Rate60 = 8,
    /// 80 Gb/s.
    #[serde(rename = "80")]
    Rate80 = 9,
    /// 120 Gb/s.
    #[serde(rename = "120")]
    Rate120 = 10,
}

impl IbRate {
    /// Get the rate in Gb/s.
    pub fn gbps(self) -> f32 {
        match self {
            IbRate::Rate2_5 => 2.5,
            IbRate::Rate10 => 10.0,
            IbRate::Rate30 => 30.0,
            IbRate::Rate5 => 5.0,
            IbRate::Rate20 => 20.0,
            IbRate::Rate40 => 40.0,
            IbRate::Rate60 => 60.0,
            IbRate::Rate80 => 80.0,
            IbRate::Rate120 => 120.0,
        }
    }
}

impl From<IbRate> for u8 {
    #[inline]
    fn from(rate: IbRate) -> Self {
        rate as _
    }
}

/// Destination of a datagram send, or the origin of a received datagram.
///
/// `qkey` and `rate` are optional: a send that leaves them unset gets the
/// queue pair's queue key and the baseline rate filled into a private copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressVector {
    /// Destination queue pair number.
    pub qpn: Qpn,

    /// Queue key.
    pub qkey: Option<QKey>,

    /// Destination LID.
    pub lid: Lid,

    /// Static rate.
    pub rate: Option<IbRate>,

    /// Service level.
    pub sl: ServiceLevel,

    /// Destination GID, if the packet carries a global route header.
    pub gid: Option<Gid>,
}

impl AddressVector {
    /// Create an address vector for the given queue pair behind the given LID.
    pub fn new(qpn: Qpn, lid: Lid) -> Self {
        Self {
            qpn,
            lid,
            ..Default::default()
        }
    }

    /// Produce a copy with unset optional fields filled from the defaults.
    #[must_use]
    pub fn with_defaults(&self, qkey: QKey, rate: IbRate) -> Self {
        Self {
            qkey: Some(self.qkey.unwrap_or(qkey)),
            rate: Some(self.rate.unwrap_or(rate)),
            ..*self
        }
    }
}
