use crate::ib::type_alias::*;

/// Queue pair type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QpType {
    /// Subnet management interface. Externally visible as QP0.
    Smi,

    /// General services interface. Externally visible as QP1.
    Gsi,

    /// Unreliable datagram.
    Ud,
}

impl QpType {
    /// Determine whether the QP type is one of the two management types.
    pub const fn is_management(self) -> bool {
        matches!(self, Self::Smi | Self::Gsi)
    }

    /// Get the externally visible queue pair number for a queue pair of this
    /// type that the hardware numbered `qpn`.
    ///
    /// Management queue pairs answer to fixed well-known numbers whatever
    /// the hardware assigned; every other type keeps its own number.
    pub const fn ext_qpn(self, qpn: Qpn) -> Qpn {
        match self {
            Self::Smi => QPN_SMI,
            Self::Gsi => QPN_GSI,
            Self::Ud => qpn,
        }
    }

    /// Get the queue key conventionally used by queue pairs of this type.
    pub const fn default_qkey(self) -> QKey {
        match self {
            Self::Smi => QKEY_SMI,
            Self::Gsi => QKEY_GSI,
            Self::Ud => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn management_qpns_are_fixed() {
        for qpn in [0x48, 0x49, 0xffffff] {
            assert_eq!(QpType::Smi.ext_qpn(qpn), QPN_SMI);
            assert_eq!(QpType::Gsi.ext_qpn(qpn), QPN_GSI);
            assert_eq!(QpType::Ud.ext_qpn(qpn), qpn);
        }
    }

    #[test]
    fn qkeys() {
        assert_eq!(QpType::Gsi.default_qkey(), 0x8001_0000);
        assert!(QpType::Smi.is_management());
        assert!(!QpType::Ud.is_management());
    }
}
