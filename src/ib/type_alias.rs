/// [`u16`]: **Local identifier (LID)**, identifies a port on a switch or an HCA in the subnet.
pub type Lid = u16;

/// [`u16`]: **Partition key**, identifies the partition a port belongs to.
pub type PKey = u16;

/// [`u8`]: **Port number**, identifies a port on an HCA.
pub type PortNum = u8;

/// [`u8`]: **Service level**, selects a virtual lane on the path.
pub type ServiceLevel = u8;

/// [`u32`]: **Queue pair number**, identifies a queue pair on a device.
pub type Qpn = u32;

/// [`u32`]: **Completion queue number**, identifies a completion queue on a device.
pub type Cqn = u32;

/// [`u32`]: **Packet sequence number (PSN)**, 24 bits wide on the wire.
pub type Psn = u32;

/// [`u32`]: **Queue key**, authorizes datagram delivery to a queue pair.
pub type QKey = u32;

/// Queue pair number of the subnet management interface.
pub const QPN_SMI: Qpn = 0;

/// Queue pair number of the general services interface.
pub const QPN_GSI: Qpn = 1;

/// Queue key of the subnet management interface.
pub const QKEY_SMI: QKey = 0;

/// Well-known queue key of the general services interface.
pub const QKEY_GSI: QKey = 0x8001_0000;

/// LID value of a port that has not been assigned one.
pub const LID_NONE: Lid = 0xffff;

/// Partition key value of a port whose partition is not yet known.
pub const PKEY_NONE: PKey = 0x0000;

/// Largest payload a single work request can carry.
pub const MAX_PAYLOAD_SIZE: usize = 2048;

/// Mask of the significant bits of a packet sequence number.
pub const PSN_MASK: Psn = 0xff_ffff;
