//! A device-independent Infiniband core, sitting between hardware drivers
//! and the management and network layers stacked on top of them.
//!
//! Hardware drivers implement [`DeviceOps`] once per adapter family. The
//! core owns everything built on a port: completion queues ([`CqHandle`]),
//! queue pairs with their send and receive work queues ([`QpHandle`]),
//! multicast memberships, and the open/close lifecycle of the port with its
//! management interfaces. Devices live in a [`Registry`], which is polled
//! from a cooperative [`process::Scheduler`] through [`process::EqPoller`].
//!
//! All objects are owned by their device and referred to by handles, and
//! the whole core is single-threaded: nothing blocks, and a full work queue
//! is reported immediately as [`IbError::NoBuffers`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ibcore::*;
//!
//! let mut dev = IbDevice::new("mlx4_0", 1, Box::new(MyDriver::new()));
//! dev.open()?;
//!
//! let cq = dev.create_cq(16, None)?;
//! let qp = dev.create_qp(QpType::Ud, 8, cq, 8, cq)?;
//! dev.modify_qp(qp)?;
//! dev.refill_recv(qp);
//!
//! let mut av = AddressVector::new(0x48, 0x1);
//! av.qkey = Some(0x11111111);
//! dev.post_send(qp, Some(&av), IoBuffer::from_slice(b"hello")?)?;
//! ```
//!
//! ## Warning
//!
//! **The interfaces are unstable and up to change!**

mod ib;
pub use ib::av::{AddressVector, IbRate};
pub use ib::cq::{CompletionOps, CompletionQueue, CqHandle};
pub use ib::device::{DeviceContext, IbDevice};
pub use ib::gid::{Gid, GidHalf};
pub use ib::iobuf::IoBuffer;
pub use ib::mi::{BasicManagement, ManagementInterface, ManagementLayer, MiHandle};
pub use ib::ops::{DeviceOps, Mad, MAD_SIZE};
pub use ib::qp::{QpHandle, QpType, QueuePair, WorkQueue, WqHandle, WqKind};
pub use ib::registry::{DeviceFinder, DeviceKey, HcaInfo, NetBinding, NoBinding, Registry};
pub use ib::type_alias;

pub mod config;
pub use config::{ConfigError, IbConfig, MiConfig};

pub mod error;
pub use error::{IbError, PostError, RegisterError, Result};

pub mod process;

pub mod prelude;

mod utils;
