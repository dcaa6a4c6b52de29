//! The Infiniband core prelude.
//!
//! The purpose of this module is to alleviate imports of the types used by
//! both hardware drivers and upper layers.

pub use crate::config::IbConfig;
pub use crate::error::{IbError, PostError, RegisterError};
pub use crate::ib::av::{AddressVector, IbRate};
pub use crate::ib::cq::{CompletionOps, CqHandle};
pub use crate::ib::device::{DeviceContext, IbDevice};
pub use crate::ib::gid::Gid;
pub use crate::ib::iobuf::IoBuffer;
pub use crate::ib::ops::{DeviceOps, Mad};
pub use crate::ib::qp::{QpHandle, QpType, QueuePair, WqKind};
pub use crate::ib::registry::{DeviceKey, Registry};
pub use crate::ib::type_alias::*;
pub use crate::process::{EqPoller, Process, Scheduler};
