//! Infiniband core functionalities.

pub mod av;
pub mod cq;
pub mod device;
pub mod gid;
pub mod iobuf;
mod mcast;
pub mod mi;
pub mod ops;
pub mod qp;
pub mod registry;
pub mod type_alias;
