//! Registered Infiniband devices.
//!
//! The registry exclusively owns every registered [`IbDevice`]; everyone else
//! holds a [`DeviceKey`]. It also stands between the devices and the network
//! binding stacked on top of them.

mod finder;

use std::fmt;

use slab::Slab;

pub use self::finder::*;
use crate::error::{RegisterError, Result};
use crate::ib::device::IbDevice;
use crate::ib::gid::GidHalf;

/// Key of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey(usize);

/// Network-device binding stacked on registered devices (e.g., IP over
/// Infiniband).
pub trait NetBinding {
    /// A device was registered. A failure aborts the registration.
    fn probe(&mut self, key: DeviceKey, dev: &mut IbDevice) -> Result<()>;

    /// A device is about to be unregistered.
    fn remove(&mut self, key: DeviceKey, dev: &mut IbDevice);

    /// The link state of a device changed.
    fn link_state_changed(&mut self, key: DeviceKey, dev: &mut IbDevice);
}

/// Binding that accepts every device and ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBinding;

impl NetBinding for NoBinding {
    fn probe(&mut self, _key: DeviceKey, _dev: &mut IbDevice) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, _key: DeviceKey, _dev: &mut IbDevice) {}

    fn link_state_changed(&mut self, _key: DeviceKey, _dev: &mut IbDevice) {}
}

/// Host channel adapter information, aggregated over the registered ports of
/// one physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HcaInfo {
    /// Node GUID, taken from the first registered port's GID.
    pub node_guid: GidHalf,

    /// Number of registered ports.
    pub num_ports: usize,
}

/// Registry of Infiniband devices.
pub struct Registry {
    devices: Slab<IbDevice>,
    order: Vec<DeviceKey>,
    binding: Box<dyn NetBinding>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|(_, dev)| dev)).finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry without a network binding.
    pub fn new() -> Self {
        Self::with_binding(Box::new(NoBinding))
    }

    /// Create an empty registry notifying `binding`.
    pub fn with_binding(binding: Box<dyn NetBinding>) -> Self {
        Self {
            devices: Slab::new(),
            order: Vec::new(),
            binding,
        }
    }

    /// Create a device finder.
    #[inline]
    pub fn finder() -> DeviceFinder {
        DeviceFinder::new()
    }

    /// Register a device and probe the network binding on it.
    ///
    /// If the binding refuses the device, it is unregistered and handed back
    /// inside the [`RegisterError`].
    pub fn register(&mut self, dev: IbDevice) -> Result<DeviceKey, RegisterError> {
        let key = DeviceKey(self.devices.insert(dev));
        self.order.push(key);

        let dev = &mut self.devices[key.0];
        if let Err(e) = self.binding.probe(key, dev) {
            log::debug!("IBDEV {} could not probe network binding: {}", dev.name(), e);
            self.order.pop();
            let dev = self.devices.remove(key.0);
            return Err(RegisterError::new(e, dev));
        }

        log::debug!("IBDEV {} registered", dev.name());
        Ok(key)
    }

    /// Remove the network binding from a device and unregister it, handing
    /// the device back.
    pub fn unregister(&mut self, key: DeviceKey) -> Option<IbDevice> {
        let dev = self.devices.get_mut(key.0)?;
        self.binding.remove(key, dev);
        self.order.retain(|&registered| registered != key);

        let dev = self.devices.remove(key.0);
        log::debug!("IBDEV {} unregistered", dev.name());
        Some(dev)
    }

    /// Get a registered device.
    #[inline]
    pub fn get(&self, key: DeviceKey) -> Option<&IbDevice> {
        self.devices.get(key.0)
    }

    /// Get a registered device mutably.
    #[inline]
    pub fn get_mut(&mut self, key: DeviceKey) -> Option<&mut IbDevice> {
        self.devices.get_mut(key.0)
    }

    /// Get the number of registered devices.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Determine whether no device is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate over the registered devices, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceKey, &IbDevice)> + '_ {
        self.order.iter().map(|&key| (key, &self.devices[key.0]))
    }

    /// Find a registered device by its `phys:port` name.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceKey> {
        self.iter()
            .find(|(_, dev)| dev.name() == name)
            .map(|(key, _)| key)
    }

    /// Aggregate the host channel adapter information of the physical device
    /// that `key` belongs to.
    pub fn hca_info(&self, key: DeviceKey) -> Option<HcaInfo> {
        let phys = self.get(key)?.phys();
        let mut ports = self
            .iter()
            .map(|(_, dev)| dev)
            .filter(|dev| dev.phys() == phys);

        let first = ports.next()?;
        Some(HcaInfo {
            node_guid: first.gid().guid(),
            num_ports: 1 + ports.count(),
        })
    }

    /// Poll every registered device once: its event queue first, forwarding
    /// link state changes to the network binding, then its completion queues.
    pub fn poll_all(&mut self) {
        for i in 0..self.order.len() {
            let key = self.order[i];
            let dev = &mut self.devices[key.0];
            if dev.poll_events() {
                log::debug!(
                    "IBDEV {} link is {}",
                    dev.name(),
                    if dev.link_up() { "up" } else { "down" }
                );
                self.binding.link_state_changed(key, dev);
            }
            dev.poll_cqs();
        }
    }
}
