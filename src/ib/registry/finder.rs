use regex::Regex;

use super::{DeviceKey, Registry};
use crate::ib::device::IbDevice;
use crate::ib::type_alias::PortNum;

/// Registered device finder.
pub struct DeviceFinder {
    /// Physical device name filters (match any).
    phys_names: Vec<Regex>,

    /// Port number filter (match any).
    port_nums: Vec<PortNum>,

    /// Link state filter.
    link_up: Option<bool>,

    /// Open state filter.
    open: Option<bool>,
}

impl DeviceFinder {
    /// Determine whether the current filter matches the specified device.
    fn is_eligible(&self, dev: &IbDevice) -> bool {
        // Short-circuit evaluation.
        (
            // Physical device name.
            self.phys_names.is_empty() || self.phys_names.iter().any(|re| re.is_match(dev.phys()))
        ) && (
            // Port number.
            self.port_nums.is_empty() || self.port_nums.contains(&dev.port())
        ) && (
            // Link state.
            self.link_up.map_or(true, |up| up == dev.link_up())
        ) && (
            // Open state.
            self.open.map_or(true, |open| open == dev.is_open())
        )
    }
}

impl DeviceFinder {
    /// Create a new finder that matches any registered device.
    pub fn new() -> Self {
        Self {
            phys_names: Vec::new(),
            port_nums: Vec::new(),
            link_up: None,
            open: None,
        }
    }

    /// Set a physical device name filter.
    /// Permit only devices whose physical name matches *any* of the filters.
    ///
    /// Regular expressions are supported.
    ///
    /// # Panic
    ///
    /// Panics if `name` is not a valid regular expression.
    #[inline]
    pub fn phys_name(mut self, name: impl AsRef<str>) -> Self {
        self.phys_names
            .push(Regex::new(name.as_ref()).expect("invalid regex pattern"));
        self
    }

    /// Set a port number filter.
    /// Permit only ports with *any* of the specified port numbers.
    ///
    /// # Panic
    ///
    /// Panics if `num` is 0.
    #[inline]
    pub fn port_num(mut self, num: PortNum) -> Self {
        assert!(num > 0, "port number must be positive");
        self.port_nums.push(num);
        self
    }

    /// Permit only ports whose link is up (`true`) or down (`false`).
    ///
    /// This will override the previous link state filter, if any.
    #[inline]
    pub fn link_up(mut self, up: bool) -> Self {
        self.link_up = Some(up);
        self
    }

    /// Permit only devices that are open (`true`) or closed (`false`).
    ///
    /// This will override the previous open state filter, if any.
    #[inline]
    pub fn open(mut self, open: bool) -> Self {
        self.open = Some(open);
        self
    }

    /// Find the first eligible device, in registration order.
    #[inline]
    pub fn find(&self, registry: &Registry) -> Option<DeviceKey> {
        self.find_nth(registry, 0)
    }

    /// Find the `n`-th eligible device, in registration order.
    /// Start counting from 0.
    pub fn find_nth(&self, registry: &Registry, n: usize) -> Option<DeviceKey> {
        self.find_all(registry).nth(n)
    }

    /// Iterate over every eligible device, in registration order.
    pub fn find_all<'a>(&'a self, registry: &'a Registry) -> impl Iterator<Item = DeviceKey> + 'a {
        registry
            .iter()
            .filter(|(_, dev)| self.is_eligible(dev))
            .map(|(key, _)| key)
    }
}

impl Default for DeviceFinder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
