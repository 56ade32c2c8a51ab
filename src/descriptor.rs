//! Known-device descriptors and the detection hook used to hand a discovered
//! device over to protocol-specific code (debug ports, flash controllers and
//! the like).  The match data is kept separate from the behavior so a
//! registry can be exercised without hardware.

use crate::chain::{ScanChain, TapDriver};
use crate::device::IdCode;

/// Pure match data for one kind of device: the IDCODE is masked before
/// comparison so a descriptor can cover every version/revision of a part.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
    pub idcode: u32,
    pub idmask: u32,
    pub description: &'static str,
}

impl Descriptor {
    pub fn matches(&self, idcode: IdCode) -> bool {
        idcode.raw() & self.idmask == self.idcode
    }
}

/// Behavior attached to a descriptor.  Handlers are registered by the caller
/// and consulted in order during discovery; the first whose descriptor
/// matches a device gets `on_detected` and may probe the device further
/// through the chain's addressed access operations.
pub trait DeviceHandler<T: TapDriver> {
    fn descriptor(&self) -> Descriptor;

    /// Called at the start of every discovery pass, before the device table
    /// is torn down.  Any state built on top of the previous scan (targets,
    /// debug-port objects) must be released here.
    fn release(&mut self) {}

    fn on_detected(&mut self, chain: &mut ScanChain<T>, index: usize);
}

/// Devices the crate can label without any registered handler.  Ordered,
/// first match wins.
pub const KNOWN_DEVICES: &[Descriptor] = &[
    Descriptor {
        idcode: 0x0ba0_0477,
        idmask: 0x0fff_0fff,
        description: "ARM ADIv5 JTAG-DP port",
    },
    Descriptor {
        idcode: 0x0ba0_2477,
        idmask: 0x0fff_0fff,
        description: "ARM ADIv6 JTAG-DP port",
    },
];
