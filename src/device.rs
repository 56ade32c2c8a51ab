//! The device table: one record per position on the scan chain, holding the
//! identity and scan-offset metadata that addressed IR/DR access is computed
//! from.  The table is rebuilt from scratch by every discovery pass; between
//! passes only the per-device IR cache changes.

use bitfield::bitfield;

/// Largest chain the table can describe.  One extra slot beyond this is kept
/// as scratch so the discovery loops can run one position past the end.
pub const JTAG_MAX_DEVS: usize = 8;

/// Largest instruction register the IR probe will accept, in bits.
pub const JTAG_MAX_IR_LEN: usize = 16;

bitfield! {
    /// A JTAG IDCODE, as captured from the data register after
    /// Test-Logic-Reset.
    #[derive(Copy, Clone, Eq, PartialEq, Default)]
    pub struct IdCode(u32);
    impl Debug;

    u8;
    /// The IDCODE version.
    pub version, set_version: 31, 28;

    u16;
    /// The part number.
    pub part_number, set_part_number: 27, 12;

    /// The JEDEC JEP-106 Manufacturer ID.
    pub manufacturer, set_manufacturer: 11, 1;

    u8;
    /// The continuation code of the JEDEC JEP-106 Manufacturer ID.
    pub manufacturer_continuation, set_manufacturer_continuation: 11, 8;

    /// The identity code of the JEDEC JEP-106 Manufacturer ID.
    pub manufacturer_identity, set_manufacturer_identity: 7, 1;

    bool;
    /// The least-significant bit.  Always set on a conformant device.
    pub lsbit, set_lsbit: 0;
}

impl IdCode {
    pub fn new(raw: u32) -> Self {
        IdCode(raw)
    }

    /// The raw 32-bit IDCODE value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Returns `true` iff the least significant bit is `1` and the 7-bit
    /// manufacturer identity is one of the non-reserved values in `[1, 126]`.
    pub fn valid(&self) -> bool {
        self.lsbit() && self.manufacturer() != 0 && self.manufacturer() != 127
    }

    /// The JEP-106 manufacturer name, if the code is assigned.
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        let cc = self.manufacturer_continuation();
        let id = self.manufacturer_identity();
        jep106::JEP106Code::new(cc, id).get()
    }
}

impl std::fmt::Display for IdCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(mfn) = self.manufacturer_name() {
            write!(f, "0x{:08X} ({})", self.0, mfn)
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

/// One device on the scan chain.
///
/// The prescan/postscan fields count the BYPASS padding bits that must be
/// shifted before and after this device's own bits so every other device on
/// the chain receives benign filler.  For the instruction register that is
/// the summed IR length of the devices on either side; for the data register
/// each bypassed device contributes exactly one bit.
#[derive(Clone, Copy, Debug, Default)]
pub struct Device {
    pub(crate) index: u8,
    pub(crate) idcode: IdCode,
    pub(crate) ir_len: u8,
    pub(crate) ir_prescan: u8,
    pub(crate) ir_postscan: u8,
    pub(crate) dr_prescan: u8,
    pub(crate) dr_postscan: u8,
    /// Instruction currently loaded in this device's IR, if known.  `None`
    /// after reset and whenever any other device's IR has been rewritten,
    /// since an IR scan reloads the whole chain.
    pub(crate) current_ir: Option<u32>,
    pub(crate) description: Option<&'static str>,
}

impl Device {
    /// Position in scan order; device 0 is scanned out first.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn idcode(&self) -> IdCode {
        self.idcode
    }

    /// Instruction register length in bits.
    pub fn ir_len(&self) -> u8 {
        self.ir_len
    }

    pub fn ir_prescan(&self) -> u8 {
        self.ir_prescan
    }

    pub fn ir_postscan(&self) -> u8 {
        self.ir_postscan
    }

    pub fn dr_prescan(&self) -> u8 {
        self.dr_prescan
    }

    pub fn dr_postscan(&self) -> u8 {
        self.dr_postscan
    }

    /// Human-readable identity, if the device matched a descriptor.
    pub fn description(&self) -> Option<&'static str> {
        self.description
    }
}

/// Fixed-capacity ordered registry of discovered devices.
///
/// `count` is the authoritative number of live entries; 0 means no chain has
/// been scanned (or the last scan failed).  The slot at `JTAG_MAX_DEVS` is
/// never live, it only absorbs the one-past-the-end writes of the discovery
/// loops.
pub struct DeviceTable {
    devices: [Device; JTAG_MAX_DEVS + 1],
    count: usize,
}

impl DeviceTable {
    pub(crate) fn new() -> Self {
        Self {
            devices: [Device::default(); JTAG_MAX_DEVS + 1],
            count: 0,
        }
    }

    /// Zero the table.  Run at the start of every discovery pass.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn set_count(&mut self, count: usize) {
        debug_assert!(count <= JTAG_MAX_DEVS);
        self.count = count;
    }

    /// Live entry at `index`, if the last scan found one there.
    pub fn get(&self, index: usize) -> Option<&Device> {
        if index < self.count {
            Some(&self.devices[index])
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices[..self.count].iter()
    }

    pub(crate) fn slot(&self, index: usize) -> &Device {
        &self.devices[index]
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Device {
        &mut self.devices[index]
    }

    /// Mark every device's IR cache as unknown.  Shifting any instruction
    /// reloads the IR of the entire chain, invalidating all caches at once.
    pub(crate) fn invalidate_ir_caches(&mut self) {
        for device in &mut self.devices[..self.count] {
            device.current_ir = None;
        }
    }

    /// Fill in `ir_postscan` for every device, walking from the tail of the
    /// chain forward since each device's postscan is the cumulative IR length
    /// of everything after it.
    pub(crate) fn fill_ir_postscan(&mut self) {
        for index in (1..self.count).rev() {
            self.devices[index - 1].ir_postscan =
                self.devices[index].ir_postscan + self.devices[index].ir_len;
        }
    }
}
