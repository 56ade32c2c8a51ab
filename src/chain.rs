//! Scan-chain discovery and per-device addressing.
//!
//! A single discovery pass reads out every device's IDCODE, determines the
//! instruction register length of each device (probed, or taken from a hint
//! list when the caller already knows the chain), cross-checks the device
//! count with a BYPASS pass over the data register, and fills in the
//! prescan/postscan bit offsets.  After that, `write_ir` and `shift_dr`
//! address one device while the rest of the chain cycles transparently
//! through BYPASS.
//!
//! Every protocol inconsistency found during discovery collapses to "zero
//! devices": the table is cleared and the caller may retry or report.  No
//! discovery fault is fatal to the process.

use crate::descriptor::{DeviceHandler, KNOWN_DEVICES};
use crate::device::{Device, DeviceTable, IdCode, JTAG_MAX_DEVS, JTAG_MAX_IR_LEN};

/// Bucket of ones for don't-care TDI.  The filler must be ones so it can
/// never be mistaken for anything but the chain-end sentinel.
const ONES: [u8; 8] = [0xff; 8];

/// The capability set the scan engine consumes from the bit-level layer.
///
/// `JtagSM` is the production implementation; tests substitute a simulated
/// chain.  Once a state transition returns, the hardware must be stable in
/// that state before the next shift.
pub trait TapDriver {
    /// Bring the interface up.  Failure is recoverable: a scan on an
    /// unavailable driver reports zero devices.
    fn init(&mut self) -> Result<(), ScanError> {
        Ok(())
    }

    /// Drive the TAP into Test-Logic-Reset.
    fn tap_reset(&mut self);

    /// Drive the TAP from Run-Test/Idle (or a pause state) into Shift-IR.
    fn enter_shift_ir(&mut self);

    /// Drive the TAP from Run-Test/Idle (or a pause state) into Shift-DR.
    fn enter_shift_dr(&mut self);

    /// Drive the TAP back to Run-Test/Idle and hold it there for `cycles`
    /// extra clocks.
    fn return_idle(&mut self, cycles: usize);

    /// Shift out `bits` bits of `tdi` (LSB first) with no capture.  With
    /// `last` set, the final bit leaves the shift state.
    fn shift(&mut self, tdi: &[u8], bits: usize, last: bool);

    /// Shift out `bits` bits of `tdi` while capturing TDO into `tdo` (LSB
    /// first).  Returns the final captured bit, which IR probing uses as its
    /// device-boundary signal.
    fn shift_capture(&mut self, tdo: &mut [u8], last: bool, tdi: &[u8], bits: usize) -> bool;
}

/// Protocol inconsistencies detected during discovery.  All of them are
/// reported to the caller as a zero device count after being logged.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("JTAG TAP driver unavailable")]
    TapUnavailable,
    #[error("scan chain exceeds the supported {JTAG_MAX_DEVS} devices")]
    ChainTooLong,
    #[error("instruction register exceeds {JTAG_MAX_IR_LEN} bits")]
    IrOverrun,
    #[error("BYPASS device count {dr_devices} does not match IR scan count {ir_devices}")]
    CountMismatch {
        ir_devices: usize,
        dr_devices: usize,
    },
}

/// A JTAG scan chain: the TAP driver plus the table of devices found by the
/// most recent discovery pass.
///
/// The engine assumes exclusive ownership of the driver for the duration of
/// each operation; the caller serializes all probe activity.
pub struct ScanChain<T> {
    tap: T,
    devices: DeviceTable,
}

impl<T: TapDriver> ScanChain<T> {
    pub fn new(tap: T) -> Self {
        Self {
            tap,
            devices: DeviceTable::new(),
        }
    }

    /// Number of devices found by the last scan; 0 means no usable chain.
    pub fn device_count(&self) -> usize {
        self.devices.count()
    }

    pub fn device(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Access to the underlying driver, for adapter-specific control such as
    /// system reset lines.
    pub fn tap_mut(&mut self) -> &mut T {
        &mut self.tap
    }

    /// Scan the chain for devices, rebuilding the device table from scratch.
    ///
    /// With `ir_lengths` supplied the IR probe is skipped and the hint list
    /// is trusted instead; a hint of 0 terminates the list.  `handlers` are
    /// consulted in order for each discovered device and the first match is
    /// invoked; every handler's `release` runs up front so state built on the
    /// previous scan is torn down before the table is.
    ///
    /// Returns the number of devices found.  Any protocol inconsistency is
    /// logged and reported as 0 with the table cleared.
    pub fn scan(
        &mut self,
        ir_lengths: Option<&[u8]>,
        handlers: &mut [&mut dyn DeviceHandler<T>],
    ) -> usize {
        for handler in handlers.iter_mut() {
            handler.release();
        }
        self.devices.reset();

        match self.scan_chain(ir_lengths) {
            Ok(()) => {
                self.classify(handlers);
                self.devices.count()
            }
            Err(err) => {
                tracing::warn!("scan failed: {err}");
                self.devices.reset();
                0
            }
        }
    }

    fn scan_chain(&mut self, ir_lengths: Option<&[u8]>) -> Result<(), ScanError> {
        tracing::debug!("resetting TAP");
        self.tap.init()?;

        self.read_idcodes()?;

        match ir_lengths {
            Some(lengths) => self.apply_ir_lengths(lengths)?,
            None => self.probe_ir_lengths()?,
        }
        tracing::debug!("return to Run-Test/Idle");
        self.tap.return_idle(1);

        // Every IR is now loaded with ones, i.e. BYPASS
        self.count_bypass_devices(ir_lengths.is_some())?;
        tracing::debug!("return to Run-Test/Idle");
        self.tap.return_idle(1);

        self.devices.fill_ir_postscan();
        Ok(())
    }

    /// Read out the IDCODE of every device on the chain.  After
    /// Test-Logic-Reset each DR presents its 32-bit IDCODE; all-ones marks
    /// the end of the chain.
    fn read_idcodes(&mut self) -> Result<(), ScanError> {
        self.tap.tap_reset();
        tracing::debug!("change state to Shift-DR");
        self.tap.enter_shift_dr();

        tracing::debug!("scanning out ID codes");
        let mut device = 0;
        loop {
            let mut raw = [0u8; 4];
            self.tap.shift_capture(&mut raw, false, &ONES, 32);
            let idcode = u32::from_le_bytes(raw);
            if idcode == 0xffff_ffff {
                break;
            }
            if device == JTAG_MAX_DEVS {
                return Err(ScanError::ChainTooLong);
            }
            let slot = self.devices.slot_mut(device);
            slot.idcode = IdCode::new(idcode);
            slot.index = device as u8;
            device += 1;
        }
        self.devices.set_count(device);

        tracing::debug!("return to Run-Test/Idle");
        self.tap.return_idle(1);
        Ok(())
    }

    /// Record IR lengths from a caller-supplied hint list, shifting each
    /// device's IR out without probing for boundaries.
    fn apply_ir_lengths(&mut self, lengths: &[u8]) -> Result<(), ScanError> {
        tracing::debug!("IR lengths supplied, skipping probe");
        tracing::debug!("change state to Shift-IR");
        self.tap.enter_shift_ir();

        let mut device = 0;
        let mut prescan = 0u8;
        for &ir_len in lengths {
            if ir_len == 0 {
                break;
            }
            if device == JTAG_MAX_DEVS {
                return Err(ScanError::ChainTooLong);
            }
            if usize::from(ir_len) > JTAG_MAX_IR_LEN {
                return Err(ScanError::IrOverrun);
            }

            let mut captured = [0u8; JTAG_MAX_IR_LEN.div_ceil(8)];
            self.tap
                .shift_capture(&mut captured, false, &ONES, usize::from(ir_len));
            // IEEE 1149.1 requires the first captured bit to be a 1, but not
            // all devices conform
            if captured[0] & 1 == 0 {
                tracing::warn!("sanity check failed: IR[0] shifted out as 0");
            }

            let slot = self.devices.slot_mut(device);
            slot.ir_len = ir_len;
            slot.ir_prescan = prescan;
            slot.index = device as u8;
            prescan += ir_len;
            device += 1;
        }
        self.devices.set_count(device);
        Ok(())
    }

    /// Determine IR lengths by probing.  After Test-Logic-Reset each IR
    /// captures `xx..x01`, so while shifting in ones every captured `1`
    /// marks the final bit of one device's IR and the first of the next.
    /// The very first bit overall is always a `1` and must not be taken as a
    /// boundary.  A device whose IR is a single bit cannot be told apart
    /// from the end-of-chain marker here; such chains undercount and are
    /// caught by the BYPASS cross-check, so they need a hint list.
    fn probe_ir_lengths(&mut self) -> Result<(), ScanError> {
        tracing::debug!("change state to Shift-IR");
        self.tap.enter_shift_ir();

        tracing::debug!("scanning out IRs");
        if !self.shift_capture_bit() {
            tracing::warn!("sanity check failed: IR[0] shifted out as 0");
        }
        self.devices.slot_mut(0).ir_len = 1;

        let mut device = 0;
        let mut prescan = 1u8;
        loop {
            if self.shift_capture_bit() {
                // End of the current device's IR, start of the next.  If the
                // current device never grew past the boundary bit, the
                // previous `1` was the chain-end marker, not a device.
                if self.devices.slot(device).ir_len == 1 {
                    break;
                }
                device += 1;
                if device > JTAG_MAX_DEVS {
                    return Err(ScanError::ChainTooLong);
                }
                let slot = self.devices.slot_mut(device);
                slot.ir_len = 1;
                slot.ir_prescan = prescan;
                slot.index = device as u8;
            } else {
                let slot = self.devices.slot_mut(device);
                slot.ir_len += 1;
                if usize::from(slot.ir_len) > JTAG_MAX_IR_LEN {
                    return Err(ScanError::IrOverrun);
                }
            }
            prescan += 1;
        }
        self.devices.set_count(device);
        Ok(())
    }

    /// Count devices via their BYPASS registers: each live device feeds one
    /// `0` into the chain before re-synchronizing to the shifted-in ones.
    /// The count must agree with the IR scan.  With `trust_hints` set the
    /// check stops at the hinted window instead of probing for the chain end,
    /// so a hint list may deliberately address a prefix of a longer chain.
    fn count_bypass_devices(&mut self, trust_hints: bool) -> Result<(), ScanError> {
        tracing::debug!("change state to Shift-DR");
        self.tap.enter_shift_dr();

        let count = self.devices.count();
        let mut seen = 0;
        while seen < count && !self.shift_capture_bit() {
            seen += 1;
        }
        if seen != count {
            return Err(ScanError::CountMismatch {
                ir_devices: count,
                dr_devices: seen,
            });
        }
        if !trust_hints {
            // The next bit must be the chain-end one, or the IR scan missed
            // devices
            while !self.shift_capture_bit() {
                seen += 1;
                if seen > count {
                    return Err(ScanError::CountMismatch {
                        ir_devices: count,
                        dr_devices: seen,
                    });
                }
            }
        }

        for index in 0..count {
            let slot = self.devices.slot_mut(index);
            slot.dr_prescan = index as u8;
            slot.dr_postscan = (count - index - 1) as u8;
        }
        Ok(())
    }

    /// Match each discovered device against the registered handlers and the
    /// built-in descriptor table, first match wins.  A matched handler gets
    /// to probe the device further; an unmatched device stays generic, which
    /// is not an error.
    fn classify(&mut self, handlers: &mut [&mut dyn DeviceHandler<T>]) {
        for index in 0..self.devices.count() {
            let idcode = self.devices.slot(index).idcode;

            if let Some(known) = KNOWN_DEVICES.iter().find(|d| d.matches(idcode)) {
                self.devices.slot_mut(index).description = Some(known.description);
            }

            let matched = handlers
                .iter_mut()
                .position(|handler| handler.descriptor().matches(idcode));
            if let Some(position) = matched {
                let slot = self.devices.slot_mut(index);
                // Force the next addressed IR write to actually shift
                slot.current_ir = None;
                slot.description = Some(handlers[position].descriptor().description);
            }

            tracing::info!(
                "device {index}: IDCODE {idcode}: {}",
                self.devices.slot(index).description.unwrap_or("unknown")
            );

            if let Some(position) = matched {
                handlers[position].on_detected(self, index);
            }
        }
    }

    /// Load `ir` into the instruction register of device `index`, putting
    /// every other device into BYPASS.
    ///
    /// A no-op when the device's IR already holds `ir`.  Otherwise all IR
    /// caches are invalidated first: the full-chain IR shift reloads every
    /// device's instruction register.
    ///
    /// Panics if `index` is not a device found by the last scan.
    pub fn write_ir(&mut self, index: usize, ir: u32) {
        assert!(index < self.devices.count(), "device index out of range");
        if self.devices.slot(index).current_ir == Some(ir) {
            return;
        }

        self.devices.invalidate_ir_caches();
        self.devices.slot_mut(index).current_ir = Some(ir);

        let device = *self.devices.slot(index);
        self.tap.enter_shift_ir();
        self.shift_ones(usize::from(device.ir_prescan), false);
        self.tap.shift(
            &ir.to_le_bytes(),
            usize::from(device.ir_len),
            device.ir_postscan == 0,
        );
        self.shift_ones(usize::from(device.ir_postscan), true);
        self.tap.return_idle(1);
    }

    /// Shift `bits` bits of `data_in` through the data register of device
    /// `index`, capturing into `data_out` when given.  Padding keeps every
    /// other device's BYPASS register cycling transparently so the target's
    /// bits pass through uncorrupted.
    ///
    /// Panics if `index` is not a device found by the last scan.
    pub fn shift_dr(
        &mut self,
        index: usize,
        data_out: Option<&mut [u8]>,
        data_in: &[u8],
        bits: usize,
    ) {
        assert!(index < self.devices.count(), "device index out of range");
        let device = *self.devices.slot(index);

        self.tap.enter_shift_dr();
        self.shift_ones(usize::from(device.dr_prescan), false);
        match data_out {
            Some(out) => {
                self.tap
                    .shift_capture(out, device.dr_postscan == 0, data_in, bits);
            }
            None => self.tap.shift(data_in, bits, device.dr_postscan == 0),
        }
        self.shift_ones(usize::from(device.dr_postscan), true);
        self.tap.return_idle(1);
    }

    fn shift_capture_bit(&mut self) -> bool {
        let mut bit = [0u8; 1];
        self.tap.shift_capture(&mut bit, false, &ONES, 1)
    }

    /// Shift `bits` don't-care ones, chunked to the filler buffer.
    fn shift_ones(&mut self, mut bits: usize, last: bool) {
        while bits > 0 {
            let chunk = bits.min(ONES.len() * 8);
            bits -= chunk;
            self.tap.shift(&ONES, chunk, last && bits == 0);
        }
    }
}
