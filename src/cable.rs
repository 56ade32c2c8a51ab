//! Hardware adapter implementations.  An adapter ("cable") implements the
//! `Cable` trait: clocking TMS sequences to move the TAP between states, and
//! shifting data bits while in a shift state.

pub mod gpio;
#[cfg(feature = "mpsse")]
pub mod mpsse;

pub trait Cable {
    /// Clock out a series of TMS values to change the state of the TAP.
    /// Each element of `tms` drives the TMS line for one clock, zero for low
    /// and any other value for high.  `tdi` fixes the TDI line for the
    /// duration.
    fn change_mode(&mut self, tms: &[usize], tdi: bool);

    /// Shift out bits on the TDI line, LSB first; `bits` is the number of
    /// bits to send from the last byte.  Must be called in ShiftIR or
    /// ShiftDR.  The state is unchanged unless `pause_after` is set, in
    /// which case the final bit is clocked with TMS high and the TAP is
    /// stepped on to PauseIR or PauseDR.
    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool);

    /// Like `write_data`, but also returns the bits captured from TDO, LSB
    /// first, with any partial byte in the low bits of the last element.
    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Vec<u8>;

    /// Push out any buffered commands.  Adapters that execute immediately
    /// need not implement this.
    fn flush(&mut self) {}
}
