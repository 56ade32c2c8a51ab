//! Tracks the state of the JTAG TAP state machine on top of a `Cable`.
//! `JtagSM` knows the TMS successor of every state and reaches any requested
//! state by the shortest TMS sequence from wherever it currently is.  It is
//! the production implementation of the `TapDriver` capability set the scan
//! engine consumes.

use crate::cable::Cable;
use crate::chain::{ScanError, TapDriver};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

/// Successor of each state for TMS low / TMS high, per IEEE 1149.1.
const EDGES: [[JtagState; 2]; 16] = {
    use JtagState::*;
    [
        [Idle, Reset],        // Reset
        [Idle, SelectDR],     // Idle
        [CaptureDR, SelectIR],
        [ShiftDR, Exit1DR],
        [ShiftDR, Exit1DR],
        [PauseDR, UpdateDR],
        [PauseDR, Exit2DR],
        [ShiftDR, UpdateDR],
        [Idle, SelectDR],     // UpdateDR
        [CaptureIR, Reset],   // SelectIR
        [ShiftIR, Exit1IR],
        [ShiftIR, Exit1IR],
        [PauseIR, UpdateIR],
        [PauseIR, Exit2IR],
        [ShiftIR, UpdateIR],
        [Idle, SelectIR],     // UpdateIR
    ]
};

/// Shortest TMS sequence from `from` to `to`.  Breadth-first over the edge
/// table; the graph is 16 nodes, so no bookkeeping beyond the frontier.
fn tms_path(from: JtagState, to: JtagState) -> Vec<usize> {
    let mut frontier: Vec<(JtagState, Vec<usize>)> = vec![(from, Vec::new())];
    loop {
        let mut next = Vec::new();
        for (state, path) in frontier {
            for tms in 0..2 {
                let successor = EDGES[state as usize][tms];
                let mut candidate = path.clone();
                candidate.push(tms);
                if successor == to {
                    return candidate;
                }
                next.push((successor, candidate));
            }
        }
        frontier = next;
    }
}

pub struct JtagSM<T> {
    pub cable: T,
    state: JtagState,
}

impl<T, U> JtagSM<T>
where
    T: core::ops::DerefMut<Target = U>,
    U: Cable + ?Sized,
{
    /// Create a JTAG state machine using an existing `Cable`.  The TAP is
    /// driven to Test-Logic-Reset so its state is known.
    pub fn new(cable: T) -> Self {
        let mut sm = Self {
            cable,
            state: JtagState::Reset,
        };
        sm.mode_reset();
        sm
    }

    /// Reset the TAP by driving TMS high for 5 clocks
    pub fn mode_reset(&mut self) {
        self.cable.change_mode(&[1, 1, 1, 1, 1], true);
        self.state = JtagState::Reset;
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn change_mode(&mut self, state: JtagState) {
        if self.state == state {
            return;
        }

        let path = tms_path(self.state, state);
        tracing::trace!("TAP {:?} -> {:?}: TMS {:?}", self.state, state, path);
        self.cable.change_mode(&path, true);
        self.state = state;
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// A shift whose final bit was clocked with TMS high has left the shift
    /// state; the cable parks it in the matching pause state.
    fn leave_shift(&mut self) {
        self.state = match self.state {
            JtagState::ShiftIR => JtagState::PauseIR,
            JtagState::ShiftDR => JtagState::PauseDR,
            other => other,
        };
    }
}

impl<T, U> TapDriver for JtagSM<T>
where
    T: core::ops::DerefMut<Target = U>,
    U: Cable + ?Sized,
{
    fn init(&mut self) -> Result<(), ScanError> {
        self.mode_reset();
        Ok(())
    }

    fn tap_reset(&mut self) {
        self.mode_reset();
    }

    fn enter_shift_ir(&mut self) {
        self.change_mode(JtagState::ShiftIR);
    }

    fn enter_shift_dr(&mut self) {
        self.change_mode(JtagState::ShiftDR);
    }

    fn return_idle(&mut self, cycles: usize) {
        self.change_mode(JtagState::Idle);
        if cycles > 0 {
            // TMS low keeps the TAP in Run-Test/Idle
            self.cable.change_mode(&vec![0; cycles], true);
        }
    }

    fn shift(&mut self, tdi: &[u8], bits: usize, last: bool) {
        if bits == 0 {
            return;
        }
        debug_assert!(matches!(
            self.state,
            JtagState::ShiftIR | JtagState::ShiftDR
        ));
        let bytes = bits.div_ceil(8);
        let last_byte_bits = bits - (bytes - 1) * 8;
        self.cable.write_data(&tdi[..bytes], last_byte_bits as u8, last);
        if last {
            self.leave_shift();
        }
    }

    fn shift_capture(&mut self, tdo: &mut [u8], last: bool, tdi: &[u8], bits: usize) -> bool {
        if bits == 0 {
            return false;
        }
        debug_assert!(matches!(
            self.state,
            JtagState::ShiftIR | JtagState::ShiftDR
        ));
        let bytes = bits.div_ceil(8);
        let last_byte_bits = bits - (bytes - 1) * 8;
        let captured = self
            .cable
            .read_write_data(&tdi[..bytes], last_byte_bits as u8, last);
        for (out, byte) in tdo.iter_mut().zip(&captured) {
            *out = *byte;
        }
        if last {
            self.leave_shift();
        }
        (captured[bytes - 1] >> (last_byte_bits - 1)) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every cable call; capture returns the `tdo` pattern repeated.
    struct FakeCable {
        tms_log: Vec<Vec<usize>>,
        writes: Vec<(Vec<u8>, u8, bool)>,
        tdo: u8,
    }

    impl FakeCable {
        fn new(tdo: u8) -> Self {
            Self {
                tms_log: Vec::new(),
                writes: Vec::new(),
                tdo,
            }
        }
    }

    impl Cable for FakeCable {
        fn change_mode(&mut self, tms: &[usize], _tdo: bool) {
            self.tms_log.push(tms.to_vec());
        }

        fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) {
            self.writes.push((data.to_vec(), bits, pause_after));
        }

        fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Vec<u8> {
            self.writes.push((data.to_vec(), bits, pause_after));
            vec![self.tdo; data.len()]
        }
    }

    #[test]
    fn reaches_shift_ir_by_shortest_path() {
        let mut sm = JtagSM::new(Box::new(FakeCable::new(0)));
        sm.enter_shift_ir();
        // Reset -> Idle -> SelectDR -> SelectIR -> CaptureIR -> ShiftIR
        assert_eq!(sm.cable.tms_log.last().unwrap(), &[0, 1, 1, 0, 0]);
        assert_eq!(sm.state(), JtagState::ShiftIR);
    }

    #[test]
    fn pausing_shift_then_idle() {
        let mut sm = JtagSM::new(Box::new(FakeCable::new(0)));
        sm.enter_shift_dr();
        sm.shift(&[0xaa], 8, true);
        assert_eq!(sm.state(), JtagState::PauseDR);
        sm.return_idle(1);
        // PauseDR -> Exit2DR -> UpdateDR -> Idle, then one idle clock
        let log = &sm.cable.tms_log;
        assert_eq!(&log[log.len() - 2..], &[vec![1, 1, 0], vec![0]]);
        assert_eq!(sm.state(), JtagState::Idle);
    }

    #[test]
    fn partial_byte_counts_reach_the_cable() {
        let mut sm = JtagSM::new(Box::new(FakeCable::new(0xff)));
        sm.enter_shift_ir();
        sm.shift(&[0xff, 0xff, 0xff, 0xff], 13, false);
        assert_eq!(sm.cable.writes.last().unwrap(), &(vec![0xff, 0xff], 5, false));

        let mut tdo = [0u8; 2];
        let last = sm.shift_capture(&mut tdo, false, &[0xff; 4], 9);
        assert!(last);
        assert_eq!(tdo, [0xff, 0xff]);
    }

    #[test]
    fn change_mode_to_current_state_is_free() {
        let mut sm = JtagSM::new(Box::new(FakeCable::new(0)));
        sm.enter_shift_dr();
        let transitions = sm.cable.tms_log.len();
        sm.enter_shift_dr();
        assert_eq!(sm.cable.tms_log.len(), transitions);
    }
}
