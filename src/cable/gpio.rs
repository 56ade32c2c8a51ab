//! Bit-banged `Cable` over four GPIO pins, for probes that wire the TAP
//! straight to a host controller.

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin, PinState},
};

use crate::cable::Cable;

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay>
where
    Clk: OutputPin,
    Tdi: OutputPin,
    Tdo: InputPin,
    Tms: OutputPin,
    Delay: DelayNs,
{
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms,
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay>
where
    Clk: OutputPin,
    Tdi: OutputPin,
    Tdo: InputPin,
    Tms: OutputPin,
    Delay: DelayNs,
{
    pub fn new(freq_khz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Self {
        let period_ns = 1_000_000 / freq_khz;
        let half_period = period_ns / 2;
        Gpio {
            half_period,
            delay,
            clock,
            tdi,
            tdo,
            tms,
        }
    }

    /// One TCK cycle: present TDI, clock high, sample TDO, clock low.
    fn clock_bit(&mut self, tdi: bool) -> bool {
        self.tdi.set_state(PinState::from(tdi)).unwrap();
        self.clock.set_high().unwrap();
        let tdo = self.tdo.is_high().unwrap();
        self.delay.delay_ns(self.half_period);
        self.clock.set_low().unwrap();
        self.delay.delay_ns(self.half_period);
        tdo
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay>
where
    Clk: OutputPin,
    Tdi: OutputPin,
    Tdo: InputPin,
    Tms: OutputPin,
    Delay: DelayNs,
{
    fn change_mode(&mut self, tms: &[usize], tdi: bool) {
        for value in tms {
            let state = match value {
                0 => PinState::Low,
                _ => PinState::High,
            };
            self.tms.set_state(state).unwrap();
            self.clock_bit(tdi);
        }
        self.tms.set_low().unwrap();
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) {
        self.read_write_data(data, bits, pause_after);
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Vec<u8> {
        // `bits` of the final byte are sent; everything is LSB first
        let bits = bits.clamp(1, 8) as usize;
        let total = (data.len() - 1) * 8 + bits;

        let mut captured = vec![0u8; data.len()];
        for index in 0..total {
            let tdi = data[index / 8] >> (index % 8) & 1 == 1;
            if index == total - 1 && pause_after {
                // Final bit exits to Exit1
                self.tms.set_high().unwrap();
            }
            if self.clock_bit(tdi) {
                captured[index / 8] |= 1 << (index % 8);
            }
        }

        if pause_after {
            // Step Exit1 on to Pause
            self.tms.set_low().unwrap();
            self.clock_bit(true);
        }
        captured
    }
}
