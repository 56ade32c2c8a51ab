//! `Cable` implementation for FTDI MPSSE parts, plus a wrapper for "jtagkey"
//! compatible adapters like the Bus Blaster.

use std::time::Duration;

use ftdi_mpsse::{ClockTMS, ClockTMSOut};
use libftd2xx::{ClockBits, ClockBitsOut, ClockData, ClockDataOut};
use libftd2xx::{Ft2232h, Ftdi, FtdiCommon, FtdiMpsse, MpsseCmdBuilder, MpsseCmdExecutor};

use crate::cable::Cable;

pub struct Mpsse<T> {
    ft: T,
    // Write commands waiting to go to the adapter
    buffer: Vec<u8>,
}

impl<T: FtdiMpsse + MpsseCmdExecutor> Mpsse<T>
where
    <T as MpsseCmdExecutor>::Error: std::fmt::Debug,
{
    pub fn new(mut ft: T, clock: u32) -> Self {
        ft.initialize_mpsse_default().expect("init");
        ft.set_clock(clock).expect("set clock");

        let builder = MpsseCmdBuilder::new()
            .disable_3phase_data_clocking()
            .disable_adaptive_data_clocking();
        ft.send(builder.as_slice()).expect("send");

        Self {
            ft,
            buffer: vec![],
        }
    }

    fn queue(&mut self, commands: &[u8]) {
        if commands.len() + self.buffer.len() > 4096 {
            self.flush();
        }
        self.buffer.extend_from_slice(commands);
    }
}

impl<T: FtdiMpsse + MpsseCmdExecutor> Cable for Mpsse<T>
where
    <T as MpsseCmdExecutor>::Error: std::fmt::Debug,
{
    fn change_mode(&mut self, tms: &[usize], tdi: bool) {
        let mut count = 0;
        let mut buf = 0;
        let mut builder = MpsseCmdBuilder::new();

        for value in tms {
            if *value != 0 {
                buf |= 1 << count;
            }
            count += 1;

            if count == 7 {
                builder = builder.clock_tms_out(ClockTMSOut::NegEdge, buf, tdi, count);
                count = 0;
                buf = 0;
            }
        }
        if count > 0 {
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, buf, tdi, count);
        }
        self.queue(builder.as_slice());
    }

    fn write_data(&mut self, data: &[u8], mut bits: u8, pause_after: bool) {
        assert!(bits >= 1 && bits <= 8);
        let mut builder = MpsseCmdBuilder::new();

        // The final bit goes out with the TMS command
        bits -= 1;

        if data.len() > 1 {
            builder = builder.clock_data_out(ClockDataOut::LsbNeg, &data[..data.len() - 1]);
        }
        let last_byte = data[data.len() - 1];
        if bits >= 1 {
            builder = builder.clock_bits_out(ClockBitsOut::LsbNeg, last_byte, bits);
        }
        let last_bit = last_byte & (1 << bits) != 0;
        if pause_after {
            // TMS 1, 0: Exit1 then Pause
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, 1, last_bit, 2);
        } else {
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, 0, last_bit, 1);
        }
        self.queue(builder.as_slice());
    }

    fn read_write_data(&mut self, data: &[u8], mut bits: u8, pause_after: bool) -> Vec<u8> {
        assert!(bits >= 1 && bits <= 8);
        let full_bytes = data.len() - 1;
        let mut builder = MpsseCmdBuilder::new();
        let mut read_len = 0;

        // The final bit goes out with the TMS command
        bits -= 1;

        if full_bytes > 0 {
            builder = builder.clock_data(ClockData::LsbPosIn, &data[..full_bytes]);
            read_len += full_bytes;
        }
        let last_byte = data[full_bytes];
        if bits >= 1 {
            builder = builder.clock_bits(ClockBits::LsbPosIn, last_byte, bits);
            read_len += 1;
        }
        let last_bit = last_byte & (1 << bits) != 0;
        if pause_after {
            // Capture the final bit on the Exit1 edge, then step to Pause
            builder = builder.clock_tms(ClockTMS::NegTMSPosTDO, 1, last_bit, 1);
            builder = builder.clock_tms(ClockTMS::NegTMSPosTDO, 0, last_bit, 1);
            read_len += 2;
        } else {
            builder = builder.clock_tms(ClockTMS::NegTMSPosTDO, 0, last_bit, 1);
            read_len += 1;
        }

        // Pending writes go out in the same transfer; they produce no reads
        let mut commands = std::mem::take(&mut self.buffer);
        commands.extend_from_slice(builder.as_slice());
        let mut response = vec![0u8; read_len];
        self.ft.xfer(&commands, &mut response).expect("xfer");

        // Repack LSB first: clock_bits captures land in the high bits of
        // their byte, TMS captures on bit 7
        let mut out = vec![0u8; data.len()];
        out[..full_bytes].copy_from_slice(&response[..full_bytes]);
        let mut last = 0u8;
        let mut index = full_bytes;
        if bits >= 1 {
            last = response[index] >> (8 - bits);
            index += 1;
        }
        if response[index] & 0x80 != 0 {
            last |= 1 << bits;
        }
        out[full_bytes] = last;
        out
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.ft.send(&self.buffer).expect("flush");
        self.buffer.clear();
    }
}

// Lower pins
const PIN_TCK: u8 = 1;
const PIN_TDI: u8 = 1 << 1;
//const PIN_TDO: u8 = 1 << 2;
const PIN_TMS: u8 = 1 << 3;
const PIN_N_OE: u8 = 1 << 4;
const LOWER_OUTPUT_PINS: u8 = PIN_TCK | PIN_TDI | PIN_TMS | PIN_N_OE;

// Upper pins
const PIN_N_TRST: u8 = 1;
const PIN_N_SRST: u8 = 1 << 1;
const PIN_N_TRST_OE: u8 = 1 << 2;
const PIN_N_SRST_OE: u8 = 1 << 3;
const UPPER_OUTPUT_PINS: u8 = PIN_N_TRST | PIN_N_SRST | PIN_N_TRST_OE | PIN_N_SRST_OE;

pub struct JtagKey {
    ft: Mpsse<Ft2232h>,
}

impl JtagKey {
    /// Create a new JtagKey.  FT2232-based adapters have both an "A" and a
    /// "B" interface; `primary` selects which to use.  `clock` is the TCK
    /// rate in hertz.
    pub fn new(clock: u32, primary: bool) -> Self {
        let description = if primary {
            "Dual RS232-HS A"
        } else {
            "Dual RS232-HS B"
        };
        let ft = Ftdi::with_description(description).expect("new");
        let ft = Ft2232h::try_from(ft).expect("try");
        let mut ft = Mpsse::new(ft, clock);
        ft.ft
            .set_latency_timer(Duration::from_millis(0))
            .expect("latency");
        ft.ft
            .set_gpio_upper(PIN_N_TRST | PIN_N_SRST, UPPER_OUTPUT_PINS)
            .expect("pins");

        let builder = MpsseCmdBuilder::new().set_gpio_lower(PIN_TMS, LOWER_OUTPUT_PINS);
        ft.ft.send(builder.as_slice()).expect("send");

        JtagKey { ft }
    }

    /// Put the target system into reset via the optional SRST signal.
    pub fn assert_srst(&mut self) {
        self.ft
            .ft
            .set_gpio_upper(PIN_N_TRST, UPPER_OUTPUT_PINS)
            .expect("pins");
    }

    /// Take the target system out of reset.
    pub fn deassert_srst(&mut self) {
        self.ft
            .ft
            .set_gpio_upper(PIN_N_TRST | PIN_N_SRST, UPPER_OUTPUT_PINS)
            .expect("pins");
    }
}

impl Cable for JtagKey {
    fn change_mode(&mut self, tms: &[usize], tdi: bool) {
        self.ft.change_mode(tms, tdi)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) {
        self.ft.write_data(data, bits, pause_after)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Vec<u8> {
        self.ft.read_write_data(data, bits, pause_after)
    }

    fn flush(&mut self) {
        self.ft.flush()
    }
}
