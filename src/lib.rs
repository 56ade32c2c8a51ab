//! This crate drives a JTAG Test Access Port to discover, enumerate and
//! individually address an unknown chain of devices, without any prior
//! knowledge of the chain topology.  At the lowest level, the `Cable` trait
//! abstracts a JTAG adapter: it can clock TMS sequences and shift bits in and
//! out of the chain.  Adapters based on FTDI MPSSE parts and plain GPIO
//! bit-banging are provided.
//!
//! One level up, `JtagSM` tracks the state of the TAP state machine.  You tell
//! it which state you want and it gets there with the fewest TMS clocks.
//! `JtagSM` implements the `TapDriver` capability set that the rest of the
//! crate is built on.
//!
//! The interesting part is `ScanChain`.  Given a `TapDriver` it reads out the
//! IDCODE of every device on the chain, determines each device's instruction
//! register length (either by probing or from a caller-supplied hint list),
//! cross-checks the device count with a BYPASS pass over the data register,
//! and computes the bit offsets needed to address any one device while every
//! other device sits in BYPASS.  After a scan, `write_ir` and `shift_dr`
//! operate on a single device as if it were alone on the chain.
//!
//! # Example
//! ```no_run
//! use jtag_chain::cable::mpsse::JtagKey;
//! use jtag_chain::chain::ScanChain;
//! use jtag_chain::statemachine::JtagSM;
//!
//! let cable = JtagKey::new(1 << 20, true);
//! let sm = JtagSM::new(Box::new(cable));
//! let mut chain = ScanChain::new(sm);
//! let found = chain.scan(None, &mut []);
//! for dev in chain.devices() {
//!     println!("device {}: {}", dev.index(), dev.idcode());
//! }
//! assert!(found > 0);
//! ```

pub mod cable;
pub mod chain;
pub mod descriptor;
pub mod device;
pub mod statemachine;
