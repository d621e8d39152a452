//! # Bit-banged JTAG bring-up for Tensix companion ASICs
//!
//! This crate drives a companion chip's control core out of reset from a
//! supervisory microcontroller: it sequences the JTAG TAP pin by pin,
//! tunnels AXI word access through the chip's scan-select register TAP,
//! streams the embedded bootcode into the core's instruction memory,
//! verifies the readback and finally releases the core into execution.
//!
//! # Examples
//!
//! ## A full bring-up against the emulated backend
//! ```no_run
//! use jtag_bootrom::{bootcode, Chip, EmulatedControl, EmulatedTap};
//!
//! // A word buffer stands in for silicon here; a real board hands in a
//! // GpioAdapter over its pins instead.
//! let tap = EmulatedTap::new(bootcode::bootcode_len());
//! let chip = Chip::new(Box::new(tap), Box::new(EmulatedControl::new()));
//!
//! let mut session = chip.claim()?;
//! session.reset_asic()?;
//! session.patch(bootcode::bootcode())?;
//! session.verify(bootcode::bootcode())?;
//! session.soft_reset_arc()?;
//! session.teardown();
//! # Ok::<(), jtag_bootrom::Error>(())
//! ```
//!
//! The crate is built around three seams: [`TapAdapter`] at the pin
//! level, [`ControlSignals`] for the board's reset and power lines, and
//! [`TargetParams`] for everything silicon-specific. Swapping the first
//! two for their emulated doubles runs the identical loader stack with
//! no hardware attached.

pub mod axi;
pub mod bootcode;
mod bootrom;
mod chip;
mod error;
pub mod params;
pub mod tap;

pub use crate::axi::AxiBridge;
pub use crate::bootrom::{verify, verify_offset, BootromSession};
pub use crate::chip::{Chip, ControlSignals, GpioControl};
pub use crate::error::Error;
pub use crate::params::TargetParams;
pub use crate::tap::emul::EmulatedControl;
pub use crate::tap::{DrExit, EmulatedMemory, EmulatedTap, GpioAdapter, Tap, TapAdapter};
