//! JTAG TAP sequencing over a clocked pin adapter.
//!
//! [`Tap`] owns a [`TapAdapter`] and a tracked controller state, and turns
//! register-level requests (shift this IR, run this DR scan) into the TMS
//! walks and per-bit clocking the adapter understands. Everything above
//! this module talks in instruction and data register values; everything
//! below talks in pin levels.

pub mod emul;
pub mod gpio;
mod state;

use bitvec::prelude::*;
use tracing::trace;

use crate::error::Error;

pub use self::emul::{EmulatedMemory, EmulatedTap};
pub use self::gpio::GpioAdapter;
pub(crate) use self::state::{JtagState, RegisterState};

/// Pin-level access to one TAP.
///
/// Implementations drive the four mandatory JTAG lines plus an optional
/// TRST. The sequencer calls [`TapAdapter::clock`] once per TCK cycle and
/// never touches pins directly.
pub trait TapAdapter: Send {
    /// Claim the pins and drive them to their idle levels.
    fn setup(&mut self) -> Result<(), Error>;

    /// Release the pins so the chip's own JTAG master can take over.
    fn teardown(&mut self) -> Result<(), Error>;

    /// Run one full TCK cycle: falling edge, present TMS and TDI, sample
    /// TDO during the low phase, rising edge. Returns the sampled TDO.
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error>;

    /// Pulse the TRST line if one is wired. The default is a no-op; the
    /// state machine reset via TMS does not depend on it.
    fn pulse_trst(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Direct access to the word buffer standing in for target memory,
    /// when this adapter is an emulation rather than real silicon.
    fn emulated_memory(&self) -> Option<&EmulatedMemory> {
        None
    }
}

/// Where a DR transfer settles after Update-DR.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DrExit {
    /// Pass through Run-Test/Idle so the target acts on the update.
    Idle,
    /// Stay poised for the next scan of a chained select/access pair.
    Chain,
}

/// A claimed TAP: the adapter plus the tracked controller state.
pub struct Tap {
    adapter: Box<dyn TapAdapter>,
    state: JtagState,
}

impl Tap {
    pub fn new(adapter: Box<dyn TapAdapter>) -> Self {
        Self {
            adapter,
            state: JtagState::Reset,
        }
    }

    pub(crate) fn setup(&mut self) -> Result<(), Error> {
        self.adapter.setup()
    }

    pub(crate) fn teardown(&mut self) -> Result<(), Error> {
        self.adapter.teardown()
    }

    pub(crate) fn emulated_memory(&self) -> Option<&EmulatedMemory> {
        self.adapter.emulated_memory()
    }

    pub(crate) fn is_emulated(&self) -> bool {
        self.adapter.emulated_memory().is_some()
    }

    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error> {
        let tdo = self.adapter.clock(tms, tdi)?;
        self.state.update(tms);
        Ok(tdo)
    }

    /// Force the controller into Run-Test/Idle from any state: pulse TRST
    /// if wired, then five TMS-high cycles (the guaranteed walk into
    /// Test-Logic-Reset) and one low.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.adapter.pulse_trst()?;
        for _ in 0..5 {
            self.clock(true, false)?;
        }
        self.clock(false, false)?;
        debug_assert_eq!(self.state, JtagState::Idle);
        Ok(())
    }

    fn move_to_state(&mut self, target: JtagState) -> Result<(), Error> {
        while let Some(tms) = self.state.step_toward(target) {
            self.clock(tms, false)?;
        }
        Ok(())
    }

    /// Shift the low `len` bits of `value` into the instruction register,
    /// LSB first, and latch it via Update-IR.
    pub fn write_ir(&mut self, value: u32, len: usize) -> Result<(), Error> {
        trace!("IR <- {value:#08x} ({len} bits)");
        self.move_to_state(JtagState::Ir(RegisterState::Shift))?;
        self.shift_bits(value as u64, len, false)?;
        self.move_to_state(JtagState::Ir(RegisterState::Update))
    }

    /// Scan `len` bits of `value` through the selected data register, LSB
    /// first, capturing TDO when asked. The final bit is clocked together
    /// with the TMS-high exit so the scan is exactly `len` cycles long.
    pub fn transfer_dr(
        &mut self,
        value: u64,
        len: usize,
        capture: bool,
        exit: DrExit,
    ) -> Result<u64, Error> {
        if len == 0 {
            return Ok(0);
        }
        self.move_to_state(JtagState::Dr(RegisterState::Shift))?;
        let captured = self.shift_bits(value, len, capture)?;
        self.move_to_state(JtagState::Dr(RegisterState::Update))?;
        if exit == DrExit::Idle {
            self.move_to_state(JtagState::Idle)?;
        }
        Ok(captured)
    }

    fn shift_bits(&mut self, value: u64, len: usize, capture: bool) -> Result<u64, Error> {
        if len == 0 {
            return Ok(0);
        }
        debug_assert!(len <= 64);
        let mut captured = BitVec::<u8, Lsb0>::with_capacity(len);
        for i in 0..len {
            let last = i == len - 1;
            let tdi = (value >> i) & 1 != 0;
            let tdo = self.clock(last, tdi)?;
            if capture {
                captured.push(tdo);
            }
        }
        Ok(if capture { captured.load_le::<u64>() } else { 0 })
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        // Pins released on a best-effort basis; a claimed-but-leaked Tap
        // must not keep driving the bus.
        let _ = self.adapter.teardown();
    }
}
