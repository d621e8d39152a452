//! Bit-level emulation of the companion chip's TAP.
//!
//! [`EmulatedTap`] stands in for real silicon at the lowest seam in the
//! stack: it follows the exact TMS/TDI stream the sequencer clocks out,
//! decodes the scan-select traffic into a word buffer, and serves IDCODE
//! and AXI status captures back on TDO. Everything above the adapter
//! boundary runs unmodified against it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bitvec::prelude::*;
use tracing::{error, trace};

use super::state::{JtagState, RegisterState};
use super::TapAdapter;
use crate::axi::ScanInstruction;
use crate::chip::ControlSignals;
use crate::error::Error;
use crate::params::TargetParams;

/// Word-addressed buffer standing in for the target's memory, shared
/// between an [`EmulatedTap`] and the harness that installed it.
#[derive(Clone)]
pub struct EmulatedMemory {
    sram: Arc<Mutex<Vec<u32>>>,
}

impl EmulatedMemory {
    fn lock(&self) -> MutexGuard<'_, Vec<u32>> {
        self.sram.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether byte address `addr` falls inside the installed buffer.
    pub fn contains(&self, addr: u32) -> bool {
        ((addr >> 2) as usize) < self.lock().len()
    }

    /// Read the word containing byte address `addr` straight out of the
    /// buffer, bypassing the wire protocol.
    pub fn read32(&self, addr: u32) -> Result<u32, Error> {
        let sram = self.lock();
        match sram.get((addr >> 2) as usize) {
            Some(&word) => Ok(word),
            None => {
                error!("invalid emulated address {addr:#010x}");
                Err(Error::Io(format!("invalid emulated address {addr:#010x}")))
            }
        }
    }

    /// Commit a decoded AXI write. Addresses outside the buffer are
    /// dropped, exactly like writes to unbacked bus regions.
    fn write32(&self, addr: u32, value: u32) {
        let mut sram = self.lock();
        if let Some(slot) = sram.get_mut((addr >> 2) as usize) {
            *slot = value;
            trace!("emul W addr {addr:#010x} data {value:#010x}");
        }
    }
}

/// TAP follower backed by a plain word buffer.
pub struct EmulatedTap {
    memory: EmulatedMemory,
    params: TargetParams,
    state: JtagState,
    /// Bits accumulated during the current Shift, exit bit excluded.
    shift: BitVec<u8, Lsb0>,
    /// Value clocked out on TDO, loaded at Capture-DR.
    dr_out: u64,
    /// Latched instruction register.
    ir: u32,
    /// Most recently selected TDR, `u32::MAX` before any select.
    tdr: u32,
    expect_addr: bool,
    expect_data: bool,
    axi_addr: u32,
    iscan: u32,
    devid: u32,
}

impl EmulatedTap {
    /// Follower over a fresh zeroed buffer of `words` 32-bit words,
    /// using the built-in Blackhole description.
    pub fn new(words: usize) -> Self {
        Self::with_sram(Arc::new(Mutex::new(vec![0; words])))
    }

    /// Follower over a caller-owned buffer. The harness keeps its own
    /// clone of the handle to seed or corrupt words around patch/verify.
    pub fn with_sram(sram: Arc<Mutex<Vec<u32>>>) -> Self {
        Self::with_params(sram, TargetParams::blackhole().clone())
    }

    /// Follower speaking a custom target description, the counterpart of
    /// [`crate::Chip::with_params`] for boards with respun silicon.
    pub fn with_params(sram: Arc<Mutex<Vec<u32>>>, params: TargetParams) -> Self {
        let iscan = ScanInstruction::select_rtap(params.rtap_select).raw();
        let devid = ScanInstruction::device_id().raw();
        Self {
            memory: EmulatedMemory { sram },
            params,
            state: JtagState::Reset,
            shift: BitVec::new(),
            dr_out: 0,
            ir: 0,
            tdr: u32::MAX,
            expect_addr: false,
            expect_data: false,
            axi_addr: 0,
            iscan,
            devid,
        }
    }

    /// Clone of the shared buffer handle.
    pub fn sram(&self) -> Arc<Mutex<Vec<u32>>> {
        self.memory.sram.clone()
    }

    /// Value presented at Capture-DR for the current IR and TDR selection.
    fn capture_value(&self) -> u64 {
        if self.ir == self.devid {
            return self.params.idcode as u64;
        }
        if self.ir == self.iscan && self.tdr == self.params.control_status_tdr {
            // Low nibble set (read data ready) and bit 16 clear (write
            // acknowledged); one value satisfies both status checks.
            return 0x1 << self.params.siblen;
        }
        0
    }

    /// Act on one TCK cycle, keyed on the state the controller is leaving.
    fn fall(&mut self, tms: bool, tdi: bool) {
        match self.state {
            JtagState::Dr(RegisterState::Capture) => {
                self.shift.clear();
                self.dr_out = self.capture_value();
            }
            JtagState::Ir(RegisterState::Capture) => {
                self.shift.clear();
            }
            JtagState::Dr(RegisterState::Shift) => {
                // The exit bit rides on the TMS-high cycle and is not
                // part of the shifted value.
                if !tms {
                    self.shift.push(tdi);
                }
                self.dr_out >>= 1;
            }
            JtagState::Ir(RegisterState::Shift) => {
                if !tms {
                    self.shift.push(tdi);
                }
            }
            JtagState::Dr(RegisterState::Update) => self.update_dr(),
            JtagState::Ir(RegisterState::Update) => self.update_ir(),
            _ => {}
        }
        self.state.update(tms);
    }

    fn update_ir(&mut self) {
        self.ir = load_bits(&self.shift) as u32;
        trace!("emul IR <- {:#08x}", self.ir);
    }

    /// Decode one finished DR scan. Select scans are exactly `siblen`
    /// accumulated bits; anything longer is a TDR access payload.
    fn update_dr(&mut self) {
        let value = load_bits(&self.shift);
        if self.shift.len() == self.params.siblen as usize {
            let sel = (value as u32).wrapping_sub(1);
            self.tdr = sel;
            if sel == self.params.addr_tdr {
                self.expect_addr = true;
            } else if sel == self.params.data_tdr {
                self.expect_data = true;
            }
        } else {
            let word = (value >> self.params.siblen) as u32;
            if self.expect_addr {
                self.expect_addr = false;
                self.axi_addr = word;
            } else if self.expect_data {
                self.expect_data = false;
                self.memory.write32(self.axi_addr, word);
            }
        }
    }
}

impl TapAdapter for EmulatedTap {
    fn setup(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error> {
        let tdo =
            matches!(self.state, JtagState::Dr(RegisterState::Shift)) && (self.dr_out & 1) != 0;
        self.fall(tms, tdi);
        Ok(tdo)
    }

    fn pulse_trst(&mut self) -> Result<(), Error> {
        self.state = JtagState::Reset;
        self.shift.clear();
        self.expect_addr = false;
        self.expect_data = false;
        Ok(())
    }

    fn emulated_memory(&self) -> Option<&EmulatedMemory> {
        Some(&self.memory)
    }
}

/// LSB-first value of the accumulated bits. Streams longer than a word
/// keep the most recent 64 bits, like a hardware shift register would.
fn load_bits(bits: &BitSlice<u8, Lsb0>) -> u64 {
    if bits.is_empty() {
        0
    } else if bits.len() <= 64 {
        bits.load_le()
    } else {
        bits[bits.len() - 64..].load_le()
    }
}

struct ControlState {
    power_good: AtomicBool,
    asic_reset: AtomicBool,
    spi_reset: AtomicBool,
}

/// Control-signal double: records the reset levels and reports a
/// configurable power-good. Clones share state, so a harness can keep one
/// handle and hand the other to [`crate::Chip`].
#[derive(Clone)]
pub struct EmulatedControl {
    shared: Arc<ControlState>,
}

impl EmulatedControl {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ControlState {
                power_good: AtomicBool::new(true),
                asic_reset: AtomicBool::new(false),
                spi_reset: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_power_good(&self, good: bool) {
        self.shared.power_good.store(good, Ordering::Relaxed);
    }

    pub fn asic_reset_asserted(&self) -> bool {
        self.shared.asic_reset.load(Ordering::Relaxed)
    }

    pub fn spi_reset_asserted(&self) -> bool {
        self.shared.spi_reset.load(Ordering::Relaxed)
    }
}

impl Default for EmulatedControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSignals for EmulatedControl {
    fn set_asic_reset(&mut self, asserted: bool) -> Result<(), Error> {
        self.shared.asic_reset.store(asserted, Ordering::Relaxed);
        Ok(())
    }

    fn set_spi_reset(&mut self, asserted: bool) -> Result<(), Error> {
        self.shared.spi_reset.store(asserted, Ordering::Relaxed);
        Ok(())
    }

    fn power_good(&mut self) -> Result<bool, Error> {
        Ok(self.shared.power_good.load(Ordering::Relaxed))
    }
}
