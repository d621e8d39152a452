//! Bootrom load and verify lifecycle.
//!
//! A [`BootromSession`] is one claimed bring-up: it holds the chip lock
//! from claim to teardown, drives the reset choreography around the AXI
//! traffic, and tracks whether the control core is still halted or has
//! been released into execution.

use std::sync::MutexGuard;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::axi::AxiBridge;
use crate::bootcode;
use crate::chip::ChipInner;
use crate::error::Error;
use crate::params::TargetParams;
use crate::tap::Tap;

/// Reset unit register offsets, relative to `params.reset_unit_base`.
const POSTCODE: u32 = 0x60;
const ARC_MISC_CNTL: u32 = 0x100;
const GPIO_TRIEN: u32 = 0x1A0;

/// ARC_MISC_CNTL bits.
const ARC_HALT_REQUEST: u32 = 0b1111 << 4;
const ARC_SOFT_RESET: u32 = 1 << 12;

/// Tri-state enables handed to the chip while the loader owns its pins.
const GPIO_TRIEN_LOADER: u32 = 0xFF00;

/// Word written to the ROM reset vector before the core is released.
const RESET_VECTOR: u32 = 0x84;

/// Progress postcodes left in the reset unit scratch slot.
const POSTCODE_PATCH_START: u32 = 0xF2;
const POSTCODE_PATCH_DONE: u32 = 0xF3;
const POSTCODE_VERIFY_FAILED: u32 = 0x6;

/// Reset pulse shape.
const RESET_HOLD: Duration = Duration::from_millis(1);
const RESET_RECOVERY: Duration = Duration::from_millis(2);

/// Spin limits for silicon coming out of reset, sized for a cold PLL.
/// A dead chip must surface an error, not hang the supervisor.
const POWER_GOOD_ATTEMPTS: usize = 10_000;
const IDCODE_ATTEMPTS: usize = 1000;
const AXI_READY_ATTEMPTS: usize = 1000;

/// Where a session stands in the bring-up lifecycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    /// Core halted with JTAG claimed; patch and verify are allowed.
    Ready,
    /// Core released into execution; only reset_asic leads back.
    Running,
}

/// A claimed chip, holding the chip lock for the whole bring-up.
///
/// Dropping the session tears the claim down, so every exit path of a
/// caller releases the pins and the lock.
pub struct BootromSession<'chip> {
    inner: MutexGuard<'chip, ChipInner>,
    params: &'chip TargetParams,
    stage: Stage,
    torn_down: bool,
}

impl<'chip> BootromSession<'chip> {
    pub(crate) fn begin(
        mut inner: MutexGuard<'chip, ChipInner>,
        params: &'chip TargetParams,
    ) -> Result<Self, Error> {
        if !inner.control.power_good()? {
            return Err(Error::NotPowered);
        }
        inner.tap.setup().map_err(|err| {
            warn!("claiming JTAG pins failed: {err}");
            Error::DeviceNotReady("JTAG pins unavailable")
        })?;
        inner.control.set_spi_reset(true)?;
        inner.control.set_asic_reset(true)?;
        inner.tap.reset()?;
        debug!("chip claimed, core held in reset");
        Ok(Self {
            inner,
            params,
            stage: Stage::Ready,
            torn_down: false,
        })
    }

    fn expect_ready(&self, what: &str) -> Result<(), Error> {
        if self.stage != Stage::Ready {
            warn!("{what} requested while the core is running");
            return Err(Error::DeviceNotReady("core is running, reset_asic first"));
        }
        Ok(())
    }

    /// Hard-reset the chip and bring its TAP back up, leaving the core
    /// halted at the reset vector with JTAG still claimed. Idempotent;
    /// also the way back to a patchable state after [`Self::soft_reset_arc`].
    pub fn reset_asic(&mut self) -> Result<(), Error> {
        let started = Instant::now();
        self.wait_power_good()?;

        self.inner.control.set_asic_reset(true)?;
        self.inner.control.set_spi_reset(true)?;
        self.inner.tap.setup().map_err(|err| {
            warn!("claiming JTAG pins failed: {err}");
            Error::DeviceNotReady("JTAG pins unavailable")
        })?;
        thread::sleep(RESET_HOLD);
        self.inner.control.set_asic_reset(false)?;
        self.inner.control.set_spi_reset(false)?;
        thread::sleep(RESET_RECOVERY);
        self.inner.tap.reset()?;

        // An emulated chip has no PLL to wait out; the spins only make
        // sense against silicon.
        if !self.inner.tap.is_emulated() {
            self.wait_for_id()?;
            self.inner.tap.reset()?;
            self.wait_axi_ready()?;
        }
        self.inner.tap.reset()?;

        self.stage = Stage::Ready;
        debug!("asic reset took {:?}", started.elapsed());
        Ok(())
    }

    fn wait_power_good(&mut self) -> Result<(), Error> {
        for _ in 0..POWER_GOOD_ATTEMPTS {
            if self.inner.control.power_good()? {
                return Ok(());
            }
            thread::yield_now();
        }
        Err(Error::NotPowered)
    }

    fn wait_for_id(&mut self) -> Result<(), Error> {
        for attempt in 0..IDCODE_ATTEMPTS {
            self.inner.tap.reset()?;
            let id = AxiBridge::new(&mut self.inner.tap, self.params).read_idcode()?;
            if id == self.params.idcode {
                if attempt > 0 {
                    debug!("IDCODE settled after {} attempts", attempt + 1);
                }
                return Ok(());
            }
            thread::yield_now();
        }
        Err(Error::Protocol(format!(
            "IDCODE never matched {:#010x}",
            self.params.idcode
        )))
    }

    fn wait_axi_ready(&mut self) -> Result<(), Error> {
        let addr = self.params.reset_unit_base + POSTCODE;
        let mut last = None;
        for _ in 0..AXI_READY_ATTEMPTS {
            self.inner.tap.reset()?;
            match AxiBridge::new(&mut self.inner.tap, self.params).read32(addr) {
                Ok(_) => return Ok(()),
                Err(err) => last = Some(err),
            }
            thread::yield_now();
        }
        let cause = last
            .map(|err| format!(", last error: {err}"))
            .unwrap_or_default();
        Err(Error::Protocol(format!(
            "AXI access to {addr:#010x} never came ready{cause}"
        )))
    }

    /// Stream the whole image to address 0. Same as
    /// [`Self::patch_offset`] with a zero base.
    pub fn patch(&mut self, words: &[u32]) -> Result<(), Error> {
        self.patch_offset(words, 0)
    }

    /// Write `words` ascending from `start_addr`, bracketed by the core
    /// halt sequence and progress postcodes.
    ///
    /// There is no rollback: when a mid-stream write fails the chip keeps
    /// whatever prefix landed, and the caller re-runs [`Self::reset_asic`]
    /// and patches from scratch. The error names the word that failed.
    pub fn patch_offset(&mut self, words: &[u32], start_addr: u32) -> Result<(), Error> {
        self.expect_ready("patch")?;
        let started = Instant::now();
        debug!(
            "patching {} words at {:#010x} (checksum {:#010x})",
            words.len(),
            start_addr,
            bootcode::checksum_words(words)
        );

        self.inner.tap.reset()?;
        let base = self.params.reset_unit_base;
        let mut axi = AxiBridge::new(&mut self.inner.tap, self.params);

        // Halt request, then release of the request, leaves the core
        // stopped and the debugger owning its memory ports.
        let cntl = axi.read32(base + ARC_MISC_CNTL)?;
        axi.write32(base + ARC_MISC_CNTL, cntl | ARC_HALT_REQUEST)?;
        let cntl = axi.read32(base + ARC_MISC_CNTL)?;
        axi.write32(base + ARC_MISC_CNTL, cntl & !ARC_HALT_REQUEST)?;

        axi.write32(base + GPIO_TRIEN, GPIO_TRIEN_LOADER)?;
        axi.write32(base + POSTCODE, POSTCODE_PATCH_START)?;
        axi.block_write(start_addr, words)?;
        axi.write32(base + POSTCODE, POSTCODE_PATCH_DONE)?;

        debug!("bootcode load took {:?}", started.elapsed());
        Ok(())
    }

    /// Read back and compare against `words` from address 0.
    pub fn verify(&mut self, words: &[u32]) -> Result<(), Error> {
        self.expect_ready("verify")?;
        verify(&mut self.inner.tap, self.params, words)
    }

    /// Read back and compare against `words` from `start_addr`, the
    /// symmetric check for [`Self::patch_offset`].
    pub fn verify_offset(&mut self, words: &[u32], start_addr: u32) -> Result<(), Error> {
        self.expect_ready("verify")?;
        verify_offset(&mut self.inner.tap, self.params, words, start_addr)
    }

    /// Release the halted core into execution at its reset vector. JTAG
    /// stays claimed; [`Self::reset_asic`] brings the session back to a
    /// patchable state.
    pub fn soft_reset_arc(&mut self) -> Result<(), Error> {
        self.inner.tap.reset()?;
        let base = self.params.reset_unit_base;
        let rom_base = self.params.rom_base;
        let mut axi = AxiBridge::new(&mut self.inner.tap, self.params);

        axi.write32(base + ARC_MISC_CNTL, ARC_HALT_REQUEST)?;
        axi.write32(base + ARC_MISC_CNTL, 0)?;
        axi.write32(rom_base, RESET_VECTOR)?;
        axi.write32(base + ARC_MISC_CNTL, ARC_SOFT_RESET)?;
        axi.write32(base + ARC_MISC_CNTL, 0)?;

        self.stage = Stage::Running;
        info!("control core released");
        Ok(())
    }

    /// Best-effort release of the JTAG claim. Never fails: sub-failures
    /// are logged and skipped so callers always have a cleanup path.
    pub fn teardown(mut self) {
        self.teardown_inner();
    }

    fn teardown_inner(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Err(err) = self.inner.tap.reset() {
            warn!("final TAP reset failed: {err}");
        }
        if let Err(err) = self.inner.tap.teardown() {
            warn!("TAP teardown failed: {err}");
        }
        // Hand the chip back running rather than parked in reset.
        if let Err(err) = self.inner.control.set_asic_reset(false) {
            warn!("releasing asic reset failed: {err}");
        }
        if let Err(err) = self.inner.control.set_spi_reset(false) {
            warn!("releasing spi reset failed: {err}");
        }
        debug!("JTAG claim released");
    }
}

impl Drop for BootromSession<'_> {
    fn drop(&mut self) {
        self.teardown_inner();
    }
}

/// Compare `words` against device contents from address 0, failing on
/// the first divergent word.
///
/// Addressed by TAP handle rather than chip context, so a harness can
/// verify against an emulation backend without claiming a chip.
pub fn verify(tap: &mut Tap, params: &TargetParams, words: &[u32]) -> Result<(), Error> {
    verify_offset(tap, params, words, 0)
}

/// Compare `words` against device contents from `start_addr`.
pub fn verify_offset(
    tap: &mut Tap,
    params: &TargetParams,
    words: &[u32],
    start_addr: u32,
) -> Result<(), Error> {
    let mut axi = AxiBridge::new(tap, params);
    for (index, &expected) in words.iter().enumerate() {
        let addr = start_addr + 4 * index as u32;
        let actual = axi.read32(addr)?;
        if actual != expected {
            if index == 0 {
                warn!("first word mismatch at {addr:#010x}, suspect wiring or addressing");
            } else {
                warn!("readback mismatch at {addr:#010x} (word {index}), suspect corruption");
            }
            let _ = axi.write32(params.reset_unit_base + POSTCODE, POSTCODE_VERIFY_FAILED);
            return Err(Error::VerifyMismatch {
                index,
                expected,
                actual,
            });
        }
    }
    debug!("bootcode verified, {} words", words.len());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chip::Chip;
    use crate::tap::emul::EmulatedControl;
    use crate::tap::TapAdapter;

    /// Clocks TMS walks fine but faults as soon as a one bit must go out
    /// on TDI, so every scan dies mid-shift.
    struct StuckLowTdi;

    impl TapAdapter for StuckLowTdi {
        fn setup(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn teardown(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn clock(&mut self, _tms: bool, tdi: bool) -> Result<bool, Error> {
            if tdi {
                return Err(Error::Io("TDI line stuck low".into()));
            }
            Ok(false)
        }
    }

    #[test]
    fn axi_ready_timeout_reports_the_last_cause() {
        let chip = Chip::new(Box::new(StuckLowTdi), Box::new(EmulatedControl::new()));
        let mut session = chip.claim().expect("claim failed");
        let err = session
            .wait_axi_ready()
            .expect_err("a faulted bus must not come ready");
        let message = err.to_string();
        assert!(message.contains("never came ready"), "{message}");
        assert!(message.contains("TDI line stuck low"), "{message}");
    }
}
