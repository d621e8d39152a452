//! Per-chip context: the TAP, the board control lines and the one lock
//! that serializes every JTAG sequence against the chip.

use std::sync::{Mutex, PoisonError, TryLockError};

use embedded_hal::digital::{InputPin, OutputPin};
use tracing::warn;

use crate::bootrom::BootromSession;
use crate::error::Error;
use crate::params::TargetParams;
use crate::tap::{Tap, TapAdapter};

/// Board-level control signals around one companion chip.
///
/// All three lines are optional in hardware; implementations for boards
/// without a wire ignore the reset calls and report power as good.
pub trait ControlSignals: Send {
    /// Drive or release the chip-level reset line.
    fn set_asic_reset(&mut self, asserted: bool) -> Result<(), Error>;

    /// Drive or release the SPI controller reset line.
    fn set_spi_reset(&mut self, asserted: bool) -> Result<(), Error>;

    /// Level of the power-good input.
    fn power_good(&mut self) -> Result<bool, Error>;
}

/// [`ControlSignals`] over embedded-hal pins, each optionally wired.
pub struct GpioControl<A, S, P> {
    asic_reset: Option<A>,
    spi_reset: Option<S>,
    power_good: Option<P>,
}

impl<A, S, P> GpioControl<A, S, P> {
    pub fn new(asic_reset: Option<A>, spi_reset: Option<S>, power_good: Option<P>) -> Self {
        Self {
            asic_reset,
            spi_reset,
            power_good,
        }
    }
}

impl<A, S, P> ControlSignals for GpioControl<A, S, P>
where
    A: OutputPin + Send,
    S: OutputPin + Send,
    P: InputPin + Send,
{
    fn set_asic_reset(&mut self, asserted: bool) -> Result<(), Error> {
        if let Some(pin) = self.asic_reset.as_mut() {
            pin.set_state(asserted.into()).map_err(Error::io)?;
        }
        Ok(())
    }

    fn set_spi_reset(&mut self, asserted: bool) -> Result<(), Error> {
        if let Some(pin) = self.spi_reset.as_mut() {
            pin.set_state(asserted.into()).map_err(Error::io)?;
        }
        Ok(())
    }

    fn power_good(&mut self) -> Result<bool, Error> {
        match self.power_good.as_mut() {
            Some(pin) => pin.is_high().map_err(Error::io),
            None => Ok(true),
        }
    }
}

pub(crate) struct ChipInner {
    pub(crate) tap: Tap,
    pub(crate) control: Box<dyn ControlSignals>,
}

/// One physical companion chip: its TAP, its control lines, its lock.
///
/// The lock is held for a whole [`BootromSession`], not per word, so two
/// callers can never interleave scans halfway through a load.
pub struct Chip {
    inner: Mutex<ChipInner>,
    params: TargetParams,
}

impl Chip {
    /// Build a chip context with the built-in Blackhole description.
    pub fn new(adapter: Box<dyn TapAdapter>, control: Box<dyn ControlSignals>) -> Self {
        Self::with_params(adapter, control, TargetParams::blackhole().clone())
    }

    pub fn with_params(
        adapter: Box<dyn TapAdapter>,
        control: Box<dyn ControlSignals>,
        params: TargetParams,
    ) -> Self {
        Self {
            inner: Mutex::new(ChipInner {
                tap: Tap::new(adapter),
                control,
            }),
            params,
        }
    }

    /// Claim the chip for a bring-up sequence, blocking until it is free.
    ///
    /// Claiming checks power, claims the JTAG pins and leaves both reset
    /// lines asserted; the returned session releases everything when it
    /// is torn down or dropped.
    pub fn claim(&self) -> Result<BootromSession<'_>, Error> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        BootromSession::begin(guard, &self.params)
    }

    /// Like [`Chip::claim`], but failing with [`Error::Busy`] instead of
    /// waiting for the current holder.
    pub fn try_claim(&self) -> Result<BootromSession<'_>, Error> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(Error::Busy),
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
        };
        BootromSession::begin(guard, &self.params)
    }

    /// Release a chip that may never have been claimed: park the TAP pins
    /// if possible. Safe at any point, any number of times.
    pub fn release(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = inner.tap.teardown() {
            warn!("TAP teardown failed: {err}");
        }
    }

    pub fn params(&self) -> &TargetParams {
        &self.params
    }
}
