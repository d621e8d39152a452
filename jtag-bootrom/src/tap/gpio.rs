//! Bit-banged TAP adapter over embedded-hal pins.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::TapAdapter;
use crate::error::Error;

/// Drives the JTAG lines through owned [`embedded_hal`] pin handles.
///
/// TCK pacing is controlled by `half_period_ns`; the default of zero means
/// "as fast as the pins toggle", which through an I2C or SPI GPIO expander
/// is comfortably below any TAP's maximum clock anyway.
pub struct GpioAdapter<Tck, Tdi, Tdo, Tms, D, Trst = Tck> {
    tck: Tck,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms,
    trst: Option<Trst>,
    delay: D,
    half_period_ns: u32,
}

impl<Tck, Tdi, Tdo, Tms, D> GpioAdapter<Tck, Tdi, Tdo, Tms, D>
where
    Tck: OutputPin,
    Tdi: OutputPin,
    Tdo: InputPin,
    Tms: OutputPin,
    D: DelayNs,
{
    pub fn new(tck: Tck, tdi: Tdi, tdo: Tdo, tms: Tms, delay: D) -> Self {
        Self {
            tck,
            tdi,
            tdo,
            tms,
            trst: None,
            delay,
            half_period_ns: 0,
        }
    }
}

impl<Tck, Tdi, Tdo, Tms, D, Trst> GpioAdapter<Tck, Tdi, Tdo, Tms, D, Trst> {
    /// Attach a TRST line, replacing whatever was configured before.
    pub fn with_trst<T>(self, trst: T) -> GpioAdapter<Tck, Tdi, Tdo, Tms, D, T> {
        GpioAdapter {
            tck: self.tck,
            tdi: self.tdi,
            tdo: self.tdo,
            tms: self.tms,
            trst: Some(trst),
            delay: self.delay,
            half_period_ns: self.half_period_ns,
        }
    }

    /// Stretch each TCK phase to at least this many nanoseconds.
    pub fn with_half_period_ns(mut self, half_period_ns: u32) -> Self {
        self.half_period_ns = half_period_ns;
        self
    }
}

/// Width of the TRST pulse. Matches the reset recovery the chip's TAP
/// needs before it answers scans again.
const TRST_PULSE_NS: u32 = 100_000;

impl<Tck, Tdi, Tdo, Tms, D, Trst> TapAdapter for GpioAdapter<Tck, Tdi, Tdo, Tms, D, Trst>
where
    Tck: OutputPin + Send,
    Tdi: OutputPin + Send,
    Tdo: InputPin + Send,
    Tms: OutputPin + Send,
    D: DelayNs + Send,
    Trst: OutputPin + Send,
{
    fn setup(&mut self) -> Result<(), Error> {
        self.tck.set_low().map_err(Error::io)?;
        self.tdi.set_low().map_err(Error::io)?;
        // TMS high so stray clocks walk toward Test-Logic-Reset.
        self.tms.set_high().map_err(Error::io)?;
        if let Some(trst) = self.trst.as_mut() {
            trst.set_low().map_err(Error::io)?;
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), Error> {
        // These pin types cannot change direction. Park every output low
        // and leave the high-impedance turnover to whoever owns the pins.
        self.tck.set_low().map_err(Error::io)?;
        self.tdi.set_low().map_err(Error::io)?;
        self.tms.set_low().map_err(Error::io)?;
        if let Some(trst) = self.trst.as_mut() {
            trst.set_low().map_err(Error::io)?;
        }
        Ok(())
    }

    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error> {
        self.tck.set_low().map_err(Error::io)?;
        self.tms.set_state(tms.into()).map_err(Error::io)?;
        self.tdi.set_state(tdi.into()).map_err(Error::io)?;
        if self.half_period_ns > 0 {
            self.delay.delay_ns(self.half_period_ns);
        }
        // TDO is stable through the low phase; sample before the rising
        // edge latches TMS/TDI on the target side.
        let tdo = self.tdo.is_high().map_err(Error::io)?;
        self.tck.set_high().map_err(Error::io)?;
        if self.half_period_ns > 0 {
            self.delay.delay_ns(self.half_period_ns);
        }
        Ok(tdo)
    }

    fn pulse_trst(&mut self) -> Result<(), Error> {
        if let Some(trst) = self.trst.as_mut() {
            trst.set_high().map_err(Error::io)?;
            self.delay.delay_ns(TRST_PULSE_NS);
            trst.set_low().map_err(Error::io)?;
        }
        Ok(())
    }
}
