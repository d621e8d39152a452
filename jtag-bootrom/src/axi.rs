//! AXI access tunneled through the chip's scan-select RTAP.
//!
//! The control core's bus is reachable over JTAG through a small register
//! TAP: a select scan picks one of its test data registers, an access scan
//! moves a word in or out, and three TDRs (address, data, control/status)
//! together form one AXI transaction. [`AxiBridge`] packages that into
//! plain `read32`/`write32` calls.

use tracing::trace;

use crate::error::Error;
use crate::params::TargetParams;
use crate::tap::{DrExit, Tap};

/// Instruction register opcodes.
const OP_ISCAN_SEL: u32 = 2;
const OP_DEVID_SEL: u32 = 6;

/// Control words understood by the AXI engine behind the TDRs.
const AXI_CNTL_READ: u32 = 1 << 31;
const AXI_CNTL_WRITE: u32 = (1 << 31) | (1 << 8) | 0xF;

/// Status polls before a read is declared dead.
const AXI_READ_POLL_LIMIT: usize = 1000;

bitfield::bitfield! {
    /// An instruction register word.
    #[derive(Copy, Clone)]
    pub struct ScanInstruction(u32);
    impl Debug;

    pub op, set_op: 2, 0;
    pub bisten_sel_0, set_bisten_sel_0: 9, 7;
    pub bisten_sel_1, set_bisten_sel_1: 22, 17;
}

impl ScanInstruction {
    /// Instruction opening scan access into the given register TAP. The
    /// TAP index is split across the two BISTEN select fields.
    pub(crate) fn select_rtap(rtap: u32) -> Self {
        let mut instr = ScanInstruction(0);
        instr.set_op(OP_ISCAN_SEL);
        instr.set_bisten_sel_0(rtap & 0x7);
        instr.set_bisten_sel_1((rtap >> 3) & 0x3F);
        instr
    }

    /// Instruction selecting the device identification register.
    pub(crate) fn device_id() -> Self {
        let mut instr = ScanInstruction(0);
        instr.set_op(OP_DEVID_SEL);
        instr
    }

    pub(crate) fn raw(self) -> u32 {
        self.0
    }
}

/// Word-granular memory access over a claimed TAP.
pub struct AxiBridge<'a> {
    tap: &'a mut Tap,
    params: &'a TargetParams,
}

impl<'a> AxiBridge<'a> {
    pub fn new(tap: &'a mut Tap, params: &'a TargetParams) -> Self {
        Self { tap, params }
    }

    fn select_rtap(&mut self) -> Result<(), Error> {
        let instr = ScanInstruction::select_rtap(self.params.rtap_select);
        self.tap.write_ir(instr.raw(), self.params.ir_len as usize)
    }

    /// Select scan: a TDR index plus one in a `siblen + 1` bit register.
    fn select_tdr(&mut self, tdr: u32) -> Result<(), Error> {
        let bits = self.params.siblen as usize + 1;
        self.tap
            .transfer_dr((tdr + 1) as u64, bits, false, DrExit::Chain)?;
        Ok(())
    }

    /// Access scan width: the payload plus `siblen` framing bits below it
    /// and one spare bit above.
    fn access_bits(&self) -> usize {
        (1 + self.params.tdrlen + self.params.siblen) as usize
    }

    fn write_tdr(&mut self, tdr: u32, value: u32, exit: DrExit) -> Result<(), Error> {
        self.select_tdr(tdr)?;
        let payload = (value as u64) << self.params.siblen;
        self.tap.transfer_dr(payload, self.access_bits(), false, exit)?;
        Ok(())
    }

    fn read_tdr(&mut self, tdr: u32, exit: DrExit) -> Result<u32, Error> {
        self.select_tdr(tdr)?;
        let raw = self.tap.transfer_dr(0, self.access_bits(), true, exit)?;
        Ok((raw >> self.params.siblen) as u32)
    }

    /// Read the 32-bit device identification code.
    pub fn read_idcode(&mut self) -> Result<u32, Error> {
        let instr = ScanInstruction::device_id();
        self.tap.write_ir(instr.raw(), self.params.ir_len as usize)?;
        let id = self.tap.transfer_dr(0, 32, true, DrExit::Idle)?;
        Ok(id as u32)
    }

    /// Read one aligned word from the control core's address space.
    pub fn read32(&mut self, addr: u32) -> Result<u32, Error> {
        if let Some(memory) = self.tap.emulated_memory() {
            if memory.contains(addr) {
                return memory.read32(addr);
            }
            // Register reads outside the installed buffer fall through to
            // the wire, where the follower answers with harmless zeros.
        }

        self.select_rtap()?;
        self.write_tdr(self.params.addr_tdr, addr, DrExit::Chain)?;
        self.write_tdr(self.params.control_status_tdr, AXI_CNTL_READ, DrExit::Chain)?;

        let mut status = 0;
        for _ in 0..AXI_READ_POLL_LIMIT {
            status = self.read_tdr(self.params.control_status_tdr, DrExit::Chain)?;
            if status & 0xF != 0 {
                break;
            }
        }
        let data = self.read_tdr(self.params.data_tdr, DrExit::Idle)?;
        if status & 0xF == 0 {
            return Err(Error::Protocol(format!(
                "AXI read from {addr:#010x} never became ready"
            )));
        }
        trace!("axi R {addr:#010x} -> {data:#010x}");
        Ok(data)
    }

    /// Write one aligned word into the control core's address space.
    pub fn write32(&mut self, addr: u32, value: u32) -> Result<(), Error> {
        self.select_rtap()?;
        self.write_tdr(self.params.addr_tdr, addr, DrExit::Chain)?;
        self.write_tdr(self.params.data_tdr, value, DrExit::Chain)?;
        self.write_tdr(self.params.control_status_tdr, AXI_CNTL_WRITE, DrExit::Chain)?;
        let status = self.read_tdr(self.params.control_status_tdr, DrExit::Idle)?;
        if (status >> 16) & 1 != 0 {
            return Err(Error::Protocol(format!(
                "AXI write to {addr:#010x} not acknowledged (status {status:#010x})"
            )));
        }
        trace!("axi W {addr:#010x} <- {value:#010x}");
        Ok(())
    }

    /// Write a run of words ascending from `addr`, failing on the first
    /// word that does not go through. No rollback is attempted; the
    /// error message carries the failed index.
    pub fn block_write(&mut self, addr: u32, words: &[u32]) -> Result<(), Error> {
        for (index, &word) in words.iter().enumerate() {
            let word_addr = addr + 4 * index as u32;
            self.write32(word_addr, word)
                .map_err(|err| err.at_word(index, word_addr))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tap::EmulatedTap;

    fn emulated(words: usize) -> (Tap, std::sync::Arc<std::sync::Mutex<Vec<u32>>>) {
        let adapter = EmulatedTap::new(words);
        let sram = adapter.sram();
        (Tap::new(Box::new(adapter)), sram)
    }

    #[test]
    fn select_instruction_encoding() {
        // RTAP 0x19e lands as op 2, sel0 0b110, sel1 0b110011.
        assert_eq!(ScanInstruction::select_rtap(0x19E).raw(), 0x0066_0302);
        assert_eq!(ScanInstruction::device_id().raw(), 6);
    }

    #[test]
    fn write_lands_in_the_follower_buffer() {
        let (mut tap, sram) = emulated(8);
        tap.reset().unwrap();
        let mut axi = AxiBridge::new(&mut tap, TargetParams::blackhole());
        axi.write32(0x0, 0xDEAD_BEEF).unwrap();
        axi.write32(0xC, 0x0102_0304).unwrap();
        let sram = sram.lock().unwrap();
        assert_eq!(sram[0], 0xDEAD_BEEF);
        assert_eq!(sram[3], 0x0102_0304);
    }

    #[test]
    fn read_prefers_the_direct_buffer() {
        let (mut tap, sram) = emulated(8);
        sram.lock().unwrap()[5] = 0xCAFE_F00D;
        tap.reset().unwrap();
        let mut axi = AxiBridge::new(&mut tap, TargetParams::blackhole());
        assert_eq!(axi.read32(0x14).unwrap(), 0xCAFE_F00D);
    }

    #[test]
    fn read_outside_the_buffer_falls_through_to_the_wire() {
        let (mut tap, _sram) = emulated(4);
        tap.reset().unwrap();
        let mut axi = AxiBridge::new(&mut tap, TargetParams::blackhole());
        // The follower acknowledges the poll and serves zero data.
        assert_eq!(axi.read32(0x8003_0060).unwrap(), 0);
    }

    #[test]
    fn block_write_round_trips() {
        let (mut tap, sram) = emulated(16);
        tap.reset().unwrap();
        let words: Vec<u32> = (0..8).map(|i| 0x1111_0000 + i).collect();
        let mut axi = AxiBridge::new(&mut tap, TargetParams::blackhole());
        axi.block_write(0x20, &words).unwrap();
        assert_eq!(&sram.lock().unwrap()[8..16], words.as_slice());
    }

    #[test]
    fn idcode_travels_the_full_bit_stream() {
        let (mut tap, _sram) = emulated(4);
        tap.reset().unwrap();
        let mut axi = AxiBridge::new(&mut tap, TargetParams::blackhole());
        assert_eq!(axi.read_idcode().unwrap(), 0x0001_38A5);
    }
}
