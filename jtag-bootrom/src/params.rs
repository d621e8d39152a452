//! Target-silicon descriptions.
//!
//! Everything chip-specific the TAP, bridge and loader layers consume
//! lives in one [`TargetParams`] block: scan geometry, TDR assignments,
//! the expected IDCODE and the register bases the load sequence touches.
//! The Blackhole description ships built in; boards with respun silicon
//! can load their own YAML instead.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetParams {
    /// Display name of the silicon.
    pub name: String,
    /// Expected device identification code.
    pub idcode: u32,
    /// Instruction register length in bits.
    pub ir_len: u32,
    /// Index of the register TAP carrying the AXI TDRs.
    pub rtap_select: u32,
    /// Width of the select-interface framing below each TDR payload.
    pub siblen: u32,
    /// TDR payload width in bits.
    pub tdrlen: u32,
    /// TDR holding the AXI address.
    pub addr_tdr: u32,
    /// TDR holding the AXI data word.
    pub data_tdr: u32,
    /// TDR holding the AXI control/status word.
    pub control_status_tdr: u32,
    /// Base of the reset unit register block.
    pub reset_unit_base: u32,
    /// Base of the boot ROM; the reset vector lives in its first word.
    pub rom_base: u32,
}

static BLACKHOLE: Lazy<TargetParams> = Lazy::new(|| {
    serde_yaml::from_str(include_str!("../targets/blackhole.yaml"))
        .expect("builtin target description is malformed")
});

impl TargetParams {
    /// The built-in Blackhole description.
    pub fn blackhole() -> &'static TargetParams {
        &BLACKHOLE
    }

    /// Parse a target description from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
