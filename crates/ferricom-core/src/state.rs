//! Full-console save states.
//!
//! A [`Snapshot`] captures every component's state plus a schema version and
//! a fingerprint of the loaded ROM. Serialization is left to the host (any
//! serde format will do when the `savestate-serde` feature is enabled);
//! the core only defines the payload and the compatibility rules:
//!
//! - a schema version mismatch fails the restore;
//! - a ROM fingerprint mismatch restores anyway but reports a warning.

use crate::{apu::ApuState, cartridge::mapper::MapperState, cpu::CpuState, ppu::PpuState};

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable console snapshot.
#[cfg_attr(
    feature = "savestate-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Schema version; checked by `restore`.
    pub version: u32,
    /// 32-bit hash of the first KiB of PRG-ROM at capture time.
    pub rom_fingerprint: u32,
    pub cpu: CpuState,
    pub ram: Vec<u8>,
    pub ppu: PpuState,
    pub apu: ApuState,
    pub mapper: MapperState,
}

/// Result of a successful restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    /// Set when the snapshot was taken against a different ROM image; the
    /// restore still happened but the machine state may not make sense.
    pub rom_mismatch: bool,
}
