use serde::{Deserialize, Serialize};

pub const FLAG_N: u8 = 0x80;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_E: u8 = 0x20;
pub const FLAG_B: u8 = 0x10;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_C: u8 = 0x01;

/// CPU status flags, packed on the wire as NVE-DIZC (bit 4 always reads set).
///
/// `set_p` leaves E alone: the CPU core's P write path cannot change the
/// stack-width flag. Callers restoring a full snapshot take E from bit 5 of
/// the raw byte themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub n: bool,
    pub v: bool,
    /// 8-bit stack mode.
    pub e: bool,
    pub d: bool,
    pub i: bool,
    pub z: bool,
    pub c: bool,
}

impl Flags {
    pub fn get_p(&self) -> u8 {
        (if self.n { FLAG_N } else { 0 })
            | (if self.v { FLAG_V } else { 0 })
            | (if self.e { FLAG_E } else { 0 })
            | FLAG_B
            | (if self.d { FLAG_D } else { 0 })
            | (if self.i { FLAG_I } else { 0 })
            | (if self.z { FLAG_Z } else { 0 })
            | (if self.c { FLAG_C } else { 0 })
    }

    pub fn set_p(&mut self, p: u8) {
        self.n = p & FLAG_N != 0;
        self.v = p & FLAG_V != 0;
        self.d = p & FLAG_D != 0;
        self.i = p & FLAG_I != 0;
        self.z = p & FLAG_Z != 0;
        self.c = p & FLAG_C != 0;
    }
}

/// Snapshot-covered CPU registers. Owned by the external CPU core; this crate
/// reads and rewrites the fields around the privileged-mode boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub sp: u8,
    /// Stack page register, high byte held in bits 8-15 (0xBE00 form).
    pub sphi: u16,
    /// Base (zero) page register, high byte held in bits 8-15.
    pub bphi: u16,
    pub pc: u16,
    pub flags: Flags,
}

impl CpuState {
    /// Composed 16-bit stack pointer.
    pub fn sp16(&self) -> u16 {
        self.sphi | u16::from(self.sp)
    }
}

/// Memory-mapping state consumed by the external address translator.
///
/// Offsets are 20-bit and 256-byte granular (bits 0-7 always zero); the
/// megabyte selectors are stored pre-shifted (selector << 20, below 256 MiB).
/// The mask carries one nibble per half of the address space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapState {
    pub offset_low: u32,
    pub offset_high: u32,
    pub mask: u8,
    pub megabyte_low: u32,
    pub megabyte_high: u32,
}

/// DMA-controller registers covered by the hypervisor save area.
///
/// `list_addr_bank` holds list address bits 16-19 (low nibble only),
/// `list_addr_mb` bits 20-27.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaState {
    pub src_mb: u8,
    pub dst_mb: u8,
    pub list_addr_low: u8,
    pub list_addr_high: u8,
    pub list_addr_bank: u8,
    pub list_addr_mb: u8,
}

/// I/O mode selector of the video chip, two-bit hardware encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoMode {
    Vic2,
    Vic3,
    Vic4,
}

impl IoMode {
    pub fn to_bits(self) -> u8 {
        match self {
            IoMode::Vic2 => 0,
            IoMode::Vic3 => 1,
            IoMode::Vic4 => 3,
        }
    }

    /// Decode a two-bit encoding. The unused encoding 2 folds to Vic3, which
    /// is where the hardware's restore path lands for that pattern.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => IoMode::Vic2,
            3 => IoMode::Vic4,
            _ => IoMode::Vic3,
        }
    }
}

impl Default for IoMode {
    fn default() -> Self {
        IoMode::Vic2
    }
}

/// Live video-chip state the trap protocol touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VicState {
    pub iomode: IoMode,
    /// ROM banking register (the $D030 equivalent). Read live at leave time;
    /// not part of the save set.
    pub rom_banking: u8,
}

/// Processor port governing the RAM/ROM/IO visibility configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuPort {
    pub ddr: u8,
    pub data: u8,
}

/// The machine-owned state the trap protocol captures and rewrites. One per
/// emulated machine instance, passed in by the external CPU loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub cpu: CpuState,
    pub map: MapState,
    pub dma: DmaState,
    pub vic: VicState,
    pub port: CpuPort,
}
