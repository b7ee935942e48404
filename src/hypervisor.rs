use std::io::BufRead;
use std::path::Path;

use log::debug;

use crate::bus::SystemBus;
use crate::listing::ListingResolver;
use crate::monitor::ExecMonitor;
use crate::registers::RegisterBank;
use crate::serial::SerialMonitor;
use crate::state::{CpuPort, IoMode, MachineState};
use crate::{Fault, Result};

/// Trap vectors are 4-byte-aligned entries starting here; trap numbers select
/// one of 128 slots.
pub const TRAP_VECTOR_BASE: u16 = 0x8000;
pub const MAX_TRAP: u8 = 0x7F;

const HYPER_PORT_DDR: u8 = 0x3F;
const HYPER_PORT_DATA: u8 = 0x35;
const HYPER_SPHI: u16 = 0xBE00;
const HYPER_BPHI: u16 = 0xBF00;
const HYPER_SP: u8 = 0xFF;
/// Mapping mask nibble routing the top two banks into hypervisor space; the
/// low-region nibble is left as the trapped program had it.
const HYPER_MAP_MASK: u8 = 0x30;
const HYPER_MAP_MEGABYTE: u32 = 0xFF << 20;
const HYPER_MAP_OFFSET: u32 = 0xF0000;

/// Per-machine session object owning everything that used to be ambient
/// around the trap protocol: the privilege flag, the register bank, the
/// symbol resolver, the execution monitor and the serial sink. Machine-owned
/// state comes in from the CPU loop; mapper, speed and fetch effects go out
/// through the [`SystemBus`].
pub struct Hypervisor {
    active: bool,
    pub bank: RegisterBank,
    pub resolver: ListingResolver,
    pub monitor: ExecMonitor,
    pub serial: SerialMonitor,
}

impl Default for Hypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Hypervisor {
    pub fn new() -> Self {
        Self {
            active: false,
            bank: RegisterBank::new(),
            resolver: ListingResolver::new(),
            monitor: ExecMonitor::new(),
            serial: SerialMonitor::new(),
        }
    }

    /// Whether the machine is in hypervisor mode.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Trap into hypervisor mode.
    ///
    /// Captures the pre-trap machine state into the register bank, switches
    /// to the protected configuration and lands the CPU on the trap vector.
    /// The privilege flag flips before any observable state changes, so the
    /// switch is atomic at every call boundary.
    pub fn enter<B: SystemBus>(
        &mut self,
        trap: u8,
        m: &mut MachineState,
        bus: &mut B,
    ) -> std::result::Result<(), Fault> {
        if trap > MAX_TRAP {
            return Err(Fault::InvalidTrapNumber(trap));
        }
        if self.active {
            return Err(Fault::AlreadyInHypervisor);
        }
        self.bank.save_cpu(&m.cpu);
        self.bank.save_map(&m.map);
        self.bank.save_io(&m.port, m.vic.iomode);
        self.bank.save_dma(&m.dma);
        let old_pc = m.cpu.pc;

        self.active = true;
        m.vic.iomode = IoMode::Vic4;
        m.port = CpuPort {
            ddr: HYPER_PORT_DDR,
            data: HYPER_PORT_DATA,
        };
        m.cpu.flags.d = false;
        m.cpu.flags.i = true;
        m.cpu.flags.e = true;
        m.cpu.sphi = HYPER_SPHI;
        m.cpu.bphi = HYPER_BPHI;
        m.cpu.sp = HYPER_SP;
        m.map.mask = (m.map.mask & 0x0F) | HYPER_MAP_MASK;
        m.map.megabyte_high = HYPER_MAP_MEGABYTE;
        m.map.offset_high = HYPER_MAP_OFFSET;
        bus.set_rom_banking(0);
        bus.apply_mapping(&m.map, &m.port, true);
        bus.update_speed();
        m.cpu.pc = TRAP_VECTOR_BASE | (u16::from(trap) << 2);
        debug!(
            "entering hypervisor mode, trap=${trap:02X} @ ${old_pc:04X} -> ${:04X}",
            m.cpu.pc
        );
        Ok(())
    }

    /// Return from hypervisor mode, restoring whatever the register bank now
    /// holds; firmware rewrites of bank slots land here.
    ///
    /// The ROM banking overlay is re-applied from the live video-chip
    /// register, not from the bank: that setting is not part of the save set.
    pub fn leave<B: SystemBus>(
        &mut self,
        m: &mut MachineState,
        bus: &mut B,
    ) -> std::result::Result<(), Fault> {
        if !self.active {
            return Err(Fault::NotInHypervisor);
        }
        let old_pc = m.cpu.pc;
        self.bank.restore_cpu(&mut m.cpu);
        m.map = self.bank.restore_map();
        let (port, iomode) = self.bank.restore_io();
        m.port = port;
        m.vic.iomode = iomode;
        m.dma = self.bank.restore_dma();

        self.active = false;
        bus.update_speed();
        bus.set_rom_banking(m.vic.rom_banking);
        bus.apply_mapping(&m.map, &m.port, false);
        debug!(
            "leaving hypervisor mode @ ${old_pc:04X} -> ${:04X}",
            m.cpu.pc
        );
        Ok(())
    }

    /// Per-retired-instruction hook from the CPU loop; a no-op outside
    /// hypervisor mode.
    pub fn check_instruction<B: SystemBus>(
        &mut self,
        m: &MachineState,
        bus: &mut B,
    ) -> std::result::Result<(), Fault> {
        if !self.active {
            return Ok(());
        }
        self.monitor
            .check(&m.cpu, m.vic.iomode, &self.resolver, bus)
    }

    /// Load the listing description and arm per-instruction tracing when
    /// `trace` is set, mirroring the debug flag the host passes at startup.
    pub fn load_listing<R: BufRead>(&mut self, reader: R, trace: bool) -> Result<()> {
        self.resolver.load(reader)?;
        self.monitor.set_tracing(trace);
        Ok(())
    }

    /// Path-taking variant of [`load_listing`](Self::load_listing); a missing
    /// file merely leaves the resolver disabled. Returns whether symbols are
    /// available.
    pub fn load_listing_path(&mut self, path: Option<&Path>, trace: bool) -> Result<bool> {
        let loaded = self.resolver.load_path(path)?;
        if loaded {
            self.monitor.set_tracing(trace);
        }
        Ok(loaded)
    }

    /// Disable symbol resolution (and with it the unlisted-address check).
    pub fn invalidate_listing(&mut self, reason: &str) {
        self.resolver.invalidate(reason);
    }

    /// One byte of firmware serial-monitor output.
    pub fn serial_push(&mut self, byte: u8) -> Option<&str> {
        self.serial.push(byte)
    }
}
