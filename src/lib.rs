//! Privileged-mode ("hypervisor") core for an M65-style 8-bit machine.
//!
//! Emulates the hardware trap mechanism: freeze the running machine state into
//! a memory-mapped register bank, switch to the protected memory configuration,
//! run trusted firmware, and restore (or deliberately rewrite) the frozen state
//! on exit. The CPU interpreter, memory mapper, DMA engine and video chip are
//! external collaborators reached through [`bus::SystemBus`]; this crate only
//! captures, encodes, decodes and validates state around the privileged-mode
//! boundary, plus the debug subsystem that observes it (listing-file symbol
//! resolution, per-instruction trace, serial monitor sink).

use thiserror::Error;

pub mod bus;
pub mod hypervisor;
pub mod listing;
pub mod monitor;
pub mod registers;
pub mod serial;
pub mod state;

pub use bus::SystemBus;
pub use hypervisor::Hypervisor;
pub use listing::ListingResolver;
pub use monitor::ExecMonitor;
pub use registers::RegisterBank;
pub use serial::SerialMonitor;
pub use state::{
    CpuPort, CpuState, DmaState, Flags, IoMode, MachineState, MapState, VicState,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Fatal invariant violations. The real silicon locks up or behaves undefined
/// on these; the host is expected to halt the emulated session, not retry.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("invalid trap number ${0:02X}")]
    InvalidTrapNumber(u8),
    #[error("already in hypervisor mode while entering")]
    AlreadyInHypervisor,
    #[error("not in hypervisor mode while leaving")]
    NotInHypervisor,
    #[error("execution outside of the hypervisor memory, PC=${pc:04X} SP=${sp:04X}")]
    ExecutionOutsideWindow { pc: u16, sp: u16 },
    #[error("execution address not found in list file, PC=${pc:04X}")]
    UnresolvedAddress { pc: u16 },
    #[error("bad list file, too long {field} part at ${addr:04X}")]
    ListingFieldTooLong { addr: u16, field: &'static str },
}

/// Errors surfaced by the load-time paths. Anything that is not a [`Fault`]
/// degrades gracefully and is reported on the diagnostic channel instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fault(#[from] Fault),
}
