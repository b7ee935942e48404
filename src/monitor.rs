use std::io::Write;

use log::debug;

use crate::bus::SystemBus;
use crate::listing::ListingResolver;
use crate::state::{CpuState, IoMode};
use crate::Fault;

/// One-page region the firmware self-upgrade procedure executes from; the
/// boundary check is skipped entirely there.
pub const BYPASS_PAGE: u16 = 0x3000;

const WINDOW_MASK: u16 = 0xC000;
const WINDOW_BASE: u16 = 0x8000;
const MNEMONIC_WIDTH: usize = 32;

/// Per-instruction boundary check for privileged-mode execution, with an
/// optional trace line per retired instruction.
///
/// Tracing needs both the enable flag and an installed sink. Logging every
/// opcode at MHz rates makes emulation very slow, so the host opts in
/// explicitly at listing-load time.
pub struct ExecMonitor {
    tracing: bool,
    sink: Option<Box<dyn Write>>,
}

impl Default for ExecMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecMonitor {
    pub fn new() -> Self {
        Self {
            tracing: false,
            sink: None,
        }
    }

    pub fn set_tracing(&mut self, on: bool) {
        self.tracing = on;
    }

    pub fn tracing(&self) -> bool {
        self.tracing
    }

    pub fn set_trace_sink(&mut self, sink: Box<dyn Write>) {
        self.sink = Some(sink);
    }

    /// Validate one retired instruction. The caller guarantees the machine is
    /// in hypervisor mode.
    ///
    /// Order matters: the upgrade bypass page short-circuits everything, the
    /// window check is unconditional, and only then does the resolver get a
    /// say. Every reachable privileged-mode instruction must be listed once
    /// the resolver is enabled.
    pub fn check<B: SystemBus>(
        &mut self,
        cpu: &CpuState,
        iomode: IoMode,
        resolver: &ListingResolver,
        bus: &mut B,
    ) -> Result<(), Fault> {
        let pc = cpu.pc;
        if pc & 0xFF00 == BYPASS_PAGE {
            debug!("allowed to run outside of hypervisor memory, no debug info, PC = ${pc:04X}");
            return Ok(());
        }
        if pc & WINDOW_MASK != WINDOW_BASE {
            debug!("execution outside of the hypervisor memory, PC = ${pc:04X}");
            return Err(Fault::ExecutionOutsideWindow {
                pc,
                sp: cpu.sp16(),
            });
        }
        if !resolver.is_enabled() {
            return Ok(());
        }
        let (dis, src) = resolver.lookup(pc);
        if dis.is_empty() {
            debug!("execution address not found in list file (out-of-bound code?), PC = ${pc:04X}");
            return Err(Fault::UnresolvedAddress { pc });
        }
        if self.tracing {
            if let Some(sink) = self.sink.as_mut() {
                let f = cpu.flags;
                let _ = writeln!(
                    sink,
                    "{dis:<width$} PC={pc:04X} SP={sp:04X} B={b:02X} A={a:02X} X={x:02X} \
                     Y={y:02X} Z={z:02X} P={n}{v}{e}-{d}{i}{zf}{c} IO={io} OPC={opc:02X} @ {src}",
                    width = MNEMONIC_WIDTH,
                    sp = cpu.sp16(),
                    b = cpu.bphi >> 8,
                    a = cpu.a,
                    x = cpu.x,
                    y = cpu.y,
                    z = cpu.z,
                    n = if f.n { 'N' } else { 'n' },
                    v = if f.v { 'V' } else { 'v' },
                    e = if f.e { 'E' } else { 'e' },
                    d = if f.d { 'D' } else { 'd' },
                    i = if f.i { 'I' } else { 'i' },
                    zf = if f.z { 'Z' } else { 'z' },
                    c = if f.c { 'C' } else { 'c' },
                    io = iomode.to_bits(),
                    opc = bus.opcode_at(pc),
                );
            }
        }
        Ok(())
    }
}
