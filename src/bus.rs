use crate::state::{CpuPort, MapState};

/// Seam to the subsystems this crate does not emulate: the address translator,
/// the video chip's ROM banking control, the speed controller and the CPU's
/// opcode fetch path. The host machine implements this once and hands it to
/// every trap-protocol call.
pub trait SystemBus {
    /// Recompute address translation from the mapper state, the processor
    /// port and the privilege flag. Called exactly once per `enter`/`leave`,
    /// after all state has been staged, so the switch is atomic for any
    /// observer reading through the translator.
    fn apply_mapping(&mut self, map: &MapState, port: &CpuPort, hypervisor: bool);

    /// VIC-III style ROM overlay control; 0 disables every overlay.
    fn set_rom_banking(&mut self, bits: u8);

    /// Re-derive the machine execution speed from the current mode bits.
    fn update_speed(&mut self);

    /// Opcode byte at `pc`, read as the CPU would fetch it. Only used for the
    /// per-instruction trace line.
    fn opcode_at(&mut self, pc: u16) -> u8;
}
