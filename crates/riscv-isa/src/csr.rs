//! Host-communication CSR bank.
//!
//! Four addresses in the custom CSR range are wired to an observable
//! message stream instead of ordinary storage; everything else is a
//! plain read/write register plus the two standard Zicsr counters.

use crate::{Instruction, Word};

/// Host-communication CSR: write terminates the guest with this exit
/// code. `0` means the guest passed.
pub const CSR_EXIT_CODE: u16 = 0x7C0;
/// Host-communication CSR: write emits one ASCII byte.
pub const CSR_PRINT_CHAR: u16 = 0x7C1;
/// Host-communication CSR: write latches the low 16 bits of a signed
/// 32-bit integer to print.
pub const CSR_PRINT_INT_LOW: u16 = 0x7C2;
/// Host-communication CSR: write supplies the high 16 bits, completing
/// the integer latched by `CSR_PRINT_INT_LOW`, and emits the message.
pub const CSR_PRINT_INT_HIGH: u16 = 0x7C3;

/// Standard Zicsr cycle counter (read-only from the guest's perspective;
/// writes from `System` instructions are accepted but have no effect).
const CSR_CYCLE: u16 = 0xC00;
/// Standard Zicsr retired-instruction counter.
const CSR_INSTRET: u16 = 0xC02;

/// A message produced by a retiring instruction's CSR write, queued for
/// the harness to drain via `take_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMessage {
    /// Guest requested termination with this exit code.
    ExitCode(i32),
    /// One ASCII byte of guest output.
    PrintChar(u8),
    /// Low 16 bits of a pending signed integer print.
    PrintIntLow(u16),
    /// High 16 bits of a signed integer print; the harness joins this
    /// with the most recent `PrintIntLow` to recover the full value.
    PrintIntHigh(u16),
}

/// The host-communication CSR bank.
///
/// At most one message is buffered between retirements (spec.md §8):
/// `write` overwrites any unread message from the same instruction, but
/// the controller only ever calls `write` once per retiring instruction,
/// so in practice each retirement produces at most one message.
#[derive(Debug, Clone, Default)]
pub struct CsrFile {
    cycle: u64,
    instret: u64,
    pending: Option<HostMessage>,
}

impl CsrFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Read stage: populate `csr_value` for `System` instructions.
    pub fn read(&self, instr: &mut Instruction) {
        if instr.kind != crate::InstKind::System {
            return;
        }
        instr.csr_value = match instr.csr {
            CSR_CYCLE => self.cycle as Word,
            CSR_INSTRET => self.instret as Word,
            // Host-comm CSRs are write-only from the guest's point of view.
            _ => 0,
        };
    }

    /// Writeback stage: a `System` instruction that writes a CSR may
    /// produce a host message.
    pub fn write(&mut self, instr: &Instruction) {
        if instr.kind != crate::InstKind::System || !instr.writes_csr {
            return;
        }
        let value = instr.csr_write_value;
        let message = match instr.csr {
            CSR_EXIT_CODE => Some(HostMessage::ExitCode(value as i32)),
            CSR_PRINT_CHAR => Some(HostMessage::PrintChar(value as u8)),
            CSR_PRINT_INT_LOW => Some(HostMessage::PrintIntLow(value as u16)),
            CSR_PRINT_INT_HIGH => Some(HostMessage::PrintIntHigh(value as u16)),
            _ => None,
        };
        if let Some(message) = message {
            log::trace!("host CSR write produced message {message:?}");
            self.pending = Some(message);
        }
    }

    /// Called once per retired instruction, regardless of kind.
    pub fn instruction_executed(&mut self) {
        self.instret += 1;
    }

    /// Called once per clock tick by the controller.
    pub fn tick(&mut self) {
        self.cycle += 1;
    }

    /// Returns and clears the next pending host message, if any.
    pub fn take_message(&mut self) -> Option<HostMessage> {
        self.pending.take()
    }
}
