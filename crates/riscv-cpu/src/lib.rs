//! The CPU controller: drives fetch/decode/read/execute/memory/writeback
//! across a `MemoryInterface`, one instruction retirement at a time.
//!
//! Grounded on the original lab's `Cpu`: a flat `Clock` method that either
//! continues whatever memory request is already in flight, or starts a
//! fresh fetch. There is no pipelining — a later stage never starts before
//! an earlier one has fully committed, so the two in-flight states
//! (`AwaitingFetch`, `AwaitingWriteback`) are mutually exclusive and the
//! whole thing collapses to a 3-state machine.
//!
//! Unlike the original, which holds its `IMem&` as a constructor-bound
//! reference, the controller here takes the memory interface as a `tick`
//! parameter rather than owning it. The harness ticks the CPU and the
//! memory interface as two distinct components each cycle (spec.md §5:
//! CPU before memory) — if `Cpu` owned its memory, nothing outside it
//! could advance the memory's wait counter without going through the
//! CPU, making "tick the CPU alone" impossible to express.

use mem_hier::{DataAccess, MemoryInterface};
use riscv_isa::{CsrFile, HostMessage, Instruction, RegisterFile, Word};
use sim_core::{Observable, Value};

/// Where the controller is in retiring its current instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No request in flight; the next `tick` starts a fresh fetch.
    Idle,
    /// A fetch was issued and is waiting on `poll_fetch`.
    AwaitingFetch,
    /// Decode/read/execute ran; a load or store is waiting on `poll_data`.
    AwaitingWriteback,
}

/// The RISC-V32I controller.
pub struct Cpu {
    ip: Word,
    rf: RegisterFile,
    csrf: CsrFile,
    state: State,
    /// The instruction currently being retired. Only meaningful once
    /// `state` leaves `Idle`.
    instr: Instruction,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ip: riscv_isa::RESET_VECTOR,
            rf: RegisterFile::new(),
            csrf: CsrFile::new(),
            state: State::Idle,
            instr: Instruction::alu_nop(),
        }
    }

    /// Reset the architectural state and start fetching from `ip`.
    pub fn reset(&mut self, ip: Word) {
        self.csrf.reset();
        self.ip = ip;
        self.state = State::Idle;
    }

    #[must_use]
    pub fn ip(&self) -> Word {
        self.ip
    }

    /// Drain the next buffered host-communication message, if any.
    pub fn take_message(&mut self) -> Option<HostMessage> {
        self.csrf.take_message()
    }

    /// Advance the controller by one cycle against `mem`. Does not clock
    /// `mem` itself — the harness is responsible for that (spec.md §5).
    pub fn tick<M: MemoryInterface>(&mut self, mem: &mut M) {
        self.csrf.tick();

        match self.state {
            State::AwaitingFetch => self.continue_fetch(mem),
            State::AwaitingWriteback => self.continue_writeback(mem),
            State::Idle => {
                mem.request_fetch(self.ip);
                match mem.poll_fetch() {
                    Some(word) => self.process_fetched_word(mem, word),
                    None => self.state = State::AwaitingFetch,
                }
            }
        }
    }

    fn continue_fetch<M: MemoryInterface>(&mut self, mem: &mut M) {
        if let Some(word) = mem.poll_fetch() {
            self.state = State::Idle;
            self.process_fetched_word(mem, word);
        }
    }

    fn continue_writeback<M: MemoryInterface>(&mut self, mem: &mut M) {
        if let Some(loaded) = mem.poll_data() {
            self.state = State::Idle;
            self.retire(loaded);
        }
    }

    fn process_fetched_word<M: MemoryInterface>(&mut self, mem: &mut M, word: Word) {
        let mut instr = riscv_isa::decode(word);
        self.csrf.read(&mut instr);
        self.rf.read(&mut instr);
        if let Err(err) = riscv_exec::execute(&mut instr, self.ip) {
            // spec.md §7: decoder/executor disagreements are a fatal
            // internal-invariant violation, not guest-recoverable.
            panic!("executor rejected a decoded instruction: {err}");
        }
        self.instr = instr;

        if self.instr.is_memory_op() {
            mem.request_data(Self::data_access(&self.instr));
            match mem.poll_data() {
                Some(loaded) => self.retire(loaded),
                None => self.state = State::AwaitingWriteback,
            }
        } else {
            self.retire(None);
        }
    }

    fn data_access(instr: &Instruction) -> DataAccess {
        if instr.kind == riscv_isa::InstKind::Store {
            DataAccess::Store {
                addr: instr.result,
                data: instr.data,
            }
        } else {
            DataAccess::Load { addr: instr.result }
        }
    }

    fn retire(&mut self, loaded: Option<Word>) {
        if let Some(word) = loaded {
            self.instr.data = word;
        }
        self.rf.write(&self.instr);
        self.csrf.write(&self.instr);
        self.csrf.instruction_executed();
        self.ip = self.instr.next_ip;
        log::trace!("retired at ip={:#x}, next ip={:#x}", self.ip, self.instr.next_ip);
    }
}

impl Observable for Cpu {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "ip" => Some(Value::U32(self.ip)),
            _ => {
                let reg = path.strip_prefix('x')?;
                let index: u8 = reg.parse().ok()?;
                (index < 32).then(|| Value::U32(self.rf.get(index)))
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["ip"]
    }
}
