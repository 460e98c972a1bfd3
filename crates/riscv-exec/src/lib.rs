//! Pure ALU/branch executor: a function of a decoded instruction and the
//! program counter, with no side effects on memory or the register file.
//!
//! This is the other "external collaborator" spec.md §1 names — grounded
//! here only far enough that the controller under test has something real
//! to drive. `execute` fills `result` (ALU value, branch/jump target
//! helper, or effective address), `data` (store value, copied from
//! `src2`), and `next_ip`.

use riscv_isa::{AluOp, BranchCond, CsrOp, InstKind, Instruction, Word};
use thiserror::Error;

/// Raised when a decoded instruction's kind/op combination isn't one the
/// executor implements. Spec.md §7 treats this as fatal: the controller
/// propagates it rather than trying to recover.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    #[error("executor has no implementation for alu op {0:?}")]
    UnsupportedAluOp(AluOp),
    #[error("decoder produced an instruction the executor does not recognize (rd={rd}, rs1={rs1}, rs2={rs2})")]
    UnsupportedInstruction { rd: u8, rs1: u8, rs2: u8 },
}

fn alu_value(op: AluOp, a: Word, b: Word, ip: Word) -> Result<Word, ExecError> {
    Ok(match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Sll => a.wrapping_shl(b & 0x1F),
        AluOp::Srl => a.wrapping_shr(b & 0x1F),
        AluOp::Sra => ((a as i32) >> (b & 0x1F)) as u32,
        AluOp::Slt => Word::from((a as i32) < (b as i32)),
        AluOp::Sltu => Word::from(a < b),
        AluOp::Lui => b,
        AluOp::AluIpc => ip.wrapping_add(b),
    })
}

fn branch_taken(cond: BranchCond, a: Word, b: Word) -> bool {
    match cond {
        BranchCond::Eq => a == b,
        BranchCond::Ne => a != b,
        BranchCond::Lt => (a as i32) < (b as i32),
        BranchCond::Ge => (a as i32) >= (b as i32),
        BranchCond::Ltu => a < b,
        BranchCond::Geu => a >= b,
    }
}

/// Execute stage: compute the ALU/branch result, effective address, and
/// the next program counter, for a fully-read instruction at `ip`.
///
/// # Errors
/// Returns `ExecError::UnsupportedAluOp` if decode produced an `AluOp`
/// variant this executor has no case for (cannot currently happen with
/// `riscv_isa::decode`). Returns `ExecError::UnsupportedInstruction` for
/// `InstKind::Unknown` — an opcode the decoder itself didn't recognize —
/// rather than computing a result from whatever `rd`/`rs1`/`rs2` happened
/// to fall out of the word's bit positions.
pub fn execute(instr: &mut Instruction, ip: Word) -> Result<(), ExecError> {
    instr.next_ip = ip.wrapping_add(4);

    match instr.kind {
        InstKind::Alu => {
            let operand2 = if instr.uses_imm { instr.imm as u32 } else { instr.src2 };
            instr.result = alu_value(instr.alu_op, instr.src1, operand2, ip)?;
        }
        InstKind::Load | InstKind::Store => {
            instr.result = instr.src1.wrapping_add(instr.imm as u32);
            if instr.kind == InstKind::Store {
                instr.data = instr.src2;
            }
        }
        InstKind::Branch => {
            let taken = instr
                .branch_taken_if
                .is_some_and(|cond| branch_taken(cond, instr.src1, instr.src2));
            if taken {
                instr.next_ip = ip.wrapping_add(instr.imm as u32);
            }
        }
        InstKind::Jump => {
            instr.result = instr.next_ip; // link address written to rd
            instr.next_ip = if instr.is_jalr {
                instr.src1.wrapping_add(instr.imm as u32) & !1
            } else {
                ip.wrapping_add(instr.imm as u32)
            };
        }
        InstKind::System => {
            // `rd` receives the CSR's old value; the CSR itself receives
            // `csr_write_value`, combined from the old value and `src1`
            // per `csr_op`. A bare ecall touches neither.
            instr.result = instr.csr_value;
            instr.csr_write_value = match instr.csr_op {
                CsrOp::Write => instr.src1,
                CsrOp::Set => instr.csr_value | instr.src1,
                CsrOp::Clear => instr.csr_value & !instr.src1,
            };
        }
        InstKind::Unknown => {
            return Err(ExecError::UnsupportedInstruction {
                rd: instr.rd,
                rs1: instr.rs1,
                rs2: instr.rs2,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use riscv_isa::{decode, RegisterFile};

    #[test]
    fn addi_adds_immediate_to_source() {
        let mut instr = decode((0xFFFu32 << 20) | (2 << 15) | (1 << 7) | 0b001_0011);
        let rf = RegisterFile::new();
        let mut rf = rf;
        rf.set(2, 10);
        rf.read(&mut instr);
        execute(&mut instr, 0x200).unwrap();
        assert_eq!(instr.result, 9); // 10 + (-1)
        assert_eq!(instr.next_ip, 0x204);
    }

    #[test]
    fn beq_taken_sets_branch_target() {
        let mut instr = Instruction::alu_nop();
        instr.kind = InstKind::Branch;
        instr.branch_taken_if = Some(BranchCond::Eq);
        instr.src1 = 5;
        instr.src2 = 5;
        instr.imm = 8;
        execute(&mut instr, 0x200).unwrap();
        assert_eq!(instr.next_ip, 0x208);
    }

    #[test]
    fn beq_not_taken_falls_through() {
        let mut instr = Instruction::alu_nop();
        instr.kind = InstKind::Branch;
        instr.branch_taken_if = Some(BranchCond::Eq);
        instr.src1 = 5;
        instr.src2 = 6;
        instr.imm = 8;
        execute(&mut instr, 0x200).unwrap();
        assert_eq!(instr.next_ip, 0x204);
    }

    #[test]
    fn jal_targets_ip_plus_immediate_and_links_fallthrough() {
        let mut instr = Instruction::alu_nop();
        instr.kind = InstKind::Jump;
        instr.is_jalr = false;
        instr.imm = 0x100;
        execute(&mut instr, 0x200).unwrap();
        assert_eq!(instr.next_ip, 0x300);
        assert_eq!(instr.result, 0x204);
    }

    #[test]
    fn csrrs_sets_bits_without_clearing_existing_ones() {
        let mut instr = Instruction::alu_nop();
        instr.kind = InstKind::System;
        instr.csr_op = CsrOp::Set;
        instr.csr_value = 0b0101;
        instr.src1 = 0b0010;
        execute(&mut instr, 0x200).unwrap();
        assert_eq!(instr.result, 0b0101); // old value, destined for rd
        assert_eq!(instr.csr_write_value, 0b0111);
    }

    #[test]
    fn csrrc_clears_only_the_masked_bits() {
        let mut instr = Instruction::alu_nop();
        instr.kind = InstKind::System;
        instr.csr_op = CsrOp::Clear;
        instr.csr_value = 0b0111;
        instr.src1 = 0b0010;
        execute(&mut instr, 0x200).unwrap();
        assert_eq!(instr.csr_write_value, 0b0101);
    }

    #[test]
    fn unknown_instruction_is_rejected_instead_of_computing_a_result() {
        let mut instr = Instruction::alu_nop();
        instr.kind = InstKind::Unknown;
        instr.rd = 7;
        instr.src1 = 1;
        instr.src2 = 2;
        let err = execute(&mut instr, 0x200).unwrap_err();
        assert_eq!(
            err,
            ExecError::UnsupportedInstruction { rd: 7, rs1: 0, rs2: 0 }
        );
    }

    #[test]
    fn load_store_effective_address_is_src1_plus_imm() {
        let mut instr = Instruction::alu_nop();
        instr.kind = InstKind::Store;
        instr.src1 = 0x1000;
        instr.src2 = 0xABCD_EF01;
        instr.imm = 4;
        execute(&mut instr, 0x200).unwrap();
        assert_eq!(instr.result, 0x1004);
        assert_eq!(instr.data, 0xABCD_EF01);
    }
}
