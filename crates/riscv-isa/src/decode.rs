//! RV32I decoder: a pure function from a fetched word to an `Instruction`.
//!
//! This is the "external collaborator" spec.md §1 excludes from the
//! simulator's core, but it still has to exist, and has to be right, for
//! the controller driving it to be testable end to end. Memory in this
//! machine is strictly word-granular (spec.md §3: addresses are
//! truncated to a word index), so only the word-width load/store
//! encodings (`lw`/`sw`) are recognized; the narrower byte/half forms
//! (and anything else the match below doesn't recognize, e.g. `fence`)
//! decode to `InstKind::Unknown`, which the executor refuses to run
//! rather than silently computing a bogus ALU result from whatever
//! `rd`/`rs1`/`rs2` happened to fall out of the word's bit positions.

use crate::instruction::{BranchCond, CsrOp};
use crate::{AluOp, InstKind, Instruction, Word};

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn bits(word: Word, hi: u32, lo: u32) -> u32 {
    (word >> lo) & ((1u32 << (hi - lo + 1)) - 1)
}

fn rd(word: Word) -> u8 {
    bits(word, 11, 7) as u8
}
fn rs1(word: Word) -> u8 {
    bits(word, 19, 15) as u8
}
fn rs2(word: Word) -> u8 {
    bits(word, 24, 20) as u8
}
fn funct3(word: Word) -> u32 {
    bits(word, 14, 12)
}
fn funct7(word: Word) -> u32 {
    bits(word, 31, 25)
}

fn imm_i(word: Word) -> i32 {
    sign_extend(bits(word, 31, 20), 12)
}
fn imm_s(word: Word) -> i32 {
    let hi = bits(word, 31, 25) << 5;
    let lo = bits(word, 11, 7);
    sign_extend(hi | lo, 12)
}
fn imm_b(word: Word) -> i32 {
    let v = (bits(word, 31, 31) << 12)
        | (bits(word, 7, 7) << 11)
        | (bits(word, 30, 25) << 5)
        | (bits(word, 11, 8) << 1);
    sign_extend(v, 13)
}
fn imm_u(word: Word) -> i32 {
    (word & 0xFFFF_F000) as i32
}
fn imm_j(word: Word) -> i32 {
    let v = (bits(word, 31, 31) << 20)
        | (bits(word, 19, 12) << 12)
        | (bits(word, 20, 20) << 11)
        | (bits(word, 30, 21) << 1);
    sign_extend(v, 21)
}

/// Decode a fetched 32-bit word into an instruction record.
///
/// Unrecognized opcodes decode to `InstKind::Unknown` rather than
/// returning `Option`/`Result`: spec.md §7 makes "decoder returns a kind
/// the executor does not recognize" the executor's problem
/// (`UnsupportedInstruction`), not this function's. `rd`/`rs1`/`rs2` are
/// still populated from the word's fixed bit positions (useful for a log
/// line), but `InstKind::Unknown` carries no valid operands as far as the
/// executor and register file are concerned.
#[must_use]
pub fn decode(word: Word) -> Instruction {
    let opcode = bits(word, 6, 0);
    let mut instr = Instruction::alu_nop();
    instr.rd = rd(word);
    instr.rs1 = rs1(word);
    instr.rs2 = rs2(word);

    match opcode {
        0b011_0111 => {
            // LUI
            instr.kind = InstKind::Alu;
            instr.alu_op = AluOp::Lui;
            instr.imm = imm_u(word);
            instr.uses_imm = true;
        }
        0b001_0111 => {
            // AUIPC
            instr.kind = InstKind::Alu;
            instr.alu_op = AluOp::AluIpc;
            instr.imm = imm_u(word);
            instr.uses_imm = true;
        }
        0b110_1111 => {
            // JAL
            instr.kind = InstKind::Jump;
            instr.imm = imm_j(word);
        }
        0b110_0111 if funct3(word) == 0 => {
            // JALR
            instr.kind = InstKind::Jump;
            instr.imm = imm_i(word);
            instr.is_jalr = true;
        }
        0b110_0011 => {
            // Branch
            instr.kind = InstKind::Branch;
            instr.imm = imm_b(word);
            instr.branch_taken_if = Some(match funct3(word) {
                0b000 => BranchCond::Eq,
                0b001 => BranchCond::Ne,
                0b100 => BranchCond::Lt,
                0b101 => BranchCond::Ge,
                0b110 => BranchCond::Ltu,
                0b111 => BranchCond::Geu,
                _ => BranchCond::Eq,
            });
        }
        0b000_0011 if funct3(word) == 0b010 => {
            // LW (the only load width this word-granular machine models)
            instr.kind = InstKind::Load;
            instr.imm = imm_i(word);
            instr.uses_imm = true;
        }
        0b010_0011 if funct3(word) == 0b010 => {
            // SW
            instr.kind = InstKind::Store;
            instr.imm = imm_s(word);
            instr.uses_imm = true;
        }
        0b001_0011 => {
            // OP-IMM
            instr.kind = InstKind::Alu;
            instr.imm = imm_i(word);
            instr.uses_imm = true;
            instr.alu_op = match funct3(word) {
                0b000 => AluOp::Add,
                0b010 => AluOp::Slt,
                0b011 => AluOp::Sltu,
                0b100 => AluOp::Xor,
                0b110 => AluOp::Or,
                0b111 => AluOp::And,
                0b001 => AluOp::Sll,
                0b101 if bits(word, 30, 30) == 0 => AluOp::Srl,
                0b101 => AluOp::Sra,
                _ => AluOp::Add,
            };
            if matches!(instr.alu_op, AluOp::Sll | AluOp::Srl | AluOp::Sra) {
                instr.imm = bits(word, 24, 20) as i32;
            }
        }
        0b011_0011 => {
            // OP (register-register)
            instr.kind = InstKind::Alu;
            instr.alu_op = match (funct3(word), funct7(word)) {
                (0b000, 0b010_0000) => AluOp::Sub,
                (0b000, _) => AluOp::Add,
                (0b001, _) => AluOp::Sll,
                (0b010, _) => AluOp::Slt,
                (0b011, _) => AluOp::Sltu,
                (0b100, _) => AluOp::Xor,
                (0b101, 0b010_0000) => AluOp::Sra,
                (0b101, _) => AluOp::Srl,
                (0b110, _) => AluOp::Or,
                (0b111, _) => AluOp::And,
                _ => AluOp::Add,
            };
        }
        0b111_0011 => {
            // SYSTEM: CSR instructions and ECALL/EBREAK.
            instr.kind = InstKind::System;
            instr.csr = bits(word, 31, 20) as u16;
            match funct3(word) {
                0b001 | 0b010 | 0b011 => {
                    // csrrw/csrrs/csrrc, register source
                    instr.is_csr = true;
                    instr.csr_op = match funct3(word) {
                        0b001 => CsrOp::Write,
                        0b010 => CsrOp::Set,
                        _ => CsrOp::Clear,
                    };
                    instr.writes_csr = funct3(word) == 0b001 || instr.rs1 != 0;
                }
                0b101 | 0b110 | 0b111 => {
                    // csrrwi/csrrsi/csrrci: the rs1 field holds a 5-bit
                    // immediate, not a register number.
                    instr.is_csr = true;
                    instr.csr_op = match funct3(word) {
                        0b101 => CsrOp::Write,
                        0b110 => CsrOp::Set,
                        _ => CsrOp::Clear,
                    };
                    instr.writes_csr = funct3(word) == 0b101 || instr.rs1 != 0;
                    instr.imm = i32::from(instr.rs1);
                    instr.uses_imm = true;
                }
                _ => {
                    // ecall/ebreak: no CSR effect.
                    instr.writes_csr = false;
                }
            }
        }
        _ => {
            log::debug!("decode: unrecognized opcode {opcode:#09b} in word {word:#010x}");
            instr.kind = InstKind::Unknown;
        }
    }

    instr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_u(opcode: u32, rd: u32, imm20: u32) -> Word {
        (imm20 << 12) | (rd << 7) | opcode
    }

    #[test]
    fn lui_decodes_alu_add_with_shifted_immediate() {
        let imm = 0b0000_0010_1000_1010_1000u32;
        let word = encode_u(0b011_0111, 0b11111, imm);
        let instr = decode(word);
        assert_eq!(instr.kind, InstKind::Alu);
        assert_eq!(instr.alu_op, AluOp::Lui);
        assert_eq!(instr.rd, 0b11111);
        assert_eq!(instr.imm, (imm << 12) as i32);
    }

    #[test]
    fn addi_decodes_op_imm_add() {
        // addi x1, x2, -1
        let word = (0xFFFu32 << 20) | (2 << 15) | (0b000 << 12) | (1 << 7) | 0b001_0011;
        let instr = decode(word);
        assert_eq!(instr.kind, InstKind::Alu);
        assert_eq!(instr.alu_op, AluOp::Add);
        assert_eq!(instr.rs1, 2);
        assert_eq!(instr.rd, 1);
        assert_eq!(instr.imm, -1);
    }

    #[test]
    fn sw_decodes_store_with_split_immediate() {
        // sw x5, 4(x10)
        let imm = 4u32;
        let word =
            (bits(imm, 11, 5) << 25) | (5 << 20) | (10 << 15) | (0b010 << 12) | (bits(imm, 4, 0) << 7) | 0b010_0011;
        let instr = decode(word);
        assert_eq!(instr.kind, InstKind::Store);
        assert_eq!(instr.rs1, 10);
        assert_eq!(instr.rs2, 5);
        assert_eq!(instr.imm, 4);
    }

    #[test]
    fn narrower_load_width_decodes_as_unknown_not_a_silent_add() {
        // lb x1, 0(x2) -- same opcode as lw, funct3 selects the byte width
        let word = (2 << 15) | (0b000 << 12) | (1 << 7) | 0b000_0011;
        let instr = decode(word);
        assert_eq!(instr.kind, InstKind::Unknown);
    }

    #[test]
    fn fence_decodes_as_unknown() {
        let word = 0b000_0000_0000_0000_0000_0000_0000_1111;
        let instr = decode(word);
        assert_eq!(instr.kind, InstKind::Unknown);
    }

    #[test]
    fn csrrw_marks_writes_csr() {
        // csrrw x0, 0x7c0, x1
        let word = (0x7C0u32 << 20) | (1 << 15) | (0b001 << 12) | (0 << 7) | 0b111_0011;
        let instr = decode(word);
        assert_eq!(instr.kind, InstKind::System);
        assert!(instr.writes_csr);
        assert_eq!(instr.csr, 0x7C0);
    }
}
