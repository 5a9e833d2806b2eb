//! Maps a mnemonic to the [`InstructionKind`] that defines its semantics,
//! and builds `Instruction` nodes out of already-classified operand nodes
//! ("node factories" step). Pseudo-instructions (`nop`,
//! `li`, `j`) are expanded here into the real instruction they stand for.

use crate::common::CodePositionInterval;
use crate::error::{CompileError, CompileErrorKind, Severity};

use super::node::{BranchCond, InstructionKind, IntOp, MemWidth, Node, OpWidth};

/// Static mnemonic -> semantics table. Word size is resolved at execution
/// time from the registers actually involved, so the same `OpWidth::Native`
/// entry serves both RV32 and RV64; only the real `*w` family is pinned to
/// `OpWidth::Word32`.
fn kind_for(mnemonic: &str) -> Option<InstructionKind> {
    use BranchCond::*;
    use IntOp::*;
    use OpWidth::*;

    Some(match mnemonic {
        "add" => InstructionKind::IntRR { op: Add, width: Native },
        "sub" => InstructionKind::IntRR { op: Sub, width: Native },
        "and" => InstructionKind::IntRR { op: And, width: Native },
        "or" => InstructionKind::IntRR { op: Or, width: Native },
        "xor" => InstructionKind::IntRR { op: Xor, width: Native },
        "sll" => InstructionKind::IntRR { op: Sll, width: Native },
        "srl" => InstructionKind::IntRR { op: Srl, width: Native },
        "sra" => InstructionKind::IntRR { op: Sra, width: Native },
        "slt" => InstructionKind::IntRR { op: Slt, width: Native },
        "sltu" => InstructionKind::IntRR { op: Sltu, width: Native },
        "mul" => InstructionKind::IntRR { op: Mul, width: Native },
        "mulh" => InstructionKind::IntRR { op: Mulh, width: Native },
        "mulhu" => InstructionKind::IntRR { op: Mulhu, width: Native },
        "mulhsu" => InstructionKind::IntRR { op: Mulhsu, width: Native },
        "div" => InstructionKind::IntRR { op: Div, width: Native },
        "divu" => InstructionKind::IntRR { op: Divu, width: Native },
        "rem" => InstructionKind::IntRR { op: Rem, width: Native },
        "remu" => InstructionKind::IntRR { op: Remu, width: Native },

        "addw" => InstructionKind::IntRR { op: Add, width: Word32 },
        "subw" => InstructionKind::IntRR { op: Sub, width: Word32 },
        "sllw" => InstructionKind::IntRR { op: Sll, width: Word32 },
        "srlw" => InstructionKind::IntRR { op: Srl, width: Word32 },
        "sraw" => InstructionKind::IntRR { op: Sra, width: Word32 },
        "mulw" => InstructionKind::IntRR { op: Mul, width: Word32 },
        "divw" => InstructionKind::IntRR { op: Div, width: Word32 },
        "divuw" => InstructionKind::IntRR { op: Divu, width: Word32 },
        "remw" => InstructionKind::IntRR { op: Rem, width: Word32 },
        "remuw" => InstructionKind::IntRR { op: Remu, width: Word32 },

        "addi" => InstructionKind::IntRI { op: Add },
        "andi" => InstructionKind::IntRI { op: And },
        "ori" => InstructionKind::IntRI { op: Or },
        "xori" => InstructionKind::IntRI { op: Xor },
        "slli" => InstructionKind::IntRI { op: Sll },
        "srli" => InstructionKind::IntRI { op: Srl },
        "srai" => InstructionKind::IntRI { op: Sra },
        "slti" => InstructionKind::IntRI { op: Slt },
        "sltiu" => InstructionKind::IntRI { op: Sltu },

        "beq" => InstructionKind::Branch { cond: Eq },
        "bne" => InstructionKind::Branch { cond: Ne },
        "blt" => InstructionKind::Branch { cond: Lt },
        "bge" => InstructionKind::Branch { cond: Ge },
        "bltu" => InstructionKind::Branch { cond: LtU },
        "bgeu" => InstructionKind::Branch { cond: GeU },

        "jal" => InstructionKind::Jal,
        "jalr" => InstructionKind::Jalr,
        "lui" => InstructionKind::Lui,
        "auipc" => InstructionKind::Auipc,

        "lb" => InstructionKind::Load { width: MemWidth::Byte, zero_extend: false },
        "lbu" => InstructionKind::Load { width: MemWidth::Byte, zero_extend: true },
        "lh" => InstructionKind::Load { width: MemWidth::Half, zero_extend: false },
        "lhu" => InstructionKind::Load { width: MemWidth::Half, zero_extend: true },
        "lw" => InstructionKind::Load { width: MemWidth::Word, zero_extend: false },
        "lwu" => InstructionKind::Load { width: MemWidth::Word, zero_extend: true },
        "ld" => InstructionKind::Load { width: MemWidth::Double, zero_extend: false },

        "sb" => InstructionKind::Store { width: MemWidth::Byte },
        "sh" => InstructionKind::Store { width: MemWidth::Half },
        "sw" => InstructionKind::Store { width: MemWidth::Word },
        "sd" => InstructionKind::Store { width: MemWidth::Double },

        _ => return None,
    })
}

/// Mnemonics the architecture description never lists directly: they
/// expand into a real instruction built out of the same operand nodes the
/// generator already produced.
enum Expansion {
    /// `nop` takes no operands and expands to `addi x0, x0, 0`.
    Nop,
    /// `li rd, imm` expands to `addi rd, x0, imm`.
    Li,
    /// `j offset` expands to `jal x0, offset`.
    J,
}

fn expansion_for(mnemonic: &str) -> Option<Expansion> {
    match mnemonic {
        "nop" => Some(Expansion::Nop),
        "li" => Some(Expansion::Li),
        "j" => Some(Expansion::J),
        _ => None,
    }
}

/// Builds `Instruction` nodes from a mnemonic and its already-classified
/// operand nodes. Stateless: all the architecture-specific knowledge it
/// needs is the mnemonic-to-semantics table above, which is shared by every
/// RV32/RV64 base+M architecture this crate assembles for.
pub struct NodeFactories;

impl NodeFactories {
    pub fn build(
        mnemonic: &str,
        operands: Vec<Node>,
        position: Option<CodePositionInterval>,
    ) -> Result<Node, CompileError> {
        if let Some(expansion) = expansion_for(mnemonic) {
            return Self::build_expansion(expansion, mnemonic, operands, position);
        }
        let kind = kind_for(mnemonic).ok_or_else(|| {
            CompileError::at(
                CompileErrorKind::UnknownMnemonic(mnemonic.to_string()),
                Severity::Error,
                position.unwrap_or_default(),
            )
        })?;
        Ok(Node::Instruction {
            mnemonic: mnemonic.to_string(),
            kind,
            position,
            children: operands,
        })
    }

    fn build_expansion(
        expansion: Expansion,
        _mnemonic: &str,
        operands: Vec<Node>,
        position: Option<CodePositionInterval>,
    ) -> Result<Node, CompileError> {
        match expansion {
            Expansion::Nop => {
                if !operands.is_empty() {
                    return Err(CompileError::at(
                        CompileErrorKind::WrongOperandCount { expected: 0, got: operands.len() },
                        Severity::Error,
                        position.unwrap_or_default(),
                    ));
                }
                let zero = Node::Register("x0".to_string());
                let imm = Node::Immediate(crate::arch::MemoryValue::new(32));
                Ok(Node::Instruction {
                    mnemonic: "addi".to_string(),
                    kind: InstructionKind::IntRI { op: IntOp::Add },
                    position,
                    children: vec![zero.clone(), zero, imm],
                })
            }
            Expansion::Li => {
                if operands.len() != 2 {
                    return Err(CompileError::at(
                        CompileErrorKind::WrongOperandCount { expected: 2, got: operands.len() },
                        Severity::Error,
                        position.unwrap_or_default(),
                    ));
                }
                let mut children = operands;
                children.insert(1, Node::Register("x0".to_string()));
                Ok(Node::Instruction {
                    mnemonic: "addi".to_string(),
                    kind: InstructionKind::IntRI { op: IntOp::Add },
                    position,
                    children,
                })
            }
            Expansion::J => {
                if operands.len() != 1 {
                    return Err(CompileError::at(
                        CompileErrorKind::WrongOperandCount { expected: 1, got: operands.len() },
                        Severity::Error,
                        position.unwrap_or_default(),
                    ));
                }
                let mut children = vec![Node::Register("x0".to_string())];
                children.extend(operands);
                Ok(Node::Instruction {
                    mnemonic: "jal".to_string(),
                    kind: InstructionKind::Jal,
                    position,
                    children,
                })
            }
        }
    }

    pub fn is_known(mnemonic: &str) -> bool {
        kind_for(mnemonic).is_some() || expansion_for(mnemonic).is_some()
    }
}
