//! The instruction AST: a tagged sum of node variants, each owning its
//! children in a vector, dispatched on with exhaustive matches rather than
//! a class hierarchy with virtual dispatch. `validate`/`get_value` are
//! the two operations every node supports: structural/range checking and
//! execution against a store.

use crate::arch::{Endianness, MemoryValue, SignedRepresentation};
use crate::common::CodePositionInterval;
use crate::error::{CompileError, CompileErrorKind, RuntimeError, Severity};
use crate::store::SimulatedStore;

/// Arithmetic/logic operations shared by register-register and
/// register-immediate instruction families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sra,
    Slt,
    Sltu,
    Mul,
    Mulh,
    Mulhu,
    Mulhsu,
    Div,
    Divu,
    Rem,
    Remu,
}

/// Whether a register-register operation computes at the architecture's
/// native word width, or truncates to 32 bits and sign-extends the result
/// back up (the RV64 `*w` family).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpWidth {
    Native,
    Word32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchCond {
    Eq,
    Ne,
    Lt,
    Ge,
    LtU,
    GeU,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemWidth {
    Byte,
    Half,
    Word,
    Double,
}

impl MemWidth {
    pub fn bytes(self) -> usize {
        match self {
            MemWidth::Byte => 1,
            MemWidth::Half => 2,
            MemWidth::Word => 4,
            MemWidth::Double => 8,
        }
    }
}

/// Which semantic family an `Instruction` node belongs to, and the data that
/// varies across architectures (native word width is read from the
/// registers involved, not stored here).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionKind {
    IntRR { op: IntOp, width: OpWidth },
    IntRI { op: IntOp },
    Branch { cond: BranchCond },
    Jal,
    Jalr,
    Lui,
    Auipc,
    Load { width: MemWidth, zero_extend: bool },
    Store { width: MemWidth },
}

/// An AST node. `Instruction` owns its children (destination first if
/// present, then sources, immediate last, per RISC-V assembly convention);
/// `Register`/`Immediate`/`Data` are leaves.
#[derive(Clone, Debug)]
pub enum Node {
    Instruction {
        mnemonic: String,
        kind: InstructionKind,
        position: Option<CodePositionInterval>,
        children: Vec<Node>,
    },
    Register(String),
    Immediate(MemoryValue),
    Data(Vec<u8>),
}

fn mask64(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

fn i_min(width: u32) -> i64 {
    if width >= 64 {
        i64::MIN
    } else {
        -(1i64 << (width - 1))
    }
}

#[allow(clippy::too_many_arguments)]
fn compute_int_op(op: IntOp, a_u: u64, a_s: i64, b_u: u64, b_s: i64, op_width: u32) -> u64 {
    let m = mask64(op_width);
    match op {
        IntOp::Add => a_u.wrapping_add(b_u) & m,
        IntOp::Sub => a_u.wrapping_sub(b_u) & m,
        IntOp::And => a_u & b_u,
        IntOp::Or => a_u | b_u,
        IntOp::Xor => a_u ^ b_u,
        IntOp::Sll => {
            let shamt = (b_u as u32) & (op_width - 1);
            a_u.wrapping_shl(shamt) & m
        }
        IntOp::Srl => {
            let shamt = (b_u as u32) & (op_width - 1);
            (a_u & m).wrapping_shr(shamt)
        }
        IntOp::Sra => {
            let shamt = (b_u as u32) & (op_width - 1);
            let shifted = a_s.wrapping_shr(shamt);
            (shifted as u64) & m
        }
        IntOp::Slt => (a_s < b_s) as u64,
        IntOp::Sltu => (a_u < b_u) as u64,
        IntOp::Mul => a_u.wrapping_mul(b_u) & m,
        IntOp::Mulh => {
            let prod = (a_s as i128).wrapping_mul(b_s as i128);
            ((prod >> op_width) as u64) & m
        }
        IntOp::Mulhu => {
            let prod = (a_u as u128).wrapping_mul(b_u as u128);
            ((prod >> op_width) as u64) & m
        }
        IntOp::Mulhsu => {
            let prod = (a_s as i128).wrapping_mul(b_u as i128);
            ((prod >> op_width) as u64) & m
        }
        IntOp::Div => {
            if b_s == 0 {
                m
            } else if a_s == i_min(op_width) && b_s == -1 {
                a_u & m
            } else {
                ((a_s / b_s) as u64) & m
            }
        }
        IntOp::Divu => {
            if b_u == 0 {
                m
            } else {
                (a_u / b_u) & m
            }
        }
        IntOp::Rem => {
            if b_s == 0 {
                a_u & m
            } else if a_s == i_min(op_width) && b_s == -1 {
                0
            } else {
                ((a_s % b_s) as u64) & m
            }
        }
        IntOp::Remu => {
            if b_u == 0 {
                a_u & m
            } else {
                (a_u % b_u) & m
            }
        }
    }
}

fn invalid_type(index: usize, message: impl Into<String>) -> CompileError {
    CompileError::new(
        CompileErrorKind::WrongOperandType {
            index,
            message: message.into(),
        },
        Severity::Error,
    )
}

fn wrong_count(expected: usize, got: usize) -> CompileError {
    CompileError::new(CompileErrorKind::WrongOperandCount { expected, got }, Severity::Error)
}

fn out_of_range(value: i64, bits: u32) -> CompileError {
    CompileError::new(CompileErrorKind::ImmediateOutOfRange { value, bits }, Severity::Error)
}

fn fits_signed(value: i64, bits: u32) -> bool {
    let min = i_min(bits);
    let max = -min - 1;
    value >= min && value <= max
}

fn fits_unsigned(value: i64, bits: u32) -> bool {
    value >= 0 && (value as u64) <= mask64(bits)
}

impl Node {
    pub fn new_instruction(mnemonic: impl Into<String>, kind: InstructionKind) -> Self {
        Node::Instruction {
            mnemonic: mnemonic.into(),
            kind,
            position: None,
            children: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: CodePositionInterval) -> Self {
        if let Node::Instruction { position: p, .. } = &mut self {
            *p = Some(position);
        }
        self
    }

    pub fn identifier(&self) -> String {
        match self {
            Node::Instruction { mnemonic, .. } => mnemonic.clone(),
            Node::Register(name) => name.clone(),
            Node::Immediate(_) => "imm".to_string(),
            Node::Data(_) => "data".to_string(),
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Instruction { children, .. } => children,
            _ => &[],
        }
    }

    pub fn add_child(&mut self, child: Node) {
        if let Node::Instruction { children, .. } = self {
            children.push(child);
        }
    }

    pub fn set_child(&mut self, index: usize, child: Node) {
        if let Node::Instruction { children, .. } = self {
            children[index] = child;
        }
    }

    fn position(&self) -> Option<CodePositionInterval> {
        match self {
            Node::Instruction { position, .. } => *position,
            _ => None,
        }
    }

    fn localize(&self, mut error: CompileError) -> CompileError {
        if error.position.is_none() {
            error.position = self.position();
        }
        error
    }

    fn immediate_value(child: &Node) -> Option<&MemoryValue> {
        match child {
            Node::Immediate(v) => Some(v),
            _ => None,
        }
    }

    fn register_name(child: &Node) -> Option<&str> {
        match child {
            Node::Register(name) => Some(name),
            _ => None,
        }
    }

    /// Structural + range validation, per instruction family.
    pub fn validate(&self, store: &SimulatedStore) -> Result<(), CompileError> {
        match self {
            Node::Register(name) => {
                if !store.has_register(name) {
                    return Err(self.localize(CompileError::new(
                        CompileErrorKind::InvalidRegister(name.clone()),
                        Severity::Error,
                    )));
                }
                Ok(())
            }
            Node::Immediate(_) | Node::Data(_) => Ok(()),
            Node::Instruction { kind, children, .. } => self.validate_instruction(kind, children, store),
        }
    }

    fn validate_instruction(
        &self,
        kind: &InstructionKind,
        children: &[Node],
        store: &SimulatedStore,
    ) -> Result<(), CompileError> {
        let check_register = |index: usize| -> Result<&str, CompileError> {
            let child = children.get(index).ok_or_else(|| wrong_count(index + 1, children.len()))?;
            let name = Self::register_name(child)
                .ok_or_else(|| invalid_type(index, "expected a register operand"))?;
            if !store.has_register(name) {
                return Err(CompileError::new(
                    CompileErrorKind::InvalidRegister(name.to_string()),
                    Severity::Error,
                ));
            }
            Ok(name)
        };
        let check_immediate = |index: usize| -> Result<i64, CompileError> {
            let child = children.get(index).ok_or_else(|| wrong_count(index + 1, children.len()))?;
            let v = Self::immediate_value(child)
                .ok_or_else(|| invalid_type(index, "expected an immediate operand"))?;
            v.to_signed(Endianness::Little, SignedRepresentation::TwosComplement)
                .map_err(|_| invalid_type(index, "immediate does not decode"))
        };

        let result: Result<(), CompileError> = (|| match kind {
            InstructionKind::IntRR { .. } => {
                if children.len() != 3 {
                    return Err(wrong_count(3, children.len()));
                }
                check_register(0)?;
                check_register(1)?;
                check_register(2)?;
                Ok(())
            }
            InstructionKind::IntRI { op } => {
                if children.len() != 3 {
                    return Err(wrong_count(3, children.len()));
                }
                check_register(0)?;
                let rs1 = check_register(1)?;
                let imm = check_immediate(2)?;
                let native_width = store.register_width(rs1).unwrap_or(32) as u32;
                let shift_bits = if native_width > 32 { 6 } else { 5 };
                let ok = match op {
                    IntOp::Sll | IntOp::Srl | IntOp::Sra => fits_unsigned(imm, shift_bits),
                    _ => fits_signed(imm, 12),
                };
                if !ok {
                    let bits = match op {
                        IntOp::Sll | IntOp::Srl | IntOp::Sra => shift_bits,
                        _ => 12,
                    };
                    return Err(out_of_range(imm, bits));
                }
                Ok(())
            }
            InstructionKind::Branch { .. } => {
                if children.len() != 3 {
                    return Err(wrong_count(3, children.len()));
                }
                check_register(0)?;
                check_register(1)?;
                let imm = check_immediate(2)?;
                if !fits_signed(imm, 12) {
                    return Err(out_of_range(imm, 12));
                }
                Ok(())
            }
            InstructionKind::Jal => {
                if children.len() != 2 {
                    return Err(wrong_count(2, children.len()));
                }
                check_register(0)?;
                let imm = check_immediate(1)?;
                if !fits_signed(imm, 20) {
                    return Err(out_of_range(imm, 20));
                }
                Ok(())
            }
            InstructionKind::Jalr => {
                if children.len() != 3 {
                    return Err(wrong_count(3, children.len()));
                }
                check_register(0)?;
                check_register(1)?;
                let imm = check_immediate(2)?;
                if !fits_signed(imm, 12) {
                    return Err(out_of_range(imm, 12));
                }
                Ok(())
            }
            InstructionKind::Lui | InstructionKind::Auipc => {
                if children.len() != 2 {
                    return Err(wrong_count(2, children.len()));
                }
                check_register(0)?;
                let imm = check_immediate(1)?;
                if !fits_unsigned(imm, 20) {
                    return Err(out_of_range(imm, 20));
                }
                Ok(())
            }
            InstructionKind::Load { .. } | InstructionKind::Store { .. } => {
                if children.len() != 3 {
                    return Err(wrong_count(3, children.len()));
                }
                check_register(0)?;
                check_register(1)?;
                let imm = check_immediate(2)?;
                if !fits_signed(imm, 12) {
                    return Err(out_of_range(imm, 12));
                }
                Ok(())
            }
        })();
        result.map_err(|e| self.localize(e))
    }

    /// Execute the node, writing its side effects to `store`.
    ///
    /// For leaves, returns the leaf's own value. For an `Instruction` node,
    /// performs the family's defined side effects, advances or redirects
    /// `pc` in `store`, and returns the resulting `pc` value.
    pub fn get_value(&self, store: &mut SimulatedStore) -> Result<MemoryValue, RuntimeError> {
        match self {
            Node::Register(name) => store.get_register(name),
            Node::Immediate(v) => Ok(v.clone()),
            Node::Data(bytes) => {
                MemoryValue::from_bytes(bytes.clone(), bytes.len() * 8).map_err(|_| RuntimeError::MemoryOutOfRange {
                    address: 0,
                    length: bytes.len(),
                    memory_size: bytes.len(),
                })
            }
            Node::Instruction { kind, children, .. } => {
                let pc_before = store.get_register("pc").ok().and_then(|v| v.to_unsigned(store.endianness()).ok());
                tracing::trace!(?kind, pc = pc_before, "executing instruction");
                self.exec_instruction(kind, children, store)
            }
        }
    }

    fn advance_pc(store: &mut SimulatedStore) -> Result<MemoryValue, RuntimeError> {
        let pc = store.get_register("pc")?;
        let width = pc.bit_count() as u32;
        let pc_u = pc.to_unsigned(store.endianness())?;
        let new_pc = pc_u.wrapping_add(4) & mask64(width);
        let value = MemoryValue::from_unsigned(new_pc, width as usize, store.endianness());
        store.put_register("pc", value.clone())?;
        Ok(value)
    }

    fn set_pc(store: &mut SimulatedStore, new_pc: u64) -> Result<MemoryValue, RuntimeError> {
        let width = store.register_width("pc").unwrap_or(32) as u32;
        if width < 64 && new_pc > mask64(width) {
            return Err(RuntimeError::ProgramCounterOutOfRange(new_pc));
        }
        let value = MemoryValue::from_unsigned(new_pc & mask64(width), width as usize, store.endianness());
        store.put_register("pc", value.clone())?;
        Ok(value)
    }

    fn exec_instruction(
        &self,
        kind: &InstructionKind,
        children: &[Node],
        store: &mut SimulatedStore,
    ) -> Result<MemoryValue, RuntimeError> {
        match kind {
            InstructionKind::IntRR { op, width } => {
                let rd = Self::register_name(&children[0]).unwrap();
                let rs1 = Self::register_name(&children[1]).unwrap();
                let rs2 = Self::register_name(&children[2]).unwrap();
                let native_width = store.register_width(rs1).ok_or_else(|| RuntimeError::UnknownRegister(rs1.to_string()))? as u32;
                let op_width = match width {
                    OpWidth::Native => native_width,
                    OpWidth::Word32 => 32,
                };
                let a = store.get_register(rs1)?;
                let b = store.get_register(rs2)?;
                let a_u = a.to_unsigned(store.endianness())? & mask64(op_width);
                let b_u = b.to_unsigned(store.endianness())? & mask64(op_width);
                let a_s = sign_extend(a_u, op_width);
                let b_s = sign_extend(b_u, op_width);
                let result = compute_int_op(*op, a_u, a_s, b_u, b_s, op_width);
                let final_value = match width {
                    OpWidth::Native => result,
                    OpWidth::Word32 => (sign_extend(result, 32) as u64) & mask64(native_width),
                };
                let rd_width = store.register_width(rd).unwrap_or(native_width as usize) as u32;
                let value = MemoryValue::from_unsigned(final_value & mask64(rd_width), rd_width as usize, store.endianness());
                store.put_register(rd, value)?;
                Self::advance_pc(store)
            }
            InstructionKind::IntRI { op } => {
                let rd = Self::register_name(&children[0]).unwrap();
                let rs1 = Self::register_name(&children[1]).unwrap();
                let imm = Self::immediate_value(&children[2]).unwrap();
                let op_width = store.register_width(rs1).ok_or_else(|| RuntimeError::UnknownRegister(rs1.to_string()))? as u32;
                let a_u = store.get_register(rs1)?.to_unsigned(store.endianness())? & mask64(op_width);
                let a_s = sign_extend(a_u, op_width);
                let imm_s = imm.to_signed(store.endianness(), SignedRepresentation::TwosComplement)?;
                let b_u = (imm_s as u64) & mask64(op_width);
                let b_s = sign_extend(b_u, op_width);
                let result = compute_int_op(*op, a_u, a_s, b_u, b_s, op_width);
                let rd_width = store.register_width(rd).unwrap_or(op_width as usize) as u32;
                let value = MemoryValue::from_unsigned(result & mask64(rd_width), rd_width as usize, store.endianness());
                store.put_register(rd, value)?;
                Self::advance_pc(store)
            }
            InstructionKind::Branch { cond } => {
                let rs1 = Self::register_name(&children[0]).unwrap();
                let rs2 = Self::register_name(&children[1]).unwrap();
                let imm = Self::immediate_value(&children[2]).unwrap();
                let width = store.register_width(rs1).ok_or_else(|| RuntimeError::UnknownRegister(rs1.to_string()))? as u32;
                let a = store.get_register(rs1)?;
                let b = store.get_register(rs2)?;
                let a_u = a.to_unsigned(store.endianness())?;
                let b_u = b.to_unsigned(store.endianness())?;
                let a_s = sign_extend(a_u, width);
                let b_s = sign_extend(b_u, width);
                let taken = match cond {
                    BranchCond::Eq => a_u == b_u,
                    BranchCond::Ne => a_u != b_u,
                    BranchCond::Lt => a_s < b_s,
                    BranchCond::Ge => a_s >= b_s,
                    BranchCond::LtU => a_u < b_u,
                    BranchCond::GeU => a_u >= b_u,
                };
                let pc_u = store.get_register("pc")?.to_unsigned(store.endianness())?;
                let offset = imm.to_signed(store.endianness(), SignedRepresentation::TwosComplement)?;
                let new_pc = if taken {
                    (pc_u as i64).wrapping_add(offset.wrapping_mul(2)) as u64
                } else {
                    pc_u.wrapping_add(4)
                };
                Self::set_pc(store, new_pc)
            }
            InstructionKind::Jal => {
                let rd = Self::register_name(&children[0]).unwrap();
                let imm = Self::immediate_value(&children[1]).unwrap();
                let pc = store.get_register("pc")?;
                let pc_width = pc.bit_count() as u32;
                let pc_u = pc.to_unsigned(store.endianness())?;
                let link = MemoryValue::from_unsigned(pc_u.wrapping_add(4) & mask64(pc_width), pc_width as usize, store.endianness());
                store.put_register(rd, link)?;
                let offset = imm.to_signed(store.endianness(), SignedRepresentation::TwosComplement)?;
                let new_pc = (pc_u as i64).wrapping_add(offset.wrapping_mul(2)) as u64;
                Self::set_pc(store, new_pc)
            }
            InstructionKind::Jalr => {
                let rd = Self::register_name(&children[0]).unwrap();
                let rs1 = Self::register_name(&children[1]).unwrap();
                let imm = Self::immediate_value(&children[2]).unwrap();
                let pc = store.get_register("pc")?;
                let pc_width = pc.bit_count() as u32;
                let pc_u = pc.to_unsigned(store.endianness())?;
                let link = MemoryValue::from_unsigned(pc_u.wrapping_add(4) & mask64(pc_width), pc_width as usize, store.endianness());
                let rs1_u = store.get_register(rs1)?.to_unsigned(store.endianness())?;
                let offset = imm.to_signed(store.endianness(), SignedRepresentation::TwosComplement)?;
                let target = ((rs1_u as i64).wrapping_add(offset) as u64) & !1u64;
                store.put_register(rd, link)?;
                Self::set_pc(store, target)
            }
            InstructionKind::Lui => {
                let rd = Self::register_name(&children[0]).unwrap();
                let imm = Self::immediate_value(&children[1]).unwrap();
                let imm_u = imm.to_unsigned(store.endianness())?;
                let intermediate32 = (imm_u << 12) & 0xFFFF_FFFF;
                let rd_width = store.register_width(rd).unwrap_or(32) as u32;
                let extended = if rd_width > 32 {
                    (sign_extend(intermediate32, 32) as u64) & mask64(rd_width)
                } else {
                    intermediate32 & mask64(rd_width)
                };
                let value = MemoryValue::from_unsigned(extended, rd_width as usize, store.endianness());
                store.put_register(rd, value)?;
                Self::advance_pc(store)
            }
            InstructionKind::Auipc => {
                let rd = Self::register_name(&children[0]).unwrap();
                let imm = Self::immediate_value(&children[1]).unwrap();
                let imm_u = imm.to_unsigned(store.endianness())?;
                let intermediate32 = (imm_u << 12) & 0xFFFF_FFFF;
                let rd_width = store.register_width(rd).unwrap_or(32) as u32;
                let extended = if rd_width > 32 {
                    (sign_extend(intermediate32, 32) as u64) & mask64(rd_width)
                } else {
                    intermediate32 & mask64(rd_width)
                };
                let pc_u = store.get_register("pc")?.to_unsigned(store.endianness())?;
                let sum = pc_u.wrapping_add(extended) & mask64(rd_width);
                let value = MemoryValue::from_unsigned(sum, rd_width as usize, store.endianness());
                store.put_register(rd, value)?;
                Self::advance_pc(store)
            }
            InstructionKind::Load { width, zero_extend } => {
                let rd = Self::register_name(&children[0]).unwrap();
                let rs1 = Self::register_name(&children[1]).unwrap();
                let imm = Self::immediate_value(&children[2]).unwrap();
                let rs1_u = store.get_register(rs1)?.to_unsigned(store.endianness())?;
                let offset = imm.to_signed(store.endianness(), SignedRepresentation::TwosComplement)?;
                let address = (rs1_u as i64).wrapping_add(offset) as u64;
                let loaded = store.get_at(address, width.bytes())?;
                let rd_width = store.register_width(rd).unwrap_or(32) as u32;
                let raw_u = loaded.to_unsigned(store.endianness())?;
                let extended = if *zero_extend {
                    raw_u
                } else {
                    (sign_extend(raw_u, (width.bytes() * 8) as u32) as u64) & mask64(rd_width)
                };
                let value = MemoryValue::from_unsigned(extended & mask64(rd_width), rd_width as usize, store.endianness());
                store.put_register(rd, value)?;
                Self::advance_pc(store)
            }
            InstructionKind::Store { width } => {
                let rs2 = Self::register_name(&children[0]).unwrap();
                let rs1 = Self::register_name(&children[1]).unwrap();
                let imm = Self::immediate_value(&children[2]).unwrap();
                let rs1_u = store.get_register(rs1)?.to_unsigned(store.endianness())?;
                let offset = imm.to_signed(store.endianness(), SignedRepresentation::TwosComplement)?;
                let address = (rs1_u as i64).wrapping_add(offset) as u64;
                let rs2_u = store.get_register(rs2)?.to_unsigned(store.endianness())?;
                let truncated = rs2_u & mask64((width.bytes() * 8) as u32);
                let value = MemoryValue::from_unsigned(truncated, width.bytes() * 8, store.endianness());
                store.put_at(address, &value)?;
                Self::advance_pc(store)
            }
        }
    }
}
