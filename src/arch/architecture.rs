//! The assembled, validated ISA description.

use serde::{Deserialize, Serialize};

use super::memory_value::{Endianness as ValueEndianness, SignedRepresentation};
use super::register::{RegisterIndex, RegisterInfo, Unit};
use crate::error::ArchitectureError;

/// Alignment enforcement policy for memory accesses and section layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentBehavior {
    Strict,
    Relaxed,
}

/// Endianness as it appears in the architecture description (a superset of
/// [`ValueEndianness`] purely for (de)serialization naming).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchEndianness {
    Little,
    Big,
    Mixed,
    Bi,
}

impl From<ArchEndianness> for ValueEndianness {
    fn from(e: ArchEndianness) -> Self {
        match e {
            ArchEndianness::Little => ValueEndianness::Little,
            ArchEndianness::Big => ValueEndianness::Big,
            ArchEndianness::Mixed => ValueEndianness::Mixed,
            ArchEndianness::Bi => ValueEndianness::Bi,
        }
    }
}

/// An instruction's name and its opaque key (opcode/function fields, not
/// interpreted by the architecture layer itself).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionInfo {
    pub name: String,
    pub key: serde_json::Value,
}

/// The assembled architecture. Exists either `Open` (mutable, used only
/// while [`super::assembler::ExtensionAssembler`] is merging extensions) or
/// `Validated` (frozen, returned to callers) — the builder/validate pattern
/// modeled as a single type with an internal flag rather than two separate
/// types, since both expose the same read surface.
#[derive(Clone, Debug, Default)]
pub struct Architecture {
    pub name: String,
    pub endianness: Option<ArchEndianness>,
    pub alignment: Option<AlignmentBehavior>,
    pub signed_representation: SignedRepresentation_,
    pub word_size: Option<usize>,
    pub byte_size: Option<usize>,
    pub units: Vec<Unit>,
    pub instructions: Vec<InstructionInfo>,
    frozen: bool,
}

/// Newtype so `Architecture` can derive `Default` even though
/// `SignedRepresentation` itself has no natural default; RISC-V's integer
/// ABI is two's complement, used unless an extension overrides it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignedRepresentation_(pub SignedRepresentation);

impl Default for SignedRepresentation_ {
    fn default() -> Self {
        SignedRepresentation_(SignedRepresentation::TwosComplement)
    }
}

impl Architecture {
    pub fn new(name: impl Into<String>) -> Self {
        Architecture {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn register_index(&self) -> RegisterIndex {
        RegisterIndex::build(&self.units)
    }

    pub fn find_instruction(&self, name: &str) -> Option<&InstructionInfo> {
        self.instructions.iter().find(|i| i.name == name)
    }

    pub fn find_register(&self, name: &str) -> Option<&RegisterInfo> {
        self.units.iter().find_map(|u| u.find(name))
    }

    pub fn word_size(&self) -> usize {
        self.word_size.unwrap_or(32)
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size.unwrap_or(8)
    }

    pub fn endianness(&self) -> ValueEndianness {
        self.endianness.map(ValueEndianness::from).unwrap_or(ValueEndianness::Little)
    }

    pub fn alignment(&self) -> AlignmentBehavior {
        self.alignment.unwrap_or(AlignmentBehavior::Relaxed)
    }

    /// Validate invariants and freeze. Requires: all four scalars set; at
    /// least one unit with at least one register; at least one instruction;
    /// all enclosing/constituent references resolve and fit.
    pub fn validate(mut self) -> Result<Architecture, ArchitectureError> {
        if self.endianness.is_none()
            || self.alignment.is_none()
            || self.word_size.is_none()
            || self.byte_size.is_none()
        {
            return Err(ArchitectureError::Incomplete(
                "endianness, alignment, word size and byte size must all be set".into(),
            ));
        }
        if !self.units.iter().any(|u| !u.registers.is_empty()) {
            return Err(ArchitectureError::Incomplete(
                "at least one unit with at least one register is required".into(),
            ));
        }
        if self.instructions.is_empty() {
            return Err(ArchitectureError::Incomplete(
                "at least one instruction is required".into(),
            ));
        }

        let mut by_id = std::collections::HashMap::new();
        for unit in &self.units {
            for reg in &unit.registers {
                by_id.insert(reg.id.clone(), reg.clone());
            }
        }
        for unit in &self.units {
            for reg in &unit.registers {
                if let Some(enclosing) = &reg.enclosing {
                    let parent = by_id.get(enclosing).ok_or_else(|| {
                        ArchitectureError::UnknownEnclosing {
                            register: reg.id.clone(),
                            enclosing: enclosing.clone(),
                        }
                    })?;
                    if parent.size < reg.size {
                        return Err(ArchitectureError::ConstituentOutOfRange {
                            enclosing: enclosing.clone(),
                            child: reg.id.clone(),
                            offset: 0,
                            width: parent.size,
                        });
                    }
                }
                for constituent in &reg.constituents {
                    let child = by_id.get(&constituent.id).ok_or_else(|| {
                        ArchitectureError::UnknownEnclosing {
                            register: reg.id.clone(),
                            enclosing: constituent.id.clone(),
                        }
                    })?;
                    if constituent.bit_offset + child.size > reg.size {
                        return Err(ArchitectureError::ConstituentOutOfRange {
                            enclosing: reg.id.clone(),
                            child: constituent.id.clone(),
                            offset: constituent.bit_offset,
                            width: reg.size,
                        });
                    }
                }
            }
        }

        self.frozen = true;
        Ok(self)
    }
}
