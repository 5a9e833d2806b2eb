//! Extensions: mergeable ISA fragments, and the formula that names which
//! ones compose an architecture.

use serde::{Deserialize, Serialize};

use super::architecture::{AlignmentBehavior, ArchEndianness, InstructionInfo};
use super::register::Unit;
use crate::common::Map;

/// The wire format for one extension record, deserialized verbatim from the
/// extension-data provider. `Raw` because it is merged and
/// partially overridden before becoming part of an [`super::architecture::Architecture`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawExtensionInformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endianness: Option<ArchEndianness>,
    #[serde(default, rename = "alignment-behavior", skip_serializing_if = "Option::is_none")]
    pub alignment_behavior: Option<AlignmentBehavior>,
    #[serde(default, rename = "word-size", skip_serializing_if = "Option::is_none")]
    pub word_size: Option<usize>,
    #[serde(default, rename = "byte-size", skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<Unit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<InstructionInfo>,
    /// Informational only; never consulted by assembly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawExtension {
    pub name: String,
    #[serde(default)]
    pub information: RawExtensionInformation,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default, rename = "reset-instructions")]
    pub reset_instructions: bool,
    #[serde(default, rename = "reset-units")]
    pub reset_units: bool,
}

/// The in-memory, mergeable form of an extension used during assembly.
#[derive(Clone, Debug, Default)]
pub struct ExtensionInformation {
    pub endianness: Option<ArchEndianness>,
    pub alignment_behavior: Option<AlignmentBehavior>,
    pub word_size: Option<usize>,
    pub byte_size: Option<usize>,
    pub units: Vec<Unit>,
    pub instructions: Vec<InstructionInfo>,
}

impl From<RawExtensionInformation> for ExtensionInformation {
    fn from(raw: RawExtensionInformation) -> Self {
        ExtensionInformation {
            endianness: raw.endianness,
            alignment_behavior: raw.alignment_behavior,
            word_size: raw.word_size,
            byte_size: raw.byte_size,
            units: raw.units,
            instructions: raw.instructions,
        }
    }
}

impl ExtensionInformation {
    /// Merge `other` into `self` (`self <- other`, other wins on conflicts):
    /// scalars present in `other` replace `self`'s; instructions are
    /// appended; units merge by name, registers union with later id winning.
    pub fn merge_from(&mut self, other: &ExtensionInformation) {
        if other.endianness.is_some() {
            self.endianness = other.endianness;
        }
        if other.alignment_behavior.is_some() {
            self.alignment_behavior = other.alignment_behavior;
        }
        if other.word_size.is_some() {
            self.word_size = other.word_size;
        }
        if other.byte_size.is_some() {
            self.byte_size = other.byte_size;
        }
        self.instructions.extend(other.instructions.iter().cloned());

        let mut units_by_name: Map<String, Unit> = self
            .units
            .drain(..)
            .map(|u| (u.name.clone(), u))
            .collect();
        for unit in &other.units {
            match units_by_name.get_mut(&unit.name) {
                Some(existing) => existing.merge_from(unit),
                None => {
                    units_by_name.insert(unit.name.clone(), unit.clone());
                }
            }
        }
        self.units = units_by_name.into_values().collect();
    }
}

/// (architecture name, ordered list of extension names, first is the base).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionFormula {
    pub architecture_name: String,
    pub extensions: Vec<String>,
}

impl ExtensionFormula {
    pub fn new(architecture_name: impl Into<String>, extensions: Vec<String>) -> Self {
        ExtensionFormula {
            architecture_name: architecture_name.into(),
            extensions,
        }
    }

    /// Parse a comma-separated list like `rv32i,rv32m` (base first).
    pub fn parse(architecture_name: impl Into<String>, formula: &str) -> Self {
        let extensions = formula
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        ExtensionFormula::new(architecture_name, extensions)
    }

    pub fn base(&self) -> Option<&str> {
        self.extensions.first().map(|s| s.as_str())
    }
}
