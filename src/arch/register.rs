//! Register and unit descriptions.

use serde::{Deserialize, Serialize};

use crate::common::Map;

/// The purpose a register serves. Only `Integer` and `ProgramCounter` are
/// exercised by the RV32I/RV64I/M subset this interpreter executes, but the
/// full set is part of the architecture description format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegisterType {
    Integer,
    Float,
    Vector,
    Flag,
    Link,
    ProgramCounter,
}

/// A sub-register exposed by bit-range inside an enclosing register.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constituent {
    pub id: String,
    /// Bit offset of this constituent within the enclosing register.
    #[serde(rename = "enclosing-index")]
    pub bit_offset: usize,
}

/// A single architectural register.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInfo {
    pub id: String,
    pub name: String,
    /// Width in bits.
    pub size: usize,
    #[serde(rename = "type")]
    pub kind: RegisterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constituents: Vec<Constituent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// A hardwired constant value (e.g. `x0` is always zero); reads return
    /// this value and writes are silently discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<u64>,
}

impl RegisterInfo {
    pub fn is_hardwired(&self) -> bool {
        self.constant.is_some()
    }

    /// All names this register answers to: its id, its declared name, and
    /// its aliases.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str())
            .chain(std::iter::once(self.name.as_str()))
            .chain(self.aliases.iter().map(|s| s.as_str()))
    }
}

/// A named collection of registers (e.g. the integer file, the FPU).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub registers: Vec<RegisterInfo>,
}

impl Unit {
    /// Merge `other` into `self`: union of registers, later id wins.
    pub fn merge_from(&mut self, other: &Unit) {
        let mut by_id: Map<String, RegisterInfo> = self
            .registers
            .drain(..)
            .map(|r| (r.id.clone(), r))
            .collect();
        for reg in &other.registers {
            by_id.insert(reg.id.clone(), reg.clone());
        }
        self.registers = by_id.into_values().collect();
    }

    pub fn find(&self, name: &str) -> Option<&RegisterInfo> {
        self.registers.iter().find(|r| r.all_names().any(|n| n == name))
    }
}

/// A convenience index: register name (any alias) -> owning unit name + info.
#[derive(Clone, Debug, Default)]
pub struct RegisterIndex {
    by_name: Map<String, (String, RegisterInfo)>,
}

impl RegisterIndex {
    pub fn build(units: &[Unit]) -> Self {
        let mut by_name = Map::new();
        for unit in units {
            for reg in &unit.registers {
                for name in reg.all_names() {
                    by_name.insert(name.to_string(), (unit.name.clone(), reg.clone()));
                }
            }
        }
        RegisterIndex { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&RegisterInfo> {
        self.by_name.get(name).map(|(_, r)| r)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
