//! The simulated store: register file + byte-addressed memory, the
//! observable side-effect surface instructions read and write.

use crate::arch::{Architecture, Endianness, MemoryValue, RegisterIndex, SignedRepresentation};
use crate::common::Map;
use crate::error::RuntimeError;

/// The register file: one [`MemoryValue`] per declared register, sized per
/// the architecture. `x0`-like hardwired registers always read their
/// constant and silently discard writes.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    values: Map<String, MemoryValue>,
    index: RegisterIndex,
    endianness: Endianness,
}

impl RegisterFile {
    pub fn new(architecture: &Architecture) -> Self {
        let index = architecture.register_index();
        let endianness = architecture.endianness();
        let mut values = Map::new();
        for unit in &architecture.units {
            for reg in &unit.registers {
                let initial = match reg.constant {
                    Some(c) => MemoryValue::from_unsigned(c, reg.size, endianness),
                    None => MemoryValue::new(reg.size),
                };
                // All aliases resolve to the same underlying storage slot,
                // keyed by canonical id.
                values.insert(reg.id.clone(), initial);
            }
        }
        RegisterFile { values, index, endianness }
    }

    fn canonical_id(&self, name: &str) -> Result<String, RuntimeError> {
        self.index
            .get(name)
            .map(|info| info.id.clone())
            .ok_or_else(|| RuntimeError::UnknownRegister(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<MemoryValue, RuntimeError> {
        let id = self.canonical_id(name)?;
        if let Some(info) = self.index.get(name) {
            if let Some(constant) = info.constant {
                return Ok(MemoryValue::from_unsigned(constant, info.size, self.endianness));
            }
        }
        Ok(self.values.get(&id).cloned().expect("indexed register has storage"))
    }

    pub fn put(&mut self, name: &str, value: MemoryValue) -> Result<(), RuntimeError> {
        let info = self
            .index
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownRegister(name.to_string()))?
            .clone();
        if info.is_hardwired() {
            // Hardwired registers silently discard writes.
            return Ok(());
        }
        if value.bit_count() != info.size {
            return Err(RuntimeError::RegisterWidthMismatch {
                name: name.to_string(),
                expected: info.size,
                got: value.bit_count(),
            });
        }
        self.values.insert(info.id.clone(), value);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn width_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|r| r.size)
    }
}

/// Byte-addressed main memory of fixed size, allocated once at project
/// construction.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Memory { bytes: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn get_at(&self, address: u64, length: usize) -> Result<MemoryValue, RuntimeError> {
        let start = address as usize;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(RuntimeError::MemoryOutOfRange {
                address,
                length,
                memory_size: self.bytes.len(),
            })?;
        MemoryValue::from_bytes(self.bytes[start..end].to_vec(), length * 8)
            .map_err(|_| RuntimeError::MemoryOutOfRange {
                address,
                length,
                memory_size: self.bytes.len(),
            })
    }

    pub fn put_at(&mut self, address: u64, value: &MemoryValue) -> Result<(), RuntimeError> {
        let length = value.byte_len();
        let start = address as usize;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(RuntimeError::MemoryOutOfRange {
                address,
                length,
                memory_size: self.bytes.len(),
            })?;
        self.bytes[start..end].copy_from_slice(value.as_bytes());
        Ok(())
    }
}

/// Register file + memory: the side-effect target every AST node's
/// `get_value` reads from and writes to. Single-threaded and strictly
/// sequential: no two operations on a store interleave.
#[derive(Debug, Clone)]
pub struct SimulatedStore {
    registers: RegisterFile,
    memory: Memory,
    endianness: Endianness,
    signed_representation: SignedRepresentation,
}

impl SimulatedStore {
    pub fn new(architecture: &Architecture, memory_size: usize) -> Self {
        SimulatedStore {
            registers: RegisterFile::new(architecture),
            memory: Memory::new(memory_size),
            endianness: architecture.endianness(),
            signed_representation: architecture.signed_representation.0,
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn signed_representation(&self) -> SignedRepresentation {
        self.signed_representation
    }

    pub fn get_register(&self, name: &str) -> Result<MemoryValue, RuntimeError> {
        self.registers.get(name)
    }

    pub fn put_register(&mut self, name: &str, value: MemoryValue) -> Result<(), RuntimeError> {
        self.registers.put(name, value)
    }

    pub fn get_at(&self, address: u64, length: usize) -> Result<MemoryValue, RuntimeError> {
        self.memory.get_at(address, length)
    }

    pub fn put_at(&mut self, address: u64, value: &MemoryValue) -> Result<(), RuntimeError> {
        self.memory.put_at(address, value)
    }

    pub fn memory_size(&self) -> usize {
        self.memory.size()
    }

    pub fn register_width(&self, name: &str) -> Option<usize> {
        self.registers.width_of(name)
    }

    pub fn has_register(&self, name: &str) -> bool {
        self.registers.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{ArchEndianness, AlignmentBehavior, InstructionInfo, RegisterType, Unit};
    use crate::arch::register::RegisterInfo;

    fn rv32i_architecture() -> Architecture {
        let mut arch = Architecture::new("rv32i-test");
        arch.endianness = Some(ArchEndianness::Little);
        arch.alignment = Some(AlignmentBehavior::Relaxed);
        arch.word_size = Some(32);
        arch.byte_size = Some(8);
        arch.units.push(Unit {
            name: "cpu".into(),
            registers: vec![
                RegisterInfo {
                    id: "x0".into(),
                    name: "x0".into(),
                    size: 32,
                    kind: RegisterType::Integer,
                    enclosing: None,
                    constituents: vec![],
                    aliases: vec!["zero".into()],
                    constant: Some(0),
                },
                RegisterInfo {
                    id: "x1".into(),
                    name: "x1".into(),
                    size: 32,
                    kind: RegisterType::Integer,
                    enclosing: None,
                    constituents: vec![],
                    aliases: vec![],
                    constant: None,
                },
                RegisterInfo {
                    id: "pc".into(),
                    name: "pc".into(),
                    size: 32,
                    kind: RegisterType::ProgramCounter,
                    enclosing: None,
                    constituents: vec![],
                    aliases: vec![],
                    constant: None,
                },
            ],
        });
        arch.instructions.push(InstructionInfo {
            name: "add".into(),
            key: serde_json::json!({}),
        });
        arch.validate().unwrap()
    }

    #[test]
    fn x0_always_reads_zero_and_ignores_writes() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 1024);
        store
            .put_register("x0", MemoryValue::from_unsigned(42, 32, Endianness::Little))
            .unwrap();
        let v = store.get_register("x0").unwrap();
        assert_eq!(v.to_unsigned(Endianness::Little).unwrap(), 0);
    }

    #[test]
    fn x0_is_invariant_under_zero_alias() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 1024);
        store
            .put_register("zero", MemoryValue::from_unsigned(7, 32, Endianness::Little))
            .unwrap();
        assert_eq!(store.get_register("x0").unwrap().to_unsigned(Endianness::Little).unwrap(), 0);
    }

    #[test]
    fn ordinary_register_round_trips() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 1024);
        store
            .put_register("x1", MemoryValue::from_unsigned(123, 32, Endianness::Little))
            .unwrap();
        assert_eq!(store.get_register("x1").unwrap().to_unsigned(Endianness::Little).unwrap(), 123);
    }

    #[test]
    fn memory_round_trip() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 1024);
        let value = MemoryValue::from_unsigned(0xA5, 8, Endianness::Little);
        store.put_at(16, &value).unwrap();
        let read = store.get_at(16, 1).unwrap();
        assert_eq!(read.to_unsigned(Endianness::Little).unwrap(), 0xA5);
    }

    #[test]
    fn memory_out_of_range_fails() {
        let arch = rv32i_architecture();
        let store = SimulatedStore::new(&arch, 16);
        assert!(store.get_at(15, 4).is_err());
    }

    #[test]
    fn register_width_mismatch_fails() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 16);
        let bad = MemoryValue::new(8);
        assert!(store.put_register("x1", bad).is_err());
    }
}
