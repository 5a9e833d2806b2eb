//! Architecture assembly: the modular ISA description loader, and the
//! bit-exact [`memory_value::MemoryValue`] primitive it and everything
//! downstream of it builds on.

pub mod architecture;
pub mod assembler;
pub mod extension;
pub mod memory_value;
pub mod register;

pub use architecture::{AlignmentBehavior, ArchEndianness, Architecture, InstructionInfo};
pub use assembler::{
    ChainedExtensionProvider, ExtensionAssembler, ExtensionProvider, FsExtensionProvider,
    JsonExtensionProvider,
};
pub use extension::{ExtensionFormula, ExtensionInformation, RawExtension, RawExtensionInformation};
pub use memory_value::{Endianness, MemoryValue, MemoryValueError, SignedRepresentation};
pub use register::{Constituent, RegisterIndex, RegisterInfo, RegisterType, Unit};
