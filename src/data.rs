//! Bundled extension-description JSON, embedded at compile time so the CLI
//! binaries and tests have a real architecture to assemble against without
//! any filesystem dependency.

pub const RV32I_JSON: &str = include_str!("data/rv32i.json");
pub const RV64I_JSON: &str = include_str!("data/rv64i.json");
pub const RV32M_JSON: &str = include_str!("data/rv32m.json");
pub const RV64M_JSON: &str = include_str!("data/rv64m.json");
