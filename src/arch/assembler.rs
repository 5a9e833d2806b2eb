//! Resolves an [`ExtensionFormula`] into a validated [`Architecture`] by
//! walking the extension dependency graph.

use std::path::{Path, PathBuf};

use crate::common::{Map, Set};
use crate::error::{ArchitectureError, ProviderError};

use super::architecture::Architecture;
use super::extension::{ExtensionFormula, ExtensionInformation, RawExtension};

/// An opaque source of extension records, keyed by extension name.
/// On-disk JSON loading is treated as an external collaborator behind this
/// trait, which is the interface the core actually consumes.
pub trait ExtensionProvider {
    fn load(&self, name: &str) -> Result<RawExtension, ProviderError>;
}

/// Looks extensions up in an in-memory map of already-parsed JSON text.
/// Used for the bundled `rv32i`/`rv64i`/`rv32m`/`rv64m` extensions embedded
/// into the binary via `include_str!`.
pub struct JsonExtensionProvider {
    sources: Map<String, String>,
}

impl JsonExtensionProvider {
    pub fn new() -> Self {
        JsonExtensionProvider { sources: Map::new() }
    }

    pub fn with_source(mut self, name: impl Into<String>, json: impl Into<String>) -> Self {
        self.sources.insert(name.into(), json.into());
        self
    }

    /// A provider pre-seeded with the bundled RV32I/RV64I/RV32M/RV64M
    /// extension data (see `src/data/`).
    pub fn bundled() -> Self {
        JsonExtensionProvider::new()
            .with_source("rv32i", crate::data::RV32I_JSON)
            .with_source("rv64i", crate::data::RV64I_JSON)
            .with_source("rv32m", crate::data::RV32M_JSON)
            .with_source("rv64m", crate::data::RV64M_JSON)
    }
}

impl Default for JsonExtensionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionProvider for JsonExtensionProvider {
    fn load(&self, name: &str) -> Result<RawExtension, ProviderError> {
        let text = self
            .sources
            .get(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
        serde_json::from_str(text).map_err(|e| ProviderError::Malformed {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Reads `<dir>/<name>.json` for user-supplied extensions.
pub struct FsExtensionProvider {
    dir: PathBuf,
}

impl FsExtensionProvider {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        FsExtensionProvider {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ExtensionProvider for FsExtensionProvider {
    fn load(&self, name: &str) -> Result<RawExtension, ProviderError> {
        let path = self.dir.join(format!("{name}.json"));
        let text = std::fs::read_to_string(&path).map_err(|e| ProviderError::Io {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Malformed {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

/// A provider that falls back from one source to another; used to layer a
/// user extension directory over the bundled defaults.
pub struct ChainedExtensionProvider<A, B> {
    primary: A,
    fallback: B,
}

impl<A: ExtensionProvider, B: ExtensionProvider> ChainedExtensionProvider<A, B> {
    pub fn new(primary: A, fallback: B) -> Self {
        ChainedExtensionProvider { primary, fallback }
    }
}

impl<A: ExtensionProvider, B: ExtensionProvider> ExtensionProvider for ChainedExtensionProvider<A, B> {
    fn load(&self, name: &str) -> Result<RawExtension, ProviderError> {
        match self.primary.load(name) {
            Ok(ext) => Ok(ext),
            Err(_) => self.fallback.load(name),
        }
    }
}

/// Resolves an [`ExtensionFormula`] into a validated [`Architecture`],
/// tolerating cycles in the extension dependency graph by treating
/// back-edges (a name already on the current recursion path) as no-ops.
pub struct ExtensionAssembler<'p, P: ExtensionProvider> {
    provider: &'p P,
    /// Completed-extensions memo: name -> fully resolved extension.
    hull: Map<String, ExtensionInformation>,
    /// Names on the current recursion path, used to detect and skip
    /// back-edges.
    stack: Set<String>,
}

impl<'p, P: ExtensionProvider> ExtensionAssembler<'p, P> {
    pub fn new(provider: &'p P) -> Self {
        ExtensionAssembler {
            provider,
            hull: Map::new(),
            stack: Set::new(),
        }
    }

    /// Resolve one extension (and transitively, its dependencies) into the
    /// hull, returning the resolved information.
    fn resolve(&mut self, name: &str) -> Result<ExtensionInformation, ArchitectureError> {
        if let Some(cached) = self.hull.get(name) {
            tracing::debug!(extension = name, "extension already resolved, using cache");
            return Ok(cached.clone());
        }

        self.stack.insert(name.to_string());
        let raw = self.provider.load(name)?;

        let mut merged = ExtensionInformation::default();
        for dep in &raw.extends {
            if self.stack.contains(dep) {
                tracing::warn!(
                    extension = name,
                    dependency = dep,
                    "cyclic extension dependency, skipping back-edge"
                );
                continue;
            }
            let resolved_dep = self.resolve(dep)?;
            merged.merge_from(&resolved_dep);
        }

        if raw.reset_instructions {
            merged.instructions.clear();
        }
        if raw.reset_units {
            merged.units.clear();
        }

        let own: ExtensionInformation = raw.information.into();
        merged.merge_from(&own);

        self.hull.insert(name.to_string(), merged.clone());
        self.stack.remove(name);
        Ok(merged)
    }

    /// Assemble the formula into a validated architecture.
    pub fn assemble(mut self, formula: &ExtensionFormula) -> Result<Architecture, ArchitectureError> {
        let mut combined = ExtensionInformation::default();
        for name in &formula.extensions {
            let resolved = self.resolve(name)?;
            combined.merge_from(&resolved);
        }

        let mut architecture = Architecture::new(formula.architecture_name.clone());
        architecture.endianness = combined.endianness;
        architecture.alignment = combined.alignment_behavior;
        architecture.word_size = combined.word_size;
        architecture.byte_size = combined.byte_size;
        architecture.units = combined.units;
        architecture.instructions = combined.instructions;

        architecture.validate()
    }
}
