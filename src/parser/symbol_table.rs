//! The symbol table: labels (bound to addresses during allocation) and
//! `.equ` constants (bound to expressions that may reference other symbols
//! defined later in the file). Resolution runs to a fixed point, bounded at
//! a default of 16 passes.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::{CodePositionInterval, Map, PositionedString};
use crate::error::{CompileError, CompileErrorKind, Severity};

use super::expr::ExpressionCompiler;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const MAX_RESOLUTION_PASSES: usize = 16;

fn validate_name(name: &str, position: CodePositionInterval) -> Result<(), CompileError> {
    if IDENT_RE.is_match(name) {
        Ok(())
    } else {
        Err(CompileError::at(
            CompileErrorKind::BadIdentifier(name.to_string()),
            Severity::Error,
            position,
        ))
    }
}

/// Maps symbol names to resolved integer values. Labels are entered
/// pre-resolved (their address is already known once the allocator has
/// run); `.equ` constants are entered as pending expression text and
/// resolved transitively via [`SymbolTable::resolve_all`].
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    resolved: Map<String, i64>,
    pending: Vec<(String, PositionedString)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    fn already_defined(&self, name: &str) -> bool {
        self.resolved.contains_key(name) || self.pending.iter().any(|(n, _)| n == name)
    }

    pub fn define_label(&mut self, name: &str, address: i64, position: CodePositionInterval) -> Result<(), CompileError> {
        validate_name(name, position)?;
        if self.already_defined(name) {
            return Err(CompileError::at(CompileErrorKind::DuplicateSymbol(name.to_string()), Severity::Error, position));
        }
        self.resolved.insert(name.to_string(), address);
        Ok(())
    }

    pub fn define_constant(&mut self, name: &str, expression: PositionedString) -> Result<(), CompileError> {
        let position = expression.interval();
        validate_name(name, position)?;
        if self.already_defined(name) {
            return Err(CompileError::at(CompileErrorKind::DuplicateSymbol(name.to_string()), Severity::Error, position));
        }
        self.pending.push((name.to_string(), expression));
        Ok(())
    }

    /// Repeatedly try to evaluate every pending constant's expression
    /// against the currently resolved set, promoting any that succeed,
    /// until either nothing is left pending or the pass budget runs out.
    pub fn resolve_all(&mut self) -> Result<(), CompileError> {
        for _ in 0..MAX_RESOLUTION_PASSES {
            if self.pending.is_empty() {
                return Ok(());
            }
            let round = std::mem::take(&mut self.pending);
            let mut progressed = false;
            for (name, expression) in round {
                match ExpressionCompiler::new(&self.resolved).evaluate(expression.text(), expression.interval()) {
                    Ok(value) => {
                        self.resolved.insert(name, value);
                        progressed = true;
                    }
                    Err(_) => self.pending.push((name, expression)),
                }
            }
            if !progressed {
                break;
            }
        }
        if let Some((_, expression)) = self.pending.first() {
            return Err(CompileError::at(
                CompileErrorKind::SymbolReplacementDepthExceeded(MAX_RESOLUTION_PASSES),
                Severity::Error,
                expression.interval(),
            ));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.resolved.get(name).copied()
    }

    pub fn as_map(&self) -> &Map<String, i64> {
        &self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(text: &str) -> PositionedString {
        PositionedString::new(text, CodePositionInterval::at_line(1))
    }

    #[test]
    fn labels_resolve_immediately() {
        let mut table = SymbolTable::new();
        table.define_label("loop", 0x100, CodePositionInterval::at_line(1)).unwrap();
        assert_eq!(table.get("loop"), Some(0x100));
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let mut table = SymbolTable::new();
        table.define_label("x", 0, CodePositionInterval::at_line(1)).unwrap();
        assert!(table.define_label("x", 1, CodePositionInterval::at_line(2)).is_err());
    }

    #[test]
    fn bad_identifier_is_rejected() {
        let mut table = SymbolTable::new();
        assert!(table.define_label("1bad", 0, CodePositionInterval::at_line(1)).is_err());
    }

    #[test]
    fn transitive_constants_resolve() {
        let mut table = SymbolTable::new();
        table.define_constant("A", pos("B + 1")).unwrap();
        table.define_constant("B", pos("C + 1")).unwrap();
        table.define_constant("C", pos("10")).unwrap();
        table.resolve_all().unwrap();
        assert_eq!(table.get("C"), Some(10));
        assert_eq!(table.get("B"), Some(11));
        assert_eq!(table.get("A"), Some(12));
    }

    #[test]
    fn unresolved_recursion_is_reported() {
        let mut table = SymbolTable::new();
        table.define_constant("A", pos("B")).unwrap();
        table.define_constant("B", pos("A")).unwrap();
        let err = table.resolve_all().unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::SymbolReplacementDepthExceeded(_)));
    }

    #[test]
    fn constant_can_reference_label() {
        let mut table = SymbolTable::new();
        table.define_label("START", 0x200, CodePositionInterval::at_line(1)).unwrap();
        table.define_constant("OFFSET", pos("START + 4")).unwrap();
        table.resolve_all().unwrap();
        assert_eq!(table.get("OFFSET"), Some(0x204));
    }
}
