//! The syntax tree generator: classifies each operand string as a register,
//! a quoted string, or a C-like integer expression, then hands the
//! resulting leaf nodes to [`NodeFactories`].

use crate::arch::{Endianness, MemoryValue};
use crate::common::{CodePositionInterval, Map, PositionedString};
use crate::error::CompileError;
use crate::parser::expr::ExpressionCompiler;
use crate::parser::unquote;
use crate::store::SimulatedStore;

use super::factories::NodeFactories;
use super::node::Node;

/// Classifies and builds nodes for each operand of one instruction line.
pub struct SyntaxTreeGenerator<'a> {
    store: &'a SimulatedStore,
    symbols: &'a Map<String, i64>,
}

impl<'a> SyntaxTreeGenerator<'a> {
    pub fn new(store: &'a SimulatedStore, symbols: &'a Map<String, i64>) -> Self {
        SyntaxTreeGenerator { store, symbols }
    }

    fn classify_operand(&self, operand: &PositionedString) -> Result<Node, CompileError> {
        let text = operand.text().trim();
        if self.store.has_register(text) {
            return Ok(Node::Register(text.to_string()));
        }
        if text.starts_with('"') && text.ends_with('"') && text.len() >= 2 {
            let bytes = unquote(text).ok_or_else(|| {
                CompileError::at(
                    crate::error::CompileErrorKind::UnterminatedString,
                    crate::error::Severity::Error,
                    operand.interval(),
                )
            })?;
            return Ok(Node::Data(bytes));
        }
        let value = ExpressionCompiler::new(self.symbols).evaluate(text, operand.interval())?;
        Ok(Node::Immediate(MemoryValue::from_signed(
            value,
            32,
            Endianness::Little,
            crate::arch::SignedRepresentation::TwosComplement,
        )))
    }

    /// Build the instruction node for one source line: classify every
    /// operand, then let [`NodeFactories`] assemble the result. A validation
    /// failure does not discard the node — it is returned alongside the
    /// error so the caller can still record an (invalid) node at its
    /// address and keep assembling the rest of the source.
    pub fn build(
        &self,
        mnemonic: &PositionedString,
        operands: &[PositionedString],
        position: CodePositionInterval,
    ) -> Result<(Node, Option<CompileError>), CompileError> {
        let children = operands
            .iter()
            .map(|op| self.classify_operand(op))
            .collect::<Result<Vec<_>, _>>()?;
        let node = NodeFactories::build(mnemonic.text(), children, Some(position))?;
        let validation = node.validate(self.store).err();
        Ok((node, validation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{AlignmentBehavior, ArchEndianness, Architecture, InstructionInfo, RegisterType, Unit};
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
                    id: "x2".into(),
                    name: "x2".into(),
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

    fn pos(text: &str) -> PositionedString {
        PositionedString::new(text, CodePositionInterval::at_line(1))
    }

    #[test]
    fn classifies_registers_and_builds_add() {
        let arch = rv32i_architecture();
        let store = SimulatedStore::new(&arch, 64);
        let symbols = Map::new();
        let gen = SyntaxTreeGenerator::new(&store, &symbols);
        let (node, validation) = gen
            .build(&pos("add"), &[pos("x1"), pos("x1"), pos("x2")], CodePositionInterval::at_line(1))
            .unwrap();
        assert!(validation.is_none());
        assert!(matches!(node, Node::Instruction { .. }));
    }

    #[test]
    fn classifies_expression_immediate() {
        let arch = rv32i_architecture();
        let store = SimulatedStore::new(&arch, 64);
        let mut symbols = Map::new();
        symbols.insert("LIMIT".to_string(), 10);
        let gen = SyntaxTreeGenerator::new(&store, &symbols);
        let (node, validation) = gen
            .build(
                &pos("addi"),
                &[pos("x1"), pos("x1"), pos("LIMIT + 2")],
                CodePositionInterval::at_line(1),
            )
            .unwrap();
        assert!(validation.is_none());
        assert!(matches!(node, Node::Instruction { .. }));
    }
}
