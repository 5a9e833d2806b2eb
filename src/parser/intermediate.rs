//! The intermediate operation pipeline: each physical
//! line becomes, in order,
//!
//! 1. **Precompile** — `.macro` bodies and `.equ` expressions are
//!    registered without being evaluated yet; everything else becomes a raw
//!    operation (instruction, data, reserve, ascii, or align) tagged with
//!    the section active at that point in the source.
//! 2. **Macro expansion** — every macro invocation is replaced in place by
//!    its substituted body, processed through the very same precompile
//!    step (so directives and further macro calls inside a body work
//!    exactly as if they had been written at the call site).
//! 3. **Memory allocation** — each raw operation reserves its bytes in its
//!    section, fixing every label's address.
//! 4. **Execution into final form** — symbols are resolved to a fixed
//!    point, static data is written into the store's memory, and every
//!    instruction operation becomes an AST node.
//!
//! Errors are accumulated rather than aborting the run; a single fatal or
//! error-severity entry just means the resulting program is not executable.

use std::collections::VecDeque;

use crate::arch::{MemoryValue, SignedRepresentation};
use crate::ast::{Node, SyntaxTreeGenerator};
use crate::common::{CodePositionInterval, Map, PositionedString};
use crate::error::{CompileError, CompileErrorKind, CompileErrorList, Severity};
use crate::store::SimulatedStore;

use super::allocator::{MemoryAllocator, SectionDefinition};
use super::expr::ExpressionCompiler;
use super::lexer::{Line, LineLexer};
use super::macro_table::{MacroDefinition, MacroParam, MacroTable};
use super::symbol_table::SymbolTable;
use super::unquote;

const DEFAULT_SECTIONS: &[(&str, usize)] = &[("text", 1), ("data", 4), ("bss", 4)];

#[derive(Clone, Debug)]
enum RawKind {
    Instruction { mnemonic: PositionedString, operands: Vec<PositionedString> },
    Data { width: usize, operands: Vec<PositionedString> },
    Reserve { width: usize, count: PositionedString },
    Ascii { text: PositionedString, terminated: bool },
    Align(PositionedString),
}

#[derive(Clone, Debug)]
struct RawOperation {
    labels: Vec<String>,
    kind: RawKind,
    section: String,
    interval: CodePositionInterval,
}

fn wrong_count(expected: usize, got: usize, position: CodePositionInterval) -> CompileError {
    CompileError::at(CompileErrorKind::WrongOperandCount { expected, got }, Severity::Error, position)
}

fn directive_operand(line: &Line) -> Result<PositionedString, CompileError> {
    line.operands
        .first()
        .cloned()
        .ok_or_else(|| wrong_count(1, 0, line.interval))
}

struct Precompiled {
    operations: Vec<RawOperation>,
    symbols: SymbolTable,
    globals: std::collections::BTreeSet<String>,
    errors: CompileErrorList,
}

/// Walks the line queue once, registering macros and `.equ` constants,
/// expanding macro invocations in place (pushed back onto the front of the
/// queue so their bodies run back through this same loop), and collecting
/// everything else as a [`RawOperation`].
fn precompile(lines: Vec<Line>, mut errors: CompileErrorList) -> Precompiled {
    let mut queue: VecDeque<Line> = lines.into_iter().collect();
    let mut operations = Vec::new();
    let mut symbols = SymbolTable::new();
    let mut macros = MacroTable::new();
    let mut globals = std::collections::BTreeSet::new();
    let mut section = "text".to_string();
    let mut pending_labels: Vec<String> = Vec::new();

    while let Some(line) = queue.pop_front() {
        pending_labels.extend(line.labels.iter().cloned());
        let Some(mnemonic) = line.mnemonic.clone() else { continue };
        let name = mnemonic.text();

        if name == ".macro" {
            define_macro(&mut queue, &mut macros, &line, &mut errors);
            continue;
        }
        if name == ".endm" {
            errors.push(CompileError::at(CompileErrorKind::DanglingEndm, Severity::Error, line.interval));
            continue;
        }
        if name == ".section" {
            match directive_operand(&line) {
                Ok(op) => section = op.text().trim().to_string(),
                Err(e) => errors.push(e),
            }
            continue;
        }
        if name == ".equ" {
            if line.operands.len() == 2 {
                let sym_name = line.operands[0].text().trim().to_string();
                if let Err(e) = symbols.define_constant(&sym_name, line.operands[1].clone()) {
                    errors.push(e);
                }
            } else {
                errors.push(wrong_count(2, line.operands.len(), line.interval));
            }
            continue;
        }
        if name == ".global" || name == ".globl" {
            for op in &line.operands {
                globals.insert(op.text().trim().to_string());
            }
            continue;
        }
        if macros.is_macro(name) {
            let args: Vec<String> = line.operands.iter().map(|o| o.text().trim().to_string()).collect();
            match macros.expand(name, &args, line.interval) {
                Ok(expanded) => {
                    for exp_line in expanded.into_iter().rev() {
                        queue.push_front(exp_line);
                    }
                }
                Err(e) => errors.push(e),
            }
            continue;
        }

        let labels = std::mem::take(&mut pending_labels);
        let kind_result: Result<RawKind, CompileError> = match name {
            ".byte" => Ok(RawKind::Data { width: 1, operands: line.operands.clone() }),
            ".half" => Ok(RawKind::Data { width: 2, operands: line.operands.clone() }),
            ".word" => Ok(RawKind::Data { width: 4, operands: line.operands.clone() }),
            ".dword" => Ok(RawKind::Data { width: 8, operands: line.operands.clone() }),
            ".resb" => directive_operand(&line).map(|count| RawKind::Reserve { width: 1, count }),
            ".resh" => directive_operand(&line).map(|count| RawKind::Reserve { width: 2, count }),
            ".resw" => directive_operand(&line).map(|count| RawKind::Reserve { width: 4, count }),
            ".resd" => directive_operand(&line).map(|count| RawKind::Reserve { width: 8, count }),
            ".ascii" => directive_operand(&line).map(|text| RawKind::Ascii { text, terminated: false }),
            ".asciiz" => directive_operand(&line).map(|text| RawKind::Ascii { text, terminated: true }),
            ".align" => directive_operand(&line).map(RawKind::Align),
            other if other.starts_with('.') => {
                Err(CompileError::at(CompileErrorKind::UnknownDirective(other.to_string()), Severity::Error, line.interval))
            }
            _ => Ok(RawKind::Instruction { mnemonic: mnemonic.clone(), operands: line.operands.clone() }),
        };
        match kind_result {
            Ok(kind) => operations.push(RawOperation { labels, kind, section: section.clone(), interval: line.interval }),
            Err(e) => errors.push(e),
        }
    }

    Precompiled { operations, symbols, globals, errors }
}

/// Parses a `.macro NAME, param, param=default` header and pulls raw body
/// lines off the front of the queue up to the matching `.endm`.
fn define_macro(queue: &mut VecDeque<Line>, macros: &mut MacroTable, def_line: &Line, errors: &mut CompileErrorList) {
    let position = def_line.interval;
    let Some(name_operand) = def_line.operands.first() else {
        errors.push(CompileError::at(
            CompileErrorKind::Syntax("`.macro` requires a name".into()),
            Severity::Error,
            position,
        ));
        return;
    };
    let name = name_operand.text().trim().to_string();
    let mut params = Vec::new();
    for spec in &def_line.operands[1..] {
        let text = spec.text().trim();
        match text.split_once('=') {
            Some((p, d)) => params.push(MacroParam { name: p.trim().to_string(), default: Some(d.trim().to_string()) }),
            None => params.push(MacroParam { name: text.to_string(), default: None }),
        }
    }

    let mut body = Vec::new();
    loop {
        let Some(line) = queue.pop_front() else {
            errors.push(CompileError::at(
                CompileErrorKind::Syntax(format!("`.macro {}` has no matching `.endm`", name)),
                Severity::Error,
                position,
            ));
            break;
        };
        if line.mnemonic.as_ref().map(|m| m.text()) == Some(".endm") {
            break;
        }
        body.push(line);
    }

    if let Err(e) = macros.define(MacroDefinition { name, params, body }, position) {
        errors.push(e);
    }
}

/// The fully assembled program: every instruction operation lowered to an
/// AST node keyed by its memory address, the resolved symbol table, the
/// lowest instruction address (the natural entry point), and whatever
/// errors were accumulated along the way.
pub struct AssembledProgram {
    pub instructions: Map<u64, Node>,
    pub entry: Option<u64>,
    pub symbols: Map<String, i64>,
    pub globals: std::collections::BTreeSet<String>,
    pub errors: CompileErrorList,
}

impl AssembledProgram {
    pub fn is_executable(&self) -> bool {
        !self.errors.blocks_execution()
    }
}

/// Run the whole pipeline over one source file, writing any static data
/// (`.byte`/`.word`/`.ascii`/...) directly into `store`'s memory as a side
/// effect, and returning the assembled instructions alongside every
/// accumulated error.
pub fn assemble(source: &str, store: &mut SimulatedStore) -> AssembledProgram {
    let (lines, lex_errors) = LineLexer::lex_source(source);
    let mut errors = CompileErrorList::new();
    for e in lex_errors {
        errors.push(e);
    }

    let mut pre = precompile(lines, errors);
    if let Err(e) = pre.symbols.resolve_all() {
        pre.errors.push(e);
    }

    let sections = DEFAULT_SECTIONS
        .iter()
        .map(|(name, alignment)| SectionDefinition { name: (*name).to_string(), alignment: *alignment })
        .collect();
    let mut allocator = MemoryAllocator::new(sections);

    let mut addresses: Vec<Option<u64>> = Vec::with_capacity(pre.operations.len());
    for op in &pre.operations {
        let (size, alignment) = match &op.kind {
            RawKind::Instruction { .. } => (4, 1),
            RawKind::Data { width, operands } => (width * operands.len(), *width),
            RawKind::Reserve { width, count } => {
                match ExpressionCompiler::new(pre.symbols.as_map()).evaluate(count.text(), count.interval()) {
                    Ok(n) if n >= 0 => (*width * n as usize, *width),
                    Ok(n) => {
                        pre.errors.push(CompileError::at(
                            CompileErrorKind::Syntax(format!("reserve count must be non-negative, got {n}")),
                            Severity::Error,
                            count.interval(),
                        ));
                        (0, 1)
                    }
                    Err(e) => {
                        pre.errors.push(e);
                        (0, 1)
                    }
                }
            }
            RawKind::Ascii { text, terminated } => match unquote(text.text()) {
                Some(bytes) => (bytes.len() + usize::from(*terminated), 1),
                None => {
                    pre.errors.push(CompileError::at(CompileErrorKind::UnterminatedString, Severity::Error, text.interval()));
                    (0, 1)
                }
            },
            RawKind::Align(expr) => {
                match ExpressionCompiler::new(pre.symbols.as_map()).evaluate(expr.text(), expr.interval()) {
                    Ok(n) if n > 0 => (0, n as usize),
                    Ok(n) => {
                        pre.errors.push(CompileError::at(
                            CompileErrorKind::Syntax(format!(".align requires a positive alignment, got {n}")),
                            Severity::Error,
                            expr.interval(),
                        ));
                        (0, 1)
                    }
                    Err(e) => {
                        pre.errors.push(e);
                        (0, 1)
                    }
                }
            }
        };

        match allocator.reserve(&op.section, size, alignment) {
            Ok(address) => {
                for label in &op.labels {
                    if let Err(e) = pre.symbols.define_label(label, address as i64, op.interval) {
                        pre.errors.push(e);
                    }
                }
                addresses.push(Some(address));
            }
            Err(e) => {
                pre.errors.push(e);
                addresses.push(None);
            }
        }
    }

    // Pass 1: write static data into the store now that every label has an
    // address (so `.word some_label` resolves).
    for (op, address) in pre.operations.iter().zip(&addresses) {
        let Some(address) = *address else { continue };
        match &op.kind {
            RawKind::Data { width, operands } => {
                for (i, text) in operands.iter().enumerate() {
                    match ExpressionCompiler::new(pre.symbols.as_map()).evaluate(text.text(), text.interval()) {
                        Ok(value) => {
                            let mv = MemoryValue::from_signed(
                                value,
                                width * 8,
                                store.endianness(),
                                SignedRepresentation::TwosComplement,
                            );
                            if let Err(e) = store.put_at(address + (i * width) as u64, &mv) {
                                pre.errors.push(CompileError::at(
                                    CompileErrorKind::Syntax(e.to_string()),
                                    Severity::Error,
                                    text.interval(),
                                ));
                            }
                        }
                        Err(e) => pre.errors.push(e),
                    }
                }
            }
            RawKind::Ascii { text, terminated } => {
                if let Some(mut bytes) = unquote(text.text()) {
                    if *terminated {
                        bytes.push(0);
                    }
                    if !bytes.is_empty() {
                        let len_bits = bytes.len() * 8;
                        if let Ok(mv) = MemoryValue::from_bytes(bytes, len_bits) {
                            if let Err(e) = store.put_at(address, &mv) {
                                pre.errors.push(CompileError::at(
                                    CompileErrorKind::Syntax(e.to_string()),
                                    Severity::Error,
                                    text.interval(),
                                ));
                            }
                        }
                    }
                }
            }
            RawKind::Reserve { .. } | RawKind::Align(_) | RawKind::Instruction { .. } => {}
        }
    }

    // Pass 2: lower every instruction operation to an AST node.
    let mut instructions = Map::new();
    let mut entry = None;
    for (op, address) in pre.operations.iter().zip(&addresses) {
        let Some(address) = *address else { continue };
        if let RawKind::Instruction { mnemonic, operands } = &op.kind {
            if entry.is_none() {
                entry = Some(address);
            }
            let generator = SyntaxTreeGenerator::new(store, pre.symbols.as_map());
            match generator.build(mnemonic, operands, op.interval) {
                Ok((node, validation)) => {
                    if let Some(e) = validation {
                        pre.errors.push(e);
                    }
                    instructions.insert(address, node);
                }
                Err(e) => pre.errors.push(e),
            }
        }
    }

    AssembledProgram {
        instructions,
        entry,
        symbols: pre.symbols.as_map().clone(),
        globals: pre.globals,
        errors: pre.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::register::RegisterInfo;
    use crate::arch::{AlignmentBehavior, ArchEndianness, Architecture, InstructionInfo, RegisterType, Unit};

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
        for mnemonic in ["add", "addi", "jal", "lw", "sw"] {
            arch.instructions.push(InstructionInfo { name: mnemonic.into(), key: serde_json::json!({}) });
        }
        arch.validate().unwrap()
    }

    #[test]
    fn assembles_plain_instructions_in_order() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = "start:\n  add x1, x1, x2\n  addi x2, x2, 1\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert_eq!(program.entry, Some(0));
        assert_eq!(program.instructions.len(), 2);
        assert_eq!(program.symbols.get("start"), Some(&0));
        assert!(program.instructions.contains_key(&0));
        assert!(program.instructions.contains_key(&4));
    }

    #[test]
    fn equ_constant_resolves_and_is_usable_as_an_immediate() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = ".equ LIMIT, 41\n  addi x1, x1, LIMIT + 1\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert_eq!(program.symbols.get("LIMIT"), Some(&41));
    }

    #[test]
    fn word_directive_writes_memory_and_can_reference_a_forward_label() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = "  .word target\n  .word 7\ntarget:\n  add x1, x1, x2\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        let target_addr = *program.symbols.get("target").unwrap();
        let first_word = store.get_at(0, 4).unwrap().to_unsigned(store.endianness()).unwrap();
        assert_eq!(first_word as i64, target_addr);
        let second_word = store.get_at(4, 4).unwrap().to_unsigned(store.endianness()).unwrap();
        assert_eq!(second_word, 7);
    }

    #[test]
    fn resb_reserves_space_without_writing_it() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = "  .resb 8\nafter:\n  add x1, x1, x2\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert_eq!(program.symbols.get("after"), Some(&8));
    }

    #[test]
    fn ascii_and_asciiz_differ_by_trailing_nul() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = "  .asciiz \"hi\"\nafter:\n  add x1, x1, x2\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert_eq!(program.symbols.get("after"), Some(&3));
        let bytes = store.get_at(0, 3).unwrap();
        assert_eq!(bytes.as_bytes(), &[b'h', b'i', 0]);
    }

    #[test]
    fn align_directive_pads_up_to_the_boundary() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = "  .byte 1\n  .align 4\naligned:\n  add x1, x1, x2\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert_eq!(program.symbols.get("aligned"), Some(&4));
    }

    #[test]
    fn macro_invocation_expands_before_allocation() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = ".macro INC, REG\n  addi REG, REG, 1\n.endm\n  INC x1\n  INC x2\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert_eq!(program.instructions.len(), 2);
    }

    #[test]
    fn unknown_directive_is_reported_but_does_not_abort_the_run() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = "  .bogus 1\n  add x1, x1, x2\n";
        let program = assemble(source, &mut store);
        assert!(!program.is_executable());
        assert_eq!(program.instructions.len(), 1);
    }

    #[test]
    fn global_directive_is_accepted_and_recorded() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = ".globl start\nstart:\n  add x1, x1, x2\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert!(program.globals.contains("start"));
    }

    #[test]
    fn sections_are_laid_out_independently_and_back_to_back() {
        let arch = rv32i_architecture();
        let mut store = SimulatedStore::new(&arch, 4096);
        let source = "  .section text\n  add x1, x1, x2\n  .section data\n  .word 99\n";
        let program = assemble(source, &mut store);
        assert!(program.is_executable());
        assert!(program.instructions.contains_key(&0));
    }
}
