//! Macro registration and expansion. A macro is
//! disambiguated by `(name, arity)`; parameters with defaults widen the
//! accepted arity range. Expansion deep-copies the body with whole-token
//! parameter substitution and detects cycles via a recursion stack.

use std::collections::HashMap;

use regex::Regex;

use crate::common::CodePositionInterval;
use crate::error::{CompileError, CompileErrorKind, Severity};

use super::lexer::Line;

#[derive(Clone, Debug)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MacroDefinition {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Vec<Line>,
}

impl MacroDefinition {
    fn min_arity(&self) -> usize {
        self.params.iter().take_while(|p| p.default.is_none()).count()
    }

    fn max_arity(&self) -> usize {
        self.params.len()
    }

    fn accepts(&self, n: usize) -> bool {
        n >= self.min_arity() && n <= self.max_arity()
    }
}

fn word_replace(text: &str, name: &str, value: &str) -> String {
    let pattern = format!(r"\b{}\b", regex::escape(name));
    Regex::new(&pattern).unwrap().replace_all(text, regex::NoExpand(value)).into_owned()
}

#[derive(Default)]
pub struct MacroTable {
    definitions: Vec<MacroDefinition>,
    stack: Vec<String>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    pub fn define(&mut self, def: MacroDefinition, position: CodePositionInterval) -> Result<(), CompileError> {
        let ambiguous = self.definitions.iter().any(|d| {
            d.name == def.name && !(d.max_arity() < def.min_arity() || def.max_arity() < d.min_arity())
        });
        if ambiguous {
            return Err(CompileError::at(
                CompileErrorKind::DuplicateSymbol(def.name.clone()),
                Severity::Error,
                position,
            ));
        }
        self.definitions.push(def);
        Ok(())
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name == name)
    }

    fn find(&self, name: &str, arg_count: usize) -> Option<&MacroDefinition> {
        self.definitions.iter().find(|d| d.name == name && d.accepts(arg_count))
    }

    /// Expand one invocation of `name` with the given argument text,
    /// returning the deep-copied, parameter-substituted body lines.
    pub fn expand(
        &mut self,
        name: &str,
        args: &[String],
        position: CodePositionInterval,
    ) -> Result<Vec<Line>, CompileError> {
        if self.stack.iter().any(|s| s == name) {
            return Err(CompileError::at(
                CompileErrorKind::CyclicMacro(name.to_string()),
                Severity::Error,
                position,
            ));
        }
        let def = self
            .find(name, args.len())
            .cloned()
            .ok_or_else(|| {
                CompileError::at(
                    CompileErrorKind::MacroArityMismatch { name: name.to_string(), given: args.len() },
                    Severity::Error,
                    position,
                )
            })?;

        let mut bindings: HashMap<String, String> = HashMap::new();
        for (i, param) in def.params.iter().enumerate() {
            let value = if i < args.len() {
                args[i].clone()
            } else {
                param
                    .default
                    .clone()
                    .expect("accepts() guarantees a default for unfilled params")
            };
            bindings.insert(param.name.clone(), value);
        }

        if self.stack.len() + 1 >= 64 {
            tracing::warn!(macro_name = name, depth = self.stack.len(), "approaching macro expansion depth limit");
        }
        self.stack.push(name.to_string());
        let expanded: Vec<Line> = def
            .body
            .iter()
            .map(|line| substitute_line(line, &bindings))
            .collect();
        self.stack.pop();
        tracing::trace!(macro_name = name, lines = expanded.len(), "expanded macro invocation");
        Ok(expanded)
    }
}

fn substitute_line(line: &Line, bindings: &HashMap<String, String>) -> Line {
    let mnemonic = line.mnemonic.as_ref().map(|m| {
        let mut text = m.text().to_string();
        for (name, value) in bindings {
            text = word_replace(&text, name, value);
        }
        m.map_text(text)
    });
    let operands = line
        .operands
        .iter()
        .map(|op| {
            let mut text = op.text().to_string();
            for (name, value) in bindings {
                text = word_replace(&text, name, value);
            }
            op.map_text(text)
        })
        .collect();
    Line {
        labels: line.labels.clone(),
        mnemonic,
        operands,
        interval: line.interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PositionedString;

    fn sample_line(mnemonic: &str, operands: &[&str]) -> Line {
        Line {
            labels: vec![],
            mnemonic: Some(PositionedString::new(mnemonic, CodePositionInterval::at_line(1))),
            operands: operands
                .iter()
                .map(|o| PositionedString::new(*o, CodePositionInterval::at_line(1)))
                .collect(),
            interval: CodePositionInterval::at_line(1),
        }
    }

    #[test]
    fn expands_with_parameter_substitution() {
        let mut table = MacroTable::new();
        table
            .define(
                MacroDefinition {
                    name: "INC".into(),
                    params: vec![MacroParam { name: "REG".into(), default: None }],
                    body: vec![sample_line("addi", &["REG", "REG", "1"])],
                },
                CodePositionInterval::at_line(1),
            )
            .unwrap();
        let expanded = table.expand("INC", &["x1".to_string()], CodePositionInterval::at_line(5)).unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].operands[0].text(), "x1");
    }

    #[test]
    fn default_parameter_widens_arity() {
        let mut table = MacroTable::new();
        table
            .define(
                MacroDefinition {
                    name: "ADDK".into(),
                    params: vec![
                        MacroParam { name: "REG".into(), default: None },
                        MacroParam { name: "K".into(), default: Some("1".into()) },
                    ],
                    body: vec![sample_line("addi", &["REG", "REG", "K"])],
                },
                CodePositionInterval::at_line(1),
            )
            .unwrap();
        let one_arg = table.expand("ADDK", &["x1".to_string()], CodePositionInterval::at_line(5)).unwrap();
        assert_eq!(one_arg[0].operands[2].text(), "1");
        let two_args = table
            .expand("ADDK", &["x1".to_string(), "5".to_string()], CodePositionInterval::at_line(5))
            .unwrap();
        assert_eq!(two_args[0].operands[2].text(), "5");
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let mut table = MacroTable::new();
        table
            .define(
                MacroDefinition {
                    name: "ONE".into(),
                    params: vec![MacroParam { name: "A".into(), default: None }],
                    body: vec![],
                },
                CodePositionInterval::at_line(1),
            )
            .unwrap();
        let err = table.expand("ONE", &[], CodePositionInterval::at_line(2)).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::MacroArityMismatch { .. }));
    }

    #[test]
    fn cyclic_macro_is_detected() {
        let mut table = MacroTable::new();
        table
            .define(
                MacroDefinition {
                    name: "SELF".into(),
                    params: vec![],
                    body: vec![sample_line("SELF", &[])],
                },
                CodePositionInterval::at_line(1),
            )
            .unwrap();
        table.stack.push("SELF".to_string());
        let err = table.expand("SELF", &[], CodePositionInterval::at_line(1)).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::CyclicMacro(_)));
    }
}
