//! Symbol table for assembler labels.

use std::collections::HashMap;

use crate::interrupt::Interrupt;
use crate::isa::Instruction;
use crate::registers::Register;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: usize,
    pub line: usize, // Source line of the definition, for diagnostics.
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names that would be ambiguous as operands: registers, mnemonics and
    /// interrupt names.
    pub fn is_reserved(name: &str) -> bool {
        Register::from_name(name).is_some()
            || Instruction::from_mnemonic(name).is_some()
            || Interrupt::from_name(name).is_some()
    }

    /// Defines `name`; returns the earlier definition if it already exists.
    pub fn define(&mut self, name: &str, address: usize, line: usize) -> Result<(), &Symbol> {
        if self.symbols.contains_key(name) {
            return Err(&self.symbols[name]);
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                address,
                line,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).map(|s| s.address)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols ordered by address, then name.
    pub fn sorted(&self) -> Vec<&Symbol> {
        let mut symbols: Vec<&Symbol> = self.symbols.values().collect();
        symbols.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));
        symbols
    }

    /// First label defined at `address`, used to annotate listings.
    pub fn label_at(&self, address: usize) -> Option<&str> {
        self.sorted()
            .into_iter()
            .find(|s| s.address == address)
            .map(|s| s.name.as_str())
    }
}
