//! Assembled programs: code/data segments placed at fixed origins.

use crate::isa::disassemble_range;
use crate::symbol::SymbolTable;
use crate::vm::Value;

/// A run of consecutive words loaded at `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub origin: usize,
    pub words: Vec<Value>,
}

impl Segment {
    pub fn new(origin: usize) -> Self {
        Segment {
            origin,
            words: Vec::new(),
        }
    }

    /// One past the last address covered.
    pub fn end(&self) -> usize {
        self.origin + self.words.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    segments: Vec<Segment>,
    symbols: SymbolTable,
}

impl Program {
    pub fn new(segments: Vec<Segment>, symbols: SymbolTable) -> Self {
        Program { segments, symbols }
    }

    /// A program made of a single segment at address 0.
    pub fn from_words(words: Vec<Value>) -> Self {
        Program {
            segments: vec![Segment { origin: 0, words }],
            symbols: SymbolTable::new(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.symbols.resolve(name)
    }

    /// Smallest memory size that holds every segment.
    pub fn required_memory(&self) -> usize {
        self.segments.iter().map(Segment::end).max().unwrap_or(0)
    }

    /// Disassembly of every segment with labels interleaved.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&format!(".org {}\n", segment.origin));
            for (offset, text) in disassemble_range(&segment.words, 0, segment.words.len()) {
                let address = segment.origin + offset;
                if let Some(label) = self.symbols.label_at(address) {
                    out.push_str(&format!("{}:\n", label));
                }
                out.push_str(&format!("{:>6}: {}\n", address, text));
            }
        }
        out
    }
}
