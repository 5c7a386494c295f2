//! Assembler for SimpleVM assembly.
//!
//! # Syntax
//!
//! ```text
//! label:  MNEMONIC operand, operand   ; comment
//!         .org 300                    ; start a new segment at address 300
//!         .word 1, 2, 'A'             ; raw words
//!         .string "hi"                ; character codes plus a zero terminator
//! ```
//!
//! Mnemonics and register names are case-insensitive; labels are not. Commas
//! between operands are optional. Label references may appear before the
//! label is defined; they are patched once the whole source has been read.

use std::iter::Peekable;

use crate::interrupt::Interrupt;
use crate::isa::{Instruction, OperandKind};
use crate::lexer::{Lexer, LexerError, Token, TokenInfo};
use crate::program::{Program, Segment};
use crate::registers::Register;
use crate::symbol::SymbolTable;
use crate::vm::Value;

// Define Parser errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    LexerError(#[from] LexerError),
    #[error("{line}:{column}: expected {expected}, found {found}")]
    UnexpectedToken {
        found: String,
        expected: String,
        line: usize,
        column: usize,
    },
    #[error("{line}:{column}: unknown instruction `{name}`")]
    UnknownMnemonic { name: String, line: usize, column: usize },
    #[error("{line}:{column}: unknown directive `.{name}`")]
    UnknownDirective { name: String, line: usize, column: usize },
    #[error("{line}:{column}: `{name}` is not a register")]
    ExpectedRegister { name: String, line: usize, column: usize },
    #[error("{line}:{column}: `{name}` is not an interrupt")]
    UnknownInterrupt { name: String, line: usize, column: usize },
    #[error("line {line}: label `{label}` already defined on line {previous}")]
    DuplicateLabel { label: String, line: usize, previous: usize },
    #[error("line {line}: `{label}` is reserved and cannot be a label")]
    ReservedLabel { label: String, line: usize },
    #[error("{line}:{column}: undefined label `{label}`")]
    UndefinedLabel { label: String, line: usize, column: usize },
    #[error("line {line}: invalid origin {value}")]
    InvalidOrigin { value: Value, line: usize },
    #[error("segments at {first} and {second} overlap")]
    OverlappingSegments { first: usize, second: usize },
}

/// A label reference waiting for its address.
#[derive(Debug)]
struct Fixup {
    segment: usize,
    offset: usize,
    label: String,
    line: usize,
    column: usize,
}

// Parser structure
pub struct Parser<'a> {
    lexer: Peekable<Lexer<'a>>,
    current: TokenInfo,
    symbols: SymbolTable,
    segments: Vec<Segment>,
    fixups: Vec<Fixup>,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self, ParseError> {
        let first = lexer.next_token()?;
        Ok(Parser {
            lexer: lexer.peekable(),
            current: first,
            symbols: SymbolTable::new(),
            segments: vec![Segment::new(0)],
            fixups: Vec::new(),
        })
    }

    // --- Token Handling ---

    fn advance(&mut self) -> Result<TokenInfo, ParseError> {
        let next = match self.lexer.next() {
            Some(result) => result?,
            None => TokenInfo {
                token: Token::Eof,
                line: self.current.line,
                column: self.current.column,
            },
        };
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            found: self.current.token.describe(),
            expected: expected.to_string(),
            line: self.current.line,
            column: self.current.column,
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.current.token, Token::Newline | Token::Eof)
    }

    fn expect_line_end(&mut self) -> Result<(), ParseError> {
        match self.current.token {
            Token::Newline => {
                self.advance()?;
                Ok(())
            }
            Token::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    /// Skips the comma between two operands, if present.
    fn skip_separator(&mut self) -> Result<(), ParseError> {
        if self.current.token == Token::Comma {
            self.advance()?;
        }
        Ok(())
    }

    // --- Code Emission Helpers ---

    fn segment_index(&self) -> usize {
        self.segments.len() - 1
    }

    fn location(&self) -> usize {
        self.segments[self.segment_index()].end()
    }

    fn emit(&mut self, word: Value) {
        let index = self.segment_index();
        self.segments[index].words.push(word);
    }

    fn emit_label_ref(&mut self, label: String, line: usize, column: usize) {
        let segment = self.segment_index();
        let offset = self.segments[segment].words.len();
        self.fixups.push(Fixup {
            segment,
            offset,
            label,
            line,
            column,
        });
        self.emit(0);
    }

    // --- Statements ---

    /// Assembles the whole source.
    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        while self.current.token != Token::Eof {
            self.parse_line()?;
        }
        self.resolve_fixups()?;
        self.segments.retain(|s| !s.words.is_empty());
        self.check_overlaps()?;
        Ok(Program::new(self.segments, self.symbols))
    }

    fn parse_line(&mut self) -> Result<(), ParseError> {
        if let Token::Ident(name) = &self.current.token {
            if matches!(self.lexer.peek(), Some(Ok(TokenInfo { token: Token::Colon, .. }))) {
                let (name, line) = (name.clone(), self.current.line);
                self.advance()?; // label
                self.advance()?; // colon
                self.define_label(name, line)?;
            }
        }

        match self.current.token.clone() {
            Token::Newline | Token::Eof => {}
            Token::Ident(name) => self.parse_instruction(&name)?,
            Token::Directive(name) => self.parse_directive(&name)?,
            _ => return Err(self.unexpected("instruction, directive or label")),
        }
        self.expect_line_end()
    }

    fn define_label(&mut self, name: String, line: usize) -> Result<(), ParseError> {
        if SymbolTable::is_reserved(&name) {
            return Err(ParseError::ReservedLabel { label: name, line });
        }
        let address = self.location();
        self.symbols
            .define(&name, address, line)
            .map_err(|previous| ParseError::DuplicateLabel {
                label: name.clone(),
                line,
                previous: previous.line,
            })
    }

    fn parse_instruction(&mut self, name: &str) -> Result<(), ParseError> {
        let instruction = Instruction::from_mnemonic(name).ok_or_else(|| ParseError::UnknownMnemonic {
            name: name.to_string(),
            line: self.current.line,
            column: self.current.column,
        })?;
        self.advance()?;
        self.emit(instruction.opcode());

        for (i, kind) in instruction.operands().iter().enumerate() {
            if i > 0 {
                self.skip_separator()?;
            }
            if self.at_line_end() {
                return Err(self.unexpected(&format!(
                    "{} operand(s) for {}",
                    instruction.arity(),
                    instruction.mnemonic()
                )));
            }
            self.parse_operand(*kind)?;
        }
        Ok(())
    }

    fn parse_operand(&mut self, kind: OperandKind) -> Result<(), ParseError> {
        let TokenInfo { token, line, column } = self.advance()?;
        match (kind, token) {
            (OperandKind::Reg, Token::Ident(name)) => {
                let reg = Register::from_name(&name)
                    .ok_or(ParseError::ExpectedRegister { name, line, column })?;
                self.emit(reg as Value);
            }
            (OperandKind::Int, Token::Ident(name)) => {
                let code = Interrupt::from_name(&name)
                    .ok_or(ParseError::UnknownInterrupt { name, line, column })?;
                self.emit(code as Value);
            }
            (OperandKind::Imm | OperandKind::Addr, Token::Ident(name)) => {
                if Register::from_name(&name).is_some() {
                    return Err(ParseError::UnexpectedToken {
                        found: format!("register `{}`", name),
                        expected: "value or label".to_string(),
                        line,
                        column,
                    });
                }
                self.emit_label_ref(name, line, column);
            }
            (OperandKind::Imm | OperandKind::Addr | OperandKind::Int, Token::Number(n)) => self.emit(n),
            (OperandKind::Imm, Token::CharLiteral(c)) => self.emit(c as Value),
            (kind, token) => {
                let expected = match kind {
                    OperandKind::Reg => "register",
                    OperandKind::Imm => "value",
                    OperandKind::Addr => "address or label",
                    OperandKind::Int => "interrupt",
                };
                return Err(ParseError::UnexpectedToken {
                    found: token.describe(),
                    expected: expected.to_string(),
                    line,
                    column,
                });
            }
        }
        Ok(())
    }

    // --- Directives ---

    fn parse_directive(&mut self, name: &str) -> Result<(), ParseError> {
        let TokenInfo { line, column, .. } = self.advance()?;
        match name {
            "org" => {
                let origin = match self.advance()?.token {
                    Token::Number(n) => usize::try_from(n)
                        .map_err(|_| ParseError::InvalidOrigin { value: n, line })?,
                    _ => return Err(self.unexpected("origin address")),
                };
                if self.segments[self.segment_index()].words.is_empty() {
                    self.segments.pop();
                }
                self.segments.push(Segment::new(origin));
            }
            "word" => loop {
                let TokenInfo { token, line, column } = self.advance()?;
                match token {
                    Token::Number(n) => self.emit(n),
                    Token::CharLiteral(c) => self.emit(c as Value),
                    Token::Ident(label) => self.emit_label_ref(label, line, column),
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            found: other.describe(),
                            expected: "word value".to_string(),
                            line,
                            column,
                        })
                    }
                }
                self.skip_separator()?;
                if self.at_line_end() {
                    break;
                }
            },
            "string" => match self.advance()?.token {
                Token::StringLiteral(text) => {
                    for c in text.chars() {
                        self.emit(c as Value);
                    }
                    self.emit(0);
                }
                _ => return Err(self.unexpected("string literal")),
            },
            _ => {
                return Err(ParseError::UnknownDirective {
                    name: name.to_string(),
                    line,
                    column,
                })
            }
        }
        Ok(())
    }

    // --- Finishing ---

    fn resolve_fixups(&mut self) -> Result<(), ParseError> {
        for fixup in std::mem::take(&mut self.fixups) {
            let address = self
                .symbols
                .resolve(&fixup.label)
                .ok_or(ParseError::UndefinedLabel {
                    label: fixup.label.clone(),
                    line: fixup.line,
                    column: fixup.column,
                })?;
            self.segments[fixup.segment].words[fixup.offset] = address as Value;
        }
        Ok(())
    }

    fn check_overlaps(&self) -> Result<(), ParseError> {
        let mut ordered: Vec<&Segment> = self.segments.iter().collect();
        ordered.sort_by_key(|s| s.origin);
        for pair in ordered.windows(2) {
            if pair[0].end() > pair[1].origin {
                return Err(ParseError::OverlappingSegments {
                    first: pair[0].origin,
                    second: pair[1].origin,
                });
            }
        }
        Ok(())
    }
}
