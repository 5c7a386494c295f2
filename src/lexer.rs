//! Lexer (Tokenizer) for SimpleVM assembly.

use std::iter::Peekable;
use std::str::Chars;

// --- Token Definition ---
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Eof,
    Newline, // Statements are line-terminated

    // Mnemonics, registers, labels and interrupt names; the parser tells them apart
    Ident(String),
    // `.org`, `.word`, `.string`, stored lowercase without the dot
    Directive(String),

    // Literals
    Number(i64),
    StringLiteral(String),
    CharLiteral(char),

    // Punctuation
    Comma, // ,
    Colon, // :
}

impl Token {
    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Eof => "end of input".to_string(),
            Token::Newline => "end of line".to_string(),
            Token::Ident(name) => format!("identifier `{}`", name),
            Token::Directive(name) => format!("directive `.{}`", name),
            Token::Number(n) => format!("number {}", n),
            Token::StringLiteral(s) => format!("string {:?}", s),
            Token::CharLiteral(c) => format!("character {:?}", c),
            Token::Comma => "`,`".to_string(),
            Token::Colon => "`:`".to_string(),
        }
    }
}

// --- Token Information (Includes position) ---
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

// --- Lexer Error (Includes positions) ---
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexerError {
    #[error("invalid character '{0}' at {1}:{2}")]
    InvalidCharacter(char, usize, usize),
    #[error("unterminated string literal starting at {0}:{1}")]
    UnterminatedString(usize, usize),
    #[error("unterminated character literal starting at {0}:{1}")]
    UnterminatedChar(usize, usize),
    #[error("invalid escape sequence '\\{0}' at {1}:{2}")]
    InvalidEscapeSequence(char, usize, usize),
    #[error("invalid number format '{0}' at {1}:{2}")]
    InvalidNumberFormat(String, usize, usize),
}

const COMMENT_CHAR: char = ';';

// --- Lexer Implementation ---
pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    current_line: usize,
    current_col: usize,
    finished: bool, // Eof has been handed out by the iterator
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
            current_line: 1,
            current_col: 1,
            finished: false,
        }
    }

    #[inline]
    fn consume(&mut self) -> Option<char> {
        let c = self.input.next()?;
        if c == '\n' {
            self.current_line += 1;
            self.current_col = 1;
        } else {
            self.current_col += 1;
        }
        Some(c)
    }

    #[inline]
    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    /// Skips spaces, tabs and comments. Newlines are significant and kept.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == COMMENT_CHAR {
                while matches!(self.peek(), Some(c) if c != '\n') {
                    self.consume();
                }
            } else if c.is_whitespace() && c != '\n' {
                self.consume();
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.consume();
            } else {
                break;
            }
        }
        word
    }

    fn read_number(&mut self, negative: bool, line: usize, column: usize) -> Result<Token, LexerError> {
        let text = self.read_word();
        let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => text.parse::<i64>(),
        };
        let value = parsed.map_err(|_| {
            let shown = if negative { format!("-{}", text) } else { text.clone() };
            LexerError::InvalidNumberFormat(shown, line, column)
        })?;
        Ok(Token::Number(if negative { -value } else { value }))
    }

    fn read_escape(&mut self, line: usize, column: usize, unterminated: LexerError) -> Result<char, LexerError> {
        let c = self.consume().ok_or(unterminated)?;
        match c {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '0' => Ok('\0'),
            '\\' | '\'' | '"' => Ok(c),
            other => Err(LexerError::InvalidEscapeSequence(other, line, column)),
        }
    }

    fn read_string(&mut self, line: usize, column: usize) -> Result<Token, LexerError> {
        let mut text = String::new();
        loop {
            match self.consume() {
                None | Some('\n') => return Err(LexerError::UnterminatedString(line, column)),
                Some('"') => return Ok(Token::StringLiteral(text)),
                Some('\\') => {
                    let (l, col) = (self.current_line, self.current_col);
                    text.push(self.read_escape(l, col, LexerError::UnterminatedString(line, column))?);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn read_char(&mut self, line: usize, column: usize) -> Result<Token, LexerError> {
        let c = match self.consume() {
            None | Some('\n') | Some('\'') => return Err(LexerError::UnterminatedChar(line, column)),
            Some('\\') => {
                let (l, col) = (self.current_line, self.current_col);
                self.read_escape(l, col, LexerError::UnterminatedChar(line, column))?
            }
            Some(c) => c,
        };
        match self.consume() {
            Some('\'') => Ok(Token::CharLiteral(c)),
            _ => Err(LexerError::UnterminatedChar(line, column)),
        }
    }

    /// Produces the next token. After the input ends, keeps returning `Eof`.
    pub fn next_token(&mut self) -> Result<TokenInfo, LexerError> {
        self.skip_trivia();
        let (line, column) = (self.current_line, self.current_col);
        let at = |token| Ok(TokenInfo { token, line, column });

        let Some(c) = self.peek() else {
            return at(Token::Eof);
        };
        match c {
            '\n' => {
                self.consume();
                at(Token::Newline)
            }
            ',' => {
                self.consume();
                at(Token::Comma)
            }
            ':' => {
                self.consume();
                at(Token::Colon)
            }
            '"' => {
                self.consume();
                at(self.read_string(line, column)?)
            }
            '\'' => {
                self.consume();
                at(self.read_char(line, column)?)
            }
            '.' => {
                self.consume();
                let name = self.read_word();
                if name.is_empty() {
                    return Err(LexerError::InvalidCharacter('.', line, column));
                }
                at(Token::Directive(name.to_ascii_lowercase()))
            }
            '-' => {
                self.consume();
                match self.peek() {
                    Some(d) if d.is_ascii_digit() => at(self.read_number(true, line, column)?),
                    _ => Err(LexerError::InvalidCharacter('-', line, column)),
                }
            }
            d if d.is_ascii_digit() => at(self.read_number(false, line, column)?),
            a if a.is_ascii_alphabetic() || a == '_' => at(Token::Ident(self.read_word())),
            other => Err(LexerError::InvalidCharacter(other, line, column)),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<TokenInfo, LexerError>;

    /// Yields every token including a final `Eof`, then `None`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        if matches!(&result, Ok(info) if info.token == Token::Eof) || result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}
