#[cfg(test)]
mod tests {
    use simple_vm::lexer::{Lexer, LexerError, Token};

    // Helper to collect all tokens up to and including Eof
    fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
        Lexer::new(input)
            .map(|result| result.map(|info| info.token))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(tokenize(""), Ok(vec![Token::Eof]));
    }

    #[test]
    fn test_whitespace_and_comments() {
        assert_eq!(
            tokenize("  ; only a comment\n\t  "),
            Ok(vec![Token::Newline, Token::Eof])
        );
    }

    #[test]
    fn test_instruction_line() {
        assert_eq!(
            tokenize("loop: LOAD R1, 42 ; set up\n"),
            Ok(vec![
                Token::Ident("loop".to_string()),
                Token::Colon,
                Token::Ident("LOAD".to_string()),
                Token::Ident("R1".to_string()),
                Token::Comma,
                Token::Number(42),
                Token::Newline,
                Token::Eof,
            ])
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokenize("0 -7 0x1F 0XfF"),
            Ok(vec![
                Token::Number(0),
                Token::Number(-7),
                Token::Number(31),
                Token::Number(255),
                Token::Eof,
            ])
        );
    }

    #[test]
    fn test_invalid_numbers() {
        assert_eq!(
            tokenize("12ab"),
            Err(LexerError::InvalidNumberFormat("12ab".to_string(), 1, 1))
        );
        assert_eq!(
            tokenize("x -0xZ"),
            Err(LexerError::InvalidNumberFormat("-0xZ".to_string(), 1, 3))
        );
        assert_eq!(tokenize("- 1"), Err(LexerError::InvalidCharacter('-', 1, 1)));
    }

    #[test]
    fn test_directives_are_lowercased() {
        assert_eq!(
            tokenize(".ORG 10\n.string \"a\""),
            Ok(vec![
                Token::Directive("org".to_string()),
                Token::Number(10),
                Token::Newline,
                Token::Directive("string".to_string()),
                Token::StringLiteral("a".to_string()),
                Token::Eof,
            ])
        );
        assert_eq!(tokenize(". org"), Err(LexerError::InvalidCharacter('.', 1, 1)));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokenize(r#""a\tb\n\"q\"\\ ;not a comment""#),
            Ok(vec![
                Token::StringLiteral("a\tb\n\"q\"\\ ;not a comment".to_string()),
                Token::Eof,
            ])
        );
    }

    #[test]
    fn test_string_errors() {
        assert_eq!(tokenize("\"open"), Err(LexerError::UnterminatedString(1, 1)));
        assert_eq!(tokenize("\"line\nbreak\""), Err(LexerError::UnterminatedString(1, 1)));
        assert_eq!(
            tokenize(r#""bad \q""#),
            Err(LexerError::InvalidEscapeSequence('q', 1, 7))
        );
    }

    #[test]
    fn test_char_literals() {
        assert_eq!(
            tokenize(r"'A' '\n' '\''"),
            Ok(vec![
                Token::CharLiteral('A'),
                Token::CharLiteral('\n'),
                Token::CharLiteral('\''),
                Token::Eof,
            ])
        );
        assert_eq!(tokenize("''"), Err(LexerError::UnterminatedChar(1, 1)));
        assert_eq!(tokenize("'ab'"), Err(LexerError::UnterminatedChar(1, 1)));
    }

    #[test]
    fn test_invalid_character() {
        assert_eq!(tokenize("LOAD R1, #3"), Err(LexerError::InvalidCharacter('#', 1, 10)));
    }

    #[test]
    fn test_positions() {
        let infos: Vec<_> = Lexer::new("NOP\n  HLT").map(Result::unwrap).collect();
        let positions: Vec<(usize, usize)> = infos.iter().map(|i| (i.line, i.column)).collect();
        assert_eq!(positions, vec![(1, 1), (1, 4), (2, 3), (2, 6)]);
    }

    #[test]
    fn test_iterator_stops_after_eof_and_errors() {
        let mut lexer = Lexer::new("NOP");
        assert!(lexer.next().is_some());
        assert_eq!(lexer.next().map(|r| r.map(|i| i.token)), Some(Ok(Token::Eof)));
        assert!(lexer.next().is_none());

        let mut lexer = Lexer::new("# NOP");
        assert!(matches!(lexer.next(), Some(Err(_))));
        assert!(lexer.next().is_none());
    }

    #[test]
    fn test_next_token_repeats_eof() {
        let mut lexer = Lexer::new("");
        assert_eq!(lexer.next_token().map(|i| i.token), Ok(Token::Eof));
        assert_eq!(lexer.next_token().map(|i| i.token), Ok(Token::Eof));
    }
}
