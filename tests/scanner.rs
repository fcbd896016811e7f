use rox::error::LoxError;
use rox::scanner::Scanner;
use rox::token::{Token, TokenType};

fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
    let scanner = Scanner::new(source);
    let tokens: Vec<Token> = scanner.filter_map(Result::ok).collect();

    assert_eq!(tokens.len(), expected.len(), "tokens: {:?}", tokens);

    for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
        assert_eq!(actual.token_type, *expected_type);
        assert_eq!(actual.lexeme, *expected_lexeme);
    }
}

#[test]
fn test_scanner_01_symbols() {
    assert_token_sequence(
        "({*.,+*})",
        &[
            (TokenType::LEFT_PAREN, "("),
            (TokenType::LEFT_BRACE, "{"),
            (TokenType::STAR, "*"),
            (TokenType::DOT, "."),
            (TokenType::COMMA, ","),
            (TokenType::PLUS, "+"),
            (TokenType::STAR, "*"),
            (TokenType::RIGHT_BRACE, "}"),
            (TokenType::RIGHT_PAREN, ")"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn test_scanner_02_maximal_munch_operators() {
    assert_token_sequence(
        "! != = == < <= > >=",
        &[
            (TokenType::BANG, "!"),
            (TokenType::BANG_EQUAL, "!="),
            (TokenType::EQUAL, "="),
            (TokenType::EQUAL_EQUAL, "=="),
            (TokenType::LESS, "<"),
            (TokenType::LESS_EQUAL, "<="),
            (TokenType::GREATER, ">"),
            (TokenType::GREATER_EQUAL, ">="),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn test_scanner_03_keywords_and_identifiers() {
    assert_token_sequence(
        "var foo = nil; fun_ny class classy",
        &[
            (TokenType::VAR, "var"),
            (TokenType::IDENTIFIER, "foo"),
            (TokenType::EQUAL, "="),
            (TokenType::NIL, "nil"),
            (TokenType::SEMICOLON, ";"),
            (TokenType::IDENTIFIER, "fun_ny"),
            (TokenType::CLASS, "class"),
            (TokenType::IDENTIFIER, "classy"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn test_scanner_04_numbers() {
    // A trailing or leading dot is not part of a number.
    assert_token_sequence(
        "123 45.67 123. .5",
        &[
            (TokenType::NUMBER(0.0), "123"),
            (TokenType::NUMBER(0.0), "45.67"),
            (TokenType::NUMBER(0.0), "123"),
            (TokenType::DOT, "."),
            (TokenType::DOT, "."),
            (TokenType::NUMBER(0.0), "5"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn test_scanner_05_number_literal_values() {
    let tokens: Vec<Token> = Scanner::new("123 45.67")
        .filter_map(Result::ok)
        .collect();

    let values: Vec<f64> = tokens
        .iter()
        .filter_map(|token| match token.token_type {
            TokenType::NUMBER(n) => Some(n),
            _ => None,
        })
        .collect();

    assert_eq!(values, vec![123.0, 45.67]);
}

#[test]
fn test_scanner_06_string_literal_spans_lines() {
    let tokens: Vec<Token> = Scanner::new("\"hello\nworld\"")
        .filter_map(Result::ok)
        .collect();

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].lexeme, "\"hello\nworld\"");
    match &tokens[0].token_type {
        TokenType::STRING(literal) => assert_eq!(literal, "hello\nworld"),
        other => panic!("expected a string token, got {:?}", other),
    }

    // The embedded newline advanced the line counter.
    assert_eq!(tokens[0].line, 2);
    assert_eq!(tokens[1].token_type, TokenType::EOF);
}

#[test]
fn test_scanner_07_comments_and_whitespace_are_skipped() {
    assert_token_sequence(
        "// nothing to see here\n1 / 2",
        &[
            (TokenType::NUMBER(0.0), "1"),
            (TokenType::SLASH, "/"),
            (TokenType::NUMBER(0.0), "2"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn test_scanner_08_line_numbers_advance() {
    let tokens: Vec<Token> = Scanner::new("1\n2\n\n3").filter_map(Result::ok).collect();

    let lines: Vec<usize> = tokens.iter().map(|token| token.line).collect();
    assert_eq!(lines, vec![1, 2, 4, 4]);
}

#[test]
fn test_scanner_09_unexpected_chars_interleave_with_tokens() {
    let source = ",.$(#";
    let results: Vec<Result<Token, LoxError>> = Scanner::new(source).collect();

    // COMMA, DOT, error for '$', LEFT_PAREN, error for '#', EOF.
    assert_eq!(results.len(), 6, "results: {:?}", results);

    assert_token_matches(&results[0], TokenType::COMMA, ",");
    assert_token_matches(&results[1], TokenType::DOT, ".");
    assert_token_matches(&results[3], TokenType::LEFT_PAREN, "(");
    assert_token_matches(&results[5], TokenType::EOF, "");

    let errors: Vec<String> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .map(|e| e.to_string())
        .collect();
    assert_eq!(errors.len(), 2);

    for error in errors {
        assert_eq!(error, "[line 1] Error: Unexpected character.");
    }
}

#[test]
fn test_scanner_10_unterminated_string() {
    let results: Vec<Result<Token, LoxError>> = Scanner::new("\"abc").collect();

    assert_eq!(results.len(), 2, "results: {:?}", results);
    assert_eq!(
        results[0].as_ref().unwrap_err().to_string(),
        "[line 1] Error: Unterminated string."
    );
    assert_token_matches(&results[1], TokenType::EOF, "");
}

fn assert_token_matches(
    result: &Result<Token, LoxError>,
    expected_type: TokenType,
    expected_lexeme: &str,
) {
    match result {
        Ok(token) => {
            assert_eq!(
                token.token_type, expected_type,
                "Expected token type {:?}, got {:?}",
                expected_type, token.token_type
            );
            assert_eq!(
                token.lexeme, expected_lexeme,
                "Expected lexeme '{}', got '{}'",
                expected_lexeme, token.lexeme
            );
        }
        Err(e) => panic!("Expected token but got error: {}", e),
    }
}
