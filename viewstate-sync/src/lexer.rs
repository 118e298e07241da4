//! Lossless tokenizer for the Kotlin subset used by presenter files.
//!
//! Every byte of the input ends up in exactly one token, whitespace and comments
//! included, so the parser can build a tree that renders back to the original text.

use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,
    /// Identifier, keyword, number or backticked name
    Word,
    StringLit,
    CharLit,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Punct,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    pub fn has_newline(&self) -> bool {
        self.kind == TokenKind::Whitespace && self.text.contains('\n')
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Unterminated character literal at position {position}")]
    UnterminatedChar { position: usize },
    #[error("Unterminated block comment at position {position}")]
    UnterminatedComment { position: usize },
}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    pub fn tokenize(mut self) -> LexResult<Vec<Token<'a>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn current_index(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |&(i, _)| i)
    }

    fn rest(&mut self) -> &'a str {
        let i = self.current_index();
        &self.input[i..]
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.chars.peek().is_some_and(|&(_, c)| pred(c)) {
            self.chars.next();
        }
    }

    fn token(&mut self, kind: TokenKind, start: usize) -> Token<'a> {
        let end = self.current_index();
        Token {
            kind,
            text: &self.input[start..end],
            span: Span { start, end },
        }
    }

    pub fn next_token(&mut self) -> LexResult<Option<Token<'a>>> {
        let Some(&(start, c)) = self.chars.peek() else {
            return Ok(None);
        };

        let kind = match c {
            c if c.is_whitespace() => {
                self.bump_while(char::is_whitespace);
                TokenKind::Whitespace
            }
            '/' if self.rest().starts_with("//") => {
                self.bump_while(|c| c != '\n');
                TokenKind::Comment
            }
            '/' if self.rest().starts_with("/*") => {
                self.block_comment(start)?;
                TokenKind::Comment
            }
            '"' => {
                self.string(start)?;
                TokenKind::StringLit
            }
            '\'' => {
                self.char_literal(start)?;
                TokenKind::CharLit
            }
            '`' => {
                self.bump();
                self.bump_while(|c| c != '`' && c != '\n');
                if self.bump() != Some('`') {
                    return Err(LexError::UnterminatedString { position: start });
                }
                TokenKind::Word
            }
            c if c.is_alphanumeric() || c == '_' => {
                self.bump_while(|c| c.is_alphanumeric() || c == '_');
                TokenKind::Word
            }
            '{' => {
                self.bump();
                TokenKind::LBrace
            }
            '}' => {
                self.bump();
                TokenKind::RBrace
            }
            '(' => {
                self.bump();
                TokenKind::LParen
            }
            ')' => {
                self.bump();
                TokenKind::RParen
            }
            '[' => {
                self.bump();
                TokenKind::LBracket
            }
            ']' => {
                self.bump();
                TokenKind::RBracket
            }
            _ => {
                self.bump();
                TokenKind::Punct
            }
        };

        Ok(Some(self.token(kind, start)))
    }

    /// Block comments nest in Kotlin.
    fn block_comment(&mut self, start: usize) -> LexResult<()> {
        let mut depth = 0usize;
        loop {
            let rest = self.rest();
            if rest.starts_with("/*") {
                depth += 1;
                self.bump();
                self.bump();
            } else if rest.starts_with("*/") {
                depth -= 1;
                self.bump();
                self.bump();
                if depth == 0 {
                    return Ok(());
                }
            } else if self.bump().is_none() {
                return Err(LexError::UnterminatedComment { position: start });
            }
        }
    }

    fn string(&mut self, start: usize) -> LexResult<()> {
        if self.rest().starts_with("\"\"\"") {
            self.bump();
            self.bump();
            self.bump();
            loop {
                if self.rest().starts_with("\"\"\"") {
                    self.bump();
                    self.bump();
                    self.bump();
                    // A raw string may end with extra quotes: """a""""
                    self.bump_while(|c| c == '"');
                    return Ok(());
                }
                if self.bump().is_none() {
                    return Err(LexError::UnterminatedString { position: start });
                }
            }
        }

        self.bump();
        let mut template_depth = 0usize;
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedString { position: start }),
                Some('\n') if template_depth == 0 => {
                    return Err(LexError::UnterminatedString { position: start })
                }
                Some('\\') => {
                    self.bump();
                }
                Some('$') if self.chars.peek().is_some_and(|&(_, c)| c == '{') => {
                    self.bump();
                    template_depth += 1;
                }
                Some('{') if template_depth > 0 => template_depth += 1,
                Some('}') if template_depth > 0 => template_depth -= 1,
                Some('"') if template_depth == 0 => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn char_literal(&mut self, start: usize) -> LexResult<()> {
        self.bump();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(LexError::UnterminatedChar { position: start }),
                Some('\\') => {
                    self.bump();
                }
                Some('\'') => return Ok(()),
                Some(_) => {}
            }
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_property_tokens() {
        assert_eq!(
            kinds("val loading: Boolean = false"),
            vec![
                (TokenKind::Word, "val"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Word, "loading"),
                (TokenKind::Punct, ":"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Word, "Boolean"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Punct, "="),
                (TokenKind::Whitespace, " "),
                (TokenKind::Word, "false"),
            ]
        );
    }

    #[test]
    fn test_lossless() {
        let src = "class A {\n  /* a /* nested */ b */ val s = \"x${ y }\\\"\" // tail\n  val c = 'q'\n}\n";
        let joined: String = tokenize(src).unwrap().iter().map(|t| t.text).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn test_string_template_with_braces() {
        let tokens = tokenize("\"a ${ map { it } } b\"").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::StringLit);
    }

    #[test]
    fn test_raw_string() {
        let tokens = tokenize("\"\"\"line \"one\"\nline two\"\"\"").unwrap();
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_backticked_name() {
        assert_eq!(kinds("`is`"), vec![(TokenKind::Word, "`is`")]);
    }

    #[test]
    fn test_unterminated_errors() {
        assert_eq!(
            tokenize("val s = \"abc").unwrap_err(),
            LexError::UnterminatedString { position: 8 }
        );
        assert_eq!(
            tokenize("/* open").unwrap_err(),
            LexError::UnterminatedComment { position: 0 }
        );
        assert_eq!(
            tokenize("'a").unwrap_err(),
            LexError::UnterminatedChar { position: 0 }
        );
    }
}
