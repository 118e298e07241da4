//! Error-tolerant, lossless parser producing a [`SyntaxTree`].
//!
//! Only the structure the presenter convention relies on is modelled precisely:
//! classes and objects with their bodies, properties with their initializers, and
//! object literals. Everything else (functions, init blocks, imports, arbitrary
//! expressions) is kept as opaque `Member` / `Expression` nodes so nothing is lost.

use thiserror::Error;

use crate::lexer::{tokenize, LexError, Token, TokenKind};
use crate::tree::{NodeId, SyntaxKind, SyntaxTree, TreeError};

/// Soft keywords that may precede a declaration keyword.
const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "internal", "abstract", "final", "open", "sealed",
    "data", "enum", "annotation", "inner", "override", "lateinit", "const", "companion",
    "suspend", "inline", "value", "external", "tailrec", "operator", "infix", "vararg",
    "noinline", "crossinline", "reified", "expect", "actual",
];

const HARD_KEYWORDS: &[&str] = &[
    "as", "break", "class", "continue", "do", "else", "false", "for", "fun", "if", "in",
    "interface", "is", "null", "object", "package", "return", "super", "this", "throw",
    "true", "try", "typealias", "typeof", "val", "var", "when", "while", "import",
];

/// Punctuation that leaves an expression unfinished at the end of a line.
const CONTINUES_AFTER: &[&str] = &["=", ",", ".", ":", "+", "-", "&", "|"];
/// Punctuation that continues the previous line when it starts the next one.
const CONTINUES_BEFORE: &[&str] = &[".", "?", ":", "=", "&", "|", "*", "/"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Unclosed `{{` opened at position {position}")]
    UnclosedBrace { position: usize },
    #[error("Unexpected `}}` at position {position}")]
    UnexpectedClosingBrace { position: usize },
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Expected a single member declaration, found {found}")]
    NotAMember { found: String },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Where a token scan should stop, besides newlines and closing braces.
#[derive(Debug, Clone, Copy)]
enum Stop {
    Statement { brace_continues: bool },
    SuperTypes,
    Type,
}

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    tree: SyntaxTree,
}

/// Parses a whole source file.
pub fn parse_file(text: &str) -> ParseResult<SyntaxTree> {
    let mut parser = Parser::new(text)?;
    let root = parser.tree.root();
    parser.items(root, false)?;
    Ok(parser.tree)
}

/// Parses a single member declaration.
///
/// Returns a scratch tree whose root holds the member plus any surrounding trivia,
/// together with the member node itself.
pub fn parse_member(text: &str) -> ParseResult<(SyntaxTree, NodeId)> {
    let mut parser = Parser::new(text)?;
    let root = parser.tree.root();
    parser.trivia(root)?;
    match parser.peek() {
        None => {
            return Err(ParseError::NotAMember {
                found: "empty input".to_string(),
            })
        }
        Some(tok) if tok.kind == TokenKind::RBrace || tok.is(";") => {
            return Err(ParseError::NotAMember {
                found: format!("`{}`", tok.text),
            })
        }
        Some(_) => {}
    }
    parser.declaration(root)?;
    let member = parser
        .tree
        .children(root)
        .last()
        .copied()
        .ok_or(ParseError::UnexpectedEof)?;
    parser.trivia(root)?;
    if let Some(tok) = parser.peek() {
        return Err(ParseError::NotAMember {
            found: format!("trailing `{}`", tok.text),
        });
    }
    Ok((parser.tree, member))
}

impl<'a> Parser<'a> {
    pub fn new(text: &'a str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            tree: SyntaxTree::new(),
        })
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    /// Index of the first non-trivia token at or after `from`.
    fn significant_from(&self, from: usize) -> Option<usize> {
        (from..self.tokens.len()).find(|&i| !self.tokens[i].kind.is_trivia())
    }

    /// Next significant token and whether a line break separates it from `pos`.
    fn next_significant(&self) -> Option<(usize, bool)> {
        let idx = self.significant_from(self.pos)?;
        let crosses = self.tokens[self.pos..idx].iter().any(Token::has_newline);
        Some((idx, crosses))
    }

    /// Next significant token if it sits on the current line.
    fn same_line(&self) -> Option<&Token<'a>> {
        match self.next_significant() {
            Some((idx, false)) => self.tokens.get(idx),
            _ => None,
        }
    }

    fn leaf(&mut self, parent: NodeId, kind: SyntaxKind) -> ParseResult<NodeId> {
        let text = self.peek().ok_or(ParseError::UnexpectedEof)?.text;
        let id = self.tree.alloc_leaf(kind, text);
        self.tree.append_child(parent, id)?;
        self.pos += 1;
        Ok(id)
    }

    fn leaf_auto(&mut self, parent: NodeId) -> ParseResult<NodeId> {
        let kind = self
            .peek()
            .map(leaf_kind)
            .ok_or(ParseError::UnexpectedEof)?;
        self.leaf(parent, kind)
    }

    fn node(&mut self, parent: NodeId, kind: SyntaxKind) -> ParseResult<NodeId> {
        let id = self.tree.alloc_node(kind);
        self.tree.append_child(parent, id)?;
        Ok(id)
    }

    fn trivia(&mut self, parent: NodeId) -> ParseResult<()> {
        while self.peek().is_some_and(|t| t.kind.is_trivia()) {
            self.leaf_auto(parent)?;
        }
        Ok(())
    }

    /// Moves every token up to `end` (exclusive) into `parent` as leaves.
    fn leaves_until(&mut self, parent: NodeId, end: usize) -> ParseResult<()> {
        while self.pos < end {
            self.leaf_auto(parent)?;
        }
        Ok(())
    }

    fn items(&mut self, parent: NodeId, in_body: bool) -> ParseResult<()> {
        while let Some(tok) = self.peek() {
            match tok.kind {
                kind if kind.is_trivia() => {
                    self.leaf_auto(parent)?;
                }
                TokenKind::RBrace if in_body => return Ok(()),
                TokenKind::RBrace => {
                    return Err(ParseError::UnexpectedClosingBrace {
                        position: tok.span.start,
                    })
                }
                TokenKind::Punct if tok.is(";") => {
                    self.leaf(parent, SyntaxKind::Punct)?;
                }
                _ => self.declaration(parent)?,
            }
        }
        Ok(())
    }

    fn declaration(&mut self, parent: NodeId) -> ParseResult<()> {
        let keyword_idx = self.modifiers_end(self.pos);
        let keyword = self.tokens.get(keyword_idx).map(|t| t.text);
        match keyword {
            Some("class") | Some("interface") => self.class_decl(parent),
            Some("object") => self.object_decl(parent),
            Some("val") | Some("var") => self.property(parent),
            Some("fun") => self.function(parent),
            _ => self.opaque(parent, SyntaxKind::Member),
        }
    }

    /// Index of the first token after any modifiers and annotations starting at `from`.
    fn modifiers_end(&self, from: usize) -> usize {
        let mut idx = from;
        loop {
            let Some(sig) = self.significant_from(idx) else {
                return idx;
            };
            let tok = &self.tokens[sig];
            if tok.kind == TokenKind::Word && MODIFIERS.contains(&tok.text) {
                let followed_by_word = self
                    .significant_from(sig + 1)
                    .map(|n| &self.tokens[n])
                    .is_some_and(|n| n.kind == TokenKind::Word || n.is("@"));
                if followed_by_word {
                    idx = sig + 1;
                    continue;
                }
            }
            if tok.is("@") {
                idx = self.annotation_end(sig);
                continue;
            }
            return sig;
        }
    }

    /// `@Name`, `@a.b.Name`, `@field:Name`, each optionally followed by arguments.
    fn annotation_end(&self, at: usize) -> usize {
        let is_word = |i: usize| self.tokens.get(i).is_some_and(|t| t.kind == TokenKind::Word);
        let mut i = at + 1;
        while is_word(i) {
            i += 1;
            let joins = self.tokens.get(i).is_some_and(|t| t.is(".") || t.is(":"));
            if joins && is_word(i + 1) {
                i += 1;
            } else {
                break;
            }
        }
        if self.tokens.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            i = self.group_end(i);
        }
        i
    }

    /// Index just past the bracket closing the group opened at `open`.
    fn group_end(&self, open: usize) -> usize {
        let mut depth = 0usize;
        for (i, tok) in self.tokens.iter().enumerate().skip(open) {
            match tok.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return i + 1;
                    }
                }
                _ => {}
            }
        }
        self.tokens.len()
    }

    /// End (exclusive) of the last significant token belonging to the construct
    /// starting at `from`.
    fn scan_end(&self, from: usize, stop: Stop) -> usize {
        let mut depth = 0usize;
        let mut end = from;
        let mut i = from;
        while let Some(tok) = self.tokens.get(i) {
            if depth == 0 {
                let stops_here = match stop {
                    Stop::SuperTypes => tok.kind == TokenKind::LBrace || tok.is("where"),
                    Stop::Type => tok.is("=") || tok.is("by") || tok.kind == TokenKind::LBrace,
                    Stop::Statement { .. } => false,
                };
                if stops_here || tok.kind == TokenKind::RBrace {
                    break;
                }
                if tok.has_newline() && !self.continues_line(from, end, i, stop) {
                    break;
                }
                if tok.is(";") {
                    if matches!(stop, Stop::Statement { .. }) {
                        end = i + 1;
                    }
                    break;
                }
            }
            match tok.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            if !tok.kind.is_trivia() {
                end = i + 1;
            }
            i += 1;
        }
        end
    }

    fn continues_line(&self, from: usize, end: usize, newline: usize, stop: Stop) -> bool {
        if end == from {
            return true;
        }
        let prev = &self.tokens[end - 1];
        let open_after = match prev.kind {
            TokenKind::Punct => CONTINUES_AFTER.contains(&prev.text),
            TokenKind::Word => matches!(prev.text, "by" | "in" | "is" | "as" | "else"),
            _ => false,
        };
        if open_after {
            return true;
        }
        let Some(next) = self.significant_from(newline).map(|i| &self.tokens[i]) else {
            return false;
        };
        match next.kind {
            TokenKind::Punct => CONTINUES_BEFORE.contains(&next.text),
            TokenKind::Word => matches!(next.text, "else" | "catch" | "finally"),
            TokenKind::LBrace => matches!(stop, Stop::Statement { brace_continues: true }),
            _ => false,
        }
    }

    /// Collects leading modifiers and annotations into a `ModifierList` node.
    fn modifier_list(&mut self, parent: NodeId) -> ParseResult<()> {
        let keyword = self.modifiers_end(self.pos);
        let mut end = keyword;
        while end > self.pos && self.tokens[end - 1].kind.is_trivia() {
            end -= 1;
        }
        if end > self.pos {
            let list = self.node(parent, SyntaxKind::ModifierList)?;
            while self.pos < end {
                let is_modifier = self
                    .peek()
                    .is_some_and(|t| t.kind == TokenKind::Word && MODIFIERS.contains(&t.text));
                if is_modifier {
                    self.leaf(list, SyntaxKind::Keyword)?;
                } else {
                    self.leaf_auto(list)?;
                }
            }
        }
        self.trivia(parent)
    }

    fn class_decl(&mut self, parent: NodeId) -> ParseResult<()> {
        let node = self.node(parent, SyntaxKind::Class)?;
        self.modifier_list(node)?;
        self.leaf(node, SyntaxKind::Keyword)?;
        self.header(node)
    }

    fn object_decl(&mut self, parent: NodeId) -> ParseResult<()> {
        let node = self.node(parent, SyntaxKind::ObjectDeclaration)?;
        self.modifier_list(node)?;
        self.leaf(node, SyntaxKind::Keyword)?;
        self.header(node)
    }

    fn object_literal(&mut self, parent: NodeId) -> ParseResult<()> {
        let literal = self.node(parent, SyntaxKind::ObjectLiteral)?;
        let decl = self.node(literal, SyntaxKind::ObjectDeclaration)?;
        self.leaf(decl, SyntaxKind::Keyword)?;
        self.header(decl)
    }

    /// Name, type parameters, primary constructor, supertypes and body of a class
    /// or object, all optional.
    fn header(&mut self, node: NodeId) -> ParseResult<()> {
        if let Some(tok) = self.same_line() {
            if tok.kind == TokenKind::Word && !tok.is("where") && !tok.is("constructor") {
                self.trivia(node)?;
                self.leaf(node, SyntaxKind::Identifier)?;
            }
        }

        while let Some((idx, crosses_line)) = self.next_significant() {
            let tok = &self.tokens[idx];
            match tok.kind {
                TokenKind::Punct if tok.is("<") && !crosses_line => {
                    self.trivia(node)?;
                    self.angle_group(node)?;
                }
                TokenKind::Punct if tok.is("@") && !crosses_line => {
                    self.trivia(node)?;
                    let end = self.annotation_end(idx);
                    self.leaves_until(node, end)?;
                }
                TokenKind::Word if !crosses_line && (tok.is("constructor") || MODIFIERS.contains(&tok.text)) => {
                    self.trivia(node)?;
                    self.leaf(node, SyntaxKind::Keyword)?;
                }
                TokenKind::LParen if !crosses_line => {
                    self.trivia(node)?;
                    let params = self.node(node, SyntaxKind::ParameterList)?;
                    let end = self.group_end(self.pos);
                    self.leaves_until(params, end)?;
                }
                TokenKind::Punct if tok.is(":") => {
                    self.trivia(node)?;
                    self.leaf(node, SyntaxKind::Punct)?;
                    self.trivia(node)?;
                    let list = self.node(node, SyntaxKind::SuperTypeList)?;
                    let end = self.scan_end(self.pos, Stop::SuperTypes);
                    self.leaves_until(list, end)?;
                }
                TokenKind::Word if tok.is("where") => {
                    self.trivia(node)?;
                    self.leaf(node, SyntaxKind::Keyword)?;
                    let end = self.scan_end(self.pos, Stop::SuperTypes);
                    self.leaves_until(node, end)?;
                }
                TokenKind::LBrace => {
                    self.trivia(node)?;
                    return self.class_body(node);
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn class_body(&mut self, parent: NodeId) -> ParseResult<()> {
        let body = self.node(parent, SyntaxKind::ClassBody)?;
        let position = self.peek().map_or(0, |t| t.span.start);
        self.leaf(body, SyntaxKind::LBrace)?;
        self.items(body, true)?;
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::RBrace => {
                self.leaf(body, SyntaxKind::RBrace)?;
                Ok(())
            }
            _ => Err(ParseError::UnclosedBrace { position }),
        }
    }

    /// `<...>` type parameter list, kept as leaves.
    fn angle_group(&mut self, parent: NodeId) -> ParseResult<()> {
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            if tok.kind == TokenKind::LBrace || tok.kind == TokenKind::RBrace || tok.is("=") {
                break;
            }
            let closes = tok.is(">");
            if tok.is("<") {
                depth += 1;
            }
            self.leaf_auto(parent)?;
            if closes {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
        }
        Ok(())
    }

    fn property(&mut self, parent: NodeId) -> ParseResult<()> {
        let node = self.node(parent, SyntaxKind::Property)?;
        self.modifier_list(node)?;
        self.leaf(node, SyntaxKind::Keyword)?;

        if self.same_line().is_some_and(|t| t.is("<")) {
            self.trivia(node)?;
            self.angle_group(node)?;
        }

        if self.same_line().is_some_and(|t| t.kind == TokenKind::Word) {
            self.trivia(node)?;
            self.property_name(node)?;
        }

        if let Some((idx, _)) = self.next_significant() {
            if self.tokens[idx].is(":") {
                self.trivia(node)?;
                self.leaf(node, SyntaxKind::Punct)?;
                self.trivia(node)?;
                let type_ref = self.node(node, SyntaxKind::TypeReference)?;
                let end = self.scan_end(self.pos, Stop::Type);
                self.leaves_until(type_ref, end)?;
            }
        }

        let initializer = self
            .same_line()
            .map(|t| (t.is("="), t.is("by")))
            .filter(|&(eq, by)| eq || by);
        if let Some((eq, _)) = initializer {
            self.trivia(node)?;
            let kind = if eq { SyntaxKind::Punct } else { SyntaxKind::Keyword };
            self.leaf(node, kind)?;
            let starts_object = self
                .significant_from(self.pos)
                .is_some_and(|i| self.tokens[i].is("object"));
            self.trivia(node)?;
            if starts_object {
                self.object_literal(node)?;
            } else {
                self.opaque(node, SyntaxKind::Expression)?;
            }
        }

        self.rest_of_statement(node)
    }

    /// `name` or `Receiver.name`; the receiver becomes a `TypeReference`.
    fn property_name(&mut self, node: NodeId) -> ParseResult<()> {
        let is_word = |i: usize| self.tokens.get(i).is_some_and(|t| t.kind == TokenKind::Word);
        let mut last = self.pos;
        while self.tokens.get(last + 1).is_some_and(|t| t.is(".")) && is_word(last + 2) {
            last += 2;
        }
        if last > self.pos {
            let receiver = self.node(node, SyntaxKind::TypeReference)?;
            self.leaves_until(receiver, last - 1)?;
            self.leaf(node, SyntaxKind::Punct)?;
        }
        self.leaf(node, SyntaxKind::Identifier)?;
        Ok(())
    }

    /// Anything left on the declaration's line, such as `get() = field`.
    ///
    /// A `;` ends the declaration; whatever follows it is the next item.
    fn rest_of_statement(&mut self, node: NodeId) -> ParseResult<()> {
        let terminated = self.tokens[..self.pos]
            .iter()
            .rev()
            .find(|t| !t.kind.is_trivia())
            .is_some_and(|t| t.is(";"));
        if terminated {
            return Ok(());
        }
        let Some(tok) = self.same_line() else {
            return Ok(());
        };
        if tok.kind == TokenKind::RBrace || tok.is(";") {
            return Ok(());
        }
        self.trivia(node)?;
        let end = self.scan_end(self.pos, Stop::Statement { brace_continues: false });
        self.leaves_until(node, end.max(self.pos + 1))
    }

    fn function(&mut self, parent: NodeId) -> ParseResult<()> {
        let node = self.node(parent, SyntaxKind::Function)?;
        self.modifier_list(node)?;
        let end = self.scan_end(self.pos, Stop::Statement { brace_continues: true });
        self.leaves_until(node, end.max(self.pos + 1))
    }

    fn opaque(&mut self, parent: NodeId, kind: SyntaxKind) -> ParseResult<()> {
        let brace_continues = kind == SyntaxKind::Member;
        let mut end = self.scan_end(self.pos, Stop::Statement { brace_continues });
        if kind == SyntaxKind::Member {
            // A member always makes progress, even on a token no rule claims
            end = end.max(self.pos + 1).min(self.tokens.len());
        }
        if end > self.pos {
            let node = self.node(parent, kind)?;
            self.leaves_until(node, end)?;
        }
        Ok(())
    }
}

fn leaf_kind(tok: &Token<'_>) -> SyntaxKind {
    match tok.kind {
        TokenKind::Whitespace => SyntaxKind::Whitespace,
        TokenKind::Comment => SyntaxKind::Comment,
        TokenKind::StringLit | TokenKind::CharLit => SyntaxKind::Literal,
        TokenKind::LBrace => SyntaxKind::LBrace,
        TokenKind::RBrace => SyntaxKind::RBrace,
        TokenKind::Word if tok.text.starts_with(|c: char| c.is_ascii_digit()) => SyntaxKind::Literal,
        TokenKind::Word if HARD_KEYWORDS.contains(&tok.text) => SyntaxKind::Keyword,
        TokenKind::Word => SyntaxKind::Identifier,
        _ => SyntaxKind::Punct,
    }
}
