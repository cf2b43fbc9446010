//! Recursive descent parser for executable GraphQL documents.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use ruql_core::{LineIndex, Location, Span};

/// A syntax error.
///
/// `line` and `col` point at the start of the top-level definition that
/// failed to parse; the message names the offending token and its own
/// position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("{message}")]
#[diagnostic(code(ruql::syntax))]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
    /// The offending token.
    #[label("here")]
    pub span: Span,
}

impl ParseError {
    #[must_use]
    pub fn location(&self) -> Location {
        Location::new(self.line, self.col)
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Deepest nesting of selection sets, list and object values, and list
/// types accepted by [`parse`].
pub const DEFAULT_RECURSION_LIMIT: usize = 256;

/// Parses a source string into a document.
///
/// Empty and whitespace-only sources produce a document without definitions.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    Parser::new(source).parse_document()
}

/// Parses a standalone type reference such as `[Int!]!`.
pub fn parse_type(source: &str) -> Result<Type, ParseError> {
    let mut parser = Parser::new(source);
    let ty = parser.parse_type()?;
    if !parser.at_kind(TokenKind::Eof) {
        return parser.unexpected("end of input");
    }
    Ok(ty)
}

/// Parser for executable documents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lines: LineIndex<'a>,
    current: Token,
    /// Start of the definition being parsed, used for error positions.
    unit_start: u32,
    depth: usize,
    recursion_limit: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            lines: LineIndex::new(source),
            current,
            unit_start: current.span.start,
            depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Sets the deepest nesting the parser accepts before failing.
    #[must_use]
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Enters one level of nesting.
    fn enter(&mut self) -> ParseResult<()> {
        if self.depth >= self.recursion_limit {
            return self.error(&format!(
                "Nesting exceeds the recursion limit of {}",
                self.recursion_limit
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Returns the current token kind.
    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    /// Returns true if at the given kind.
    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Returns true if at a name token with the given text.
    fn at_keyword(&self, keyword: &str) -> bool {
        self.at_kind(TokenKind::Name) && self.current_text() == keyword
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    /// Consumes the given token kind if present.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at_kind(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expects a specific token kind.
    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            self.unexpected(kind.as_str())
        }
    }

    /// Expects a specific keyword.
    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            self.unexpected(&format!("\"{keyword}\""))
        }
    }

    /// Gets the text of the current token.
    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn location(&self, offset: u32) -> Location {
        self.lines.location(offset)
    }

    /// End of the last consumed token.
    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.lexer.pos().max(start))
    }

    /// Reports a syntax error at the current token.
    fn error<T>(&self, detail: &str) -> ParseResult<T> {
        let found = self.location(self.current.span.start);
        let unit = self.location(self.unit_start);
        Err(ParseError {
            message: format!("{detail} at {found}"),
            line: unit.line,
            col: unit.column,
            span: self.current.span,
        })
    }

    /// Reports an expected token error.
    fn unexpected<T>(&self, expected: &str) -> ParseResult<T> {
        let found = match self.at() {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Error => format!("invalid token \"{}\"", self.current_text()),
            _ => format!("\"{}\"", self.current_text()),
        };
        self.error(&format!("Expected {expected}, found {found}"))
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> ParseResult<Document> {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        while !self.at_kind(TokenKind::Eof) {
            self.unit_start = self.current.span.start;
            definitions.push(self.parse_definition()?);
        }

        Ok(Document {
            definitions,
            span: self.span_from(start),
        })
    }

    /// Parses a definition.
    fn parse_definition(&mut self) -> ParseResult<Definition> {
        if self.at_kind(TokenKind::LBrace) {
            return Ok(Definition::Operation(self.parse_operation()?));
        }
        if self.at_kind(TokenKind::Name) {
            if OperationType::from_keyword(self.current_text()).is_some() {
                return Ok(Definition::Operation(self.parse_operation()?));
            }
            if self.at_keyword("fragment") {
                return Ok(Definition::Fragment(self.parse_fragment_definition()?));
            }
        }
        self.unexpected("definition")
    }

    /// Parses a name.
    fn parse_name(&mut self) -> ParseResult<Name> {
        if !self.at_kind(TokenKind::Name) {
            return self.unexpected("Name");
        }
        let span = self.current.span;
        let name = Name::new(self.current_text(), span, self.location(span.start));
        self.advance();
        Ok(name)
    }

    /// Parses an operation definition.
    fn parse_operation(&mut self) -> ParseResult<OperationDefinition> {
        let start = self.current.span.start;

        if self.at_kind(TokenKind::LBrace) {
            // Query shorthand
            let selection_set = self.parse_selection_set()?;
            return Ok(OperationDefinition {
                operation: OperationType::Query,
                name: None,
                variables: Vec::new(),
                directives: Vec::new(),
                selection_set,
                span: self.span_from(start),
                location: self.location(start),
            });
        }

        let operation =
            OperationType::from_keyword(self.current_text()).unwrap_or(OperationType::Query);
        self.advance();

        let name = if self.at_kind(TokenKind::Name) {
            Some(self.parse_name()?)
        } else {
            None
        };

        let variables = if self.at_kind(TokenKind::LParen) {
            self.parse_variable_definitions()?
        } else {
            Vec::new()
        };

        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(OperationDefinition {
            operation,
            name,
            variables,
            directives,
            selection_set,
            span: self.span_from(start),
            location: self.location(start),
        })
    }

    /// Parses variable definitions.
    fn parse_variable_definitions(&mut self) -> ParseResult<Vec<VariableDefinition>> {
        self.expect(TokenKind::LParen)?;
        let mut vars = vec![self.parse_variable_definition()?];
        while !self.eat(TokenKind::RParen) {
            vars.push(self.parse_variable_definition()?);
        }
        Ok(vars)
    }

    /// Parses a variable definition.
    fn parse_variable_definition(&mut self) -> ParseResult<VariableDefinition> {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar)?;
        let name = self.parse_name()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        let default_value = if self.eat(TokenKind::Eq) {
            Some(self.parse_value(true)?)
        } else {
            None
        };

        Ok(VariableDefinition {
            name,
            ty,
            default_value,
            span: self.span_from(start),
            location: self.location(start),
        })
    }

    /// Parses a type reference.
    fn parse_type(&mut self) -> ParseResult<Type> {
        let ty = if self.eat(TokenKind::LBracket) {
            self.enter()?;
            let inner = self.parse_type()?;
            self.expect(TokenKind::RBracket)?;
            self.leave();
            Type::List(Box::new(inner))
        } else {
            Type::Named(self.parse_name()?)
        };

        if self.eat(TokenKind::Bang) {
            Ok(Type::NonNull(Box::new(ty)))
        } else {
            Ok(ty)
        }
    }

    /// Parses a fragment definition.
    fn parse_fragment_definition(&mut self) -> ParseResult<FragmentDefinition> {
        let start = self.current.span.start;
        self.expect_keyword("fragment")?;

        if self.at_keyword("on") {
            return self.unexpected("fragment name");
        }
        let name = self.parse_name()?;
        self.expect_keyword("on")?;
        let type_condition = self.parse_name()?;
        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
            location: self.location(start),
        })
    }

    /// Parses a selection set.
    fn parse_selection_set(&mut self) -> ParseResult<SelectionSet> {
        let start = self.current.span.start;
        self.expect(TokenKind::LBrace)?;
        self.enter()?;

        let mut selections = vec![self.parse_selection()?];
        while !self.eat(TokenKind::RBrace) {
            selections.push(self.parse_selection()?);
        }
        self.leave();

        Ok(SelectionSet {
            selections,
            span: self.span_from(start),
        })
    }

    /// Parses a selection.
    fn parse_selection(&mut self) -> ParseResult<Selection> {
        let start = self.current.span.start;
        if !self.eat(TokenKind::Spread) {
            return Ok(Selection::Field(self.parse_field()?));
        }

        if self.at_keyword("on") {
            self.advance();
            let type_condition = Some(self.parse_name()?);
            let directives = self.parse_directives()?;
            let selection_set = self.parse_selection_set()?;
            Ok(Selection::InlineFragment(InlineFragment {
                type_condition,
                directives,
                selection_set,
                span: self.span_from(start),
                location: self.location(start),
            }))
        } else if self.at_kind(TokenKind::LBrace) || self.at_kind(TokenKind::At) {
            let directives = self.parse_directives()?;
            let selection_set = self.parse_selection_set()?;
            Ok(Selection::InlineFragment(InlineFragment {
                type_condition: None,
                directives,
                selection_set,
                span: self.span_from(start),
                location: self.location(start),
            }))
        } else {
            let name = self.parse_name()?;
            let directives = self.parse_directives()?;
            Ok(Selection::FragmentSpread(FragmentSpread {
                name,
                directives,
                span: self.span_from(start),
                location: self.location(start),
            }))
        }
    }

    /// Parses a field selection.
    fn parse_field(&mut self) -> ParseResult<Field> {
        let start = self.current.span.start;

        let first_name = self.parse_name()?;
        let (alias, name) = if self.eat(TokenKind::Colon) {
            (Some(first_name), self.parse_name()?)
        } else {
            (None, first_name)
        };

        let arguments = self.parse_arguments(false)?;
        let directives = self.parse_directives()?;

        let selection_set = if self.at_kind(TokenKind::LBrace) {
            Some(self.parse_selection_set()?)
        } else {
            None
        };

        Ok(Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: self.span_from(start),
            location: self.location(start),
        })
    }

    /// Parses an optional parenthesised argument list.
    fn parse_arguments(&mut self, is_const: bool) -> ParseResult<Vec<Argument>> {
        if !self.eat(TokenKind::LParen) {
            return Ok(Vec::new());
        }
        let mut args = vec![self.parse_argument(is_const)?];
        while !self.eat(TokenKind::RParen) {
            args.push(self.parse_argument(is_const)?);
        }
        Ok(args)
    }

    /// Parses an argument.
    fn parse_argument(&mut self, is_const: bool) -> ParseResult<Argument> {
        let start = self.current.span.start;
        let name = self.parse_name()?;
        self.expect(TokenKind::Colon)?;
        let value = self.parse_value(is_const)?;
        Ok(Argument {
            name,
            value,
            span: self.span_from(start),
            location: self.location(start),
        })
    }

    /// Parses directives.
    fn parse_directives(&mut self) -> ParseResult<Vec<Directive>> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) {
            let start = self.current.span.start;
            self.advance();
            let name = self.parse_name()?;
            let arguments = self.parse_arguments(false)?;
            directives.push(Directive {
                name,
                arguments,
                span: self.span_from(start),
                location: self.location(start),
            });
        }
        Ok(directives)
    }

    /// Parses a value. Variables are rejected in constant positions.
    fn parse_value(&mut self, is_const: bool) -> ParseResult<Value> {
        match self.at() {
            TokenKind::Dollar if !is_const => {
                self.advance();
                Ok(Value::Variable(self.parse_name()?))
            }
            TokenKind::IntLiteral => {
                let Ok(value) = self.current_text().parse() else {
                    return self.error("Int literal out of range");
                };
                self.advance();
                Ok(Value::Int(value))
            }
            TokenKind::FloatLiteral => {
                let Ok(value) = self.current_text().parse() else {
                    return self.error("Invalid Float literal");
                };
                self.advance();
                Ok(Value::Float(value))
            }
            TokenKind::StringLiteral => {
                let text = self.current_text();
                let Some(value) = unescape(&text[1..text.len() - 1]) else {
                    return self.error("Invalid escape sequence in string");
                };
                self.advance();
                Ok(Value::String(value))
            }
            TokenKind::BlockStringLiteral => {
                let text = self.current_text();
                let value = block_string_value(&text[3..text.len() - 3]);
                self.advance();
                Ok(Value::String(value))
            }
            TokenKind::LBracket => {
                self.advance();
                self.enter()?;
                let mut values = Vec::new();
                while !self.eat(TokenKind::RBracket) {
                    values.push(self.parse_value(is_const)?);
                }
                self.leave();
                Ok(Value::List(values))
            }
            TokenKind::LBrace => {
                self.advance();
                self.enter()?;
                let mut fields = Vec::new();
                while !self.eat(TokenKind::RBrace) {
                    let name = self.parse_name()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_value(is_const)?;
                    fields.push((name, value));
                }
                self.leave();
                Ok(Value::Object(fields))
            }
            TokenKind::Name => {
                let value = match self.current_text() {
                    "true" => Value::Boolean(true),
                    "false" => Value::Boolean(false),
                    "null" => Value::Null,
                    other => Value::Enum(other.to_string()),
                };
                self.advance();
                Ok(value)
            }
            _ => self.unexpected("value"),
        }
    }
}

/// Resolves escape sequences in the body of a quoted string.
fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Dedents a block string body and trims blank leading/trailing lines.
fn block_string_value(raw: &str) -> String {
    let raw = raw.replace("\\\"\"\"", "\"\"\"");
    let lines: Vec<&str> = raw.lines().collect();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut dedented: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line
            } else {
                line.get(common_indent..).unwrap_or("")
            }
        })
        .collect();

    while dedented.first().is_some_and(|line| line.trim().is_empty()) {
        dedented.remove(0);
    }
    while dedented.last().is_some_and(|line| line.trim().is_empty()) {
        dedented.pop();
    }
    dedented.join("\n")
}
