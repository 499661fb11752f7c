use crate::frontend::{
    ast::{
        ArithmeticOperator, Body, ComparisonOperator, ConstDecl, Expression, ExpressionKind,
        FunctionDecl, Identifier, LValue, LValueKind, Literal, LiteralKind, Param, Program,
        Statement, StatementKind, TypeDecl, TypeExpr, TypeExprKind, VarDecl,
    },
    lexer::{Keyword, Token, TokenKind, TokenValue},
};

/// An unexpected token. The parser records these and resynchronizes instead
/// of stopping at the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub found: String,
    pub expected: String,
}

impl core::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "expected {} but found `{}` (line {})",
            self.expected, self.found, self.line
        )
    }
}

impl std::error::Error for SyntaxError {}

type ParseResult<T> = Result<T, SyntaxError>;

/// Where panic mode recovery is allowed to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPoint {
    Statement,
    Declaration,
    /// Past a broken function header, in front of its `var` section or body
    FunctionBody,
}

#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    /// Parses a whole program from a token stream. Fails if any syntax error
    /// was recorded, even when recovery managed to build a tree.
    pub fn parse_program(mut tokens: Vec<Token>) -> Result<Program, Vec<SyntaxError>> {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let line = tokens.last().map(|t| t.line).unwrap_or(1);

            tokens.push(Token {
                kind: TokenKind::Eof,
                value: TokenValue::None,
                line,
            });
        }

        let mut parser = Self {
            tokens,
            position: 0,
            errors: Vec::new(),
        };

        let program = parser.parse_program_node();

        match program {
            Ok(program) if parser.errors.is_empty() => Ok(program),
            Ok(_) => Err(parser.errors),
            Err(error) => {
                parser.errors.push(error);
                Err(parser.errors)
            }
        }
    }

    fn peek(&self) -> &Token {
        // The stream always ends with an Eof token which is never consumed
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.position + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();

        if token.kind != TokenKind::Eof {
            self.position += 1;
        }

        token
    }

    fn unexpected(&self, expected: impl Into<String>) -> SyntaxError {
        let token = self.peek();

        SyntaxError {
            line: token.line,
            found: token.to_string(),
            expected: expected.into(),
        }
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.peek_kind() != kind {
            return Err(self.unexpected(kind.describe()));
        }

        Ok(self.next())
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.next();
            return true;
        }

        false
    }

    /// Panic mode recovery: skip tokens until a `;` (consumed) or a token
    /// that closes the current construct (not consumed). Nested
    /// `begin`/`record` ... `end` pairs are skipped as a whole.
    fn synchronize(&mut self, sync_point: SyncPoint) {
        let mut depth = 0usize;

        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Keyword(Keyword::Var | Keyword::Begin)
                    if depth == 0 && sync_point == SyncPoint::FunctionBody =>
                {
                    return;
                }
                _ if sync_point == SyncPoint::FunctionBody => {}
                TokenKind::Semicolon if depth == 0 => {
                    self.next();
                    return;
                }
                TokenKind::Keyword(Keyword::End) if depth == 0 => return,
                TokenKind::Keyword(
                    Keyword::Const
                    | Keyword::Type
                    | Keyword::Var
                    | Keyword::Function
                    | Keyword::Begin,
                ) if depth == 0 && sync_point == SyncPoint::Declaration => return,
                TokenKind::Keyword(Keyword::Begin | Keyword::Record) => depth += 1,
                TokenKind::Keyword(Keyword::End) => depth -= 1,
                _ => {}
            }

            self.next();
        }
    }

    /// Skips past the `end` closing the construct the parser is inside of
    fn skip_past_end(&mut self) {
        let mut depth = 0usize;

        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Keyword(Keyword::End) if depth == 0 => {
                    self.next();
                    return;
                }
                TokenKind::Keyword(Keyword::Begin | Keyword::Record) => depth += 1,
                TokenKind::Keyword(Keyword::End) => depth -= 1,
                _ => {}
            }

            self.next();
        }
    }

    fn recover(&mut self, error: SyntaxError, sync_point: SyncPoint) {
        tracing::trace!(line = error.line, "recovering from syntax error");
        self.errors.push(error);
        self.synchronize(sync_point);
    }

    // program name; body .
    fn parse_program_node(&mut self) -> ParseResult<Program> {
        let program_keyword = self.expect_keyword(Keyword::Program)?;
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Semicolon)?;

        let body = self.parse_body()?;

        self.eat(TokenKind::Dot);

        if self.peek_kind() != TokenKind::Eof {
            return Err(self.unexpected("end of file"));
        }

        Ok(Program {
            line: program_keyword.line,
            name,
            body,
        })
    }

    fn parse_body(&mut self) -> ParseResult<Body> {
        let consts = if self.eat(TokenKind::Keyword(Keyword::Const)) {
            self.parse_declaration_list(Self::parse_const_decl)
        } else {
            Vec::new()
        };

        let types = if self.eat(TokenKind::Keyword(Keyword::Type)) {
            self.parse_declaration_list(Self::parse_type_decl)
        } else {
            Vec::new()
        };

        let vars = self.parse_var_section();

        let mut functions = Vec::new();
        while self.peek_kind() == TokenKind::Keyword(Keyword::Function) {
            functions.push(self.parse_function_decl()?);
        }

        let statements = self.parse_block_statements()?;

        Ok(Body {
            consts,
            types,
            vars,
            functions,
            statements,
        })
    }

    /// Parses one or more `;` terminated declarations. Each declaration
    /// starts with an identifier.
    fn parse_declaration_list<T>(
        &mut self,
        mut parse: impl FnMut(&mut Self) -> ParseResult<T>,
    ) -> Vec<T> {
        let mut declarations = Vec::new();

        loop {
            match parse(self) {
                Ok(declaration) => declarations.push(declaration),
                Err(error) => self.recover(error, SyncPoint::Declaration),
            }

            if self.peek_kind() != TokenKind::Identifier {
                break;
            }
        }

        declarations
    }

    fn parse_var_section(&mut self) -> Vec<VarDecl> {
        if !self.eat(TokenKind::Keyword(Keyword::Var)) {
            return Vec::new();
        }

        self.parse_declaration_list(|parser| {
            let declaration = parser.parse_var_decl()?;
            parser.expect_next_to_be(TokenKind::Semicolon)?;
            Ok(declaration)
        })
    }

    // pi := 3.14;
    fn parse_const_decl(&mut self) -> ParseResult<ConstDecl> {
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Assign)?;
        let value = self.parse_literal()?;
        self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(ConstDecl { name, value })
    }

    fn parse_literal(&mut self) -> ParseResult<Literal> {
        let token = self.peek().clone();

        let kind = match token.value {
            TokenValue::Integer(value) => LiteralKind::Integer(value),
            TokenValue::Real(value) => LiteralKind::Real(value),
            TokenValue::String(value) => LiteralKind::String(value),
            _ => return Err(self.unexpected("string or number literal")),
        };

        self.next();

        Ok(Literal {
            line: token.line,
            kind,
        })
    }

    // point := record x, y: real; end;
    fn parse_type_decl(&mut self) -> ParseResult<TypeDecl> {
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Assign)?;
        let ty = self.parse_type()?;
        self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(TypeDecl { name, ty })
    }

    // a, b: integer
    fn parse_var_decl(&mut self) -> ParseResult<VarDecl> {
        let names = self.parse_identifier_list()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        Ok(VarDecl { names, ty })
    }

    fn parse_identifier_list(&mut self) -> ParseResult<Vec<Identifier>> {
        let mut names = vec![self.parse_identifier()?];

        while self.eat(TokenKind::Comma) {
            names.push(self.parse_identifier()?);
        }

        Ok(names)
    }

    fn parse_identifier(&mut self) -> ParseResult<Identifier> {
        let token = self.expect_next_to_be(TokenKind::Identifier)?;

        let TokenValue::Identifier(name) = token.value else {
            return Err(SyntaxError {
                line: token.line,
                found: token.to_string(),
                expected: "identifier".to_string(),
            });
        };

        Ok(Identifier {
            line: token.line,
            name,
        })
    }

    // type = "integer" | "real" | IDENTIFIER
    //        | "array" "[" INTEGER "]" "of" type
    //        | "record" ( ident_list ":" type ";" )+ "end"
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let token = self.peek().clone();

        let kind = match token.kind {
            TokenKind::Keyword(keyword @ (Keyword::Integer | Keyword::Real)) => {
                self.next();

                TypeExprKind::Simple(Identifier {
                    line: token.line,
                    name: keyword.to_string(),
                })
            }
            TokenKind::Identifier => TypeExprKind::Simple(self.parse_identifier()?),
            TokenKind::Keyword(Keyword::Array) => {
                self.next();
                self.expect_next_to_be(TokenKind::OpenBracket)?;

                let size_token = self.peek().clone();
                let TokenValue::Integer(size) = size_token.value else {
                    return Err(self.unexpected("array size (integer literal)"));
                };
                let size = u64::try_from(size).map_err(|_| self.unexpected("positive array size"))?;
                self.next();

                self.expect_next_to_be(TokenKind::CloseBracket)?;
                self.expect_keyword(Keyword::Of)?;

                let element = self.parse_type()?;

                TypeExprKind::Array {
                    size,
                    element: Box::new(element),
                }
            }
            TokenKind::Keyword(Keyword::Record) => {
                self.next();

                let mut fields = vec![];

                // At least one field is required. A broken field skips the
                // rest of the record so the enclosing declaration continues
                // after its `end`.
                let parsed = loop {
                    let field = self.parse_var_decl().and_then(|field| {
                        self.expect_next_to_be(TokenKind::Semicolon)?;
                        Ok(field)
                    });

                    match field {
                        Ok(field) => fields.push(field),
                        Err(error) => break Err(error),
                    }

                    if self.peek_kind() != TokenKind::Identifier {
                        break self.expect_keyword(Keyword::End);
                    }
                };

                if let Err(error) = parsed {
                    tracing::trace!(line = error.line, "recovering inside record type");
                    self.errors.push(error);
                    self.skip_past_end();
                }

                TypeExprKind::Record(fields)
            }
            _ => return Err(self.unexpected("type")),
        };

        Ok(TypeExpr {
            line: token.line,
            kind,
        })
    }

    /// function name(a, b: integer; c: real): integer var ...; begin ... end
    ///
    /// A broken header is reported and skipped so the body can still be
    /// checked for syntax errors.
    fn parse_function_decl(&mut self) -> ParseResult<FunctionDecl> {
        let function_keyword = self.expect_keyword(Keyword::Function)?;

        let header = match self.parse_function_header() {
            Ok(header) => Some(header),
            Err(error) => {
                self.recover(error, SyncPoint::FunctionBody);
                None
            }
        };

        let locals = self.parse_var_section();
        let statements = self.parse_block_statements()?;

        self.eat(TokenKind::Semicolon);

        // The error was already recorded, so this function never reaches the
        // analyzer. Produce a placeholder to keep parsing.
        let (name, parameters, return_type) = header.unwrap_or_else(|| {
            let line = function_keyword.line;
            let placeholder = Identifier {
                line,
                name: String::new(),
            };

            (
                placeholder.clone(),
                Vec::new(),
                TypeExpr {
                    line,
                    kind: TypeExprKind::Simple(placeholder),
                },
            )
        });

        Ok(FunctionDecl {
            line: function_keyword.line,
            name,
            parameters,
            return_type,
            locals,
            statements,
        })
    }

    fn parse_function_header(&mut self) -> ParseResult<(Identifier, Vec<Param>, TypeExpr)> {
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::OpenParen)?;

        let mut parameters = Vec::new();

        // If the next token is not a closing paren, there MUST be at least
        // one parameter group
        if self.peek_kind() != TokenKind::CloseParen {
            loop {
                let VarDecl { names, ty } = self.parse_var_decl()?;
                parameters.push(Param { names, ty });

                if !self.eat(TokenKind::Semicolon) {
                    break;
                }
            }
        }

        self.expect_next_to_be(TokenKind::CloseParen)?;
        self.expect_next_to_be(TokenKind::Colon)?;

        let return_type = self.parse_type()?;

        Ok((name, parameters, return_type))
    }

    // "begin" statement_list "end"
    fn parse_block_statements(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect_keyword(Keyword::Begin)?;
        let statements = self.parse_statement_list();
        self.expect_keyword(Keyword::End)?;

        Ok(statements)
    }

    /// Statements separated by `;`. Stops in front of `end` (or the end of
    /// the file) without consuming it.
    fn parse_statement_list(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();

        loop {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::End) | TokenKind::Eof => break,
                // Empty statement
                TokenKind::Semicolon => {
                    self.next();
                    continue;
                }
                _ => {}
            }

            let start = self.position;

            match self.parse_statement() {
                Ok(statement) => {
                    statements.push(statement);

                    match self.peek_kind() {
                        TokenKind::Semicolon => {
                            self.next();
                        }
                        TokenKind::Keyword(Keyword::End) | TokenKind::Eof => break,
                        _ => {
                            let error = self.unexpected("`;` or `end`");
                            self.recover(error, SyncPoint::Statement);
                        }
                    }
                }
                Err(error) => {
                    self.recover(error, SyncPoint::Statement);

                    // Always make progress, even on a token recovery stops at
                    if self.position == start && self.peek_kind() != TokenKind::Eof {
                        self.next();
                    }
                }
            }
        }

        statements
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let token = self.peek().clone();

        let kind = match token.kind {
            TokenKind::Identifier => {
                let target = self.parse_lvalue()?;
                self.expect_next_to_be(TokenKind::Assign)?;
                let value = self.parse_expression()?;

                StatementKind::Assign { target, value }
            }
            TokenKind::Keyword(Keyword::While) => {
                self.next();
                let condition = self.parse_expression()?;
                let body = self.parse_block_statements()?;

                StatementKind::While { condition, body }
            }
            TokenKind::Keyword(Keyword::If) => {
                self.next();
                let condition = self.parse_expression()?;
                self.expect_keyword(Keyword::Then)?;
                let positive = self.parse_block_statements()?;

                let negative = if self.eat(TokenKind::Keyword(Keyword::Else)) {
                    Some(self.parse_block_statements()?)
                } else {
                    None
                };

                StatementKind::If {
                    condition,
                    positive,
                    negative,
                }
            }
            TokenKind::Keyword(Keyword::Write) => {
                self.next();
                self.expect_next_to_be(TokenKind::OpenParen)?;
                let operand = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;

                StatementKind::Write(operand)
            }
            TokenKind::Keyword(Keyword::Read) => {
                self.next();
                self.expect_next_to_be(TokenKind::OpenParen)?;
                let target = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;

                StatementKind::Read(target)
            }
            TokenKind::Keyword(Keyword::Begin) => StatementKind::Block(self.parse_block_statements()?),
            _ => return Err(self.unexpected("statement")),
        };

        Ok(Statement {
            line: token.line,
            kind,
        })
    }

    // x | a[i] | r.f | a[i].f
    fn parse_lvalue(&mut self) -> ParseResult<LValue> {
        let name = self.parse_identifier()?;
        let line = name.line;

        let mut lvalue = if self.eat(TokenKind::OpenBracket) {
            let index = self.parse_expression()?;
            self.expect_next_to_be(TokenKind::CloseBracket)?;

            LValue {
                line,
                kind: LValueKind::ArrayAccess {
                    array: name,
                    index: Box::new(index),
                },
            }
        } else {
            LValue {
                line,
                kind: LValueKind::Name(name),
            }
        };

        if self.eat(TokenKind::Dot) {
            let field = self.parse_identifier()?;

            lvalue = LValue {
                line,
                kind: LValueKind::FieldAccess {
                    base: Box::new(lvalue),
                    field,
                },
            };
        }

        Ok(lvalue)
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_comparison_expression()
    }

    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_term_expression()?;

        while self.peek_kind().is_comparison_operator() {
            let operator = match self.next().kind {
                TokenKind::Equals => ComparisonOperator::Equal,
                TokenKind::NotEquals => ComparisonOperator::NotEqual,
                TokenKind::LessThan => ComparisonOperator::LessThan,
                TokenKind::LessThanOrEqualTo => ComparisonOperator::LessThanOrEqualTo,
                TokenKind::GreaterThan => ComparisonOperator::GreaterThan,
                TokenKind::GreaterThanOrEqualTo => ComparisonOperator::GreaterThanOrEqualTo,
                _ => unreachable!(),
            };
            let rhs = self.parse_term_expression()?;

            expression = Expression {
                line: expression.line,
                kind: ExpressionKind::Comparison {
                    operator,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_term_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_factor_expression()?;

        while self.peek_kind().is_term_operator() {
            let operator = match self.next().kind {
                TokenKind::Plus => ArithmeticOperator::Add,
                TokenKind::Minus => ArithmeticOperator::Subtract,
                _ => unreachable!(),
            };
            let rhs = self.parse_factor_expression()?;

            expression = Expression {
                line: expression.line,
                kind: ExpressionKind::Arithmetic {
                    operator,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_factor_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_primary_expression()?;

        while self.peek_kind().is_factor_operator() {
            let operator = match self.next().kind {
                TokenKind::Asterisk => ArithmeticOperator::Multiply,
                TokenKind::Slash => ArithmeticOperator::Divide,
                _ => unreachable!(),
            };
            let rhs = self.parse_primary_expression()?;

            expression = Expression {
                line: expression.line,
                kind: ExpressionKind::Arithmetic {
                    operator,
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let token = self.peek().clone();

        let kind = match (token.kind, token.value) {
            (TokenKind::IntegerLiteral, TokenValue::Integer(value)) => {
                self.next();
                ExpressionKind::Integer(value)
            }
            (TokenKind::RealLiteral, TokenValue::Real(value)) => {
                self.next();
                ExpressionKind::Real(value)
            }
            (TokenKind::StringLiteral, TokenValue::String(value)) => {
                self.next();
                ExpressionKind::String(value)
            }
            (TokenKind::OpenParen, _) => {
                self.next();
                let inner = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;

                return Ok(inner);
            }
            (TokenKind::Identifier, _) if self.peek_nth_kind(1) == TokenKind::OpenParen => {
                let function = self.parse_identifier()?;
                self.next();

                let mut arguments = Vec::new();

                if self.peek_kind() != TokenKind::CloseParen {
                    arguments.push(self.parse_expression()?);

                    while self.eat(TokenKind::Comma) {
                        arguments.push(self.parse_expression()?);
                    }
                }

                self.expect_next_to_be(TokenKind::CloseParen)?;

                ExpressionKind::Call {
                    function,
                    arguments,
                }
            }
            (TokenKind::Identifier, _) => return self.parse_place_expression(),
            _ => return Err(self.unexpected("expression")),
        };

        Ok(Expression {
            line: token.line,
            kind,
        })
    }

    // x | a[i] | r.f | a[i].f
    fn parse_place_expression(&mut self) -> ParseResult<Expression> {
        let name = self.parse_identifier()?;
        let line = name.line;

        let mut expression = if self.eat(TokenKind::OpenBracket) {
            let index = self.parse_expression()?;
            self.expect_next_to_be(TokenKind::CloseBracket)?;

            Expression {
                line,
                kind: ExpressionKind::ArrayAccess {
                    array: name,
                    index: Box::new(index),
                },
            }
        } else {
            Expression {
                line,
                kind: ExpressionKind::Identifier(name),
            }
        };

        if self.eat(TokenKind::Dot) {
            let field = self.parse_identifier()?;

            expression = Expression {
                line,
                kind: ExpressionKind::FieldAccess {
                    base: Box::new(expression),
                    field,
                },
            };
        }

        Ok(expression)
    }
}
