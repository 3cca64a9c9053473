use anyhow::anyhow;
use num::BigInt;

use crate::compiler::{
    ast::{
        BinaryExpression, BinaryOperator, CallExpression, ConstStatement, ExprInfo, Expression,
        FieldAccessExpression, GroupExpression, Identifier, IntegerLiteral, Parameter,
        ProcStatement, Statement, StatementFlags, StringLiteral, UnaryExpression, UnaryOperator,
    },
    diagnostic::Diagnostics,
    lexer::{KeywordToken, Lexer, PunctuationToken, Token, TokenKind},
    source::{FileId, SourceRange},
    typing::IntKind,
};

/// Marker for a parse that failed and wants its caller to resynchronize.
///
/// The diagnostic has already been pushed by the time this is returned.
#[derive(Clone, Copy, Debug)]
struct ParseFailure;

type ParseResult<T> = Result<T, ParseFailure>;

/// Parses a whole file into its top level statements.
///
/// Always returns the statements it managed to build; the `bool` reports
/// whether parsing succeeded without any lexical or syntactic error.
pub fn parse(
    code: &str,
    file: FileId,
    diagnostics: &mut Diagnostics,
) -> (Vec<Statement>, bool) {
    let errors_before = diagnostics.error_count();
    let mut parser = Parser {
        code,
        lexer: Lexer::new(code, file),
        peeked: Vec::new(),
        documentation: String::new(),
        recovering: false,
        previous_range: SourceRange::new(
            crate::compiler::source::Location {
                file,
                ..Default::default()
            },
            crate::compiler::source::Location {
                file,
                ..Default::default()
            },
        ),
        diagnostics,
    };

    let mut statements = Vec::new();
    while parser.peek().is_some() {
        if let Some(statement) = parser.parse_statement() {
            statements.push(statement);
        }
    }

    let success = parser.diagnostics.error_count() == errors_before;
    (statements, success)
}

struct Parser<'code, 'diagnostics> {
    code: &'code str,
    lexer: Lexer<'code>,
    /// Lookahead buffer; two tokens at most, and the second is only ever
    /// used to tell field access from division.
    peeked: Vec<Token>,
    /// Raw `///` slices collected while skipping trivia, waiting for the
    /// statement they belong to.
    documentation: String,
    /// While resynchronizing, lexer errors are swallowed instead of
    /// reported.
    recovering: bool,
    previous_range: SourceRange,
    diagnostics: &'diagnostics mut Diagnostics,
}

impl Parser<'_, '_> {
    // --- token access ---

    fn pull_token(&mut self) -> Option<Token> {
        loop {
            match self.lexer.next_token() {
                Ok(Some(token)) if token.kind.is_trivia() => {
                    if token.kind == TokenKind::Documentation {
                        if !self.documentation.is_empty() {
                            self.documentation.push('\n');
                        }
                        self.documentation.push_str(token.slice(self.code));
                    }
                }
                Ok(token) => break token,
                Err(error) => {
                    if !self.recovering {
                        self.diagnostics.error(error.error, error.range);
                    }
                }
            }
        }
    }

    fn peek(&mut self) -> Option<Token> {
        if self.peeked.is_empty() {
            let token = self.pull_token()?;
            self.peeked.push(token);
        }
        self.peeked.first().copied()
    }

    /// The token after the lookahead token.
    fn peek_second(&mut self) -> Option<Token> {
        self.peek()?;
        if self.peeked.len() < 2 {
            let token = self.pull_token()?;
            self.peeked.push(token);
        }
        self.peeked.get(1).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = if self.peeked.is_empty() {
            self.pull_token()?
        } else {
            self.peeked.remove(0)
        };
        self.previous_range = token.range;
        Some(token)
    }

    fn at(&mut self, kind: impl Into<TokenKind>) -> bool {
        let kind = kind.into();
        self.peek().is_some_and(|token| token.kind == kind)
    }

    /// Consumes the next token if it has the given kind.
    fn eat(&mut self, kind: impl Into<TokenKind>) -> Option<Token> {
        self.at(kind).then(|| self.advance().expect("token should be peeked"))
    }

    fn expect(&mut self, kind: impl Into<TokenKind>) -> ParseResult<Token> {
        let kind = kind.into();
        match self.peek() {
            Some(token) if token.kind == kind => {
                Ok(self.advance().expect("token should be peeked"))
            }
            Some(token) => {
                self.x_expected_found_y(kind.name(), token.kind.name(), token.range);
                Err(ParseFailure)
            }
            None => {
                self.x_expected(kind.name());
                Err(ParseFailure)
            }
        }
    }

    fn take_documentation(&mut self) -> Option<String> {
        if self.documentation.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.documentation))
        }
    }

    fn eof_range(&self) -> SourceRange {
        SourceRange::new(self.previous_range.end, self.previous_range.end)
    }

    // --- diagnostics ---

    fn x_expected(&mut self, x: &str) {
        let range = self.eof_range();
        self.diagnostics
            .error(anyhow!("{x} expected"), range);
    }

    fn x_expected_found_y(&mut self, x: &str, y: &str, range: SourceRange) {
        self.diagnostics
            .error(anyhow!("{x} expected, found {y}"), range);
    }

    // --- recovery ---

    /// Skips tokens until a `;` at zero nesting depth, swallowing lexer
    /// errors on the way.
    fn recover_to_semi(&mut self) {
        self.recovering = true;
        let mut parens = 0usize;
        let mut blocks = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Punctuation(PunctuationToken::LParen) => parens += 1,
                TokenKind::Punctuation(PunctuationToken::RParen) => {
                    parens = parens.saturating_sub(1)
                }
                TokenKind::Keyword(KeywordToken::Begin) => blocks += 1,
                TokenKind::Keyword(KeywordToken::End) => blocks = blocks.saturating_sub(1),
                TokenKind::Punctuation(PunctuationToken::Semi) if parens == 0 && blocks == 0 => {
                    self.advance();
                    break;
                }
                _ => {}
            }
            self.advance();
        }
        self.recovering = false;
    }

    /// Skips tokens until the `end` matching the failed function, swallowing
    /// lexer errors on the way.
    ///
    /// If the function's own `begin` was not consumed yet, the first `begin`
    /// encountered while skipping is taken to be it.
    fn recover_to_end(&mut self, seen_begin: bool) {
        self.recovering = true;
        let mut needed = usize::from(seen_begin);
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Keyword(KeywordToken::Begin) => needed += 1,
                TokenKind::Keyword(KeywordToken::End) => {
                    if needed <= 1 {
                        self.advance();
                        break;
                    }
                    needed -= 1;
                }
                _ => {}
            }
            self.advance();
        }
        self.recovering = false;
    }

    // --- statements ---

    /// Parses one statement, resynchronizing internally on failure.
    fn parse_statement(&mut self) -> Option<Statement> {
        let documentation = self.take_documentation();
        let flags = self.parse_statement_flags();

        match self.peek() {
            Some(token) if token.kind == KeywordToken::Const.into() => {
                match self.parse_const(documentation, flags) {
                    Ok(statement) => Some(Statement::Const(statement)),
                    Err(ParseFailure) => {
                        self.recover_to_semi();
                        None
                    }
                }
            }
            Some(token) if token.kind == KeywordToken::Proc.into() => {
                match self.parse_proc(documentation, flags) {
                    Ok(statement) => Some(Statement::Proc(statement)),
                    Err((ParseFailure, seen_begin)) => {
                        self.recover_to_end(seen_begin);
                        None
                    }
                }
            }
            Some(token) => {
                self.x_expected_found_y(
                    "`const` or `proc`",
                    token.kind.name(),
                    token.range,
                );
                self.advance();
                None
            }
            None => {
                self.x_expected("`const` or `proc`");
                None
            }
        }
    }

    fn parse_statement_flags(&mut self) -> StatementFlags {
        let mut flags = StatementFlags::default();
        while let Some(hash) = self.eat(PunctuationToken::Hash) {
            let Some(token) = self.peek() else {
                self.x_expected("statement flag");
                break;
            };
            if token.kind != TokenKind::Identifier {
                self.x_expected_found_y("statement flag", token.kind.name(), token.range);
                break;
            }
            self.advance();
            match token.slice(self.code) {
                "print_ast" => flags.print_ast = true,
                "print_value" => flags.print_value = true,
                name => self.diagnostics.error(
                    anyhow!("invalid statement flag '{name}'"),
                    hash.range.to(token.range),
                ),
            }
        }
        flags
    }

    fn parse_const(
        &mut self,
        documentation: Option<String>,
        flags: StatementFlags,
    ) -> ParseResult<ConstStatement> {
        let const_keyword = self.expect(KeywordToken::Const)?;
        let name = self.parse_identifier()?;
        let type_expression = if self.eat(PunctuationToken::Colon).is_some() {
            Some(self.parse_atom()?)
        } else {
            None
        };
        self.expect(PunctuationToken::Eq)?;
        let value = self.parse_call_expression()?;
        let semi = self.expect(PunctuationToken::Semi)?;

        Ok(ConstStatement {
            documentation,
            flags,
            name,
            type_expression,
            value,
            range: const_keyword.range.to(semi.range),
        })
    }

    fn parse_proc(
        &mut self,
        documentation: Option<String>,
        flags: StatementFlags,
    ) -> Result<ProcStatement, (ParseFailure, bool)> {
        let mut seen_begin = false;
        self.parse_proc_inner(documentation, flags, &mut seen_begin)
            .map_err(|failure| (failure, seen_begin))
    }

    fn parse_proc_inner(
        &mut self,
        documentation: Option<String>,
        flags: StatementFlags,
        seen_begin: &mut bool,
    ) -> ParseResult<ProcStatement> {
        let proc_keyword = self.expect(KeywordToken::Proc)?;
        let name = self.parse_identifier()?;

        let mut recursive = false;
        let mut entry_point = false;
        let mut parameters = Vec::new();
        let mut return_type = None;

        loop {
            match self.peek().map(|token| token.kind) {
                Some(TokenKind::Keyword(KeywordToken::Is)) => {
                    self.advance();
                    if self.eat(KeywordToken::Recursive).is_some() {
                        recursive = true;
                    } else if self.eat(KeywordToken::EntryPoint).is_some() {
                        entry_point = true;
                    } else {
                        match self.peek() {
                            Some(token) => self.x_expected_found_y(
                                "`recursive` or `entry_point`",
                                token.kind.name(),
                                token.range,
                            ),
                            None => self.x_expected("`recursive` or `entry_point`"),
                        }
                        return Err(ParseFailure);
                    }
                }
                Some(TokenKind::Keyword(KeywordToken::Param)) => {
                    self.advance();
                    let name = self.parse_identifier()?;
                    let type_expression = self.parse_atom()?;
                    let range = name.range.to(type_expression.range());
                    parameters.push(Parameter {
                        name,
                        type_expression,
                        range,
                    });
                }
                Some(TokenKind::Keyword(KeywordToken::Returns)) => {
                    self.advance();
                    return_type = Some(self.parse_atom()?);
                }
                Some(TokenKind::Keyword(KeywordToken::Begin)) => break,
                Some(_) => {
                    let token = self.peek().expect("token should be peeked");
                    self.x_expected_found_y("`begin`", token.kind.name(), token.range);
                    return Err(ParseFailure);
                }
                None => {
                    self.x_expected("`begin`");
                    return Err(ParseFailure);
                }
            }
        }

        self.expect(KeywordToken::Begin)?;
        *seen_begin = true;

        let mut body = Vec::new();
        let end_keyword = loop {
            match self.peek() {
                Some(token) if token.kind == KeywordToken::End.into() => {
                    self.advance();
                    break token;
                }
                Some(_) => {
                    if let Some(statement) = self.parse_statement() {
                        body.push(statement);
                    }
                }
                None => {
                    self.x_expected("`end`");
                    return Err(ParseFailure);
                }
            }
        };

        Ok(ProcStatement {
            documentation,
            flags,
            name,
            recursive,
            entry_point,
            parameters,
            return_type,
            body,
            range: proc_keyword.range.to(end_keyword.range),
        })
    }

    fn parse_identifier(&mut self) -> ParseResult<Identifier> {
        let token = self.expect(TokenKind::Identifier)?;
        Ok(Identifier::new(token.slice(self.code), token.range))
    }

    // --- expressions ---

    /// Parses a call expression, the outermost expression production.
    ///
    /// After the leading unary expression, a `!` makes an argument-less
    /// call, an argument starter begins a right recursive comma chain, and a
    /// binary operator begins a flat left associative binary tail. `+` and
    /// `-` read as binary operators here, so a negated argument needs
    /// parentheses.
    fn parse_call_expression(&mut self) -> ParseResult<Expression> {
        let callee = self.parse_unary()?;

        if let Some(bang) = self.eat(PunctuationToken::Bang) {
            let range = callee.range().to(bang.range);
            return Ok(Expression::Call(Box::new(CallExpression {
                callee,
                arguments: Vec::new(),
                range,
                info: ExprInfo::default(),
            })));
        }

        if self.at_argument_starter() {
            let mut arguments = vec![self.parse_call_expression()?];
            while self.eat(PunctuationToken::Comma).is_some() {
                arguments.push(self.parse_call_expression()?);
            }
            let range = callee.range().to(
                arguments
                    .last()
                    .expect("arguments should not be empty")
                    .range(),
            );
            return Ok(Expression::Call(Box::new(CallExpression {
                callee,
                arguments,
                range,
                info: ExprInfo::default(),
            })));
        }

        self.parse_binary_tail(callee)
    }

    fn at_argument_starter(&mut self) -> bool {
        match self.peek().map(|token| token.kind) {
            Some(
                TokenKind::Identifier
                | TokenKind::Integer
                | TokenKind::String
                | TokenKind::Punctuation(PunctuationToken::LParen)
                | TokenKind::Punctuation(PunctuationToken::Tilde)
                | TokenKind::Keyword(KeywordToken::Not),
            ) => true,
            _ => false,
        }
    }

    /// Folds `op unary` pairs onto `left`; all operators have equal
    /// precedence and associate left to right.
    fn parse_binary_tail(&mut self, mut left: Expression) -> ParseResult<Expression> {
        while let Some((operator, operator_token)) = self.peek_binary_operator() {
            self.advance();
            let right = self.parse_unary()?;
            let range = left.range().to(right.range());
            left = Expression::Binary(Box::new(BinaryExpression {
                left,
                operator,
                operator_range: operator_token.range,
                right,
                range,
                info: ExprInfo::default(),
            }));
        }
        Ok(left)
    }

    fn peek_binary_operator(&mut self) -> Option<(BinaryOperator, Token)> {
        let token = self.peek()?;
        use BinaryOperator::*;
        use PunctuationToken as P;
        let operator = match token.kind {
            TokenKind::Punctuation(P::Plus) => Add,
            TokenKind::Punctuation(P::Minus) => Sub,
            TokenKind::Punctuation(P::Star) => Mul,
            TokenKind::Punctuation(P::Slash) => Div,
            TokenKind::Punctuation(P::Percent) => Rem,
            TokenKind::Punctuation(P::Shl) => Shl,
            TokenKind::Punctuation(P::Shr) => Shr,
            TokenKind::Punctuation(P::Amp) => BitAnd,
            TokenKind::Punctuation(P::Pipe) => BitOr,
            TokenKind::Punctuation(P::Caret) => BitXor,
            TokenKind::Punctuation(P::EqEq) => Eq,
            TokenKind::Punctuation(P::Ne) => Ne,
            TokenKind::Punctuation(P::Lt) => Lt,
            TokenKind::Punctuation(P::Le) => Le,
            TokenKind::Punctuation(P::Gt) => Gt,
            TokenKind::Punctuation(P::Ge) => Ge,
            TokenKind::Keyword(KeywordToken::And) => LogicAnd,
            TokenKind::Keyword(KeywordToken::Or) => LogicOr,
            _ => return None,
        };
        Some((operator, token))
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        use PunctuationToken as P;
        let operator = match self.peek().map(|token| token.kind) {
            Some(TokenKind::Punctuation(P::Plus)) => Some(UnaryOperator::Id),
            Some(TokenKind::Punctuation(P::Minus)) => Some(UnaryOperator::Neg),
            Some(TokenKind::Punctuation(P::Tilde)) => Some(UnaryOperator::BitNot),
            Some(TokenKind::Keyword(KeywordToken::Not)) => Some(UnaryOperator::LogicNot),
            _ => None,
        };
        let Some(operator) = operator else {
            return self.parse_postfix();
        };
        let operator_token = self.advance().expect("operator should be peeked");
        let operand = self.parse_unary()?;
        let range = operator_token.range.to(operand.range());
        Ok(Expression::Unary(Box::new(UnaryExpression {
            operator,
            operand,
            range,
            info: ExprInfo::default(),
        })))
    }

    /// Parses an atom followed by any number of field accesses.
    ///
    /// A `/` only reads as field access when it touches both the expression
    /// before it and the identifier after it; `a/b` is a segmented name
    /// while `a / b` is a division.
    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_atom()?;
        loop {
            let Some(slash) = self.peek() else {
                break;
            };
            if slash.kind != PunctuationToken::Slash.into()
                || slash.range.start.index != expression.range().end.index
            {
                break;
            }
            let Some(field) = self.peek_second() else { break };
            if field.kind != TokenKind::Identifier || !slash.touches(&field) {
                break;
            }
            self.advance();
            self.advance();
            let field = Identifier::new(field.slice(self.code), field.range);
            let range = expression.range().to(field.range);
            expression = Expression::FieldAccess(Box::new(FieldAccessExpression {
                base: expression,
                field,
                range,
                info: ExprInfo::default(),
            }));
        }
        Ok(expression)
    }

    fn parse_atom(&mut self) -> ParseResult<Expression> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => {
                self.advance();
                Ok(Expression::Identifier(Identifier::new(
                    token.slice(self.code),
                    token.range,
                )))
            }
            Some(token) if token.kind == TokenKind::Integer => {
                self.advance();
                Ok(self.parse_integer_literal(token))
            }
            Some(token) if token.kind == TokenKind::String => {
                self.advance();
                let slice = token.slice(self.code);
                let contents = &slice[1..slice.len() - 1];
                Ok(Expression::String(StringLiteral {
                    value: contents.into(),
                    range: token.range,
                    info: ExprInfo::default(),
                }))
            }
            Some(token) if token.kind == PunctuationToken::LParen.into() => {
                self.advance();
                let inner = self.parse_call_expression()?;
                let closing = self.expect(PunctuationToken::RParen)?;
                let range = token.range.to(closing.range);
                Ok(Expression::Group(Box::new(GroupExpression {
                    inner,
                    range,
                    info: ExprInfo::default(),
                })))
            }
            Some(token) => {
                self.x_expected_found_y("expression", token.kind.name(), token.range);
                Err(ParseFailure)
            }
            None => {
                self.x_expected("expression");
                Err(ParseFailure)
            }
        }
    }

    /// Builds an integer literal, consuming a touching type flag suffix.
    ///
    /// An unknown suffix is diagnosed but leaves the literal at the default
    /// `ct` flag.
    fn parse_integer_literal(&mut self, token: Token) -> Expression {
        let value = token
            .slice(self.code)
            .parse::<BigInt>()
            .expect("integer token should only contain digits");

        let mut flag = IntKind::Ct;
        let mut range = token.range;
        if let Some(suffix) = self.peek() {
            if suffix.kind == TokenKind::Identifier && token.touches(&suffix) {
                self.advance();
                range = range.to(suffix.range);
                let name = suffix.slice(self.code);
                match IntKind::from_flag_name(name) {
                    Some(kind) => flag = kind,
                    None => self.diagnostics.error(
                        anyhow!("unknown integer type flag '{name}'"),
                        suffix.range,
                    ),
                }
            }
        }

        Expression::Integer(IntegerLiteral {
            value,
            flag,
            range,
            info: ExprInfo::default(),
        })
    }
}
