//! Token stream → AST, hand-written recursive descent with explicit
//! precedence climbing (spec §4.3).

use crate::ast::{
    CompoundStmt, Declaration, Expr, ExprKind, ExprNode, FunctionDef, Literal, Param, Program,
    Span, Spanned, Stmt, Ty,
};
use crate::error::{Category, Diagnostic, DiagnosticSink};
use crate::lexer::{decode_char_literal, decode_string_literal, Token, TokenKind};

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    sink: &'a mut DiagnosticSink,
}

/// Parse a full token stream (including the trailing `Eof`) into a
/// `Program`. Syntax errors are recorded on `sink` and recovered from via
/// panic-mode synchronization; parsing always runs to `Eof` regardless of
/// the sink's configured mode (spec §7: syntax errors accumulate through a
/// single parse).
pub fn parse(tokens: &[Token], sink: &mut DiagnosticSink) -> Program {
    let mut parser = Parser { tokens, pos: 0, sink };
    parser.parse_program()
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if let Some(tok) = self.eat(kind) {
            return Some(tok);
        }
        let span = self.span();
        let found = self.peek_kind();
        self.sink.emit(Diagnostic::error(
            Category::Syntax,
            format!("expected {kind}, found {found}"),
            span,
        ));
        None
    }

    fn expect_identifier(&mut self) -> Option<Spanned<String>> {
        if self.check(TokenKind::Identifier) {
            let tok = self.bump();
            Some(Spanned::new(tok.lexeme, tok.span))
        } else {
            let span = self.span();
            let found = self.peek_kind();
            self.sink.emit(Diagnostic::error(
                Category::Syntax,
                format!("expected identifier, found {found}"),
                span,
            ));
            None
        }
    }

    fn current_type(&self) -> Option<Ty> {
        match self.peek_kind() {
            TokenKind::Char => Some(Ty::Char),
            TokenKind::Int => Some(Ty::Int),
            TokenKind::Float => Some(Ty::Float),
            TokenKind::String => Some(Ty::String),
            TokenKind::Void => Some(Ty::Void),
            _ => None,
        }
    }

    fn parse_type(&mut self) -> Option<Ty> {
        let ty = self.current_type();
        if ty.is_some() {
            self.bump();
        } else {
            let span = self.span();
            let found = self.peek_kind();
            self.sink.emit(Diagnostic::error(Category::Syntax, format!("expected a type, found {found}"), span));
        }
        ty
    }

    /// Consume tokens until the next `;` or `{` (inclusive of `{`), or EOF.
    /// The `;` itself is also consumed; `{` is left for the caller since it
    /// opens a block the caller is expected to parse.
    fn synchronize(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof | TokenKind::LBrace => return,
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while !self.check(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_function_def() {
                Some(f) => program.functions.push(f),
                None => {
                    if self.pos == before {
                        self.synchronize();
                    }
                }
            }
        }
        program
    }

    fn parse_function_def(&mut self) -> Option<FunctionDef> {
        let span = self.span();
        let return_ty = self.parse_type()?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_compound()?;
        Some(FunctionDef { name, return_ty, params, body, span })
    }

    fn parse_params(&mut self) -> Option<Vec<Spanned<Param>>> {
        let mut params = Vec::new();
        if self.check(TokenKind::RParen) {
            return Some(params);
        }
        loop {
            let span = self.span();
            let ty = self.parse_type()?;
            let name = self.expect_identifier()?;
            params.push(Spanned::new(Param { name: name.node, ty }, span));
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        Some(params)
    }

    fn parse_compound(&mut self) -> Option<CompoundStmt> {
        let span = self.span();
        self.expect(TokenKind::LBrace)?;

        let mut decls = Vec::new();
        while self.current_type().is_some() {
            match self.parse_declaration() {
                Some(d) => decls.push(d),
                None => self.synchronize(),
            }
        }

        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_statement() {
                Some(s) => stmts.push(s),
                None => {
                    if self.pos == before {
                        self.synchronize();
                    }
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Some(CompoundStmt { decls, stmts, span })
    }

    fn parse_declaration(&mut self) -> Option<Declaration> {
        let ty = self.parse_type()?;
        let name = self.expect_identifier()?;
        let init = if self.eat(TokenKind::Assign).is_some() { Some(self.parse_expr()?) } else { None };
        self.expect(TokenKind::Semicolon)?;
        Some(Declaration { ty, name, init })
    }

    /// A bare declaration used as a `for`-loop initializer: like
    /// `parse_declaration`, but callers are responsible for the terminating
    /// `;` already having been consumed uniformly with the assignment case.
    fn parse_for_init(&mut self) -> Option<Stmt> {
        if self.current_type().is_some() {
            let decl = self.parse_declaration()?;
            Some(Stmt::Declaration(decl))
        } else {
            let name = self.expect_identifier()?;
            let target = ExprNode::new(ExprKind::Reference(name.node), name.span);
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expr()?;
            self.expect(TokenKind::Semicolon)?;
            Some(Stmt::Assignment { target, value })
        }
    }

    /// A `for`-loop's step clause: an assignment or a bare expression, with
    /// no terminating `;` (the loop header's closing `)` follows directly).
    fn parse_for_step(&mut self) -> Option<Stmt> {
        if self.check(TokenKind::Identifier) && self.tokens.get(self.pos + 1).map(|t| t.kind) == Some(TokenKind::Assign) {
            let name = self.expect_identifier()?;
            let target = ExprNode::new(ExprKind::Reference(name.node), name.span);
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expr()?;
            Some(Stmt::Assignment { target, value })
        } else {
            let expr = self.parse_expr()?;
            Some(Stmt::ExprStmt(expr))
        }
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::LBrace => Some(Stmt::Compound(self.parse_compound()?)),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Identifier if self.tokens.get(self.pos + 1).map(|t| t.kind) == Some(TokenKind::Assign) => {
                self.parse_assignment()
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Some(Stmt::ExprStmt(expr))
            }
        }
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let span = self.span();
        self.bump();
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(TokenKind::Else).is_some() {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Some(Stmt::If { cond, then_branch, else_branch, span })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let span = self.span();
        self.bump();
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Some(Stmt::While { cond, body, span })
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let span = self.span();
        self.bump();
        self.expect(TokenKind::LParen)?;
        let init = if self.eat(TokenKind::Semicolon).is_some() { None } else { Some(Box::new(self.parse_for_init()?)) };
        let cond = if self.check(TokenKind::Semicolon) { None } else { Some(self.parse_expr()?) };
        self.expect(TokenKind::Semicolon)?;
        let step = if self.check(TokenKind::RParen) { None } else { Some(Box::new(self.parse_for_step()?)) };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Some(Stmt::For { init, cond, step, body, span })
    }

    fn parse_return(&mut self) -> Option<Stmt> {
        let span = self.span();
        self.bump();
        let value = if self.check(TokenKind::Semicolon) { None } else { Some(self.parse_expr()?) };
        self.expect(TokenKind::Semicolon)?;
        Some(Stmt::Return { value, span })
    }

    fn parse_assignment(&mut self) -> Option<Stmt> {
        let name = self.expect_identifier()?;
        let target = ExprNode::new(ExprKind::Reference(name.node), name.span);
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semicolon)?;
        Some(Stmt::Assignment { target, value })
    }

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => crate::ast::BinOp::Eq,
                TokenKind::NotEq => crate::ast::BinOp::Ne,
                _ => break,
            };
            let span = self.span();
            self.bump();
            let right = self.parse_relational()?;
            left = ExprNode::new(ExprKind::Binary { op, left, right }, span);
        }
        Some(left)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => crate::ast::BinOp::Lt,
                TokenKind::LtEq => crate::ast::BinOp::Le,
                TokenKind::Gt => crate::ast::BinOp::Gt,
                TokenKind::GtEq => crate::ast::BinOp::Ge,
                _ => break,
            };
            let span = self.span();
            self.bump();
            let right = self.parse_additive()?;
            left = ExprNode::new(ExprKind::Binary { op, left, right }, span);
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => crate::ast::BinOp::Add,
                TokenKind::Minus => crate::ast::BinOp::Sub,
                _ => break,
            };
            let span = self.span();
            self.bump();
            let right = self.parse_multiplicative()?;
            left = ExprNode::new(ExprKind::Binary { op, left, right }, span);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => crate::ast::BinOp::Mul,
                TokenKind::Slash => crate::ast::BinOp::Div,
                _ => break,
            };
            let span = self.span();
            self.bump();
            let right = self.parse_unary()?;
            left = ExprNode::new(ExprKind::Binary { op, left, right }, span);
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(crate::ast::UnOp::Neg),
            TokenKind::Plus => Some(crate::ast::UnOp::Plus),
            TokenKind::Bang => Some(crate::ast::UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.span();
            self.bump();
            let operand = self.parse_unary()?;
            return Some(ExprNode::new(ExprKind::Unary { op, operand }, span));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let span = self.span();
        match self.peek_kind() {
            TokenKind::IntLiteral => {
                let tok = self.bump();
                let value: i64 = tok.lexeme.parse().unwrap_or(0);
                Some(ExprNode::new(ExprKind::Constant(Literal::Int(value)), span))
            }
            TokenKind::FloatLiteral => {
                let tok = self.bump();
                let value: f64 = tok.lexeme.parse().unwrap_or(0.0);
                Some(ExprNode::new(ExprKind::Constant(Literal::Float(value)), span))
            }
            TokenKind::CharLiteral => {
                let tok = self.bump();
                let value = decode_char_literal(&tok.lexeme).unwrap_or('\0');
                Some(ExprNode::new(ExprKind::Constant(Literal::Char(value)), span))
            }
            TokenKind::StringLiteral => {
                let tok = self.bump();
                let value = decode_string_literal(&tok.lexeme).unwrap_or_default();
                Some(ExprNode::new(ExprKind::Constant(Literal::Str(value)), span))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Some(inner)
            }
            TokenKind::Identifier => {
                let tok = self.bump();
                if self.eat(TokenKind::LParen).is_some() {
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Some(ExprNode::new(ExprKind::Call { callee: tok.lexeme, args }, span))
                } else {
                    Some(ExprNode::new(ExprKind::Reference(tok.lexeme), span))
                }
            }
            found => {
                self.sink.emit(Diagnostic::error(
                    Category::Syntax,
                    format!("expected an expression, found {found}"),
                    span,
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticConfig;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> (Program, DiagnosticSink) {
        let mut lex_errors = Vec::new();
        let tokens = tokenize(src, &mut lex_errors);
        let mut sink = DiagnosticSink::new(DiagnosticConfig::default());
        for e in lex_errors {
            sink.emit(e);
        }
        let program = parse(&tokens, &mut sink);
        (program, sink)
    }

    #[test]
    fn parses_minimal_main() {
        let (program, sink) = parse_src("int main() { return 0; }");
        assert!(!sink.has_errors());
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name.node, "main");
    }

    #[test]
    fn precedence_multiplies_before_adds() {
        let (program, sink) = parse_src("int main() { int x; x = 2 + 3 * 4; return x; }");
        assert!(!sink.has_errors());
        let stmt = &program.functions[0].body.stmts[0];
        match stmt {
            Stmt::Assignment { value, .. } => match &value.kind {
                ExprKind::Binary { op: crate::ast::BinOp::Add, right, .. } => {
                    assert!(matches!(&right.kind, ExprKind::Binary { op: crate::ast::BinOp::Mul, .. }));
                }
                other => panic!("expected top-level Add, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn call_with_arguments_parses() {
        let (program, sink) = parse_src("int main() { print(fact(5)); return 0; }");
        assert!(!sink.has_errors());
        assert_eq!(program.functions[0].body.stmts.len(), 2);
    }

    #[test]
    fn unexpected_token_recovers_at_semicolon() {
        let (program, sink) = parse_src("int main() { int x; x = ; return 0; }");
        assert!(sink.has_errors());
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn for_loop_with_declaration_init_parses() {
        let (program, sink) = parse_src("int main() { for (int i = 0; i < 10; i = i + 1) { } return 0; }");
        assert!(!sink.has_errors());
        match &program.functions[0].body.stmts[0] {
            Stmt::For { init: Some(init), .. } => assert!(matches!(**init, Stmt::Declaration(_))),
            other => panic!("expected for-loop, got {other:?}"),
        }
    }
}
