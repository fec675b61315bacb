use super::*;
use crate::ast::{Expr, FnDecl, Param, TypeName, VarDecl};

impl<'a> Parser<'a> {
    /// Parses a declaration (or statement). Recovers from syntax errors by synchronizing.
    pub fn parse_declaration(&mut self) -> Stmt {
        self.recovering(|parser| match parser.current.kind {
            TokenKind::Let => parser.parse_let_declaration(),
            TokenKind::Fn => parser.parse_fn_declaration(),
            _ => parser.parse_stmt(),
        })
    }

    /// Parses a statement.
    pub fn parse_stmt(&mut self) -> Stmt {
        match self.current.kind {
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::OpenBrace => self.parse_block_stmt(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            _ => {
                // expression statement
                let start = self.current.span;
                let expr = self.parse_expr();
                self.expect(TokenKind::Semi);
                Stmt {
                    kind: StmtKind::Expr(expr),
                    span: self.span_from(start),
                }
            }
        }
    }

    pub fn parse_block_stmt(&mut self) -> Stmt {
        let start = self.current.span;
        let body = self.parse_block_body();
        Stmt {
            kind: StmtKind::Block(body),
            span: self.span_from(start),
        }
    }

    /// Parses `{ declaration* }` and returns the declarations.
    fn parse_block_body(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        if self.expect(TokenKind::OpenBrace).is_none() {
            return body;
        }

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            body.push(self.parse_declaration());
        }
        self.expect(TokenKind::CloseBrace);
        body
    }

    fn parse_type_name(&mut self) -> Option<TypeName> {
        self.expect_identifier("type name")
            .map(|(name, span)| TypeName { name, span })
    }

    fn parse_let_declaration(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::Let);
        let (name, name_span) = match self.expect_identifier("variable name") {
            Some(ident) => ident,
            None => return self.error_stmt(start),
        };

        let declared_type = if self.eat(TokenKind::Colon) {
            match self.parse_type_name() {
                Some(ty) => Some(ty),
                None => return self.error_stmt(start),
            }
        } else {
            None
        };

        let initializer = if self.eat(TokenKind::Equals) {
            let init = self.parse_expr();
            // a broken initializer still declares the name, with an error-typed value
            Some(if self.panic_mode {
                Expr::error(init.span)
            } else {
                init
            })
        } else {
            None
        };
        self.expect(TokenKind::Semi);
        if self.panic_mode {
            self.synchronize();
        }

        Stmt {
            kind: StmtKind::VarDecl(VarDecl {
                name,
                name_span,
                declared_type,
                initializer,
                symbol: None,
            }),
            span: self.span_from(start),
        }
    }

    fn parse_fn_declaration(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::Fn);
        let (name, name_span) = match self.expect_identifier("function name") {
            Some(ident) => ident,
            None => return self.error_stmt(start),
        };

        if self.expect(TokenKind::OpenParen).is_none() {
            return self.error_stmt(start);
        }
        let mut params = Vec::new();
        if !self.eat(TokenKind::CloseParen) {
            loop {
                let param = match self.parse_param() {
                    Some(param) => param,
                    None => return self.error_stmt(start),
                };
                params.push(param);

                if self.eat(TokenKind::CloseParen) {
                    break;
                } else if !self.eat(TokenKind::Comma) {
                    self.unexpected("',' or ')'");
                    return self.error_stmt(start);
                }
            }
        }

        let return_type = if self.eat(TokenKind::Arrow) {
            match self.parse_type_name() {
                Some(ty) => Some(ty),
                None => return self.error_stmt(start),
            }
        } else {
            None
        };

        let body = self.parse_block_body();

        Stmt {
            kind: StmtKind::FnDecl(FnDecl {
                name,
                name_span,
                params,
                return_type,
                body,
                symbol: None,
            }),
            span: self.span_from(start),
        }
    }

    fn parse_param(&mut self) -> Option<Param> {
        let (name, span) = self.expect_identifier("parameter name")?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type_name()?;
        Some(Param {
            name,
            span,
            ty,
            symbol: None,
        })
    }

    /// `else` binds to the nearest `if` because the innermost `parse_if_stmt` call sees it first.
    fn parse_if_stmt(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::If);
        self.expect(TokenKind::OpenParen);
        let condition = self.parse_expr();
        self.expect(TokenKind::CloseParen);

        let then_branch = Box::new(self.parse_stmt());
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_stmt()))
        } else {
            None
        };

        Stmt {
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span: self.span_from(start),
        }
    }

    fn parse_while_stmt(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::While);
        self.expect(TokenKind::OpenParen);
        let condition = self.parse_expr();
        self.expect(TokenKind::CloseParen);
        let body = Box::new(self.parse_stmt());

        Stmt {
            kind: StmtKind::While { condition, body },
            span: self.span_from(start),
        }
    }

    fn parse_return_stmt(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::Return);
        let value = if self.check(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::Semi);
        Stmt {
            kind: StmtKind::Return(value),
            span: self.span_from(start),
        }
    }

    fn error_stmt(&self, start: Span) -> Stmt {
        Stmt {
            kind: StmtKind::Error,
            span: self.span_from(start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ExprKind, Literal};

    fn program(source: &str) -> Program {
        let source = source.into();
        let program = Parser::new(&source).parse_program();
        assert!(source.has_no_errors(), "{}", source.render_all());
        program
    }

    fn single(source: &str) -> StmtKind {
        let mut program = program(source);
        assert_eq!(program.items.len(), 1);
        program.items.remove(0).kind
    }

    fn errors(source: &str) -> Vec<String> {
        let source = source.into();
        Parser::new(&source).parse_program();
        source.diagnostics.error_messages()
    }

    #[test]
    fn test_let_declaration() {
        match single("let x = 1 + 2 * 3;") {
            StmtKind::VarDecl(decl) => {
                assert_eq!(decl.name, "x");
                assert!(decl.declared_type.is_none());
                let init = decl.initializer.expect("initializer");
                match init.kind {
                    ExprKind::Binary { op, lhs, rhs } => {
                        assert_eq!(op, crate::ast::BinaryOp::Add);
                        assert_eq!(lhs.kind, ExprKind::Literal(Literal::Int(1)));
                        assert!(matches!(
                            rhs.kind,
                            ExprKind::Binary {
                                op: crate::ast::BinaryOp::Mul,
                                ..
                            }
                        ));
                    }
                    _ => panic!("expected a binary expression"),
                }
            }
            _ => panic!("expected a let declaration"),
        }
    }

    #[test]
    fn test_let_with_type() {
        match single("let x: Float;") {
            StmtKind::VarDecl(decl) => {
                assert_eq!(decl.declared_type.map(|t| t.name), Some("Float".to_string()));
                assert!(decl.initializer.is_none());
            }
            _ => panic!("expected a let declaration"),
        }
    }

    #[test]
    fn test_fn_declaration() {
        match single("fn add(a: Int, b: Float) -> Float { return a + b; }") {
            StmtKind::FnDecl(decl) => {
                assert_eq!(decl.name, "add");
                let params: Vec<_> = decl
                    .params
                    .iter()
                    .map(|p| (p.name.as_str(), p.ty.name.as_str()))
                    .collect();
                assert_eq!(params, vec![("a", "Int"), ("b", "Float")]);
                assert_eq!(decl.return_type.map(|t| t.name), Some("Float".to_string()));
                assert_eq!(decl.body.len(), 1);
            }
            _ => panic!("expected a function declaration"),
        }
        match single("fn main() {}") {
            StmtKind::FnDecl(decl) => {
                assert!(decl.params.is_empty());
                assert!(decl.return_type.is_none());
                assert!(decl.body.is_empty());
            }
            _ => panic!("expected a function declaration"),
        }
    }

    #[test]
    fn test_dangling_else() {
        // `else` belongs to the inner `if`
        match single("if (a) if (b) x = 1; else x = 2;") {
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert!(else_branch.is_none());
                match then_branch.kind {
                    StmtKind::If { else_branch, .. } => assert!(else_branch.is_some()),
                    _ => panic!("expected a nested if"),
                }
            }
            _ => panic!("expected an if statement"),
        }
    }

    #[test]
    fn test_while() {
        match single("while (i < 10) { i = i + 1; }") {
            StmtKind::While { condition, body } => {
                assert!(matches!(condition.kind, ExprKind::Binary { .. }));
                assert!(matches!(body.kind, StmtKind::Block(ref stmts) if stmts.len() == 1));
            }
            _ => panic!("expected a while statement"),
        }
    }

    #[test]
    fn test_return() {
        let program = program("fn f() { return; } fn g() -> Int { return 1; }");
        let bodies: Vec<&Vec<Stmt>> = program
            .items
            .iter()
            .map(|item| match &item.kind {
                StmtKind::FnDecl(decl) => &decl.body,
                _ => panic!("expected a function"),
            })
            .collect();
        assert_eq!(bodies[0][0].kind, StmtKind::Return(None));
        assert!(matches!(
            &bodies[1][0].kind,
            StmtKind::Return(Some(Expr {
                kind: ExprKind::Literal(Literal::Int(1)),
                ..
            }))
        ));
    }

    #[test]
    fn test_let_is_not_a_statement() {
        assert_eq!(
            errors("if (a) let x = 1;"),
            vec!["expected expression, found 'let'"]
        );
    }

    #[test]
    fn test_bad_fn_header_recovers_at_body() {
        let source = "fn f(a Int) { return; }\nlet y = 1;".into();
        let program = Parser::new(&source).parse_program();
        assert_eq!(
            source.diagnostics.error_messages(),
            vec!["expected ':', found 'Int'"]
        );
        // the header is an error marker, the body survives as a block
        assert!(matches!(program.items[0].kind, StmtKind::Error));
        assert!(matches!(program.items[1].kind, StmtKind::Block(_)));
        assert!(matches!(program.items[2].kind, StmtKind::VarDecl(_)));
    }

    #[test]
    fn test_missing_condition_paren() {
        assert_eq!(
            errors("while x < 1 { }"),
            vec!["expected '(', found 'x'"]
        );
    }
}
