use super::*;
use crate::ast::{BinaryOp, Expr, ExprKind, Ident, Literal, UnaryOp};
use crate::lexer::{unescape, PREFIX_BP};

impl<'a> Parser<'a> {
    /* Expressions */
    /// Parses any expression.
    /// This is equivalent to calling [`Self::parse_expr_bp`] with `min_bp = 0`.
    pub fn parse_expr(&mut self) -> Expr {
        self.parse_expr_bp(0) // 0 to accept any expression
    }

    /// Parses a primary (atom) expression followed by any number of call suffixes.
    fn parse_primary_expr(&mut self) -> Expr {
        // NOTE: prefix operators are handled here
        let mut expr = match self.current.kind {
            TokenKind::IntLit
            | TokenKind::FloatLit
            | TokenKind::StringLit
            | TokenKind::True
            | TokenKind::False => self.parse_literal_expr(),
            TokenKind::Identifier => {
                let token = self.next();
                Expr::new(
                    ExprKind::Identifier(Ident::new(token.lexeme, token.span)),
                    token.span,
                )
            }
            TokenKind::OpenParen => {
                // grouping produces no node of its own
                let open = self.next();
                let inner = self.parse_expr();
                self.expect(TokenKind::CloseParen);
                Expr {
                    span: self.span_from(open.span),
                    ..inner
                }
            }
            TokenKind::LogicalNot | TokenKind::Minus => {
                let op_token = self.next();
                let op = match op_token.kind {
                    TokenKind::LogicalNot => UnaryOp::Not,
                    _ => UnaryOp::Neg,
                };
                let operand = self.parse_expr_bp(PREFIX_BP);
                let span = op_token.span.to(operand.span);
                return Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                );
            }
            TokenKind::Error => {
                // already reported by the lexer
                let token = self.next();
                self.panic_mode = true;
                return Expr::error(token.span);
            }
            _ => {
                self.unexpected("expression");
                return Expr::error(self.current.span);
            }
        };

        while self.check(TokenKind::OpenParen) {
            expr = self.parse_call_suffix(expr);
        }
        expr
    }

    /// Parses an expression with the specified `min_bp`.
    /// To parse any expression use, [`Self::parse_expr`].
    fn parse_expr_bp(&mut self, min_bp: u8) -> Expr {
        let mut lhs = self.parse_primary_expr();
        // binding power of the last non-associative operator folded into `lhs` at this level
        let mut last_non_assoc = None;

        loop {
            let kind = self.current.kind;
            let (l_bp, r_bp) = match kind.binop_bp() {
                Some(bp) => bp,
                None => break, // not a valid binop, stop parsing
            };
            if l_bp < min_bp {
                break; // less than the min_bp, stop parsing
            }

            // self.current is a valid binop
            let op_token = self.next();
            if kind.is_non_associative() {
                if last_non_assoc == Some(l_bp) {
                    self.error_at("comparison operators cannot be chained", op_token.span);
                }
                last_non_assoc = Some(l_bp);
            } else {
                last_non_assoc = None;
            }

            let rhs = self.parse_expr_bp(r_bp);
            let span = lhs.span.to(rhs.span);

            lhs = match kind {
                TokenKind::Equals => match lhs.kind {
                    ExprKind::Identifier(target) => Expr::new(
                        ExprKind::Assign {
                            target,
                            value: Box::new(rhs),
                        },
                        span,
                    ),
                    ExprKind::Error => Expr::error(span),
                    _ => {
                        self.error_at("invalid assignment target", lhs.span);
                        Expr::error(span)
                    }
                },
                _ => Expr::new(
                    ExprKind::Binary {
                        op: binary_op(kind),
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                ),
            }
        }

        lhs
    }

    /* Expressions.Literals */
    /// Parses a literal expression.
    /// A literal can be a number, string or bool literal.
    fn parse_literal_expr(&mut self) -> Expr {
        let token = self.next();
        // Numeric lexemes are validated by the lexer.
        let literal = match token.kind {
            TokenKind::IntLit => Literal::Int(token.lexeme.parse().unwrap_or_default()),
            TokenKind::FloatLit => Literal::Float(token.lexeme.parse().unwrap_or_default()),
            TokenKind::StringLit => Literal::Str(unescape(token.lexeme)),
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            _ => unreachable!("parse_literal_expr called on a non-literal token"),
        };
        Expr::new(ExprKind::Literal(literal), token.span)
    }

    /* Expressions.Call */
    /// Parses the argument list of a call expression. The current token is `(`.
    fn parse_call_suffix(&mut self, callee: Expr) -> Expr {
        self.expect(TokenKind::OpenParen);

        let mut args = Vec::new();
        if !self.eat(TokenKind::CloseParen) {
            loop {
                args.push(self.parse_expr());

                if self.eat(TokenKind::CloseParen) {
                    break;
                } else if !self.eat(TokenKind::Comma) {
                    self.unexpected("',' or ')'");
                    break;
                }
            }
        }

        let span = self.span_from(callee.span);
        Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            span,
        )
    }
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Asterisk => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::EqualsEquals => BinaryOp::Eq,
        TokenKind::NotEquals => BinaryOp::NotEq,
        TokenKind::LessThan => BinaryOp::Less,
        TokenKind::LessThanEquals => BinaryOp::LessEq,
        TokenKind::GreaterThan => BinaryOp::Greater,
        TokenKind::GreaterThanEquals => BinaryOp::GreaterEq,
        TokenKind::LogicalAnd => BinaryOp::And,
        TokenKind::LogicalOr => BinaryOp::Or,
        _ => unreachable!("binop_bp accepted a non-binary token"),
    }
}
