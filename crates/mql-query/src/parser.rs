//! MQL 解析器模块
//!
//! 使用递归下降把 token 流解析为二叉表达式树。每个括号分组维护一个
//! `PartialExpr` 累加器,逻辑操作符之间没有优先级,按左结合折叠;
//! 括号可以改变结合方式。空白 token 只作为分隔符。
//!
//! 括号嵌套层数和树的深度都不超过 `MAX_DEPTH`,超过时返回 `NestingTooDeep`。

use crate::ast::{ComparisonExpr, ComparisonOp, Expression, LogicalOp, PartialExpr, MAX_DEPTH};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::{QueryError, QueryResult};
use tracing::debug;

/// MQL 解析器
///
/// 每次解析使用独立的实例,不共享任何状态。
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    input: &'a str,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            input,
            peeked: None,
        }
    }

    /// 解析查询字符串
    ///
    /// # Brief
    /// 解析输入为完整的表达式树
    ///
    /// # Arguments
    /// * `input` - MQL 查询字符串
    ///
    /// # Returns
    /// 成功返回根表达式,语法或词法错误返回 QueryError
    pub fn parse(input: &str) -> QueryResult<Expression> {
        let mut parser = Parser::new(input);
        let (expr, _) = parser.parse_group(0)?;
        debug!(depth = expr.depth(), expr = %expr, "parsed query");
        Ok(expr)
    }

    fn next(&mut self) -> QueryResult<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> QueryResult<&Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn skip_whitespace(&mut self) -> QueryResult<()> {
        while self.peek()?.kind == TokenKind::Whitespace {
            self.next()?;
        }
        Ok(())
    }

    fn raw(&self) -> String {
        self.input.to_string()
    }

    fn too_deep(&self) -> QueryError {
        QueryError::NestingTooDeep {
            limit: MAX_DEPTH,
            input: self.raw(),
        }
    }

    /// 解析一个括号分组,返回分组的根表达式及其深度
    fn parse_group(&mut self, nesting: usize) -> QueryResult<(Expression, usize)> {
        let mut partial = PartialExpr::default();
        let mut after_whitespace = false;

        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Whitespace => {
                    after_whitespace = true;
                    continue;
                }
                TokenKind::Eof => {
                    if nesting > 0 {
                        return Err(QueryError::MissingClosingParen(self.raw()));
                    }
                    let depth = partial.depth();
                    return Ok((partial.root(self.input)?, depth));
                }
                TokenKind::RParen => {
                    if nesting == 0 || partial.left.is_none() {
                        return Err(QueryError::UnexpectedClosingParen {
                            position: token.offset,
                            input: self.raw(),
                        });
                    }
                    let depth = partial.depth();
                    return Ok((partial.root(self.input)?, depth));
                }
                TokenKind::LParen => {
                    if partial.expects_operand() {
                        if nesting >= MAX_DEPTH {
                            return Err(self.too_deep());
                        }
                        let (expr, depth) = self.parse_group(nesting + 1)?;
                        partial.push_operand(expr, depth);
                    } else if after_whitespace {
                        return Err(QueryError::MissingLogicalOp(format!("{:?}", self.input)));
                    } else {
                        let context = partial
                            .last_operand()
                            .map(|expr| format!(" after {}", expr))
                            .unwrap_or_default();
                        return Err(QueryError::UnexpectedOpeningParen {
                            position: token.offset,
                            context,
                            input: self.raw(),
                        });
                    }
                }
                TokenKind::And | TokenKind::Or => {
                    if !partial.accepts_logical_op() {
                        return Err(QueryError::UnexpectedLogicalOp {
                            op: token.value,
                            position: token.offset,
                            input: self.raw(),
                        });
                    }
                    partial.push_logical_op(token.value.parse::<LogicalOp>()?);
                }
                kind if kind.is_operand() => {
                    if !partial.expects_operand() {
                        return Err(QueryError::UnexpectedExpr {
                            token: token.value,
                            position: token.offset,
                            input: self.raw(),
                        });
                    }
                    let cmp = self.parse_comparison(token)?;
                    partial.push_operand(Expression::Comparison(cmp), 1);
                }
                _ => {
                    return Err(QueryError::UnexpectedToken {
                        token: token.to_string(),
                        position: token.offset,
                        input: self.raw(),
                    })
                }
            }
            if partial.depth() > MAX_DEPTH {
                return Err(self.too_deep());
            }
            after_whitespace = false;
        }
    }

    /// 解析 `column ws? op ws? value`,列名 token 已被读取
    fn parse_comparison(&mut self, column: Token) -> QueryResult<ComparisonExpr> {
        self.skip_whitespace()?;
        let op_token = self.next()?;
        let op = match op_token.kind {
            kind if kind.is_comparison_op() => op_token.value.parse::<ComparisonOp>()?,
            TokenKind::LParen => {
                return Err(QueryError::UnexpectedOpeningParen {
                    position: op_token.offset,
                    context: String::new(),
                    input: self.raw(),
                })
            }
            _ => {
                return Err(QueryError::MissingComparisonOp {
                    column: column.value,
                    input: self.raw(),
                })
            }
        };

        self.skip_whitespace()?;
        let value_token = self.next()?;
        match value_token.kind {
            kind if kind.is_operand() => Ok(ComparisonExpr {
                column: column.value,
                op,
                value: Some(value_token.value),
            }),
            kind if kind.is_comparison_op() => Err(QueryError::UnexpectedToken {
                token: value_token.to_string(),
                position: value_token.offset,
                input: self.raw(),
            }),
            TokenKind::LParen => Err(QueryError::UnexpectedOpeningParen {
                position: value_token.offset,
                context: format!(" after {}{}", column.value, op),
                input: self.raw(),
            }),
            _ => Err(QueryError::MissingComparisonValue(format!(
                "{}{} in {:?}",
                column.value, op, self.input
            ))),
        }
    }
}
