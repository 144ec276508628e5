use crate::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Contains => "%",
        }
    }

    /// 条件字符串中使用的 SQL 操作符
    pub fn sql(&self) -> &'static str {
        match self {
            ComparisonOp::Contains => " like ",
            op => op.as_str(),
        }
    }
}

impl FromStr for ComparisonOp {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s {
            "=" => Ok(ComparisonOp::Eq),
            "!=" => Ok(ComparisonOp::Ne),
            ">" => Ok(ComparisonOp::Gt),
            ">=" => Ok(ComparisonOp::Gte),
            "<" => Ok(ComparisonOp::Lt),
            "<=" => Ok(ComparisonOp::Lte),
            "%" => Ok(ComparisonOp::Contains),
            _ => Err(QueryError::InvalidComparisonOp(format!("{:?}", s))),
        }
    }
}

impl std::fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

impl FromStr for LogicalOp {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s {
            "and" => Ok(LogicalOp::And),
            "or" => Ok(LogicalOp::Or),
            _ => Err(QueryError::InvalidLogicalOp(s.to_string())),
        }
    }
}

impl std::fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 比较表达式(叶子节点)
///
/// `value` 仅在解析过程中短暂为 None,完整的树中总是 Some。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonExpr {
    pub column: String,
    pub op: ComparisonOp,
    pub value: Option<String>,
}

impl ComparisonExpr {
    pub fn new(column: impl Into<String>, op: ComparisonOp, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            value: Some(value.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.column.is_empty() && self.value.is_some()
    }
}

impl std::fmt::Display for ComparisonExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "(comparison: {} {} {})", self.column, self.op, value),
            None => write!(f, "(comparison: {} {} nil)", self.column, self.op),
        }
    }
}

/// 逻辑表达式(内部节点),左右子树由父节点独占
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpr {
    pub left: Box<Expression>,
    pub op: LogicalOp,
    pub right: Box<Expression>,
}

impl std::fmt::Display for LogicalExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(logical: {} {} {})", self.left, self.op, self.right)
    }
}

/// 表达式树允许的最大深度
///
/// 同时限制括号嵌套层数和逻辑表达式链的长度;解析和编译的递归深度都不会超过它。
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Comparison(ComparisonExpr),
    Logical(LogicalExpr),
}

impl Expression {
    pub fn comparison(column: impl Into<String>, op: ComparisonOp, value: impl Into<String>) -> Self {
        Expression::Comparison(ComparisonExpr::new(column, op, value))
    }

    pub fn logical(left: Expression, op: LogicalOp, right: Expression) -> Self {
        Expression::Logical(LogicalExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::logical(left, LogicalOp::And, right)
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::logical(left, LogicalOp::Or, right)
    }

    /// 树中所有叶子都是完整的比较表达式
    pub fn is_complete(&self) -> bool {
        self.comparisons().iter().all(|cmp| cmp.is_complete())
    }

    /// 按从左到右的顺序返回所有比较表达式
    pub fn comparisons(&self) -> Vec<&ComparisonExpr> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expression::Comparison(cmp) => out.push(cmp),
                Expression::Logical(l) => {
                    stack.push(&l.right);
                    stack.push(&l.left);
                }
            }
        }
        out
    }

    /// 树的深度,单个比较表达式为 1
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1)];
        while let Some((expr, depth)) = stack.pop() {
            max = max.max(depth);
            if let Expression::Logical(l) = expr {
                stack.push((&l.left, depth + 1));
                stack.push((&l.right, depth + 1));
            }
        }
        max
    }

    fn empty() -> Self {
        Expression::Comparison(ComparisonExpr {
            column: String::new(),
            op: ComparisonOp::Eq,
            value: None,
        })
    }
}

// 逐层拆开子树后再释放,避免深树在析构时递归过深
impl Drop for Expression {
    fn drop(&mut self) {
        let Expression::Logical(l) = self else {
            return;
        };
        if !matches!(*l.left, Expression::Logical(_)) && !matches!(*l.right, Expression::Logical(_)) {
            return;
        }
        let mut stack = vec![
            std::mem::replace(&mut *l.left, Expression::empty()),
            std::mem::replace(&mut *l.right, Expression::empty()),
        ];
        while let Some(mut expr) = stack.pop() {
            if let Expression::Logical(l) = &mut expr {
                stack.push(std::mem::replace(&mut *l.left, Expression::empty()));
                stack.push(std::mem::replace(&mut *l.right, Expression::empty()));
            }
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Comparison(cmp) => cmp.fmt(f),
            Expression::Logical(l) => l.fmt(f),
        }
    }
}

/// 解析过程中的逻辑表达式累加器
///
/// 每个括号分组各有一个。左操作数、逻辑操作符、右操作数依次填入;
/// 三者齐全后遇到下一个逻辑操作符时折叠为新的左操作数(左结合)。
/// 操作符为空的状态只存在于这里,完整的表达式树中不会出现。
#[derive(Debug, Default)]
pub(crate) struct PartialExpr {
    pub left: Option<Expression>,
    pub op: Option<LogicalOp>,
    pub right: Option<Expression>,
    left_depth: usize,
    right_depth: usize,
}

impl PartialExpr {
    /// 当前位置是否需要一个操作数
    pub fn expects_operand(&self) -> bool {
        self.left.is_none() || (self.op.is_some() && self.right.is_none())
    }

    /// 当前位置是否可以接受逻辑操作符
    pub fn accepts_logical_op(&self) -> bool {
        self.left.is_some() && (self.op.is_none() || self.right.is_some())
    }

    /// 填入操作数及其深度
    pub fn push_operand(&mut self, expr: Expression, depth: usize) {
        if self.left.is_none() {
            self.left = Some(expr);
            self.left_depth = depth;
        } else {
            self.right = Some(expr);
            self.right_depth = depth;
        }
    }

    pub fn push_logical_op(&mut self, op: LogicalOp) {
        if self.right.is_some() {
            let depth = self.depth();
            if let (Some(left), Some(prev), Some(right)) =
                (self.left.take(), self.op.take(), self.right.take())
            {
                self.left = Some(Expression::logical(left, prev, right));
                self.left_depth = depth;
                self.right_depth = 0;
            }
        }
        self.op = Some(op);
    }

    /// `root()` 将返回的树的深度
    pub fn depth(&self) -> usize {
        if self.right.is_some() {
            1 + self.left_depth.max(self.right_depth)
        } else {
            self.left_depth
        }
    }

    /// 最近完成的操作数,用于错误信息
    pub fn last_operand(&self) -> Option<&Expression> {
        self.right.as_ref().or(self.left.as_ref())
    }

    /// 取出分组的根表达式
    ///
    /// # Brief
    /// 操作符为空时解包为左操作数;绝不丢弃已填入的右操作数
    ///
    /// # Arguments
    /// * `raw` - 原始查询字符串,用于错误信息
    ///
    /// # Returns
    /// 分组的根表达式;累加器不完整时返回对应错误
    pub fn root(self, raw: &str) -> QueryResult<Expression> {
        match (self.left, self.op, self.right) {
            (Some(left), Some(op), Some(right)) => Ok(Expression::logical(left, op, right)),
            (Some(left), None, None) => Ok(left),
            (Some(_), Some(_), None) => Err(QueryError::MissingRightSideExpr(raw.to_string())),
            (Some(_), None, Some(_)) => Err(QueryError::MissingLogicalOp(format!("{:?}", raw))),
            (None, _, _) => Err(QueryError::MissingExpr(raw.to_string())),
        }
    }
}
