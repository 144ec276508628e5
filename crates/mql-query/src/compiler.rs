//! 条件编译器
//!
//! 深度优先遍历表达式树,为每个比较表达式生成一个带占位符的条件片段,
//! 并按从左到右的顺序收集绑定参数。字面值只会进入参数列表,
//! 条件字符串中只出现列名、操作符和占位符。
//!
//! 自定义转换器一律使用 `?` 作为占位符;编号模式下编译器按出现顺序
//! 将其改写为 `$n`,与其余叶子共用同一个计数。

use crate::ast::{ComparisonExpr, ComparisonOp, Expression, LogicalExpr, MAX_DEPTH};
use crate::options::Options;
use crate::validator::Validators;
use crate::{QueryError, QueryResult};
use mql_common::{PlaceholderStyle, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 编译结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    /// 带占位符的条件字符串
    pub condition: String,
    /// 与占位符一一对应的参数
    pub args: Vec<Value>,
}

impl WhereClause {
    pub fn new(condition: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            condition: condition.into(),
            args,
        }
    }
}

impl std::fmt::Display for WhereClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.condition)
    }
}

/// 编译表达式树
///
/// # Brief
/// 依据校验表把表达式树转换为参数化条件
///
/// # Arguments
/// * `expr` - 解析得到的表达式树
/// * `validators` - 由 Schema 构建的校验表
/// * `options` - 占位符风格、列名映射、自定义转换器
///
/// # Returns
/// 成功返回 WhereClause;任何比较表达式校验失败都返回错误,不产生部分结果
pub fn compile(expr: &Expression, validators: &Validators, options: &Options) -> QueryResult<WhereClause> {
    let mut compiler = Compiler {
        validators,
        options,
        args: Vec::new(),
    };
    let condition = compiler.compile_expr(expr, 1)?;
    let clause = WhereClause {
        condition,
        args: compiler.args,
    };
    debug!(condition = %clause.condition, args = clause.args.len(), "compiled where clause");
    Ok(clause)
}

struct Compiler<'a> {
    validators: &'a Validators,
    options: &'a Options,
    args: Vec<Value>,
}

impl<'a> Compiler<'a> {
    fn compile_expr(&mut self, expr: &Expression, depth: usize) -> QueryResult<String> {
        if depth > MAX_DEPTH {
            return Err(QueryError::NestingTooDeep {
                limit: MAX_DEPTH,
                input: format!("expression tree of {} comparisons", expr.comparisons().len()),
            });
        }
        match expr {
            Expression::Comparison(cmp) => self.compile_comparison(cmp),
            Expression::Logical(logical) => self.compile_logical(logical, depth),
        }
    }

    fn compile_logical(&mut self, expr: &LogicalExpr, depth: usize) -> QueryResult<String> {
        let left = self.compile_expr(&expr.left, depth + 1)?;
        let right = self.compile_expr(&expr.right, depth + 1)?;
        Ok(format!("({} {} {})", left, expr.op, right))
    }

    fn compile_comparison(&mut self, expr: &ComparisonExpr) -> QueryResult<String> {
        if expr.column.is_empty() {
            return Err(QueryError::MissingColumn(expr.to_string()));
        }

        let column = self
            .options
            .resolve_alias(&expr.column)
            .unwrap_or(&expr.column);
        let validator = self
            .validators
            .get(column)
            .ok_or_else(|| QueryError::InvalidColumn(column.to_string()))?;

        if let Some(convert) = self.options.converter(&validator.column) {
            let clause = convert(&validator.column, expr.op, expr.value.as_deref())?;
            return self.splice(&validator.column, clause);
        }

        let Some(raw) = expr.value.as_deref() else {
            return Err(QueryError::MissingComparisonValue(expr.to_string()));
        };
        if !validator.supports(expr.op) {
            return Err(QueryError::InvalidComparisonOp(format!(
                "{:?} for {} field {:?}",
                expr.op.as_str(),
                validator.field_type,
                validator.column
            )));
        }

        let value = match validator.convert(raw, expr)? {
            Value::String(s) if expr.op == ComparisonOp::Contains => Value::String(format!("%{}%", s)),
            value => value,
        };

        let mut column = self
            .options
            .table_column(&validator.column)
            .unwrap_or(&validator.column)
            .to_string();
        if validator.field_type.is_time() {
            column.push_str("::date");
        }

        let placeholder = self.placeholder();
        self.args.push(value);
        Ok(format!("{}{}{}", column, expr.op.sql(), placeholder))
    }

    /// 嵌入自定义转换器的结果
    ///
    /// 片段中 `?` 的个数必须等于返回的参数个数;编号模式下依次改写为 `$n`。
    fn splice(&mut self, column: &str, clause: WhereClause) -> QueryResult<String> {
        let placeholders = clause.condition.matches('?').count();
        if placeholders != clause.args.len() {
            return Err(QueryError::InvalidParameter(format!(
                "converter for {:?} returned {} placeholders for {} args",
                column,
                placeholders,
                clause.args.len()
            )));
        }

        let condition = match self.options.placeholder() {
            PlaceholderStyle::Sequential => clause.condition,
            PlaceholderStyle::Numbered => {
                let mut next = self.args.len() + 1;
                let mut out = String::with_capacity(clause.condition.len() + placeholders * 2);
                for c in clause.condition.chars() {
                    if c == '?' {
                        out.push_str(&format!("${}", next));
                        next += 1;
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        };
        self.args.extend(clause.args);
        Ok(condition)
    }

    /// 下一个参数的占位符,编号等于已收集的参数个数加一
    fn placeholder(&self) -> String {
        match self.options.placeholder() {
            PlaceholderStyle::Sequential => "?".to_string(),
            PlaceholderStyle::Numbered => format!("${}", self.args.len() + 1),
        }
    }
}
