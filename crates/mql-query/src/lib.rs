//! MQL 查询模块
//!
//! 本模块把面向终端用户的 MQL (Model Query Language) 查询字符串编译为
//! 参数化的 WHERE 条件:
//! - 词法分析(显式状态机,单字符前瞻)
//! - 语法解析(递归下降,构建二叉表达式树)
//! - 依据 Schema 校验字段/操作符/值,并按字段类型转换值
//! - 生成带占位符的条件字符串与有序参数列表
//!
//! 用户输入的值永远不会出现在条件字符串中,只会以占位符参数的形式返回。
//!
//! MQL 支持:
//! - 比较操作符: `=`, `!=`, `>`, `>=`, `<`, `<=`, `%`(包含匹配)
//! - 逻辑组合: `and`, `or`(不区分大小写)
//! - 括号分组
//! - 使用 `"`, `'` 或 `` ` `` 引用的字符串值
//!
//! ```rust,ignore
//! use mql_common::{FieldType, Schema};
//! use mql_query::{parse_and_compile, Options};
//!
//! let schema = Schema::new()
//!     .field("name", FieldType::String)
//!     .field("age", FieldType::Int);
//! let clause = parse_and_compile(r#"name="alice" and age>21"#, &schema, &Options::default())?;
//! assert_eq!(clause.condition, "(name=? and age>?)");
//! ```

pub mod lexer;
pub mod parser;
pub mod ast;
pub mod validator;
pub mod compiler;
pub mod options;

pub use ast::*;
pub use compiler::{compile, WhereClause};
pub use options::{ConvertFn, Options, OptionsBuilder};
pub use parser::Parser;
pub use validator::{Validator, Validators};

use mql_common::{Model, MqlError, Schema};
use thiserror::Error;

/// 查询错误类型
///
/// 每个变体对应一种稳定的错误类别,可直接用于模式匹配;
/// 错误信息中回显出错的输入片段及其位置。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// 参数缺失或无效
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// `!` 后面不是 `=`
    #[error("Invalid \"!=\" token, got {got:?} at {position} in: {input:?}")]
    InvalidNotEqual {
        got: String,
        position: usize,
        input: String,
    },

    /// 引号字符串缺少结束分隔符
    #[error("Missing closing delimiter {delimiter} for string at {position} in: {input:?}")]
    MissingClosingDelimiter {
        delimiter: char,
        position: usize,
        input: String,
    },

    /// 输入以未转义的反斜杠结尾
    #[error("Trailing backslash at {position} in: {input:?}")]
    TrailingBackslash { position: usize, input: String },

    /// 数字字面值包含多个小数点
    #[error("Invalid number {literal:?} at {position} in: {input:?}")]
    InvalidNumber {
        literal: String,
        position: usize,
        input: String,
    },

    #[error("Unexpected opening paren at {position}{context} in: {input:?}")]
    UnexpectedOpeningParen {
        position: usize,
        context: String,
        input: String,
    },

    #[error("Unexpected closing paren \")\" at {position} but no left side expression has been parsed in: {input:?}")]
    UnexpectedClosingParen { position: usize, input: String },

    #[error("Missing closing paren in: {0:?}")]
    MissingClosingParen(String),

    #[error("Missing comparison operator after {column:?} in: {input:?}")]
    MissingComparisonOp { column: String, input: String },

    #[error("Missing comparison value in: {0}")]
    MissingComparisonValue(String),

    #[error("Missing logical operator before right side expr in: {0}")]
    MissingLogicalOp(String),

    #[error("Unexpected token {token} at {position} in: {input:?}")]
    UnexpectedToken {
        token: String,
        position: usize,
        input: String,
    },

    /// 两个表达式之间缺少逻辑操作符
    #[error("Unexpected expression starting at {token:?} ({position}) in: {input:?}")]
    UnexpectedExpr {
        token: String,
        position: usize,
        input: String,
    },

    #[error("Unexpected logical operator {op:?} at {position} in: {input:?}")]
    UnexpectedLogicalOp {
        op: String,
        position: usize,
        input: String,
    },

    /// 逻辑操作符后缺少右侧表达式
    #[error("Logical operator without a right side expr in: {0:?}")]
    MissingRightSideExpr(String),

    #[error("Missing expression in: {0:?}")]
    MissingExpr(String),

    /// 括号嵌套或逻辑表达式链超过最大深度
    #[error("Expression nesting exceeds the maximum depth of {limit} in: {input:?}")]
    NestingTooDeep { limit: usize, input: String },

    #[error("Invalid comparison operator {0}")]
    InvalidComparisonOp(String),

    #[error("Invalid logical operator {0:?}")]
    InvalidLogicalOp(String),

    #[error("Missing column in: {0}")]
    MissingColumn(String),

    /// 列不在 Schema 中,或已被忽略
    #[error("Invalid column {0:?}")]
    InvalidColumn(String),

    /// 值无法转换为字段声明的类型
    #[error("Invalid value {value:?} in {expr}: {source}")]
    InvalidValue {
        value: String,
        expr: String,
        source: MqlError,
    },

    /// 同一字段注册了多个自定义转换器
    #[error("Duplicate converter for field {0:?}")]
    DuplicateConverter(String),

    /// 两个列名映射规范化后指向同一个键
    #[error("Duplicate column mapping for {0:?}")]
    DuplicateColumnMapping(String),

    /// 公共层错误
    #[error(transparent)]
    Common(#[from] MqlError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 查询结果类型
pub type QueryResult<T> = Result<T, QueryError>;

/// 解析查询字符串
///
/// # Brief
/// 将 MQL 查询解析为表达式树,不做 Schema 校验
///
/// # Arguments
/// * `input` - MQL 查询字符串
///
/// # Returns
/// 成功返回根表达式,语法错误返回 QueryError
pub fn parse(input: &str) -> QueryResult<Expression> {
    Parser::parse(input)
}

/// 解析并编译查询
///
/// # Brief
/// 依次执行 Schema 校验表构建、语法解析和条件编译
///
/// # Arguments
/// * `query` - MQL 查询字符串
/// * `schema` - 允许查询的字段及其类型
/// * `options` - 编译选项
///
/// # Returns
/// 成功返回 WhereClause,任何错误都不会产生部分结果
pub fn parse_and_compile(query: &str, schema: &Schema, options: &Options) -> QueryResult<WhereClause> {
    if query.is_empty() {
        return Err(QueryError::InvalidParameter("missing query".to_string()));
    }
    let validators = Validators::from_schema(schema, options)?;
    let expr = Parser::parse(query)?;
    compile(&expr, &validators, options)
}

/// 以模型自身的 Schema 解析并编译查询
pub fn parse_model<M: Model>(query: &str, options: &Options) -> QueryResult<WhereClause> {
    parse_and_compile(query, &M::schema(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mql_common::{FieldType, Value};

    struct User;

    impl Model for User {
        fn schema() -> Schema {
            Schema::new()
                .field("id", FieldType::Int)
                .field("name", FieldType::String)
                .field("email", FieldType::NullableString)
                .field("age", FieldType::Int)
                .field("length", FieldType::Float)
                .field("member_number", FieldType::NullableString)
                .field("created_at", FieldType::Time)
        }
    }

    #[test]
    fn test_parse_and_compile_mixed() {
        let clause = parse_model::<User>(
            r#"(name="alice" and email="eve@example.com" and member_number = 1) or (age > 21 or length < 1.5)"#,
            &Options::default(),
        )
        .unwrap();
        assert_eq!(
            clause.condition,
            "(((name=? and email=?) and member_number=?) or (age>? or length<?))"
        );
        assert_eq!(
            clause.args,
            vec![
                Value::from("alice"),
                Value::from("eve@example.com"),
                Value::from("1"),
                Value::Int(21),
                Value::Float(1.5),
            ]
        );
    }

    #[test]
    fn test_alternate_delimiters() {
        for query in [
            "(name='alice' and email='eve@example.com') or age > 21",
            "(name=`alice` and email=`eve@example.com`) or age > 21",
        ] {
            let clause = parse_model::<User>(query, &Options::default()).unwrap();
            assert_eq!(clause.condition, "((name=? and email=?) or age>?)");
            assert_eq!(clause.args[0], Value::from("alice"));
        }
    }

    #[test]
    fn test_missing_query() {
        let err = parse_model::<User>("", &Options::default()).unwrap_err();
        assert_eq!(err, QueryError::InvalidParameter("missing query".to_string()));
    }

    #[test]
    fn test_missing_schema() {
        let err = parse_and_compile("name=alice", &Schema::new(), &Options::default()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidParameter(_)));
    }

    #[test]
    fn test_invalid_not_equal() {
        let err = parse_model::<User>("name!alice", &Options::default()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidNotEqual { ref got, .. } if got == "!a"));
        assert!(err.to_string().contains(r#"got "!a""#));
    }

    #[test]
    fn test_null_string_is_a_value() {
        let clause = parse_model::<User>(r#"name="null""#, &Options::default()).unwrap();
        assert_eq!(clause.condition, "name=?");
        assert_eq!(clause.args, vec![Value::from("null")]);
    }

    #[test]
    fn test_logical_scenarios() {
        let schema = Schema::new()
            .field("name", FieldType::String)
            .field("age", FieldType::Int);
        let clause = parse_and_compile(r#"name="alice" and age>21"#, &schema, &Options::default()).unwrap();
        assert_eq!(clause.condition, "(name=? and age>?)");
        assert_eq!(clause.args, vec![Value::from("alice"), Value::Int(21)]);

        let options = Options::builder().pg_placeholders().build().unwrap();
        let clause =
            parse_and_compile(r#"name="bob" or (name%"alice" or name="eve")"#, &schema, &options).unwrap();
        assert_eq!(clause.condition, "(name=$1 or (name like $2 or name=$3))");
        assert_eq!(
            clause.args,
            vec![Value::from("bob"), Value::from("%alice%"), Value::from("eve")]
        );
    }

    #[test]
    fn test_long_chain_is_rejected() {
        let query = vec!["age=1"; 20_000].join(" or ");
        let err = parse_model::<User>(&query, &Options::default()).unwrap_err();
        assert!(matches!(err, QueryError::NestingTooDeep { limit: MAX_DEPTH, .. }));

        let query = vec!["age=1"; MAX_DEPTH].join(" or ");
        let clause = parse_model::<User>(&query, &Options::default()).unwrap();
        assert_eq!(clause.args.len(), MAX_DEPTH);
    }

    #[test]
    fn test_invalid_value_error() {
        let err = parse_model::<User>("age=old", &Options::default()).unwrap_err();
        match err {
            QueryError::InvalidValue { value, source, .. } => {
                assert_eq!(value, "old");
                assert!(matches!(source, MqlError::TypeMismatch { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
