//! 错误类型定义模块
//!
//! 定义值转换、Schema 校验和配置加载阶段的统一错误类型 MqlError。

use thiserror::Error;

/// 公共层错误类型
///
/// 查询层通过 `#[from]` 将其包装进 `QueryError`。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MqlError {
    /// 类型不匹配: 字面值无法转换为字段声明的类型
    #[error("Type mismatch: expected {expected}, got {actual:?}")]
    TypeMismatch { expected: String, actual: String },

    /// Schema 或配置校验失败
    #[error("Validation error: {0}")]
    Validation(String),

    /// 配置反序列化失败
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 公共层 Result 类型别名
pub type MqlResult<T> = Result<T, MqlError>;
