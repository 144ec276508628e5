//! 公共类型定义模块
//!
//! 定义查询编译所需的核心类型:
//! - Value: 绑定到占位符上的参数值
//! - FieldType: 字段声明类型及其默认转换规则
//! - Schema: 调用方提供的 字段名 → 类型 表
//! - Model: 宿主类型发布自身 Schema 的 trait

use crate::error::{MqlError, MqlResult};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 日期字面值格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 绑定参数值
///
/// 编译器为每个占位符生成一个 Value,顺序与条件字符串中的占位符一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    String(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

/// 字面值转换函数
pub type ConvertValueFn = fn(&str) -> MqlResult<Value>;

/// 字段声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    NullableString,
    Int,
    Float,
    Bool,
    Time,
    NullableTime,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::NullableString => "nullable_string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Time => "time",
            FieldType::NullableTime => "nullable_time",
        }
    }

    /// 是否为字符串类字段(支持包含匹配)
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::String | FieldType::NullableString)
    }

    /// 是否为时间类字段(条件中按日期比较)
    pub fn is_time(&self) -> bool {
        matches!(self, FieldType::Time | FieldType::NullableTime)
    }

    /// 字段类型的默认转换函数
    pub fn converter(&self) -> ConvertValueFn {
        match self {
            FieldType::String | FieldType::NullableString => convert_string,
            FieldType::Int => convert_int,
            FieldType::Float => convert_float,
            FieldType::Bool => convert_bool,
            FieldType::Time | FieldType::NullableTime => convert_date,
        }
    }

    /// 按类型转换字面值
    ///
    /// # Brief
    /// 将查询中的原始字面值转换为强类型的绑定参数
    ///
    /// # Arguments
    /// * `raw` - 词法分析器输出的原始字面值(已去除引号)
    ///
    /// # Returns
    /// 成功返回 Value,格式不符返回 MqlError::TypeMismatch
    pub fn convert(&self, raw: &str) -> MqlResult<Value> {
        (self.converter())(raw)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn mismatch(expected: &str, raw: &str) -> MqlError {
    MqlError::TypeMismatch {
        expected: expected.to_string(),
        actual: raw.to_string(),
    }
}

fn convert_string(raw: &str) -> MqlResult<Value> {
    Ok(Value::String(raw.to_string()))
}

fn convert_int(raw: &str) -> MqlResult<Value> {
    raw.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| mismatch("int", raw))
}

fn convert_float(raw: &str) -> MqlResult<Value> {
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Value::Float(n)),
        _ => Err(mismatch("float", raw)),
    }
}

fn convert_bool(raw: &str) -> MqlResult<Value> {
    if raw.eq_ignore_ascii_case("true") {
        Ok(Value::Bool(true))
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(Value::Bool(false))
    } else {
        Err(mismatch("bool", raw))
    }
}

fn convert_date(raw: &str) -> MqlResult<Value> {
    // chrono 接受不补零的月/日,这里要求严格的 YYYY-MM-DD
    if raw.len() != 10 {
        return Err(mismatch("date (YYYY-MM-DD)", raw));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(Value::Date)
        .map_err(|_| mismatch("date (YYYY-MM-DD)", raw))
}

/// 字段 Schema
///
/// 有序的 字段名 → 类型 表。类型为 None 的字段已声明但不可查询,
/// 构建校验表时会被跳过。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: IndexMap<String, Option<FieldType>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加可查询字段
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), Some(field_type));
        self
    }

    /// 添加无可查询类型的字段
    pub fn untyped(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    pub fn get(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<FieldType>)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 从 JSON 加载 Schema,例如 `{"name": "string", "age": "int"}`
    pub fn from_json(json: &str) -> MqlResult<Self> {
        let schema: Schema = serde_json::from_str(json)
            .map_err(|e| MqlError::Serialization(format!("Invalid schema: {}", e)))?;
        if let Some(name) = schema.fields.keys().find(|name| name.trim().is_empty()) {
            return Err(MqlError::Validation(format!(
                "Schema field name must not be empty: {:?}",
                name
            )));
        }
        Ok(schema)
    }
}

impl<S: Into<String>> FromIterator<(S, FieldType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (S, FieldType)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, ty)| (name.into(), Some(ty)))
                .collect(),
        }
    }
}

/// 可查询的宿主模型
///
/// 宿主类型实现该 trait 后即可直接以自身 Schema 编译查询。
pub trait Model {
    fn schema() -> Schema;
}
