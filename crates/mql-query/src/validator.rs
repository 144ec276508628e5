//! 字段校验表
//!
//! 由 Schema 构建,以规范化后的字段名为键。规范化规则: 转为小写并删除下划线,
//! 因此 `member_number`、`MemberNumber`、`memberNumber` 指向同一个字段。

use crate::options::Options;
use crate::{ComparisonOp, QueryError, QueryResult};
use indexmap::IndexMap;
use mql_common::{ConvertValueFn, FieldType, Schema, Value};
use tracing::debug;

/// 规范化字段名
pub fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// 单个字段的校验信息
#[derive(Debug, Clone)]
pub struct Validator {
    /// Schema 中声明的字段名,条件中使用该名称
    pub column: String,
    pub field_type: FieldType,
    convert: ConvertValueFn,
}

impl Validator {
    pub fn new(column: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            column: column.into(),
            field_type,
            convert: field_type.converter(),
        }
    }

    /// 字段类型是否支持该比较操作符
    pub fn supports(&self, op: ComparisonOp) -> bool {
        match op {
            ComparisonOp::Contains => self.field_type.is_string(),
            ComparisonOp::Eq | ComparisonOp::Ne => true,
            _ => self.field_type != FieldType::Bool,
        }
    }

    /// 转换字面值,失败时返回带有表达式上下文的 InvalidValue
    pub fn convert(&self, raw: &str, expr: &dyn std::fmt::Display) -> QueryResult<Value> {
        (self.convert)(raw).map_err(|source| QueryError::InvalidValue {
            value: raw.to_string(),
            expr: expr.to_string(),
            source,
        })
    }
}

/// 规范化字段名 → Validator
#[derive(Debug, Clone, Default)]
pub struct Validators {
    fields: IndexMap<String, Validator>,
}

impl Validators {
    /// 从 Schema 构建校验表
    ///
    /// # Brief
    /// 遍历 Schema 字段,跳过未声明类型和被忽略的字段
    ///
    /// # Arguments
    /// * `schema` - 字段名 → 类型
    /// * `options` - 提供被忽略字段列表
    ///
    /// # Returns
    /// 校验表;Schema 为空时返回 InvalidParameter
    pub fn from_schema(schema: &Schema, options: &Options) -> QueryResult<Self> {
        if schema.is_empty() {
            return Err(QueryError::InvalidParameter("missing schema".to_string()));
        }

        let ignored: Vec<String> = options
            .config()
            .ignored_fields
            .iter()
            .map(|name| normalize_column(name))
            .collect();

        let mut fields = IndexMap::with_capacity(schema.len());
        for (name, field_type) in schema.iter() {
            let Some(field_type) = field_type else {
                continue;
            };
            let key = normalize_column(name);
            if ignored.contains(&key) {
                continue;
            }
            fields.insert(key, Validator::new(name, field_type));
        }

        debug!(fields = fields.len(), skipped = schema.len() - fields.len(), "built validators");
        Ok(Self { fields })
    }

    /// 按任意大小写/下划线写法查找字段
    pub fn get(&self, column: &str) -> Option<&Validator> {
        self.fields.get(&normalize_column(column))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
