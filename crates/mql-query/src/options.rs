//! 编译选项
//!
//! `Options` 由可序列化的 `QueryConfig` 和按字段注册的自定义转换器组成。
//! 转换器是函数对象,不参与序列化;使用 `OptionsBuilder` 注册时会校验
//! 字段名非空且不重复。列名映射在构建时按规范化键建立索引,
//! 两个映射规范化后相同即为错误。

use crate::compiler::WhereClause;
use crate::validator::normalize_column;
use crate::{ComparisonOp, QueryError, QueryResult};
use indexmap::IndexMap;
use mql_common::{PlaceholderStyle, QueryConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// 自定义字段转换器
///
/// 参数依次为 Schema 中的字段名、比较操作符和比较值。返回的条件片段
/// 以 `?` 标记占位符,个数必须与返回的参数个数相同;编号模式下由编译器
/// 改写为 `$n`。
pub type ConvertFn =
    Arc<dyn Fn(&str, ComparisonOp, Option<&str>) -> QueryResult<WhereClause> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Options {
    config: QueryConfig,
    aliases: IndexMap<String, String>,
    table_columns: IndexMap<String, String>,
    converters: IndexMap<String, ConvertFn>,
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// 只使用配置,不注册转换器
    pub fn from_config(config: QueryConfig) -> QueryResult<Self> {
        Self::assemble(config, IndexMap::new())
    }

    fn assemble(config: QueryConfig, converters: IndexMap<String, ConvertFn>) -> QueryResult<Self> {
        let aliases = index_columns(&config.column_map)?;
        let table_columns = index_columns(&config.table_column_map)?;
        Ok(Self {
            config,
            aliases,
            table_columns,
            converters,
        })
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn placeholder(&self) -> PlaceholderStyle {
        self.config.placeholder
    }

    /// 按字段名查找转换器(大小写与下划线不敏感)
    pub fn converter(&self, column: &str) -> Option<&ConvertFn> {
        self.converters.get(&normalize_column(column))
    }

    /// 查询列名的别名映射,返回 Schema 中的规范列名
    pub(crate) fn resolve_alias(&self, column: &str) -> Option<&str> {
        self.aliases.get(&normalize_column(column)).map(String::as_str)
    }

    /// 条件中输出的完整列表达式
    pub(crate) fn table_column(&self, column: &str) -> Option<&str> {
        self.table_columns
            .get(&normalize_column(column))
            .map(String::as_str)
    }
}

/// 以规范化键重建映射,键冲突时返回 DuplicateColumnMapping
fn index_columns(map: &HashMap<String, String>) -> QueryResult<IndexMap<String, String>> {
    let mut entries: Vec<(&String, &String)> = map.iter().collect();
    entries.sort();

    let mut index = IndexMap::with_capacity(map.len());
    for (name, target) in entries {
        let key = normalize_column(name);
        if index.contains_key(&key) {
            return Err(QueryError::DuplicateColumnMapping(key));
        }
        index.insert(key, target.clone());
    }
    Ok(index)
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("config", &self.config)
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Options 构建器
#[derive(Default)]
pub struct OptionsBuilder {
    config: QueryConfig,
    converters: Vec<(String, ConvertFn)>,
}

impl OptionsBuilder {
    /// 以已有配置为基础
    pub fn config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn placeholder(mut self, style: PlaceholderStyle) -> Self {
        self.config.placeholder = style;
        self
    }

    /// 使用 `$1`, `$2`, ... 占位符
    pub fn pg_placeholders(self) -> Self {
        self.placeholder(PlaceholderStyle::Numbered)
    }

    pub fn column_map<K, V>(mut self, map: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .column_map
            .extend(map.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn table_column_map<K, V>(mut self, map: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .table_column_map
            .extend(map.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn ignored_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.config
            .ignored_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// 为字段注册自定义转换器
    pub fn converter<F>(mut self, field: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&str, ComparisonOp, Option<&str>) -> QueryResult<WhereClause> + Send + Sync + 'static,
    {
        self.converters.push((field.into(), Arc::new(convert)));
        self
    }

    /// 构建 Options
    ///
    /// # Returns
    /// 转换器字段名为空返回 InvalidParameter,规范化后重复返回 DuplicateConverter;
    /// 列名映射规范化后重复返回 DuplicateColumnMapping
    pub fn build(self) -> QueryResult<Options> {
        let mut converters = IndexMap::with_capacity(self.converters.len());
        for (field, convert) in self.converters {
            if field.trim().is_empty() {
                return Err(QueryError::InvalidParameter("missing field name".to_string()));
            }
            let key = normalize_column(&field);
            if converters.contains_key(&key) {
                return Err(QueryError::DuplicateConverter(field));
            }
            converters.insert(key, convert);
        }
        Options::assemble(self.config, converters)
    }
}

impl TryFrom<QueryConfig> for Options {
    type Error = QueryError;

    fn try_from(config: QueryConfig) -> QueryResult<Self> {
        Self::from_config(config)
    }
}
