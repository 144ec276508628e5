use crate::error::{MqlError, MqlResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 占位符风格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// 每个参数都使用 `?`
    Sequential,
    /// 使用 `$1`, `$2`, ... (PostgreSQL 风格)
    Numbered,
}

impl Default for PlaceholderStyle {
    fn default() -> Self {
        Self::Sequential
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub placeholder: PlaceholderStyle,
    /// 查询中使用的列名 → Schema 中的规范列名
    pub column_map: HashMap<String, String>,
    /// 规范列名 → 条件中输出的完整列表达式(例如 `users.name`)
    pub table_column_map: HashMap<String, String>,
    pub ignored_fields: HashSet<String>,
}

impl QueryConfig {
    pub fn from_json(json: &str) -> MqlResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| MqlError::Serialization(format!("Invalid query config: {}", e)))
    }
}
