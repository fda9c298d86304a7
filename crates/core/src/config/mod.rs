//! 配置管理
//!
//! 配置按功能分节，每节都有默认值与 `validate()`。加载顺序：
//! 1. 默认配置
//! 2. TOML 配置文件
//! 3. 环境变量覆盖（前缀 `HARBOR_`，层级分隔符 `__`）

pub mod models;

#[cfg(test)]
mod tests;

pub use models::*;
