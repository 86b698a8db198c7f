//! 匿名匹配系统核心领域模型
//!
//! 包含用户、群组、兴趣、匹配、消息等核心实体，以及信用规则与内容审核门。

pub mod business_rules;
pub mod entities;
pub mod errors;
pub mod moderation;
pub mod value_objects;

// 重新导出常用类型
pub use business_rules::*;
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
