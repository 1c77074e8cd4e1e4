//! 数据库迁移

use brewops_adapter_postgres::Migration;

/// 服务自带的迁移脚本，按版本号顺序执行
pub fn migrations() -> Vec<Migration> {
    vec![Migration::new(
        1,
        "cellar",
        include_str!("../../../migrations/0001_cellar.sql"),
    )]
}
