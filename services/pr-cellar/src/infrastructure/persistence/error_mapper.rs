//! 数据库错误映射
//!
//! SQLx 错误按 SQLSTATE 转为 AppError；并发类错误统一为冲突，由上层映射为并发修改。

use brewops_errors::AppError;

pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::not_found("Record not found"),
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    "23505" => AppError::conflict("Duplicate entry violates unique constraint"),
                    // 排他约束：同一罐上的占罐时间窗重叠
                    "23P01" => AppError::conflict("Tank window overlaps an open assignment"),
                    "40001" => AppError::conflict("Serialization failure, concurrent update"),
                    "40P01" => AppError::conflict("Deadlock detected"),
                    // lock_timeout 到期，罐正被另一个命令锁定
                    "55P03" => AppError::conflict("Tank is locked by another command"),
                    "23503" => AppError::validation("Foreign key constraint violation"),
                    "23514" => AppError::validation("Check constraint violation"),
                    "23502" => AppError::validation("Not null constraint violation"),
                    "22001" => AppError::validation("String data too long"),
                    "22P02" => AppError::validation("Invalid input syntax"),
                    _ => AppError::database(format!("Database error ({}): {}", code, db_err)),
                }
            } else {
                AppError::database(db_err.to_string())
            }
        }
        sqlx::Error::PoolTimedOut => AppError::database("Database connection pool timeout"),
        sqlx::Error::PoolClosed => AppError::database("Database connection pool is closed"),
        sqlx::Error::Protocol(msg) => AppError::internal(format!("Database protocol error: {}", msg)),
        _ => AppError::database(e.to_string()),
    }
}

/// 数据库中的枚举字符串无法识别
pub fn map_decode_error(column: &str, message: impl std::fmt::Display) -> AppError {
    AppError::internal(format!("Invalid value in column {}: {}", column, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Database(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_decode_error_names_column() {
        let err = map_decode_error("status", "unknown TankStatus value: BROKEN");
        assert!(err.to_string().contains("status"));
    }
}
