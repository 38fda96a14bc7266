use crate::domain::port::RepositoryError;

/// データベースエラー型
/// sqlx の操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatabaseError {
    /// データベース接続・トランザクション開始エラー
    #[error("Database connection error: {0}")]
    ConnectionError(String),
    /// SQLクエリエラー
    #[error("Database query error: {0}")]
    QueryError(String),
    /// 取得した行の変換エラー
    #[error("Database decode error: {0}")]
    DecodeError(String),
    /// マイグレーションエラー
    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConnectionError(msg) => RepositoryError::ConnectionFailed(msg),
            DatabaseError::QueryError(msg) | DatabaseError::MigrationError(msg) => {
                RepositoryError::OperationFailed(msg)
            }
            DatabaseError::DecodeError(msg) => RepositoryError::FetchFailed(msg),
        }
    }
}
