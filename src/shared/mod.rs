/// 共有エラー型とエラーハンドリング
pub mod errors;

/// 共有データベース接続管理
pub mod database;

/// 共有設定管理
pub mod config;

// 便利な再エクスポート
pub use config::{
    get_environment, initialize_logging_system, load_environment_variables, Environment,
    EnvironmentConfig,
};
pub use database::{create_tables, initialize_database};
pub use errors::{AppError, AppResult, ErrorSeverity};
