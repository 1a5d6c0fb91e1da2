/// データベース接続と初期化
pub mod connection;

pub use connection::{create_tables, initialize_database, IN_MEMORY_PATH};
