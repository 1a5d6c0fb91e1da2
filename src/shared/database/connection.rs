use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::Path;

/// インメモリデータベースを指定するパス
pub const IN_MEMORY_PATH: &str = ":memory:";

/// データベース接続を初期化し、テーブルを作成する
///
/// # 引数
/// * `database_path` - データベースファイルのパス（":memory:" でインメモリ）
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. 親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. ファイルDBの場合はWALモードを有効化
/// 4. テーブルとインデックスの作成
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    let in_memory = database_path.as_os_str() == IN_MEMORY_PATH;

    let conn = if in_memory {
        Connection::open_in_memory()?
    } else {
        ensure_parent_directory(database_path)?;
        Connection::open(database_path)?
    };

    if !in_memory {
        // journal_modeは結果行を返すためquery_rowで実行する
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        log::debug!("journal_mode: {mode}");
    }

    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {:?}", database_path);

    Ok(conn)
}

/// データベースファイルの親ディレクトリがなければ作成する
fn ensure_parent_directory(database_path: &Path) -> AppResult<()> {
    let Some(parent) = database_path.parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(parent).map_err(|e| {
        AppError::configuration(format!("データディレクトリの作成に失敗: {e}"))
    })?;
    log::info!("データディレクトリを作成: {:?}", parent);

    Ok(())
}

/// データベーステーブルを作成する（既存の場合は何もしない）
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            service_name TEXT NOT NULL,
            monthly_cost INTEGER NOT NULL CHECK(monthly_cost > 0),
            user_id TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    create_indexes(conn)?;

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON subscriptions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_service_name ON subscriptions(service_name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_start_date ON subscriptions(start_date)",
        [],
    )?;

    Ok(())
}
