pub mod features;
pub mod server;
pub mod shared;

use features::subscriptions::{SqliteSubscriptionStore, SubscriptionService};
use log::{error, info};
use server::HttpServer;
use shared::config::{initialize_logging_system, load_environment_variables, EnvironmentConfig};
use shared::database::initialize_database;
use shared::errors::AppResult;
use std::sync::Arc;

/// アプリケーションを起動し、停止シグナルを受けるまでリクエストを処理する
pub async fn run() -> AppResult<()> {
    // 環境変数を読み込み（.envファイルがある場合）
    load_environment_variables();

    let env_config = EnvironmentConfig::from_env();
    initialize_logging_system(&env_config);

    info!("アプリケーション初期化を開始します...");

    info!(
        "データベースを初期化しています: {}",
        env_config.database_path.display()
    );
    let db_conn = initialize_database(&env_config.database_path).map_err(|e| {
        error!("データベースの初期化に失敗しました: {e}");
        e
    })?;
    info!("データベースの初期化が完了しました");

    let store = SqliteSubscriptionStore::new(db_conn);
    let service = Arc::new(SubscriptionService::new(
        store,
        env_config.request_timeout,
    ));

    let server = HttpServer::bind(&env_config.bind_address(), service).await?;
    let shutdown = server.shutdown_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("停止シグナルを受信しました"),
            Err(e) => error!("停止シグナルの待機に失敗しました: {e}"),
        }
        shutdown.cancel();
    });

    info!("アプリケーション初期化が完了しました");

    server.serve().await?;

    info!("アプリケーションを終了しました");
    Ok(())
}
