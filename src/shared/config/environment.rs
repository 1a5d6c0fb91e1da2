use std::path::PathBuf;
use std::time::Duration;

/// デフォルトのサーバーホスト
const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// デフォルトのサーバーポート
const DEFAULT_SERVER_PORT: u16 = 8080;

/// デフォルトのリクエストタイムアウト（秒）
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// データベースを置くディレクトリ名
const DATA_DIR_NAME: &str = "subscription-cost";

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
    /// HTTPサーバーのバインド先ホスト
    pub server_host: String,
    /// HTTPサーバーのポート番号
    pub server_port: u16,
    /// SQLiteデータベースファイルのパス
    pub database_path: PathBuf,
    /// ストア問い合わせのタイムアウト
    pub request_timeout: Duration,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let env = get_environment();
        let debug_mode = env == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        let server_host =
            std::env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string());
        let server_port = parse_env_or("SERVER_PORT", DEFAULT_SERVER_PORT);
        let request_timeout = Duration::from_secs(parse_env_or(
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));

        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_database_path(env));

        Self {
            environment: format!("{env:?}").to_lowercase(),
            debug_mode,
            log_level,
            server_host,
            server_port,
            database_path,
            request_timeout,
        }
    }

    /// サーバーのバインドアドレスを "host:port" 形式で取得
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// 数値の環境変数を読み込む。未設定または不正な値の場合はデフォルト値を使用する
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("{key}の値が不正です（'{raw}'）。デフォルト値 {default} を使用します");
                default
            }
        },
        Err(_) => default,
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. 未設定でデバッグビルドの場合は Development
/// 3. 未設定でリリースビルドの場合は Production
pub fn get_environment() -> Environment {
    let env_var = std::env::var("ENVIRONMENT").ok();
    let env = resolve_environment(env_var.as_deref(), cfg!(debug_assertions));
    log::debug!(
        "環境判定: ENVIRONMENT={env_var:?}, debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

fn resolve_environment(env_var: Option<&str>, debug_build: bool) -> Environment {
    match env_var {
        Some("production") => Environment::Production,
        Some(_) => Environment::Development,
        None if debug_build => Environment::Development,
        None => Environment::Production,
    }
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_subscriptions.db"
/// - プロダクション環境: "subscriptions.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subscriptions.db",
        Environment::Production => "subscriptions.db",
    }
}

/// DATABASE_PATH未指定時のデータベースパスを決定する
///
/// ユーザーデータディレクトリが取得できない場合はカレントディレクトリを使う。
fn default_database_path(env: Environment) -> PathBuf {
    let filename = get_database_filename(env);
    match dirs::data_dir() {
        Some(dir) => dir.join(DATA_DIR_NAME).join(filename),
        None => PathBuf::from(filename),
    }
}

/// 環境に応じた.envファイル名を取得する
pub fn get_env_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => ".env",
        Environment::Production => ".env.production",
    }
}

/// 環境に応じた.envファイルを読み込む
pub fn load_environment_variables() {
    let environment = get_environment();
    let env_file = get_env_filename(environment);

    log::info!("環境: {environment:?}, 読み込み対象: {env_file}");

    match dotenv::from_filename(env_file) {
        Ok(_) => {
            log::info!("{env_file}ファイルを読み込みました");
        }
        Err(_) => {
            log::warn!(
                "{env_file}が見つかりません。直接設定された環境変数を使用します。"
            );
        }
    }
}

/// ログシステムを初期化する
///
/// 二重初期化はエラーにせず無視する（テストから複数回呼ばれるため）。
pub fn initialize_logging_system(env_config: &EnvironmentConfig) {
    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    let result = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    if result.is_ok() {
        log::info!(
            "ログシステムを初期化しました: level={}, environment={}",
            env_config.log_level,
            env_config.environment
        );
    }
}
