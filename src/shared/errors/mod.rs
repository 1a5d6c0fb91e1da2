use hyper::StatusCode;
use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// データベース関連のエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// 入力値の解析エラー（MM/YYYY形式、UUID形式など）
    #[error("解析エラー: {0}")]
    Parse(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 集計期間の開始が終了より後になっている場合のエラー
    #[error("期間指定エラー: {0}")]
    Ordering(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),

    /// 並行処理関連のエラー
    #[error("並行処理エラー: {0}")]
    Concurrency(String),

    /// キャンセルまたはタイムアウトによる中断
    #[error("処理が中断されました: {0}")]
    Cancelled(String),

    /// 金額計算のオーバーフロー
    #[error("計算エラー: {0}")]
    Arithmetic(String),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（一時的なエラーなど）
    Medium,
    /// 高重要度（データベースエラーなど）
    High,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// データベースの詳細などの内部情報は含めない。
    pub fn user_message(&self) -> &str {
        match self {
            AppError::Database(_) => "データベース操作でエラーが発生しました",
            AppError::Validation(msg) => msg,
            AppError::Parse(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::Ordering(msg) => msg,
            AppError::Configuration(_) => "設定エラーが発生しました",
            AppError::Io(_) => "ファイル操作でエラーが発生しました",
            AppError::Json(_) => "リクエストのJSON形式が不正です",
            AppError::Concurrency(_) => "並行処理でエラーが発生しました",
            AppError::Cancelled(_) => "処理がキャンセルまたはタイムアウトしました",
            AppError::Arithmetic(msg) => msg,
        }
    }

    /// エラーの詳細情報を取得（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Validation(_)
            | AppError::Parse(_)
            | AppError::NotFound(_)
            | AppError::Ordering(_)
            | AppError::Json(_) => ErrorSeverity::Low,
            AppError::Cancelled(_) | AppError::Io(_) | AppError::Arithmetic(_) => {
                ErrorSeverity::Medium
            }
            AppError::Database(_) | AppError::Configuration(_) | AppError::Concurrency(_) => {
                ErrorSeverity::High
            }
        }
    }

    /// HTTPレスポンスのステータスコードに変換する
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Parse(_)
            | AppError::Json(_)
            | AppError::Ordering(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// バリデーションエラーを作成するヘルパー関数
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// 解析エラーを作成するヘルパー関数
    pub fn parse<S: Into<String>>(message: S) -> Self {
        AppError::Parse(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// 期間指定エラーを作成するヘルパー関数
    pub fn ordering<S: Into<String>>(message: S) -> Self {
        AppError::Ordering(message.into())
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }

    /// 並行処理エラーを作成するヘルパー関数
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        AppError::Concurrency(message.into())
    }

    /// 中断エラーを作成するヘルパー関数
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        AppError::Cancelled(message.into())
    }
}

/// rusqlite::ErrorからAppErrorへの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        AppError::Database(error.to_string())
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;
