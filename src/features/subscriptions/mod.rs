/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - サブスクリプションの作成、読み取り、更新、削除
/// - ユーザーID・サービス名による絞り込み
/// - 集計期間（MM/YYYY〜MM/YYYY）内の合計コスト計算
/// - HTTP API（/sub 以下）
pub mod cost;
pub mod handlers;
pub mod models;
pub mod period;
pub mod repository;
pub mod service;
pub mod validation;

// 公開インターフェース
pub use cost::{active_months, may_overlap, total_cost};

pub use handlers::handle_request;

pub use models::{Subscription, SubscriptionDraft, SubscriptionFilter, SubscriptionRequest};

pub use period::{month_end, month_start, parse_month, QueryPeriod};

pub use repository::{SqliteSubscriptionStore, SubscriptionStore};

pub use service::SubscriptionService;

pub use validation::build_subscription;
