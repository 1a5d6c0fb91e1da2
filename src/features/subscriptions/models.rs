use super::period::{month_end, parse_month};
use crate::shared::errors::{AppError, AppResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// サブスクリプションデータモデル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,                 // 作成時にサーバー側で採番、以後不変
    pub service_name: String,     // 2〜255文字
    pub monthly_cost: i64,        // 正の整数（通貨の最小単位）
    pub user_id: Uuid,            // 所有ユーザー
    pub start_date: NaiveDate,    // 開始月の1日
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>, // 終了月の末日、Noneは継続中
}

/// サブスクリプション作成・更新リクエスト（HTTPボディそのまま）
///
/// 日付は "MM/YYYY" 形式。更新時は `id` が必須。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionRequest {
    pub id: Option<String>,
    pub service_name: String,
    pub monthly_cost: i64,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// 解析済み・未検証のサブスクリプション
///
/// 欠落したフィールドは `None` のまま残し、判定はバリデータに任せる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDraft {
    pub service_name: String,
    pub monthly_cost: i64,
    pub user_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// 一覧・集計の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub user_id: Option<Uuid>,
    pub service_name: Option<String>,
}

impl SubscriptionFilter {
    /// クエリ文字列の値から絞り込み条件を作成する
    ///
    /// 空文字列は「指定なし」として扱う。
    pub fn from_query(user_id: Option<&str>, service_name: Option<&str>) -> AppResult<Self> {
        let user_id = match non_empty(user_id) {
            Some(raw) => Some(parse_uuid(raw, "user_id")?),
            None => None,
        };

        Ok(Self {
            user_id,
            service_name: non_empty(service_name).map(str::to_string),
        })
    }
}

impl SubscriptionRequest {
    /// リクエストを解析し、IDとドラフトに分解する
    ///
    /// 形式不正（UUID、MM/YYYY）は解析エラー、欠落はバリデーションに回す。
    /// サービス名の前後の空白は除去し、開始日は月初、終了日は月末に正規化する。
    pub fn parse(self) -> AppResult<(Option<Uuid>, SubscriptionDraft)> {
        let id = match non_empty(self.id.as_deref()) {
            Some(raw) => Some(parse_uuid(raw, "id")?),
            None => None,
        };

        let user_id = match non_empty(self.user_id.as_deref()) {
            Some(raw) => Some(parse_uuid(raw, "user_id")?),
            None => None,
        };

        let start_date = match non_empty(self.start_date.as_deref()) {
            Some(raw) => Some(parse_month(raw)?),
            None => None,
        };

        let end_date = match non_empty(self.end_date.as_deref()) {
            Some(raw) => Some(month_end(parse_month(raw)?)),
            None => None,
        };

        Ok((
            id,
            SubscriptionDraft {
                service_name: self.service_name.trim().to_string(),
                monthly_cost: self.monthly_cost,
                user_id,
                start_date,
                end_date,
            },
        ))
    }
}

/// 空白のみの文字列を「指定なし」とみなす
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// UUID文字列を解析する
pub fn parse_uuid(value: &str, field: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppError::parse(format!("{field}のUUID形式が不正です（受信: '{value}'）")))
}
