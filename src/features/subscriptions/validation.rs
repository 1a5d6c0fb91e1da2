//! サブスクリプションのバリデーション
//!
//! 作成時と更新時で同じ規則を、以下の順に適用する。
//! 1. サービス名（2〜255文字）
//! 2. 月額料金（正の整数）
//! 3. ユーザーID（必須、nil不可）
//! 4. 開始日（必須）
//! 5. 終了日（指定時は開始日以降）

use super::models::{Subscription, SubscriptionDraft};
use crate::shared::errors::{AppError, AppResult};
use chrono::NaiveDate;
use uuid::Uuid;

/// サービス名の最小文字数
pub const SERVICE_NAME_MIN_CHARS: usize = 2;

/// サービス名の最大文字数
pub const SERVICE_NAME_MAX_CHARS: usize = 255;

/// ドラフトを検証し、指定IDのサブスクリプションを組み立てる
///
/// # 引数
/// * `id` - 作成時は新規ID、更新時は既存ID
/// * `draft` - 解析済みのドラフト
///
/// # 戻り値
/// 検証済みのサブスクリプション、または最初に違反した規則のバリデーションエラー
pub fn build_subscription(id: Uuid, draft: SubscriptionDraft) -> AppResult<Subscription> {
    validate_service_name(&draft.service_name)?;
    validate_monthly_cost(draft.monthly_cost)?;
    let user_id = validate_user_id(draft.user_id)?;
    let start_date = validate_start_date(draft.start_date)?;
    validate_date_order(start_date, draft.end_date)?;

    Ok(Subscription {
        id,
        service_name: draft.service_name,
        monthly_cost: draft.monthly_cost,
        user_id,
        start_date,
        end_date: draft.end_date,
    })
}

fn validate_service_name(service_name: &str) -> AppResult<()> {
    let length = service_name.chars().count();

    if service_name.trim().is_empty() {
        return Err(AppError::validation("サービス名を入力してください"));
    }

    if !(SERVICE_NAME_MIN_CHARS..=SERVICE_NAME_MAX_CHARS).contains(&length) {
        return Err(AppError::validation(format!(
            "サービス名は{SERVICE_NAME_MIN_CHARS}文字以上{SERVICE_NAME_MAX_CHARS}文字以内で入力してください"
        )));
    }

    Ok(())
}

fn validate_monthly_cost(monthly_cost: i64) -> AppResult<()> {
    if monthly_cost <= 0 {
        return Err(AppError::validation(
            "月額料金は正の整数である必要があります",
        ));
    }

    Ok(())
}

fn validate_user_id(user_id: Option<Uuid>) -> AppResult<Uuid> {
    match user_id {
        Some(id) if !id.is_nil() => Ok(id),
        _ => Err(AppError::validation("ユーザーIDを指定してください")),
    }
}

fn validate_start_date(start_date: Option<NaiveDate>) -> AppResult<NaiveDate> {
    start_date.ok_or_else(|| AppError::validation("開始日を指定してください"))
}

fn validate_date_order(start_date: NaiveDate, end_date: Option<NaiveDate>) -> AppResult<()> {
    if let Some(end_date) = end_date {
        if end_date < start_date {
            return Err(AppError::validation("終了日は開始日より前にできません"));
        }
    }

    Ok(())
}
