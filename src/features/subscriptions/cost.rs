//! 期間別コスト集計
//!
//! 各サブスクリプションを集計期間と重なる暦月の数で按分し、合計する。
//! 1日でも有効な月は月額の全額を計上する（月内の日割りはしない）。

use super::models::Subscription;
use super::period::months_inclusive;
use crate::shared::errors::{AppError, AppResult};
use chrono::NaiveDate;

/// 集計期間内の合計コストを計算する
///
/// # 引数
/// * `subscriptions` - 集計対象のサブスクリプション
/// * `period_start` - 期間の開始（月初日に正規化済み）
/// * `period_end` - 期間の終了（月末日に正規化済み）
///
/// # 戻り値
/// 合計コスト。開始が終了より後の場合は期間指定エラー
pub fn total_cost(
    subscriptions: &[Subscription],
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> AppResult<i64> {
    if period_start > period_end {
        return Err(AppError::ordering(
            "集計期間の開始が終了より後になっています",
        ));
    }

    subscriptions.iter().try_fold(0i64, |total, subscription| {
        let contribution = subscription_cost(subscription, period_start, period_end)?;
        total.checked_add(contribution).ok_or_else(|| {
            AppError::Arithmetic("合計金額が表現可能な範囲を超えました".to_string())
        })
    })
}

/// 1件のサブスクリプションが期間内で請求される金額
pub fn subscription_cost(
    subscription: &Subscription,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> AppResult<i64> {
    let months = active_months(subscription, period_start, period_end);

    months.checked_mul(subscription.monthly_cost).ok_or_else(|| {
        AppError::Arithmetic(format!(
            "サブスクリプション {} の金額計算がオーバーフローしました",
            subscription.id
        ))
    })
}

/// サブスクリプションが期間内で有効な月数
///
/// 重なりがない場合は0（エラーではない）。
pub fn active_months(
    subscription: &Subscription,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> i64 {
    let activity_start = subscription.start_date.max(period_start);
    let activity_end = subscription
        .end_date
        .map_or(period_end, |end_date| end_date.min(period_end));

    if activity_start > activity_end {
        return 0;
    }

    months_inclusive(activity_start, activity_end)
}

/// ストアの粗い絞り込み条件（期間と少しでも重なる可能性があるか）
///
/// `active_months` の厳密判定の上位集合であり、偽陰性を出さない。
pub fn may_overlap(subscription: &Subscription, period_start: NaiveDate, period_end: NaiveDate) -> bool {
    subscription.start_date <= period_end
        && subscription
            .end_date
            .map_or(true, |end_date| end_date >= period_start)
}
