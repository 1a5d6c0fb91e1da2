//! サブスクリプションサービス
//!
//! HTTP層から呼ばれる操作をまとめる。リクエストの解析と検証はストアに触れる前に行い、
//! ストア呼び出しはブロッキングスレッドで実行する。
//!
//! 読み取りは呼び出し元のキャンセルとタイムアウトで打ち切る。書き込みは開始前のキャンセルだけを
//! 受け付け、開始後は完了を待って実際の結果を返す（中断を返した書き込みは反映されていない）。

use super::cost;
use super::models::{Subscription, SubscriptionFilter, SubscriptionRequest};
use super::period::QueryPeriod;
use super::repository::SubscriptionStore;
use super::validation::build_subscription;
use crate::shared::errors::{AppError, AppResult};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// サブスクリプションサービス
pub struct SubscriptionService<S: SubscriptionStore + 'static> {
    /// 永続化ストア
    store: Arc<S>,
    /// ストア呼び出しのタイムアウト
    request_timeout: Duration,
}

impl<S: SubscriptionStore + 'static> SubscriptionService<S> {
    /// 新しいサービスを作成する
    ///
    /// # 引数
    /// * `store` - 永続化ストア
    /// * `request_timeout` - 1回のストア呼び出しの上限時間
    pub fn new(store: S, request_timeout: Duration) -> Self {
        Self {
            store: Arc::new(store),
            request_timeout,
        }
    }

    /// サブスクリプションを作成し、採番したIDを返す
    ///
    /// リクエストにIDが含まれていても無視し、常に新しいIDを採番する。
    pub async fn create_subscription(
        &self,
        request: SubscriptionRequest,
        cancel: &CancellationToken,
    ) -> AppResult<Uuid> {
        let (_, draft) = request.parse()?;
        let subscription = build_subscription(Uuid::new_v4(), draft)?;
        let id = subscription.id;

        self.run_write(cancel, "create", move |store| store.create(&subscription))
            .await?;

        log::info!("サブスクリプションを作成しました: id={id}");
        Ok(id)
    }

    /// サブスクリプションを全フィールド置き換えで更新する
    pub async fn update_subscription(
        &self,
        request: SubscriptionRequest,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        let (id, draft) = request.parse()?;
        let id = match id {
            Some(id) if !id.is_nil() => id,
            _ => return Err(AppError::validation("更新にはサブスクリプションIDが必要です")),
        };
        let subscription = build_subscription(id, draft)?;

        self.run_write(cancel, "update", move |store| store.update(&subscription))
            .await?;

        log::info!("サブスクリプションを更新しました: id={id}");
        Ok(())
    }

    /// サブスクリプションを削除する
    pub async fn delete_subscription(&self, id: Uuid, cancel: &CancellationToken) -> AppResult<()> {
        ensure_valid_id(id)?;

        self.run_write(cancel, "delete", move |store| store.delete(id))
            .await?;

        log::info!("サブスクリプションを削除しました: id={id}");
        Ok(())
    }

    /// IDでサブスクリプションを取得する
    pub async fn get_subscription(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> AppResult<Subscription> {
        ensure_valid_id(id)?;

        self.run_read(cancel, "get_by_id", move |store| store.get_by_id(id))
            .await?
            .ok_or_else(|| AppError::not_found(format!("ID {id} のサブスクリプション")))
    }

    /// サブスクリプション一覧を取得する（条件なしの場合は全件）
    pub async fn list_subscriptions(
        &self,
        filter: SubscriptionFilter,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<Subscription>> {
        let subscriptions = if filter == SubscriptionFilter::default() {
            self.run_read(cancel, "list_all", |store| store.list_all())
                .await?
        } else {
            self.run_read(cancel, "list_filtered", move |store| {
                store.list_filtered(&filter, None)
            })
            .await?
        };

        log::debug!("サブスクリプション一覧を取得しました: {}件", subscriptions.len());
        Ok(subscriptions)
    }

    /// 期間内の合計コストを計算する
    ///
    /// # 引数
    /// * `filter` - ユーザーID・サービス名の絞り込み
    /// * `period_start` - 期間の開始月（任意の日、月初に正規化される）
    /// * `period_end` - 期間の終了月（任意の日、月末に正規化される）
    /// * `cancel` - 呼び出し元のキャンセルトークン
    ///
    /// # 戻り値
    /// 合計コスト。開始月が終了月より後の場合はストアに問い合わせず期間指定エラー
    pub async fn total_cost(
        &self,
        filter: SubscriptionFilter,
        period_start: NaiveDate,
        period_end: NaiveDate,
        cancel: &CancellationToken,
    ) -> AppResult<i64> {
        let period = QueryPeriod::new(period_start, period_end)?;

        let subscriptions = self
            .run_read(cancel, "list_filtered", move |store| {
                store.list_filtered(&filter, Some(&period))
            })
            .await?;

        let total = cost::total_cost(&subscriptions, period.start, period.end)?;

        log::info!(
            "合計コストを計算しました: period={}〜{}, candidates={}, total={total}",
            period.start.format("%m/%Y"),
            period.end.format("%m/%Y"),
            subscriptions.len()
        );
        Ok(total)
    }

    /// 読み取り操作をブロッキングスレッドで実行する
    ///
    /// キャンセルまたはタイムアウトが先に来た場合は結果を待たずに中断エラーを返す。
    async fn run_read<T, F>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        f: F,
    ) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> AppResult<T> + Send + 'static,
    {
        ensure_not_cancelled(cancel, operation)?;

        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                log::warn!("ストア操作がキャンセルされました: {operation}");
                Err(AppError::cancelled(format!("{operation}: キャンセルされました")))
            }
            _ = tokio::time::sleep(self.request_timeout) => {
                log::warn!(
                    "ストア操作がタイムアウトしました: {operation} ({}ms)",
                    self.request_timeout.as_millis()
                );
                Err(AppError::cancelled(format!("{operation}: タイムアウトしました")))
            }
            joined = task => flatten_join(operation, joined),
        };

        log_store_failure(operation, &result);
        result
    }

    /// 書き込み操作をブロッキングスレッドで実行する
    ///
    /// 開始後は完了まで待つ。タイムアウトを超えた場合も警告を出すだけで、結果はそのまま返す。
    async fn run_write<F>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        f: F,
    ) -> AppResult<()>
    where
        F: FnOnce(&S) -> AppResult<()> + Send + 'static,
    {
        ensure_not_cancelled(cancel, operation)?;

        let store = Arc::clone(&self.store);
        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || f(store.as_ref())).await;
        let result = flatten_join(operation, joined);

        let elapsed = started.elapsed();
        if elapsed > self.request_timeout {
            log::warn!(
                "書き込みがタイムアウト時間を超えて完了しました: {operation} ({}ms)",
                elapsed.as_millis()
            );
        }

        log_store_failure(operation, &result);
        result
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, operation: &str) -> AppResult<()> {
    if cancel.is_cancelled() {
        return Err(AppError::cancelled(format!(
            "{operation}: 実行前にキャンセルされました"
        )));
    }
    Ok(())
}

fn flatten_join<T>(
    operation: &str,
    joined: Result<AppResult<T>, tokio::task::JoinError>,
) -> AppResult<T> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(AppError::concurrency(format!(
            "{operation}: ワーカーの実行に失敗: {e}"
        ))),
    }
}

fn log_store_failure<T>(operation: &str, result: &AppResult<T>) {
    if let Err(AppError::Database(details)) = result {
        log::error!("ストア操作に失敗しました: {operation}: {details}");
    }
}

/// nil UUIDは操作対象として扱わない
fn ensure_valid_id(id: Uuid) -> AppResult<()> {
    if id.is_nil() {
        return Err(AppError::validation("サブスクリプションIDが不正です"));
    }
    Ok(())
}
