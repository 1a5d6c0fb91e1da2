use super::models::{Subscription, SubscriptionFilter};
use super::period::QueryPeriod;
use crate::shared::errors::{AppError, AppResult};
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Tokyo;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// 取得カラム（行マッピングの順序と一致させる）
const SELECT_COLUMNS: &str =
    "SELECT id, service_name, monthly_cost, user_id, start_date, end_date FROM subscriptions";

/// サブスクリプションの永続化ストア
///
/// 実装はブロッキングでよい。サービス層がブロッキングスレッドで呼び出す。
pub trait SubscriptionStore: Send + Sync {
    /// サブスクリプションを保存する
    fn create(&self, subscription: &Subscription) -> AppResult<()>;

    /// IDでサブスクリプションを取得する。存在しない場合はNone
    fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;

    /// サブスクリプションの全フィールドを置き換える。存在しない場合はNotFound
    fn update(&self, subscription: &Subscription) -> AppResult<()>;

    /// サブスクリプションを削除する。存在しない場合はNotFound
    fn delete(&self, id: Uuid) -> AppResult<()>;

    /// 全サブスクリプションを開始日の新しい順に取得する
    fn list_all(&self) -> AppResult<Vec<Subscription>>;

    /// 条件に一致するサブスクリプションを取得する
    ///
    /// 期間を指定した場合は粗い重なり条件
    /// （start_date <= 期間終了 かつ (end_date IS NULL または end_date >= 期間開始)）も適用する。
    fn list_filtered(
        &self,
        filter: &SubscriptionFilter,
        period: Option<&QueryPeriod>,
    ) -> AppResult<Vec<Subscription>>;
}

/// SQLiteによるサブスクリプションストア
pub struct SqliteSubscriptionStore {
    conn: Mutex<Connection>,
}

impl SqliteSubscriptionStore {
    /// 初期化済みのデータベース接続からストアを作成する
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))
    }
}

impl SubscriptionStore for SqliteSubscriptionStore {
    fn create(&self, subscription: &Subscription) -> AppResult<()> {
        let conn = self.lock()?;
        create(&conn, subscription)
    }

    fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let conn = self.lock()?;
        find_by_id(&conn, id)
    }

    fn update(&self, subscription: &Subscription) -> AppResult<()> {
        let conn = self.lock()?;
        update(&conn, subscription)
    }

    fn delete(&self, id: Uuid) -> AppResult<()> {
        let conn = self.lock()?;
        delete(&conn, id)
    }

    fn list_all(&self) -> AppResult<Vec<Subscription>> {
        let conn = self.lock()?;
        find_all(&conn, &SubscriptionFilter::default(), None)
    }

    fn list_filtered(
        &self,
        filter: &SubscriptionFilter,
        period: Option<&QueryPeriod>,
    ) -> AppResult<Vec<Subscription>> {
        let conn = self.lock()?;
        find_all(&conn, filter, period)
    }
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - 検証済みのサブスクリプション
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create(conn: &Connection, subscription: &Subscription) -> AppResult<()> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    conn.execute(
        "INSERT INTO subscriptions (id, service_name, monthly_cost, user_id, start_date, end_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            subscription.id.to_string(),
            subscription.service_name,
            subscription.monthly_cost,
            subscription.user_id.to_string(),
            subscription.start_date,
            subscription.end_date,
            now,
            now
        ],
    )?;

    Ok(())
}

/// IDでサブスクリプションを取得する
///
/// # 戻り値
/// サブスクリプション（存在しない場合はNone）、または失敗時はエラー
pub fn find_by_id(conn: &Connection, id: Uuid) -> AppResult<Option<Subscription>> {
    let query = format!("{SELECT_COLUMNS} WHERE id = ?1");

    let subscription = conn
        .query_row(&query, params![id.to_string()], map_row)
        .optional()?;

    Ok(subscription)
}

/// サブスクリプション一覧を取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `filter` - ユーザーID・サービス名の絞り込み
/// * `period` - 集計期間（指定時は粗い重なり条件で絞り込む）
///
/// # 戻り値
/// 開始日の新しい順のサブスクリプション、または失敗時はエラー
pub fn find_all(
    conn: &Connection,
    filter: &SubscriptionFilter,
    period: Option<&QueryPeriod>,
) -> AppResult<Vec<Subscription>> {
    let mut query = format!("{SELECT_COLUMNS} WHERE 1 = 1");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    // ユーザーフィルター
    if let Some(user_id) = filter.user_id {
        query.push_str(" AND user_id = ?");
        params.push(Box::new(user_id.to_string()));
    }

    // サービス名フィルター（完全一致）
    if let Some(service_name) = &filter.service_name {
        query.push_str(" AND service_name = ?");
        params.push(Box::new(service_name.clone()));
    }

    // 期間フィルター（ISO形式の日付文字列は辞書順が日付順と一致する）
    if let Some(period) = period {
        query.push_str(" AND start_date <= ? AND (end_date IS NULL OR end_date >= ?)");
        params.push(Box::new(period.end));
        params.push(Box::new(period.start));
    }

    query.push_str(" ORDER BY start_date DESC, service_name");

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let subscriptions = stmt.query_map(param_refs.as_slice(), map_row)?;

    subscriptions
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// サブスクリプションを更新する（全フィールド置き換え）
///
/// # 戻り値
/// 成功時はOk(())、対象が存在しない場合はNotFound
pub fn update(conn: &Connection, subscription: &Subscription) -> AppResult<()> {
    // JSTで現在時刻を取得
    let now = Utc::now().with_timezone(&Tokyo).to_rfc3339();

    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET service_name = ?1, monthly_cost = ?2, user_id = ?3, start_date = ?4, end_date = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            subscription.service_name,
            subscription.monthly_cost,
            subscription.user_id.to_string(),
            subscription.start_date,
            subscription.end_date,
            now,
            subscription.id.to_string()
        ],
    )?;

    if rows_affected == 0 {
        return Err(not_found(subscription.id));
    }

    Ok(())
}

/// サブスクリプションを削除する
///
/// # 戻り値
/// 成功時はOk(())、対象が存在しない場合はNotFound
pub fn delete(conn: &Connection, id: Uuid) -> AppResult<()> {
    let rows_affected = conn.execute(
        "DELETE FROM subscriptions WHERE id = ?1",
        params![id.to_string()],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    Ok(())
}

/// 未発見エラー
fn not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("ID {id} のサブスクリプション"))
}

/// 行をサブスクリプションに変換する
fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: uuid_column(row, 0)?,
        service_name: row.get(1)?,
        monthly_cost: row.get(2)?,
        user_id: uuid_column(row, 3)?,
        start_date: row.get::<_, NaiveDate>(4)?,
        end_date: row.get::<_, Option<NaiveDate>>(5)?,
    })
}

/// TEXTカラムのUUIDを読み込む
fn uuid_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::cost::may_overlap;
    use crate::shared::database::create_tables;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn subscription(
        user_id: Uuid,
        service_name: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            service_name: service_name.to_string(),
            monthly_cost: 100,
            user_id,
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn test_subscription_crud_operations() {
        let conn = create_test_db();
        let user_id = Uuid::new_v4();

        // 作成のテスト
        let mut sub = subscription(user_id, "Netflix", date(2023, 1, 1), None);
        create(&conn, &sub).unwrap();

        // 取得のテスト
        let found = find_by_id(&conn, sub.id).unwrap().unwrap();
        assert_eq!(found, sub);

        // 更新のテスト（全フィールド置き換え）
        sub.service_name = "Netflix Premium".to_string();
        sub.monthly_cost = 1980;
        sub.end_date = Some(date(2023, 12, 31));
        update(&conn, &sub).unwrap();

        let updated = find_by_id(&conn, sub.id).unwrap().unwrap();
        assert_eq!(updated, sub);

        // 削除のテスト
        delete(&conn, sub.id).unwrap();
        assert!(find_by_id(&conn, sub.id).unwrap().is_none());
    }

    #[test]
    fn test_missing_rows() {
        let conn = create_test_db();
        let missing = subscription(Uuid::new_v4(), "Ghost", date(2023, 1, 1), None);

        // 取得は「見つからない」を正常な結果として返す
        assert!(find_by_id(&conn, missing.id).unwrap().is_none());

        // 更新・削除はNotFound
        assert!(matches!(update(&conn, &missing), Err(AppError::NotFound(_))));
        assert!(matches!(delete(&conn, missing.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_find_all_orders_by_start_date_desc() {
        let conn = create_test_db();
        let user_id = Uuid::new_v4();

        for (name, month) in [("A", 1), ("B", 6), ("C", 3)] {
            create(&conn, &subscription(user_id, name, date(2023, month, 1), None)).unwrap();
        }

        let names: Vec<String> = find_all(&conn, &SubscriptionFilter::default(), None)
            .unwrap()
            .into_iter()
            .map(|s| s.service_name)
            .collect();
        assert_eq!(names, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_find_all_filters_by_user_and_service() {
        let conn = create_test_db();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        create(&conn, &subscription(alice, "Netflix", date(2023, 1, 1), None)).unwrap();
        create(&conn, &subscription(alice, "Spotify", date(2023, 1, 1), None)).unwrap();
        create(&conn, &subscription(bob, "Netflix", date(2023, 1, 1), None)).unwrap();

        let by_user = SubscriptionFilter {
            user_id: Some(alice),
            service_name: None,
        };
        assert_eq!(find_all(&conn, &by_user, None).unwrap().len(), 2);

        let by_service = SubscriptionFilter {
            user_id: None,
            service_name: Some("Netflix".to_string()),
        };
        assert_eq!(find_all(&conn, &by_service, None).unwrap().len(), 2);

        let both = SubscriptionFilter {
            user_id: Some(alice),
            service_name: Some("Netflix".to_string()),
        };
        let result = find_all(&conn, &both, None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].user_id, alice);
        assert_eq!(result[0].service_name, "Netflix");
    }

    #[test]
    fn test_period_filter_matches_coarse_predicate() {
        let conn = create_test_db();
        let user_id = Uuid::new_v4();
        let period = QueryPeriod::parse("01/2023", "12/2023").unwrap();

        let candidates = vec![
            subscription(user_id, "before", date(2022, 1, 1), Some(date(2022, 12, 31))),
            subscription(user_id, "edge-start", date(2022, 1, 1), Some(date(2023, 1, 31))),
            subscription(user_id, "inside", date(2023, 4, 1), Some(date(2023, 6, 30))),
            subscription(user_id, "edge-end", date(2023, 12, 1), None),
            subscription(user_id, "after", date(2024, 1, 1), None),
            subscription(user_id, "open-old", date(2019, 5, 1), None),
        ];
        for sub in &candidates {
            create(&conn, sub).unwrap();
        }

        let mut found: Vec<String> = find_all(&conn, &SubscriptionFilter::default(), Some(&period))
            .unwrap()
            .into_iter()
            .map(|s| s.service_name)
            .collect();
        found.sort();

        let mut expected: Vec<String> = candidates
            .iter()
            .filter(|s| may_overlap(s, period.start, period.end))
            .map(|s| s.service_name.clone())
            .collect();
        expected.sort();

        assert_eq!(found, expected);
        assert_eq!(found, vec!["edge-end", "edge-start", "inside", "open-old"]);
    }

    #[test]
    fn test_store_trait_delegates_to_connection() {
        let store = SqliteSubscriptionStore::new(create_test_db());
        let sub = subscription(Uuid::new_v4(), "YouTube", date(2024, 2, 1), None);

        store.create(&sub).unwrap();
        assert_eq!(store.get_by_id(sub.id).unwrap(), Some(sub.clone()));
        assert_eq!(store.list_all().unwrap().len(), 1);

        store.delete(sub.id).unwrap();
        assert!(store.list_all().unwrap().is_empty());
    }
}
