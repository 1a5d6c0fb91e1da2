/// 機能別モジュール
///
/// 各機能モジュールは、その機能に関連するすべてのコード（モデル、データベース操作、サービス、HTTPハンドラー）
/// を含む自己完結型のユニットです。
pub mod subscriptions;
