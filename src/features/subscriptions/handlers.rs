//! サブスクリプションAPIのHTTPハンドラー
//!
//! | メソッド | パス | 処理 |
//! |---|---|---|
//! | POST | /sub | 作成 |
//! | PUT | /sub | 更新（ボディにid） |
//! | GET | /sub | 全件取得 |
//! | GET | /sub/{id} | 1件取得 |
//! | DELETE | /sub/{id} | 削除 |
//! | GET | /sub/filter | user_id・service_nameで絞り込み |
//! | GET | /sub/total-cost | 期間内の合計コスト |

use super::models::{parse_uuid, Subscription, SubscriptionFilter, SubscriptionRequest};
use super::period::parse_month;
use super::repository::SubscriptionStore;
use super::service::SubscriptionService;
use crate::shared::errors::{AppError, AppResult, ErrorSeverity};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// リクエストボディの上限（バイト）
const MAX_BODY_BYTES: usize = 64 * 1024;

/// レスポンスボディ型
pub type ResponseBody = Full<Bytes>;

/// HTTPリクエストを処理する
///
/// エラーは `{"error": "..."}` 形式のJSONに変換し、常にレスポンスを返す。
pub async fn handle_request<S, B>(
    req: Request<B>,
    service: Arc<SubscriptionService<S>>,
    cancel: CancellationToken,
) -> Response<ResponseBody>
where
    S: SubscriptionStore + 'static,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    log::debug!("リクエストを受信: {method} {path}");

    match route(req, &service, &cancel).await {
        Ok(response) => {
            log::debug!("レスポンス: {method} {path} -> {}", response.status());
            response
        }
        Err(error) => {
            match error.severity() {
                ErrorSeverity::High => {
                    log::error!("リクエスト処理エラー: {method} {path}: {}", error.details())
                }
                ErrorSeverity::Medium => {
                    log::warn!("リクエスト処理エラー: {method} {path}: {}", error.details())
                }
                ErrorSeverity::Low => {
                    log::info!("リクエストを拒否しました: {method} {path}: {}", error.details())
                }
            }
            json_response(error.status_code(), &json!({ "error": error.user_message() }))
        }
    }
}

/// パスとメソッドから処理を振り分ける
async fn route<S, B>(
    req: Request<B>,
    service: &SubscriptionService<S>,
    cancel: &CancellationToken,
) -> AppResult<Response<ResponseBody>>
where
    S: SubscriptionStore + 'static,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().trim_matches('/').to_string();
    let query = parse_query(req.uri().query().unwrap_or(""));
    let segments: Vec<&str> = path.split('/').collect();

    match (&method, segments.as_slice()) {
        (&Method::POST, ["sub"]) => {
            let request = read_json(req).await?;
            create_subscription(service, request, cancel).await
        }
        (&Method::PUT, ["sub"]) => {
            let request = read_json(req).await?;
            update_subscription(service, request, cancel).await
        }
        (&Method::GET, ["sub"]) => list_subscriptions(service, SubscriptionFilter::default(), cancel).await,
        (&Method::GET, ["sub", "filter"]) => {
            let filter = filter_from_query(&query)?;
            list_subscriptions(service, filter, cancel).await
        }
        (&Method::GET, ["sub", "total-cost"]) => total_cost(service, &query, cancel).await,
        (_, ["sub", "filter"]) | (_, ["sub", "total-cost"]) => Ok(method_not_allowed("GET")),
        (&Method::GET, ["sub", id]) => get_subscription(service, id, cancel).await,
        (&Method::DELETE, ["sub", id]) => delete_subscription(service, id, cancel).await,
        (_, ["sub"]) => Ok(method_not_allowed("GET, POST, PUT")),
        (_, ["sub", _]) => Ok(method_not_allowed("GET, DELETE")),
        _ => {
            log::debug!("未対応のリクエスト: {method} /{path}");
            Ok(json_response(
                StatusCode::NOT_FOUND,
                &json!({ "error": "Not Found" }),
            ))
        }
    }
}

/// POST /sub
async fn create_subscription<S: SubscriptionStore + 'static>(
    service: &SubscriptionService<S>,
    request: SubscriptionRequest,
    cancel: &CancellationToken,
) -> AppResult<Response<ResponseBody>> {
    let id = service.create_subscription(request, cancel).await?;

    Ok(json_response(
        StatusCode::CREATED,
        &json!({ "message": "subscription created", "id": id }),
    ))
}

/// PUT /sub
async fn update_subscription<S: SubscriptionStore + 'static>(
    service: &SubscriptionService<S>,
    request: SubscriptionRequest,
    cancel: &CancellationToken,
) -> AppResult<Response<ResponseBody>> {
    service.update_subscription(request, cancel).await?;

    Ok(json_response(
        StatusCode::OK,
        &json!({ "message": "subscription updated" }),
    ))
}

/// DELETE /sub/{id}
async fn delete_subscription<S: SubscriptionStore + 'static>(
    service: &SubscriptionService<S>,
    raw_id: &str,
    cancel: &CancellationToken,
) -> AppResult<Response<ResponseBody>> {
    let id = parse_uuid(raw_id, "id")?;
    service.delete_subscription(id, cancel).await?;

    Ok(build_response(StatusCode::NO_CONTENT, None, Bytes::new()))
}

/// GET /sub/{id}
async fn get_subscription<S: SubscriptionStore + 'static>(
    service: &SubscriptionService<S>,
    raw_id: &str,
    cancel: &CancellationToken,
) -> AppResult<Response<ResponseBody>> {
    let id = parse_uuid(raw_id, "id")?;
    let subscription = service.get_subscription(id, cancel).await?;

    Ok(json_response(StatusCode::OK, &subscription))
}

/// GET /sub, GET /sub/filter
async fn list_subscriptions<S: SubscriptionStore + 'static>(
    service: &SubscriptionService<S>,
    filter: SubscriptionFilter,
    cancel: &CancellationToken,
) -> AppResult<Response<ResponseBody>> {
    let subscriptions: Vec<Subscription> = service.list_subscriptions(filter, cancel).await?;

    Ok(json_response(StatusCode::OK, &subscriptions))
}

/// GET /sub/total-cost
async fn total_cost<S: SubscriptionStore + 'static>(
    service: &SubscriptionService<S>,
    query: &HashMap<String, String>,
    cancel: &CancellationToken,
) -> AppResult<Response<ResponseBody>> {
    let start_raw = query_value(query, "start_period");
    let end_raw = query_value(query, "end_period");

    let (Some(start_raw), Some(end_raw)) = (start_raw, end_raw) else {
        return Err(AppError::validation("start_periodとend_periodは必須です"));
    };

    let period_start = parse_month(start_raw).map_err(|_| {
        AppError::parse("start_periodの形式が不正です。MM/YYYY形式で指定してください")
    })?;
    let period_end = parse_month(end_raw).map_err(|_| {
        AppError::parse("end_periodの形式が不正です。MM/YYYY形式で指定してください")
    })?;

    let filter = filter_from_query(query)?;
    let total = service
        .total_cost(filter, period_start, period_end, cancel)
        .await?;

    Ok(json_response(StatusCode::OK, &json!({ "total_cost": total })))
}

/// クエリ文字列をキーと値のマップに変換する（同じキーは後勝ち）
fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// 空でないクエリ値を取得する
fn query_value<'a>(query: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    query
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn filter_from_query(query: &HashMap<String, String>) -> AppResult<SubscriptionFilter> {
    SubscriptionFilter::from_query(
        query_value(query, "user_id"),
        query_value(query, "service_name"),
    )
}

/// リクエストボディをJSONとして読み込む
async fn read_json<B>(req: Request<B>) -> AppResult<SubscriptionRequest>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| AppError::parse(format!("リクエストボディを読み込めません: {e}")))?
        .to_bytes();

    let request = serde_json::from_slice(&body)?;
    Ok(request)
}

/// JSONレスポンスを作成する
fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(body) => build_response(
            status,
            Some("application/json; charset=utf-8"),
            Bytes::from(body),
        ),
        Err(e) => {
            log::error!("レスポンスのシリアライズに失敗しました: {e}");
            build_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("application/json; charset=utf-8"),
                Bytes::from_static(br#"{"error":"internal error"}"#),
            )
        }
    }
}

fn method_not_allowed(allow: &'static str) -> Response<ResponseBody> {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({ "error": "Method Not Allowed" }),
    );
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

fn build_response(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}
