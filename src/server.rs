//! HTTPサーバー
//!
//! 接続ごとにタスクを起動し、停止トークンがキャンセルされると新規受付を止める。
//! 処理中の接続には graceful shutdown を通知し、すべての接続タスクの終了を待ってから戻る。
//! 各リクエストには停止トークンの子トークンを渡す。

use crate::features::subscriptions::handlers::handle_request;
use crate::features::subscriptions::repository::SubscriptionStore;
use crate::features::subscriptions::service::SubscriptionService;
use crate::shared::errors::AppResult;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// 接続受付エラー後の待機時間
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// サブスクリプションAPIサーバー
pub struct HttpServer<S: SubscriptionStore + 'static> {
    listener: TcpListener,
    service: Arc<SubscriptionService<S>>,
    shutdown: CancellationToken,
}

impl<S: SubscriptionStore + 'static> HttpServer<S> {
    /// 指定アドレスで待ち受けを開始する
    ///
    /// # 引数
    /// * `addr` - "host:port" 形式のアドレス（ポート0で自動割り当て）
    /// * `service` - リクエストを処理するサービス
    pub async fn bind(addr: &str, service: Arc<SubscriptionService<S>>) -> AppResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("HTTPサーバーを開始しました: http://{}", listener.local_addr()?);

        Ok(Self {
            listener,
            service,
            shutdown: CancellationToken::new(),
        })
    }

    /// 実際に待ち受けているアドレス
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// サーバー停止用のトークン
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 停止トークンがキャンセルされるまで接続を受け付ける
    ///
    /// 停止後は処理中の接続がレスポンスを返し終えるまで待つ。
    pub async fn serve(self) -> AppResult<()> {
        let Self {
            listener,
            service,
            shutdown,
        } = self;
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("停止要求を受信しました。新規接続の受付を終了します");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        log::debug!("接続を受け付けました: {peer}");
                        let service = Arc::clone(&service);
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, service, shutdown).await {
                                log::error!("接続処理エラー ({peer}): {e}");
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("接続受け入れエラー: {e}");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                }
            }
        }

        connections.close();
        if !connections.is_empty() {
            log::info!("処理中の接続の終了を待機しています: {}件", connections.len());
        }
        connections.wait().await;
        log::info!("すべての接続が終了しました");

        Ok(())
    }
}

/// TCP接続を処理する
async fn handle_connection<S: SubscriptionStore + 'static>(
    stream: TcpStream,
    service: Arc<SubscriptionService<S>>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let request_shutdown = shutdown.clone();
    let handler = service_fn(move |req| {
        let service = Arc::clone(&service);
        let cancel = request_shutdown.child_token();
        async move { Ok::<_, Infallible>(handle_request(req, service, cancel).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, handler);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::repository::SqliteSubscriptionStore;
    use crate::shared::database::create_tables;
    use crate::features::subscriptions::models::{Subscription, SubscriptionFilter};
    use crate::features::subscriptions::period::QueryPeriod;
    use http_body_util::{BodyExt, Empty, Full};
    use hyper::body::Bytes;
    use hyper::{Method, Request, StatusCode};
    use rusqlite::Connection;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn create_service() -> Arc<SubscriptionService<SqliteSubscriptionStore>> {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        Arc::new(SubscriptionService::new(
            SqliteSubscriptionStore::new(conn),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_serves_requests_until_shutdown() {
        let server = HttpServer::bind("127.0.0.1:0", create_service())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_token();
        let serve_task = tokio::spawn(server.serve());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let req = Request::builder()
            .uri("/sub")
            .header("host", addr.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"[]");

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), serve_task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_invalid_address_fails() {
        let result = HttpServer::bind("not-an-address", create_service()).await;
        assert!(result.is_err());
    }

    /// 作成に時間がかかり、完了数を記録するストア
    struct SlowCreateStore {
        inner: SqliteSubscriptionStore,
        completed: Arc<AtomicUsize>,
    }

    impl SubscriptionStore for SlowCreateStore {
        fn create(&self, subscription: &Subscription) -> AppResult<()> {
            std::thread::sleep(Duration::from_millis(300));
            self.inner.create(subscription)?;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
            self.inner.get_by_id(id)
        }
        fn update(&self, subscription: &Subscription) -> AppResult<()> {
            self.inner.update(subscription)
        }
        fn delete(&self, id: Uuid) -> AppResult<()> {
            self.inner.delete(id)
        }
        fn list_all(&self) -> AppResult<Vec<Subscription>> {
            self.inner.list_all()
        }
        fn list_filtered(
            &self,
            filter: &SubscriptionFilter,
            period: Option<&QueryPeriod>,
        ) -> AppResult<Vec<Subscription>> {
            self.inner.list_filtered(filter, period)
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_request() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let completed = Arc::new(AtomicUsize::new(0));
        let service = Arc::new(SubscriptionService::new(
            SlowCreateStore {
                inner: SqliteSubscriptionStore::new(conn),
                completed: Arc::clone(&completed),
            },
            Duration::from_secs(5),
        ));

        let server = HttpServer::bind("127.0.0.1:0", service).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_token();
        let serve_task = tokio::spawn(server.serve());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let body = json!({
            "service_name": "Netflix",
            "monthly_cost": 100,
            "user_id": Uuid::new_v4().to_string(),
            "start_date": "01/2023",
        });
        let req = Request::builder()
            .method(Method::POST)
            .uri("/sub")
            .header("host", addr.to_string())
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let response_task = tokio::spawn(async move { sender.send_request(req).await });

        // 作成処理の途中で停止する
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), serve_task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(completed.load(Ordering::SeqCst), 1);

        let response = response_task.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
