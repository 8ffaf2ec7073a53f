//! HTTP serving with a bounded graceful drain.

use axum::Router;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Serve `app` on `listener` until `signal` resolves.
///
/// Once signalled the listener stops accepting and in-flight requests get up
/// to `drain_timeout` to finish. Requests still running after that are
/// dropped.
pub async fn serve<S>(
    listener: TcpListener,
    app: Router,
    signal: S,
    drain_timeout: Duration,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let draining = Arc::new(Notify::new());
    let notify = Arc::clone(&draining);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            tracing::info!(
                drain_timeout_secs = drain_timeout.as_secs_f64(),
                "Draining in-flight requests"
            );
            notify.notify_one();
        })
        .into_future();

    let deadline = async {
        draining.notified().await;
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        result = server => result,
        _ = deadline => {
            tracing::warn!(
                drain_timeout_secs = drain_timeout.as_secs_f64(),
                "Drain timed out, dropping remaining connections"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn bind() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_idle_server_stops_without_waiting_for_drain() {
        let app = Router::new().route("/health", get(|| async { "ok" }));

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            serve(bind().await, app, async {}, Duration::from_secs(30)),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_stuck_request_is_cut_off_after_drain_timeout() {
        let app = Router::new().route("/stuck", get(std::future::pending::<&'static str>));
        let listener = bind().await;
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let server = tokio::spawn(serve(
            listener,
            app,
            async move {
                let _ = stopped.await;
            },
            Duration::from_millis(200),
        ));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /stuck HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), server).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
