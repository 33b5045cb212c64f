use axum::Router;
use std::io;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serve `app` until `shutdown` is cancelled.
///
/// Cancellation closes the listener at once. Connections already in flight
/// get up to `grace` to finish; whatever is left after that is dropped.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> io::Result<()> {
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut task => return flatten(result),
        _ = shutdown.cancelled() => {}
    }

    match tokio::time::timeout(grace, &mut task).await {
        Ok(result) => flatten(result),
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed, dropping in-flight connections"
            );
            task.abort();
            Ok(())
        }
    }
}

fn flatten(result: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => return,
    }

    tracing::info!("shutdown signal received, closing listener");
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn fetch_root(addr: std::net::SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn cancellation_stops_listener_and_returns_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", get(|| async { "up" }));
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(serve(
            listener,
            app,
            shutdown.clone(),
            Duration::from_secs(2),
        ));

        let reply = fetch_root(addr).await;
        assert!(reply.starts_with("HTTP/1.1 200"), "got {reply:?}");

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn stuck_request_is_abandoned_after_grace() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            app,
            shutdown.clone(),
            Duration::from_millis(100),
        ));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("grace period not enforced")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn signal_listener_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn(shutdown_signal(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_cancels_the_token() {
        use tokio::signal::unix::{signal, SignalKind};

        // Installing a handler first keeps SIGTERM from killing the test binary.
        let _guard = signal(SignalKind::terminate()).unwrap();

        let token = CancellationToken::new();
        let waiter = tokio::spawn(shutdown_signal(token.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -TERM {}", std::process::id()))
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("SIGTERM did not cancel the token");
        waiter.await.unwrap();
    }
}
