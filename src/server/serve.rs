// Server loop module
// Accepts connections until shutdown, then drains active ones

use hyper_util::server::graceful::GracefulShutdown;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Run the accept loop until `shutdown` is notified.
///
/// After shutdown the listener is closed, every connection is told to finish
/// its current request and close, and the drain is bounded by
/// `performance.shutdown_timeout`.
#[allow(clippy::ignored_unit_patterns)]
pub async fn run(listener: TcpListener, state: Arc<AppState>, shutdown: Arc<Notify>) {
    let active_connections = Arc::new(AtomicUsize::new(0));
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections, &graceful);
                    }
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            _ = shutdown.notified() => break,
        }
    }

    drop(listener);
    logger::log_shutdown(active_connections.load(Ordering::SeqCst));

    let grace = Duration::from_secs(state.config.performance.shutdown_timeout);
    if tokio::time::timeout(grace, graceful.shutdown()).await.is_ok() {
        logger::log_info("[Shutdown] All connections closed");
    } else {
        logger::log_warning(&format!(
            "[Shutdown] {} connection(s) still open after {}s, exiting",
            active_connections.load(Ordering::SeqCst),
            grace.as_secs()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::client::conn::http1::{handshake, SendRequest};
    use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, ORIGIN, SERVER};
    use hyper::{Method, Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpStream;

    async fn client(addr: SocketAddr) -> SendRequest<Full<Bytes>> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (sender, conn) = handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);
        sender
    }

    async fn start(max_body_size: u64) -> (SocketAddr, Arc<Notify>, tokio::task::JoinHandle<()>) {
        let mut config = Config::load_from("does-not-exist").unwrap();
        config.performance.shutdown_timeout = 30;
        config.http.max_body_size = max_body_size;
        let state = Arc::new(AppState::new(config).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let server = tokio::spawn(run(listener, state, Arc::clone(&shutdown)));
        (addr, shutdown, server)
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_with_cors() {
        let (addr, shutdown, server) = start(16).await;
        let mut sender = client(addr).await;

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/blogs")
            .header(ORIGIN, "http://localhost:3000")
            .header(CONTENT_LENGTH, "17")
            .body(Full::new(Bytes::from(vec![b'x'; 17])))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(resp.headers()[SERVER], "blog-gateway");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(br#"{"error":"Request body too large"}"#));

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_keep_alive_connections() {
        let (addr, shutdown, server) = start(1024).await;
        let mut sender = client(addr).await;

        let req = Request::builder()
            .uri("/healthz")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.into_body().collect().await.unwrap();

        // the connection is idle but still open; shutdown must not wait
        // out the 30s grace period for it
        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert!(sender.is_closed() || sender.ready().await.is_err());
    }
}
