//! End-to-end server tests over real sockets.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use basement_config::CorsConfig;
use basement_middleware::{
    BoxFuture, BoxedMiddleware, Middleware, MiddlewareChain, MiddlewareContext, Next, Request,
    Response, ResponseExt,
};
use basement_server::{
    lifecycle, livez_handler, ListenerConfig, Router, ServeHandle, Server, ServerError,
    ServerState, ShutdownSignal, TlsPaths, LIVEZ_PATH,
};
use basement_telemetry::Observability;
use http::StatusCode;
use tokio::sync::{oneshot, Notify};

fn loopback() -> ListenerConfig {
    ListenerConfig::builder()
        .addr("127.0.0.1:0".parse().unwrap())
        .shutdown_timeout(Duration::from_secs(5))
        .build()
}

fn livez_router(observability: &Observability) -> Router {
    Router::new().route_shared(LIVEZ_PATH, livez_handler(observability))
}

fn standard_server(config: ListenerConfig) -> Server {
    let observability = Observability::disabled("basement");
    Server::builder()
        .config(config)
        .router(livez_router(&observability))
        .chain(MiddlewareChain::standard(&observability, &CorsConfig::default()))
        .build()
        .unwrap()
}

async fn start(server: Server) -> (ServeHandle, SocketAddr) {
    let handle = server.spawn();
    let addr = handle.local_addr().await.expect("listener bound");
    (handle, addr)
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[tokio::test]
async fn test_livez_over_http() {
    let (mut handle, addr) = start(standard_server(loopback())).await;

    let response = reqwest::get(format!("http://{addr}/livez")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_eq!(response.text().await.unwrap(), r#"{"status":"ok"}"#);

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (mut handle, addr) = start(standard_server(loopback())).await;

    let response = reqwest::get(format!("http://{addr}/readyz")).await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "404 page not found");

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_livez_rejects_post() {
    let (mut handle, addr) = start(standard_server(loopback())).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/livez"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "GET, HEAD");

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_cors_headers_on_livez() {
    let (mut handle, addr) = start(standard_server(loopback())).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/livez"))
        .header("origin", "https://app.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_livez_over_tls() {
    let config = ListenerConfig::builder()
        .addr("127.0.0.1:0".parse().unwrap())
        .tls(Some(TlsPaths {
            cert: fixture("localhost.crt"),
            key: fixture("localhost.key"),
        }))
        .build();
    let (mut handle, addr) = start(standard_server(config)).await;

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();
    let response = client
        .get(format!("https://localhost:{}/livez", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"status":"ok"}"#);

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_port_in_use_is_fatal() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let server = standard_server(ListenerConfig::builder().addr(addr).build());
    let state = server.state().clone();

    let result = lifecycle::run(server, std::future::pending()).await;

    match result {
        Err(ServerError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        other => panic!("expected bind error, got {other:?}"),
    }
    assert_eq!(
        state.history(),
        vec![ServerState::Starting, ServerState::Stopped]
    );
}

/// A route that parks until released, to hold a request in flight.
fn slow_router(entered: Arc<Notify>, release: Arc<Notify>) -> Router {
    Router::new().route("/slow", move |ctx: &mut MiddlewareContext, _req: Request| {
        let entered = Arc::clone(&entered);
        let release = Arc::clone(&release);
        let shutdown = ctx.get_extension::<ShutdownSignal>().cloned();
        Box::pin(async move {
            entered.notify_one();
            release.notified().await;
            match shutdown {
                Some(signal) if signal.is_shutdown() => {
                    Response::json(StatusCode::OK, r#"{"status":"ok","draining":true}"#)
                }
                Some(_) => Response::json(StatusCode::OK, r#"{"status":"ok"}"#),
                None => Response::error(StatusCode::INTERNAL_SERVER_ERROR, "no shutdown signal"),
            }
        })
    })
}

fn slow_server(config: ListenerConfig) -> (Server, Arc<Notify>, Arc<Notify>) {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let server = Server::builder()
        .config(config)
        .router(slow_router(Arc::clone(&entered), Arc::clone(&release)))
        .build()
        .unwrap();
    (server, entered, release)
}

#[tokio::test]
async fn test_interrupt_lets_in_flight_request_finish() {
    let (server, entered, release) = slow_server(loopback());
    let state = server.state().clone();
    let (handle, addr) = start(server).await;

    let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(lifecycle::supervise(handle, async {
        let _ = interrupt_rx.await;
    }));

    let in_flight = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));
    entered.notified().await;

    interrupt_tx.send(()).unwrap();
    state.reached(ServerState::ShuttingDown).await;

    // New connections are refused once the accept loop stops.
    let mut refused = false;
    for _ in 0..50 {
        let probe = tokio::time::timeout(
            Duration::from_secs(1),
            reqwest::get(format!("http://{addr}/nope")),
        )
        .await;
        if matches!(probe, Ok(Err(_))) {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refused);

    release.notify_one();
    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"status":"ok","draining":true}"#
    );

    running.await.unwrap().unwrap();
    assert_eq!(state.current(), ServerState::Stopped);
}

#[tokio::test]
async fn test_drain_bound_reports_open_connections() {
    let config = ListenerConfig::builder()
        .addr("127.0.0.1:0".parse().unwrap())
        .shutdown_timeout(Duration::from_millis(200))
        .build();
    let (server, entered, _release) = slow_server(config);
    let (handle, addr) = start(server).await;

    let stuck = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));
    entered.notified().await;

    let result = lifecycle::supervise(handle, std::future::ready(())).await;

    assert!(matches!(
        result,
        Err(ServerError::ShutdownTimeout { remaining: 1 })
    ));
    stuck.abort();
}

#[tokio::test]
async fn test_slow_handler_hits_write_timeout() {
    let config = ListenerConfig::builder()
        .addr("127.0.0.1:0".parse().unwrap())
        .write_timeout(Duration::from_millis(100))
        .build();
    let (server, _entered, _release) = slow_server(config);
    let (mut handle, addr) = start(server).await;

    let response = reqwest::get(format!("http://{addr}/slow")).await.unwrap();
    assert_eq!(response.status(), 503);

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_middleware_order_around_livez() {
    let log: Log = Arc::default();
    let observability = Observability::disabled("basement");
    let chain = MiddlewareChain::standard(&observability, &CorsConfig::default()).map_stages(
        |inner| {
            Arc::new(Recorded {
                inner,
                log: Arc::clone(&log),
            })
        },
    );
    let server = Server::builder()
        .config(loopback())
        .router(livez_router(&observability))
        .chain(chain)
        .build()
        .unwrap();
    let (mut handle, addr) = start(server).await;

    let response = reqwest::get(format!("http://{addr}/livez")).await.unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(
        *log.lock(),
        vec![
            "enter:cors",
            "enter:trace_context",
            "enter:request_log",
            "enter:metrics",
            "exit:metrics",
            "exit:request_log",
            "exit:trace_context",
            "exit:cors",
        ]
    );

    // Unknown paths bypass the chain entirely.
    log.lock().clear();
    let response = reqwest::get(format!("http://{addr}/nope")).await.unwrap();
    assert_eq!(response.status(), 404);
    assert!(log.lock().is_empty());

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
}

type Log = Arc<parking_lot::Mutex<Vec<String>>>;

struct Recorded {
    inner: BoxedMiddleware,
    log: Log,
}

impl Middleware for Recorded {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            self.log.lock().push(format!("enter:{}", self.name()));
            let response = self.inner.process(ctx, request, next).await;
            self.log.lock().push(format!("exit:{}", self.name()));
            response
        })
    }
}
