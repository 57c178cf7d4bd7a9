use linerpc_client::{ProtocolError, RpcClient, RpcError};
use linerpc_core::config::ServerConfig;
use linerpc_core::JsonRpcError;
use linerpc_server::methods::register_builtin;
use linerpc_server::{parse_params, CallContext, HandlerError, MethodRegistry, RpcServer};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn start_server(registry: MethodRegistry) -> (Arc<RpcServer>, SocketAddr) {
    start_server_with_config(registry, ServerConfig::default()).await
}

async fn start_server_with_config(
    registry: MethodRegistry,
    config: ServerConfig,
) -> (Arc<RpcServer>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(RpcServer::new(registry, config));

    let running = server.clone();
    tokio::spawn(async move {
        running.serve(listener).await.unwrap();
    });
    (server, addr)
}

fn builtin() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    register_builtin(&mut registry);
    registry
}

fn client(addr: SocketAddr) -> RpcClient {
    RpcClient::new(addr.to_string()).with_read_timeout(TEST_TIMEOUT)
}

#[tokio::test]
async fn test_say_hello() {
    let (_server, addr) = start_server(builtin()).await;

    let greeting = client(addr).say_hello("World").await.unwrap();
    assert_eq!(greeting, "Hello, World");
}

#[tokio::test]
async fn test_add() {
    let (_server, addr) = start_server(builtin()).await;
    let client = client(addr);

    assert_eq!(client.add(2, 3).await.unwrap(), 5);
    assert_eq!(client.add(-1, 1).await.unwrap(), 0);
}

#[tokio::test]
async fn test_one_shot_call() {
    let (_server, addr) = start_server(builtin()).await;

    let result = linerpc_client::call(&addr.to_string(), "add", json!([40, 2]))
        .await
        .unwrap();
    assert_eq!(result, json!(42));
}

#[tokio::test]
async fn test_unknown_method_then_recover() {
    let (_server, addr) = start_server(builtin()).await;
    let client = client(addr);

    let err = client.call("nope", json!([])).await.unwrap_err();
    assert!(matches!(err, RpcError::Protocol(ProtocolError::Remote(_))));
    assert_eq!(
        err.remote_error().and_then(|e| e.code()),
        Some(JsonRpcError::METHOD_NOT_FOUND)
    );

    assert_eq!(client.add(1, 2).await.unwrap(), 3);
}

#[tokio::test]
async fn test_missing_params() {
    let (_server, addr) = start_server(builtin()).await;

    let err = client(addr).call("sayHello", Value::Null).await.unwrap_err();
    assert_eq!(
        err.remote_error().and_then(|e| e.code()),
        Some(JsonRpcError::INVALID_PARAMS)
    );
}

#[tokio::test]
async fn test_add_overflow_is_reported() {
    let (_server, addr) = start_server(builtin()).await;

    let err = client(addr).add(i64::MAX, 1).await.unwrap_err();
    let remote = err.remote_error().unwrap();
    assert_eq!(remote.code(), Some(JsonRpcError::INVALID_PARAMS));
    assert!(remote.to_string().contains("overflows"));
}

#[tokio::test]
async fn test_oversized_request_is_rejected() {
    let config = ServerConfig {
        max_message_size: 256,
        ..ServerConfig::default()
    };
    let (_server, addr) = start_server_with_config(builtin(), config).await;
    let client = client(addr);

    let err = client.say_hello(&"x".repeat(1024)).await.unwrap_err();
    assert_eq!(
        err.remote_error().and_then(|e| e.code()),
        Some(JsonRpcError::INVALID_REQUEST)
    );

    assert_eq!(client.add(1, 2).await.unwrap(), 3);
}

#[tokio::test]
async fn test_last_registration_wins() {
    let mut registry = builtin();
    registry.register("sayHello", |_ctx: &CallContext, _params: Value| {
        Ok::<_, HandlerError>(json!("second"))
    });
    let (_server, addr) = start_server(registry).await;

    let result = client(addr)
        .call("sayHello", json!({"name": "World"}))
        .await
        .unwrap();
    assert_eq!(result, json!("second"));
}

#[tokio::test]
async fn test_handler_sees_registration_context() {
    let mut registry = MethodRegistry::new();
    registry.register_with_context(
        "greet",
        |ctx: &CallContext, params: Value| -> Result<Value, HandlerError> {
            #[derive(serde::Deserialize)]
            struct Params {
                name: String,
            }
            let params: Params = parse_params(params)?;
            let greeting = ctx
                .data::<String>()
                .ok_or_else(|| HandlerError::failed("no greeting configured"))?;
            Ok(json!(format!("{}, {}", greeting, params.name)))
        },
        String::from("Howdy"),
    );
    let (_server, addr) = start_server(registry).await;

    let result = client(addr)
        .call("greet", json!({"name": "Ada"}))
        .await
        .unwrap();
    assert_eq!(result, json!("Howdy, Ada"));
}

#[tokio::test]
async fn test_independent_servers() {
    let mut first = MethodRegistry::new();
    first.register("whoami", |_ctx: &CallContext, _params: Value| {
        Ok::<_, HandlerError>(json!("first"))
    });
    let mut second = MethodRegistry::new();
    second.register("whoami", |_ctx: &CallContext, _params: Value| {
        Ok::<_, HandlerError>(json!("second"))
    });

    let (_a, first_addr) = start_server(first).await;
    let (_b, second_addr) = start_server(second).await;

    let first_result = client(first_addr).call("whoami", json!([])).await.unwrap();
    let second_result = client(second_addr).call("whoami", json!([])).await.unwrap();
    assert_eq!(first_result, json!("first"));
    assert_eq!(second_result, json!("second"));
}

#[tokio::test]
async fn test_concurrent_clients() {
    let (_server, addr) = start_server(builtin()).await;

    let calls = (0..16i64).map(|i| {
        let client = client(addr);
        tokio::spawn(async move { client.add(i, i).await })
    });

    let results = timeout(TEST_TIMEOUT, futures::future::join_all(calls))
        .await
        .unwrap();
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().unwrap(), 2 * i as i64);
    }
}

#[tokio::test]
async fn test_shutdown_refuses_new_connections() {
    let (server, addr) = start_server(builtin()).await;
    assert_eq!(client(addr).add(1, 1).await.unwrap(), 2);

    server.shutdown();
    // Give the accept loop a moment to observe the cancellation.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = client(addr)
        .with_connect_timeout(Duration::from_secs(1))
        .add(1, 1)
        .await
        .unwrap_err();
    assert!(!matches!(err, RpcError::Protocol(_)));
}
