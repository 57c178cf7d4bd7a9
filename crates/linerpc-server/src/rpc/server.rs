use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::connection::{Connection, ConnectionError, Incoming};
use crate::handler::CallContext;
use crate::registry::MethodRegistry;
use linerpc_core::config::ServerConfig;
use linerpc_core::{JsonRpcError, Request, Response};

#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Invalid config: {0}")]
    Config(#[from] linerpc_core::Error),
}

pub type Result<T> = std::result::Result<T, RpcServerError>;

/// A JSON-RPC server instance. Owns its registry and config; nothing is process-wide,
/// so several servers can run side by side.
pub struct RpcServer {
    config: ServerConfig,
    registry: Arc<MethodRegistry>,
    shutdown: CancellationToken,
}

impl RpcServer {
    pub fn new(registry: MethodRegistry, config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting connections. Connections already open finish the request they are
    /// working on and are then closed.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind the configured address and serve until [`RpcServer::shutdown`] is called.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until [`RpcServer::shutdown`] is called.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            "RPC server listening on {} ({} methods)",
            local_addr,
            self.registry.len()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("RPC server on {} shutting down", local_addr);
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer).await {
                                    tracing::error!("Connection error ({}): {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> std::result::Result<(), ConnectionError> {
        tracing::debug!("New client connected: {}", peer);
        let mut connection = Connection::new(stream, peer, self.config.max_message_size);

        loop {
            let incoming = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                incoming = connection.read_request() => incoming,
            };

            match incoming {
                Ok(Incoming::Request(request)) => {
                    tracing::info!("handler: received request: {}", request.method);
                    let response = self.handle_request(request, peer).await;
                    connection.write_response(&response).await?;
                }
                Ok(Incoming::Invalid { error, id }) => {
                    tracing::warn!("Rejected request from {}: {}", peer, error);
                    connection
                        .write_response(&Response::error(error, id))
                        .await?;
                }
                Err(ConnectionError::TooLarge { limit }) => {
                    tracing::warn!("Request from {} exceeds {} bytes; closing", peer, limit);
                    let error = JsonRpcError::invalid_request(format!(
                        "Request exceeds maximum size of {} bytes",
                        limit
                    ));
                    connection
                        .write_response(&Response::error(error, Default::default()))
                        .await?;
                    break;
                }
                Err(ConnectionError::Closed) => {
                    tracing::debug!("Client disconnected: {}", peer);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn handle_request(&self, request: Request, peer: SocketAddr) -> Response {
        let id = request.id.clone();
        if let Err(error) = request.validate() {
            return Response::error(error, id);
        }

        let Some(registration) = self.registry.lookup(&request.method) else {
            tracing::warn!("Unknown method '{}' requested by {}", request.method, peer);
            return Response::error(JsonRpcError::method_not_found(&request.method), id);
        };

        let handler = registration.handler().clone();
        let ctx = CallContext::new(
            request.method.clone(),
            id.clone(),
            Some(peer),
            registration.context().cloned(),
        );
        let params = request.params;

        // Handlers are synchronous; keep them off the reactor threads.
        match tokio::task::spawn_blocking(move || handler.call(&ctx, params)).await {
            Ok(Ok(result)) => Response::success(result, id),
            Ok(Err(error)) => {
                tracing::debug!("Method '{}' failed: {}", request.method, error);
                Response::error(error.into_rpc_error(), id)
            }
            Err(e) => {
                tracing::error!("Method '{}' panicked: {}", request.method, e);
                Response::error(
                    JsonRpcError::internal_error(format!(
                        "Internal error in method '{}'",
                        request.method
                    )),
                    id,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use crate::methods::register_builtin;
    use linerpc_core::{codec, ErrorObject, Outcome};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    async fn spawn_server(registry: MethodRegistry) -> (Arc<RpcServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(RpcServer::new(registry, ServerConfig::default()));

        let running = server.clone();
        tokio::spawn(async move {
            running.serve(listener).await.unwrap();
        });
        (server, addr)
    }

    /// Send raw bytes on a fresh connection and read one reply line.
    async fn exchange(addr: SocketAddr, payload: &[u8]) -> Response {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(payload).await.unwrap();

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        timeout(TEST_TIMEOUT, reader.read_line(&mut line))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        codec::decode_response(line.trim().as_bytes()).unwrap()
    }

    fn builtin() -> MethodRegistry {
        let mut registry = MethodRegistry::new();
        register_builtin(&mut registry);
        registry
    }

    #[tokio::test]
    async fn test_dispatch_add() {
        let (_server, addr) = spawn_server(builtin()).await;

        let response = exchange(
            addr,
            b"{\"method\": \"add\", \"params\": [2, 3], \"id\": \"2\"}\n",
        )
        .await;
        assert_eq!(response.id, "2".into());
        assert_eq!(response.into_outcome(), Outcome::Result(json!(5)));
    }

    #[tokio::test]
    async fn test_unterminated_request_is_answered() {
        let (_server, addr) = spawn_server(builtin()).await;

        let response = exchange(
            addr,
            b"{\"method\": \"sayHello\",\"params\":{\"name\": \"World\"}, \"id\": \"2\" }",
        )
        .await;
        assert_eq!(response.into_outcome(), Outcome::Result(json!("Hello, World")));
    }

    #[tokio::test]
    async fn test_pretty_printed_request_is_answered() {
        let (_server, addr) = spawn_server(builtin()).await;

        let response = exchange(
            addr,
            b"{\n  \"method\": \"add\",\n  \"params\": [2, 3],\n  \"id\": \"1\"\n}\n",
        )
        .await;
        assert_eq!(response.id, "1".into());
        assert_eq!(response.into_outcome(), Outcome::Result(json!(5)));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_server, addr) = spawn_server(builtin()).await;

        let response = exchange(
            addr,
            b"{\"method\": \"nope\", \"params\": [], \"id\": \"3\"}\n",
        )
        .await;
        match response.into_outcome() {
            Outcome::Error(error) => assert_eq!(error.code(), Some(JsonRpcError::METHOD_NOT_FOUND)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_error_becomes_response() {
        let (_server, addr) = spawn_server(builtin()).await;

        let response = exchange(
            addr,
            b"{\"method\": \"sayHello\", \"params\": {}, \"id\": \"4\"}\n",
        )
        .await;
        match response.into_outcome() {
            Outcome::Error(ErrorObject::Structured(error)) => {
                assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
                assert!(error.message.contains("name"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_server() {
        let mut registry = builtin();
        registry.register(
            "explode",
            |_ctx: &CallContext, _params: Value| -> std::result::Result<Value, HandlerError> {
                panic!("handler blew up")
            },
        );
        let (_server, addr) = spawn_server(registry).await;

        let response = exchange(addr, b"{\"method\": \"explode\", \"id\": \"5\"}\n").await;
        match response.into_outcome() {
            Outcome::Error(error) => assert_eq!(error.code(), Some(JsonRpcError::INTERNAL_ERROR)),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let response = exchange(
            addr,
            b"{\"method\": \"add\", \"params\": [1, 1], \"id\": \"6\"}\n",
        )
        .await;
        assert_eq!(response.into_outcome(), Outcome::Result(json!(2)));
    }

    #[tokio::test]
    async fn test_sequential_requests_on_one_connection() {
        let (_server, addr) = spawn_server(builtin()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        for (i, (a, b)) in [(1, 2), (10, -4), (0, 0)].into_iter().enumerate() {
            let request = codec::encode_request("add", &json!([a, b]), &(i as i64).into()).unwrap();
            write_half.write_all(&request).await.unwrap();
            write_half.write_all(b"\n").await.unwrap();

            let mut line = String::new();
            timeout(TEST_TIMEOUT, reader.read_line(&mut line))
                .await
                .unwrap()
                .unwrap();
            let response = codec::decode_response(line.trim().as_bytes()).unwrap();
            assert_eq!(response.id, (i as i64).into());
            assert_eq!(response.into_outcome(), Outcome::Result(json!(a + b)));
        }
    }

    #[tokio::test]
    async fn test_parse_error_keeps_connection_open() {
        let (_server, addr) = spawn_server(builtin()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(b"not json at all\n{\"method\": \"add\", \"params\": [4, 5], \"id\": \"7\"}\n")
            .await
            .unwrap();

        let mut first = String::new();
        reader.read_line(&mut first).await.unwrap();
        let first = codec::decode_response(first.trim().as_bytes()).unwrap();
        match first.into_outcome() {
            Outcome::Error(error) => assert_eq!(error.code(), Some(JsonRpcError::PARSE_ERROR)),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let mut second = String::new();
        reader.read_line(&mut second).await.unwrap();
        let second = codec::decode_response(second.trim().as_bytes()).unwrap();
        assert_eq!(second.into_outcome(), Outcome::Result(json!(9)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(RpcServer::new(builtin(), ServerConfig::default()));

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });

        server.shutdown();
        let result = timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
