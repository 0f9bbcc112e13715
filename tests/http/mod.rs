use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::hyper::body::to_bytes;
use warp::hyper::{Body, Client, Method, Request, Response};

use tablegate::config::schema::HttpFrontend;
use tablegate::context::test_utils::in_memory_context;
use tablegate::frontend::http::run_server;

mod query;
mod records;

pub struct TestServer {
    pub port: u16,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let port = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = HttpFrontend {
            bind_host: "127.0.0.1".to_string(),
            bind_port: port,
            ..Default::default()
        };

        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(run_server(
            Arc::new(in_memory_context()),
            config,
            async move {
                let _ = signal.await;
            },
        ));

        for _ in 0..100 {
            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            port,
            shutdown,
            handle,
        }
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<JsonValue>) -> Response<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(format!("http://127.0.0.1:{}{path}", self.port));

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        Client::new().request(request).await.unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap();
    }
}

pub async fn response_json(response: Response<Body>) -> JsonValue {
    let body_bytes = to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}
