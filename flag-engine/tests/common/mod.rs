use std::net::SocketAddr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use flag_engine::router::router;
use flag_engine::test_utils::MemoryStorage;
use flag_engine::time::SystemTime;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    /// Serves the full router over an ephemeral port, backed by the given
    /// in-memory storage.
    pub async fn for_storage(storage: Arc<MemoryStorage>) -> ServerHandle {
        let app = router(
            storage.clone(),
            storage.clone(),
            storage,
            Arc::new(SystemTime {}),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { notify.notified().await })
                .await
                .unwrap()
        });
        ServerHandle { addr, shutdown }
    }

    pub async fn evaluate(&self, body: serde_json::Value) -> reqwest::Response {
        self.post("/flags/evaluate", body).await
    }

    pub async fn create_flag(&self, body: serde_json::Value) -> reqwest::Response {
        self.post("/flags", body).await
    }

    pub async fn update_flag(&self, flag_key: &str, body: serde_json::Value) -> reqwest::Response {
        CLIENT
            .patch(format!("http://{}/flags/{}", self.addr, flag_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn delete_flag(&self, flag_key: &str, body: serde_json::Value) -> reqwest::Response {
        CLIENT
            .delete(format!("http://{}/flags/{}", self.addr, flag_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        CLIENT
            .get(format!("http://{}{}", self.addr, path))
            .send()
            .await
            .expect("failed to send request")
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        CLIENT
            .post(format!("http://{}{}", self.addr, path))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
