use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::analytics::evaluation_sink::{EvaluationSink, PostgresSink, TraceSink};
use crate::audit::audit_store::PostgresAuditStore;
use crate::config::Config;
use crate::database::get_pool;
use crate::flags::flag_store::PostgresFlagStore;
use crate::router;
use crate::time::SystemTime;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let writer_pool = match get_pool(&config.write_database_url, config.max_pg_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("failed to create writer database pool: {}", e);
            return;
        }
    };
    let reader_pool = match get_pool(&config.read_database_url, config.max_pg_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("failed to create reader database pool: {}", e);
            return;
        }
    };

    let flag_store = Arc::new(PostgresFlagStore::new(
        reader_pool.clone(),
        writer_pool.clone(),
    ));
    let audit_store = Arc::new(PostgresAuditStore::new(reader_pool));
    let sink: Arc<dyn EvaluationSink + Send + Sync> = if config.evaluation_log_enabled {
        Arc::new(PostgresSink::new(writer_pool))
    } else {
        Arc::new(TraceSink {})
    };

    let app = router::router(flag_store, audit_store, sink, Arc::new(SystemTime {}));

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
