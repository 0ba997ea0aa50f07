use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::analytics::evaluation_sink::EvaluationSink;
use crate::api::endpoint;
use crate::audit::audit_store::AuditStore;
use crate::flags::flag_admin::FlagAdminService;
use crate::flags::flag_service::FlagService;
use crate::flags::flag_store::FlagStore;
use crate::time::TimeSource;

#[derive(Clone)]
pub struct State {
    pub flags: Arc<FlagService>,
    pub admin: Arc<FlagAdminService>,
    pub audit: Arc<dyn AuditStore + Send + Sync>,
}

async fn index() -> &'static str {
    "flag-engine"
}

pub fn router(
    flag_store: Arc<dyn FlagStore + Send + Sync>,
    audit_store: Arc<dyn AuditStore + Send + Sync>,
    sink: Arc<dyn EvaluationSink + Send + Sync>,
    time: Arc<dyn TimeSource + Send + Sync>,
) -> Router {
    let state = State {
        flags: Arc::new(FlagService::new(flag_store.clone(), sink, time.clone())),
        admin: Arc::new(FlagAdminService::new(flag_store, time)),
        audit: audit_store,
    };

    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(index))
        .route("/flags/evaluate", post(endpoint::evaluate))
        .route(
            "/flags",
            post(endpoint::create_flag).get(endpoint::list_flags),
        )
        .route(
            "/flags/:key",
            get(endpoint::get_flag)
                .patch(endpoint::update_flag)
                .delete(endpoint::delete_flag),
        )
        .route("/flags/:key/audit", get(endpoint::audit_trail))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
