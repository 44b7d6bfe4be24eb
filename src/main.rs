use std::sync::Arc;

use exam_session_server::api::{routes, AppState};
use exam_session_server::config::Config;
use exam_session_server::sandbox::StubSandbox;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exam_session_server=info,warp=info".into()),
        )
        .init();

    let config = Config::from_env();
    let state = AppState::new(
        Arc::new(StubSandbox),
        config.meetings.default_duration_minutes,
    );

    let addr = config.bind_address();
    tracing::info!(host = %config.server.host, port = config.server.port, "Starting exam session coordinator");

    warp::serve(routes::api(state)).run(addr).await;
}
