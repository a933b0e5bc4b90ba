//! DocQA HTTP 服务
//!
//! 启动: cargo run --bin docqa-web --features web
//! 监听地址由 DOCQA_ADDR 指定，默认 127.0.0.1:8000

use std::sync::Arc;

use anyhow::Context;
use docqa::{api, create_service_from_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docqa::observability::init();

    let service = create_service_from_config(None)
        .await
        .context("Failed to build QA service")?;
    let app = api::router(Arc::new(service));

    let addr = std::env::var("DOCQA_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("docqa-web listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("Server error")?;
    Ok(())
}
