use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port: u16 = std::env::var("AUTHGATE_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7878);
    let db_url = std::env::var("AUTHGATE_DB_URL")
        .unwrap_or_else(|_| "sqlite://authgate.db?mode=rwc".to_string());
    let admin_password =
        std::env::var("AUTHGATE_ADMIN_PASSWORD").unwrap_or_else(|_| "authgate".to_string());
    info!(
        target: "authgate",
        "authgate starting: RUST_LOG='{}', http_port={}, db_url='{}'",
        rust_log, http_port, db_url
    );

    authgate::server::run_with(http_port, &db_url, &admin_password).await
}
