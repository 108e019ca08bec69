use recipebook::{app, config::AppConfig, state::AppState, users::services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipebook=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let admin = config.admin.clone();
    let state = AppState::init(config).await?;

    if let Some(admin) = admin {
        services::ensure_superuser(state.store.as_ref(), &admin.email, &admin.password).await?;
    }

    app::serve(app::build_app(state)).await
}
