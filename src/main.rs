//! Pageview cache advisor: HTTP service entrypoint.
//! Boots the Axum router with the prediction pipeline wired from `config/app.toml`.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    pageview_cache_advisor::telemetry::init_tracing();

    let router = pageview_cache_advisor::app()
        .await
        .map_err(shuttle_runtime::Error::Custom)?;

    Ok(router.into())
}
