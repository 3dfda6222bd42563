use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    edu_pay::{
        AppState,
        adapters::{
            catalog::HttpCatalog, duitku::DuitkuAdapter, midtrans::MidtransAdapter, purchases,
            webhooks,
        },
        services::{purchase::GatewayRegistry, sweeper::run_expiry_sweeper},
    },
    sqlx::postgres::PgPoolOptions,
    std::{env, sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    // Outbound gateway/catalog calls share one client; the 10s timeout makes
    // an unreachable gateway a retryable error, never an implicit status.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build http client");

    let midtrans = MidtransAdapter::new(
        http.clone(),
        env::var("MIDTRANS_SERVER_KEY").expect("MIDTRANS_SERVER_KEY must be set"),
        env::var("MIDTRANS_API_BASE")
            .unwrap_or_else(|_| "https://api.sandbox.midtrans.com".to_string()),
        env::var("MIDTRANS_SNAP_BASE")
            .unwrap_or_else(|_| "https://app.sandbox.midtrans.com".to_string()),
    );
    let duitku = DuitkuAdapter::new(
        http.clone(),
        env::var("DUITKU_MERCHANT_CODE").expect("DUITKU_MERCHANT_CODE must be set"),
        env::var("DUITKU_API_KEY").expect("DUITKU_API_KEY must be set"),
        env::var("DUITKU_API_BASE").unwrap_or_else(|_| "https://sandbox.duitku.com".to_string()),
        env::var("DUITKU_CALLBACK_URL").expect("DUITKU_CALLBACK_URL must be set"),
        env::var("DUITKU_RETURN_URL").expect("DUITKU_RETURN_URL must be set"),
    );
    let catalog = HttpCatalog::new(
        http,
        env::var("CATALOG_BASE").expect("CATALOG_BASE must be set"),
    );

    let state = AppState {
        pool: pool.clone(),
        gateways: GatewayRegistry::new(Arc::new(midtrans), Arc::new(duitku)),
        catalog: Arc::new(catalog),
        return_success_url: env::var("PAY_RETURN_SUCCESS_URL")
            .expect("PAY_RETURN_SUCCESS_URL must be set")
            .into(),
        return_failure_url: env::var("PAY_RETURN_FAILURE_URL")
            .expect("PAY_RETURN_FAILURE_URL must be set")
            .into(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_expiry_sweeper(pool, shutdown_rx));

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/purchases", post(purchases::create_purchase))
        .route(
            "/purchases/{merchant_order_id}",
            get(purchases::purchase_status),
        )
        .route(
            "/purchases/{merchant_order_id}/cancel",
            post(purchases::cancel),
        )
        .route("/webhooks/midtrans", post(webhooks::midtrans_webhook))
        .route("/webhooks/duitku", post(webhooks::duitku_webhook))
        .route("/payments/duitku/return", get(webhooks::duitku_return))
        .layer(DefaultBodyLimit::max(64 * 1024)) // gateway notifications are small
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!("listening on 0.0.0.0:3000");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    shutdown_tx.send(true).ok();
    sweeper.await.ok();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
