use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod handlers;
mod outbox;

#[cfg(test)]
mod fuzz;

use error::Error;
use extractors::{AppState, LockTimeout, PgPool};
use outbox::Notifier;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(Debug, StructOpt)]
#[structopt(name = "remark-server", about = "Threaded comments over HTTP")]
struct Opt {
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    #[structopt(long, default_value = "32")]
    max_connections: u32,

    /// How long a write waits for the lock of its target article
    #[structopt(long, default_value = "5000")]
    lock_timeout_ms: u64,
}

pub async fn create_sqlx_pool(db_url: &str, max_connections: u32) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .with_context(|| format!("Error opening database {:?}", db_url))
}

pub fn app(db: sqlx::PgPool, lock_timeout: Duration) -> Router {
    let db = PgPool::new(db);
    let state = AppState {
        notifier: Notifier::new(db.clone()),
        db,
        lock_timeout: LockTimeout(lock_timeout),
    };
    Router::new()
        .route("/api/whoami", get(handlers::whoami))
        .route(
            "/api/comments",
            get(handlers::list_comments).post(handlers::write_comment),
        )
        .route(
            "/api/comments/:id",
            get(handlers::get_comment).put(handlers::update_comment),
        )
        .route("/api/comments/:id/hide", post(handlers::hide_comment))
        .route("/api/comments/:id/show", post(handlers::show_comment))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::from_args();

    let db = create_sqlx_pool(&opt.database_url, opt.max_connections).await?;
    MIGRATOR
        .run(&mut *db.acquire().await.context("getting migrator connection")?)
        .await
        .context("running pending migrations")?;

    let app = app(db, Duration::from_millis(opt.lock_timeout_ms));

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
