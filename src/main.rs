use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use email_inliner::config::Config;
use email_inliner::handlers::{self, AppState};
use email_inliner::limiter::RateLimiter;
use email_inliner::mailer::Mailer;
use email_inliner::middleware::RateLimitGuard;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        max_requests = config.rate_limit.max_requests,
        window_minutes = config.rate_limit.window_minutes,
        "Starting email-inliner"
    );
    if config.sendgrid.is_none() {
        error!(
            "SENDGRID_API_KEY or SENDGRID_FROM_EMAIL is not set; \
             /api/send-email will answer with a configuration error"
        );
    }

    let limiter = RateLimiter::builder()
        .max_requests(config.rate_limit.max_requests)
        .window(config.rate_limit.window())
        .build();

    let state = web::Data::new(AppState {
        mailer: config
            .sendgrid
            .map(|sg| Mailer::new(sg.api_key, sg.from_email, sg.from_name)),
    });

    let bind_addr = config.bind_addr.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .service(handlers::health)
            .service(handlers::preview_html)
            .service(
                web::resource("/api/send-email")
                    .wrap(RateLimitGuard::new(limiter.clone()))
                    .route(web::post().to(handlers::send_email)),
            )
    })
    .bind(&bind_addr)?
    .run()
    .await
}
