use std::io;

use actix_web::{middleware, web, App, HttpServer};

use splash25::auth::JwtAuth;
use splash25::config::AppConfig;
use splash25::db;
use splash25::handlers;
use splash25::queue::MeetingEventService;
use splash25::settings::{self, ScheduleCache};

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    // initialize DB pool outside of `HttpServer::new` so that it is shared across all workers
    let pool = db::initialize_db_pool(&config).map_err(|e| startup_error("Database unavailable", e))?;
    let cache = {
        let mut conn = pool.get().map_err(|e| startup_error("Database unavailable", e))?;
        let applied = db::run_migrations(&mut conn).map_err(|e| startup_error("Migrations failed", e))?;
        if applied > 0 {
            log::info!("Applied {} pending migrations", applied);
        }
        let schedule = settings::initialize(&mut conn).map_err(|e| startup_error("Settings unavailable", e))?;
        let cache = ScheduleCache::new();
        cache.store(schedule);
        web::Data::new(cache)
    };

    let mut events = MeetingEventService::new(pool.clone(), config.amqp.clone());
    match events.initialize().await {
        Ok(()) if events.is_connected() => {
            if let Err(e) = events.start_consuming_completions().await {
                log::error!("Error starting meeting completion consumer: {:?}", e);
            }
        }
        Ok(()) => {}
        // Meetings keep working without the broker; events and auto-completion are skipped.
        Err(e) => log::warn!("RabbitMQ unavailable, continuing without meeting events: {:?}", e),
    }
    let events = web::Data::new(events);

    let bind = (config.host.clone(), config.port);
    let jwt_secret = config.jwt_secret.clone();
    let config = web::Data::new(config);
    let pool = web::Data::new(pool);

    log::info!("starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(config.clone())
            .app_data(cache.clone())
            .app_data(events.clone())
            .app_data(web::JsonConfig::default().error_handler(handlers::json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(handlers::query_error_handler))
            .app_data(web::PathConfig::default().error_handler(handlers::path_error_handler))
            .wrap(middleware::Logger::default())
            .service(handlers::health::health)
            .service(
                web::scope("/api")
                    .wrap(JwtAuth::new(jwt_secret.clone()))
                    .configure(handlers::configure),
            )
    })
    .bind(bind)?
    .run()
    .await
}
