use actix_web::{get, web, HttpResponse};
use diesel::{sql_query, RunQueryDsl};
use serde::Serialize;

use crate::db::DbPool;
use crate::queue::MeetingEventService;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    database: bool,
    broker: bool,
}

/// Liveness probe, mounted outside `/api` and unauthenticated.
#[get("/health")]
pub async fn health(pool: web::Data<DbPool>, events: web::Data<MeetingEventService>) -> HttpResponse {
    let database = web::block(move || {
        let mut conn = pool.get()?;
        sql_query("SELECT 1").execute(&mut conn)?;
        Ok::<_, crate::error::ServiceError>(())
    })
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false);

    let body = Health {
        status: if database { "ok" } else { "degraded" },
        database,
        broker: events.is_connected(),
    };
    if database {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
