use actix_web::{get, post, put, web, HttpResponse};

use crate::auth::{AdminOnly, AnyRole, Authorized};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::models::{ToggleRequest, ToggleResponse};
use crate::queue::{MeetingEvent, MeetingEventService};
use crate::settings::{self, MeetingMetadata, ScheduleCache, ScheduleUpdate};
use crate::toggle;

#[get("/system/meeting-metadata")]
pub async fn get_metadata(
    pool: web::Data<DbPool>,
    cache: web::Data<ScheduleCache>,
    _user: Authorized<AnyRole>,
) -> actix_web::Result<HttpResponse> {
    let config = web::block(move || {
        let mut conn = pool.get()?;
        cache.get_or_load(&mut conn)
    })
    .await??;

    Ok(HttpResponse::Ok().json(MeetingMetadata::from(&config)))
}

#[put("/system/meeting-metadata")]
pub async fn update_metadata(
    pool: web::Data<DbPool>,
    cache: web::Data<ScheduleCache>,
    _admin: Authorized<AdminOnly>,
    form: web::Json<MeetingMetadata>,
) -> actix_web::Result<HttpResponse> {
    let changes = ScheduleUpdate::try_from(form.into_inner())?;

    let config = web::block(move || {
        let mut conn = pool.get()?;
        cache.write(&mut conn, |conn| settings::update(conn, changes))
    })
    .await??;

    log::info!(
        "Meeting schedule updated: {}min slots, {}min interval, {} breaks",
        config.meeting_duration,
        config.meeting_interval,
        config.breaks.len()
    );
    Ok(HttpResponse::Ok().json(MeetingMetadata::from(&config)))
}

#[post("/system/meeting-metadata/initialize")]
pub async fn initialize_metadata(
    pool: web::Data<DbPool>,
    cache: web::Data<ScheduleCache>,
    _admin: Authorized<AdminOnly>,
) -> actix_web::Result<HttpResponse> {
    let config = web::block(move || {
        let mut conn = pool.get()?;
        cache.write(&mut conn, settings::initialize)
    })
    .await??;

    Ok(HttpResponse::Ok().json(MeetingMetadata::from(&config)))
}

#[put("/system/meetings-toggle")]
pub async fn toggle_meetings(
    pool: web::Data<DbPool>,
    cache: web::Data<ScheduleCache>,
    config: web::Data<AppConfig>,
    events: web::Data<MeetingEventService>,
    admin: Authorized<AdminOnly>,
    form: web::Json<ToggleRequest>,
) -> actix_web::Result<HttpResponse> {
    let enabled = form.enabled;
    let deadline = config.bulk_deadline;

    let outcome = web::block(move || {
        let mut conn = pool.get()?;
        cache.write(&mut conn, |conn| toggle::set_enabled(conn, enabled, deadline))
    })
    .await??;

    log::info!("Admin {} set meeting requests to {}", admin.id, outcome.enabled);
    if !outcome.expired.is_empty() {
        events.publish(MeetingEvent::expired(outcome.expired.clone())).await;
    }

    Ok(HttpResponse::Ok().json(ToggleResponse {
        enabled: outcome.enabled,
        expired_meetings: outcome.expired.len(),
        message: outcome.message(),
    }))
}
