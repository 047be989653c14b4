use actix_web::{delete, get, post, put, web, HttpResponse};

use crate::auth::{AnyRole, AuthUser, Authorized, BuyerOnly, SellerOnly};
use crate::db::DbPool;
use crate::error::ServiceError;
use crate::meetings::{self, MeetingRequest, Transition};
use crate::models::{
    BuyerMeetingRequest, Meeting, MeetingQuery, MeetingStatus, MeetingStatusUpdate, SellerMeetingRequest,
};
use crate::queue::{MeetingEvent, MeetingEventKind, MeetingEventService};

use super::created;

async fn create(
    pool: web::Data<DbPool>,
    events: web::Data<MeetingEventService>,
    requestor: AuthUser,
    request: MeetingRequest,
) -> actix_web::Result<HttpResponse> {
    let meeting = web::block(move || {
        let mut conn = pool.get()?;
        meetings::create_request(&mut conn, &requestor, &request)
    })
    .await??;

    events
        .publish(MeetingEvent::for_meeting(MeetingEventKind::Requested, &meeting))
        .await;
    Ok(created(&meeting))
}

#[post("/meetings/buyer/request")]
pub async fn buyer_request(
    pool: web::Data<DbPool>,
    events: web::Data<MeetingEventService>,
    buyer: Authorized<BuyerOnly>,
    form: web::Json<BuyerMeetingRequest>,
) -> actix_web::Result<HttpResponse> {
    let form = form.into_inner();
    let request = MeetingRequest {
        counterparty_id: form.seller_id,
        time_slot_id: form.time_slot_id,
        notes: form.notes,
    };
    create(pool, events, buyer.into_inner(), request).await
}

#[post("/meetings/seller/request")]
pub async fn seller_request(
    pool: web::Data<DbPool>,
    events: web::Data<MeetingEventService>,
    seller: Authorized<SellerOnly>,
    form: web::Json<SellerMeetingRequest>,
) -> actix_web::Result<HttpResponse> {
    let form = form.into_inner();
    let request = MeetingRequest {
        counterparty_id: form.buyer_id,
        time_slot_id: form.time_slot_id,
        notes: form.notes,
    };
    create(pool, events, seller.into_inner(), request).await
}

/// Runs `transition` and, after commit, notifies and arms the completion timer for accepted meetings.
async fn drive(
    pool: web::Data<DbPool>,
    events: web::Data<MeetingEventService>,
    actor: AuthUser,
    meeting_id: i32,
    transition: Transition,
) -> actix_web::Result<Meeting> {
    let (meeting, slot) = web::block(move || -> Result<_, ServiceError> {
        let mut conn = pool.get()?;
        let meeting = match transition {
            Transition::Accept | Transition::Reject => meetings::respond(&mut conn, meeting_id, &actor, transition)?,
            Transition::Cancel => meetings::cancel(&mut conn, meeting_id, &actor)?,
            Transition::Complete => meetings::mark_completed(&mut conn, meeting_id, Some(&actor))?,
            Transition::Expire => return Err(ServiceError::validation("meetings expire only through the toggle")),
        };
        let slot = match meeting.status {
            MeetingStatus::Accepted => meetings::slot_of(&mut conn, &meeting)?,
            _ => None,
        };
        Ok((meeting, slot))
    })
    .await??;

    events
        .publish(MeetingEvent::for_meeting(transition.into(), &meeting))
        .await;
    if let Some(slot) = slot {
        events.schedule_completion(meeting.id, slot.end_time).await;
    }
    Ok(meeting)
}

#[put("/meetings/{id}/status")]
pub async fn update_status(
    pool: web::Data<DbPool>,
    events: web::Data<MeetingEventService>,
    user: Authorized<AnyRole>,
    path: web::Path<i32>,
    form: web::Json<MeetingStatusUpdate>,
) -> actix_web::Result<HttpResponse> {
    let transition = Transition::from_requested_status(&form.status)?;
    let meeting = drive(pool, events, user.into_inner(), path.into_inner(), transition).await?;
    Ok(HttpResponse::Ok().json(meeting))
}

#[delete("/meetings/{id}")]
pub async fn cancel_meeting(
    pool: web::Data<DbPool>,
    events: web::Data<MeetingEventService>,
    user: Authorized<AnyRole>,
    path: web::Path<i32>,
) -> actix_web::Result<HttpResponse> {
    let meeting = drive(pool, events, user.into_inner(), path.into_inner(), Transition::Cancel).await?;
    Ok(HttpResponse::Ok().json(meeting))
}

#[get("/meetings")]
pub async fn list_meetings(
    pool: web::Data<DbPool>,
    user: Authorized<AnyRole>,
    query: web::Query<MeetingQuery>,
) -> actix_web::Result<HttpResponse> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<MeetingStatus>)
        .transpose()
        .map_err(ServiceError::Validation)?;
    let user = user.into_inner();

    let found = web::block(move || {
        let mut conn = pool.get()?;
        meetings::list_for_user(&mut conn, &user, status)
    })
    .await??;

    Ok(HttpResponse::Ok().json(found))
}
