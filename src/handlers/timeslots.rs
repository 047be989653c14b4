use actix_web::{delete, get, post, web, HttpResponse};

use crate::auth::{AnyRole, Authorized, SellerOnly};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::models::{
    ApiResponse, BulkDeleteRequest, BulkDeleteResponse, GenerateSlotsRequest, GenerateSlotsResponse, SlotQuery,
};
use crate::slots;

use super::created;

#[post("/timeslots")]
pub async fn generate_slots(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    seller: Authorized<SellerOnly>,
    form: web::Json<GenerateSlotsRequest>,
) -> actix_web::Result<HttpResponse> {
    let seller_id = seller.id;
    let deadline = config.bulk_deadline;
    let range = form.into_inner();

    let created_count = web::block(move || {
        let mut conn = pool.get()?;
        slots::generate(&mut conn, seller_id, range.start_date, range.end_date, deadline)
    })
    .await??;

    Ok(created(&GenerateSlotsResponse {
        created_count,
        message: format!("Created {} time slots", created_count),
    }))
}

/// Slots of `user_id`, or of the caller when omitted.
#[get("/timeslots")]
pub async fn list_slots(
    pool: web::Data<DbPool>,
    user: Authorized<AnyRole>,
    query: web::Query<SlotQuery>,
) -> actix_web::Result<HttpResponse> {
    let owner = query.user_id.unwrap_or(user.id);
    let date = query.date;

    let found = web::block(move || {
        let mut conn = pool.get()?;
        slots::list_for_owner(&mut conn, owner, date)
    })
    .await??;

    Ok(HttpResponse::Ok().json(found))
}

#[delete("/timeslots/{id}")]
pub async fn delete_slot(
    pool: web::Data<DbPool>,
    seller: Authorized<SellerOnly>,
    path: web::Path<i32>,
) -> actix_web::Result<HttpResponse> {
    let slot_id = path.into_inner();
    let owner = seller.id;

    web::block(move || {
        let mut conn = pool.get()?;
        slots::delete_one(&mut conn, owner, slot_id)
    })
    .await??;

    Ok(HttpResponse::Ok().json(ApiResponse {
        message: format!("Time slot {} deleted", slot_id),
    }))
}

#[post("/timeslots/bulk-delete")]
pub async fn bulk_delete_slots(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    seller: Authorized<SellerOnly>,
    form: web::Json<BulkDeleteRequest>,
) -> actix_web::Result<HttpResponse> {
    let owner = seller.id;
    let deadline = config.bulk_deadline;
    let range = form.into_inner();

    let deleted_count = web::block(move || {
        let mut conn = pool.get()?;
        slots::delete_range(&mut conn, owner, range.start_date, range.end_date, deadline)
    })
    .await??;

    Ok(HttpResponse::Ok().json(BulkDeleteResponse {
        deleted_count,
        message: format!("Deleted {} available time slots", deleted_count),
    }))
}
