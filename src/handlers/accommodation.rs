use actix_web::{delete, get, post, web, HttpResponse};

use crate::accommodation::{self, ValidatedAllocation};
use crate::auth::{AdminOnly, Authorized};
use crate::db::DbPool;
use crate::models::AllocateAccommodationRequest;

use super::created;

#[post("/admin/buyers/{id}/allocate-accommodation")]
pub async fn allocate(
    pool: web::Data<DbPool>,
    admin: Authorized<AdminOnly>,
    path: web::Path<i32>,
    form: web::Json<AllocateAccommodationRequest>,
) -> actix_web::Result<HttpResponse> {
    let buyer_id = path.into_inner();
    let request = ValidatedAllocation::try_from(form.into_inner())?;

    let allocation = web::block(move || {
        let mut conn = pool.get()?;
        accommodation::allocate(&mut conn, buyer_id, request)
    })
    .await??;

    log::info!(
        "Admin {} allocated accommodation {} to buyer {}",
        admin.id,
        allocation.accommodation.id,
        buyer_id
    );
    Ok(created(&allocation))
}

#[delete("/admin/accommodations/{id}/deallocate")]
pub async fn deallocate(
    pool: web::Data<DbPool>,
    _admin: Authorized<AdminOnly>,
    path: web::Path<i32>,
) -> actix_web::Result<HttpResponse> {
    let accommodation_id = path.into_inner();

    let property = web::block(move || {
        let mut conn = pool.get()?;
        accommodation::deallocate(&mut conn, accommodation_id)
    })
    .await??;

    Ok(HttpResponse::Ok().json(property))
}

#[get("/admin/host-properties")]
pub async fn list_host_properties(
    pool: web::Data<DbPool>,
    _admin: Authorized<AdminOnly>,
) -> actix_web::Result<HttpResponse> {
    let properties = web::block(move || {
        let mut conn = pool.get()?;
        accommodation::list_host_properties(&mut conn)
    })
    .await??;

    Ok(HttpResponse::Ok().json(properties))
}
