use actix_web::{post, web, HttpResponse};

use crate::auth::{self, AnyRole, Authorized};
use crate::db::DbPool;
use crate::models::ApiResponse;

/// Blocks the caller's token identifier for the rest of its lifetime.
#[post("/auth/logout")]
pub async fn logout(pool: web::Data<DbPool>, user: Authorized<AnyRole>) -> actix_web::Result<HttpResponse> {
    let user = user.into_inner();
    let user_id = user.id;

    web::block(move || {
        let mut conn = pool.get()?;
        auth::revoke(&mut conn, &user.jti)
    })
    .await??;

    log::info!("User {} logged out", user_id);
    Ok(HttpResponse::Ok().json(ApiResponse {
        message: "Logged out".to_string(),
    }))
}
