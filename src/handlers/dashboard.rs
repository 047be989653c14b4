use actix_web::{get, web, HttpResponse};

use crate::auth::{AnyRole, Authorized};
use crate::dashboard;
use crate::db::DbPool;

#[get("/dashboard")]
pub async fn get_dashboard(pool: web::Data<DbPool>, user: Authorized<AnyRole>) -> actix_web::Result<HttpResponse> {
    let user = user.into_inner();

    let view = web::block(move || {
        let mut conn = pool.get()?;
        dashboard::for_user(&mut conn, &user)
    })
    .await??;

    Ok(HttpResponse::Ok().json(view))
}
