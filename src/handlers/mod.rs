//! HTTP surface. Every handler authenticates through the `/api` scope's [`JwtAuth`]
//! middleware and runs its database work on the blocking pool.
//!
//! [`JwtAuth`]: crate::auth::JwtAuth

use actix_web::{error, web, HttpRequest, HttpResponse};

use crate::error::{ErrorBody, ServiceError};

pub mod accommodation;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod meetings;
pub mod system;
pub mod timeslots;

/// Routes mounted under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(timeslots::generate_slots)
        .service(timeslots::list_slots)
        .service(timeslots::bulk_delete_slots)
        .service(timeslots::delete_slot)
        .service(meetings::buyer_request)
        .service(meetings::seller_request)
        .service(meetings::update_status)
        .service(meetings::cancel_meeting)
        .service(meetings::list_meetings)
        .service(system::get_metadata)
        .service(system::update_metadata)
        .service(system::initialize_metadata)
        .service(system::toggle_meetings)
        .service(accommodation::allocate)
        .service(accommodation::deallocate)
        .service(accommodation::list_host_properties)
        .service(dashboard::get_dashboard)
        .service(auth::logout);
}

/// Malformed JSON bodies answer with the same `VALIDATION` envelope as every other error.
pub fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected request body: {}", err);
    if matches!(err, error::JsonPayloadError::ContentType) {
        let response = HttpResponse::UnsupportedMediaType().json(ErrorBody {
            error: "VALIDATION",
            message: "Content-Type must be application/json".to_string(),
        });
        return error::InternalError::from_response(err, response).into();
    }
    ServiceError::Validation(format!("Invalid request body: {}", err)).into()
}

pub fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ServiceError::Validation(format!("Invalid query string: {}", err)).into()
}

pub fn path_error_handler(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    ServiceError::Validation(format!("Invalid path: {}", err)).into()
}

pub(crate) fn created<T: serde::Serialize>(body: &T) -> HttpResponse {
    HttpResponse::Created().json(body)
}
