//! Meeting coordination backend for the Splash25 buyer/seller networking event:
//! seller time slots, meeting requests, the global request switch and host-property
//! accommodation.

pub mod accommodation;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod handlers;
pub mod meetings;
pub mod models;
pub mod queue;
pub mod schema;
pub mod settings;
pub mod slots;
pub mod toggle;
