use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::{
    deserialize::{self, FromSql},
    pg::{Pg, PgValue},
    serialize::{self, Output, ToSql},
    sql_types::Text,
    AsExpression, FromSqlRow, Identifiable, Insertable, Queryable, Selectable,
};
use serde::{Deserialize, Serialize};

use crate::schema::{
    accommodations, buyer_profiles, host_properties, meetings, seller_profiles, system_settings,
    time_slots, travel_plans,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::UserRole)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Buyer,
    Seller,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Buyer => "BUYER",
            UserRole::Seller => "SELLER",
            UserRole::Admin => "ADMIN",
        }
    }

    /// The role a meeting counterparty must hold. Admins never take part in meetings.
    pub fn counterpart(&self) -> Option<UserRole> {
        match self {
            UserRole::Buyer => Some(UserRole::Seller),
            UserRole::Seller => Some(UserRole::Buyer),
            UserRole::Admin => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUYER" => Ok(UserRole::Buyer),
            "SELLER" => Ok(UserRole::Seller),
            "ADMIN" => Ok(UserRole::Admin),
            other => Err(format!("Unrecognized user role: {}", other)),
        }
    }
}

impl ToSql<crate::schema::sql_types::UserRole, Pg> for UserRole {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<crate::schema::sql_types::UserRole, Pg> for UserRole {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        Ok(<String as FromSql<Text, Pg>>::from_sql(bytes)?.parse::<UserRole>()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::MeetingStatus)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl MeetingStatus {
    /// Statuses that keep a buyer/seller pair busy and hold a slot.
    pub const LIVE: [MeetingStatus; 2] = [MeetingStatus::Pending, MeetingStatus::Accepted];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Pending => "PENDING",
            MeetingStatus::Accepted => "ACCEPTED",
            MeetingStatus::Rejected => "REJECTED",
            MeetingStatus::Completed => "COMPLETED",
            MeetingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(MeetingStatus::Pending),
            "ACCEPTED" => Ok(MeetingStatus::Accepted),
            "REJECTED" => Ok(MeetingStatus::Rejected),
            "COMPLETED" => Ok(MeetingStatus::Completed),
            "CANCELLED" => Ok(MeetingStatus::Cancelled),
            other => Err(format!("Unrecognized meeting status: {}", other)),
        }
    }
}

impl ToSql<crate::schema::sql_types::MeetingStatus, Pg> for MeetingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<crate::schema::sql_types::MeetingStatus, Pg> for MeetingStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        Ok(<String as FromSql<Text, Pg>>::from_sql(bytes)?.parse::<MeetingStatus>()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::RoomType)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Single,
    Shared,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Single => "single",
            RoomType::Shared => "shared",
        }
    }
}

impl FromStr for RoomType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(RoomType::Single),
            "shared" => Ok(RoomType::Shared),
            other => Err(format!("Unrecognized room type: {}", other)),
        }
    }
}

impl ToSql<crate::schema::sql_types::RoomType, Pg> for RoomType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<crate::schema::sql_types::RoomType, Pg> for RoomType {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        Ok(<String as FromSql<Text, Pg>>::from_sql(bytes)?.parse::<RoomType>()?)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = seller_profiles)]
pub struct SellerProfile {
    pub id: i32,
    pub user_id: i32,
    pub business_name: String,
    pub description: Option<String>,
    pub is_verified: bool,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = buyer_profiles)]
pub struct BuyerProfile {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub organization: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = system_settings)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = system_settings)]
pub struct NewSetting {
    pub key: String,
    pub value: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = time_slots)]
pub struct TimeSlot {
    pub id: i32,
    pub user_id: i32,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_available: bool,
    pub meeting_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = time_slots)]
pub struct NewTimeSlot {
    pub user_id: i32,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_available: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = meetings)]
pub struct Meeting {
    pub id: i32,
    pub buyer_id: i32,
    pub seller_id: i32,
    pub requestor_id: i32,
    pub time_slot_id: Option<i32>,
    pub status: MeetingStatus,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Meeting {
    pub fn is_participant(&self, user_id: i32) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = meetings)]
pub struct NewMeeting {
    pub buyer_id: i32,
    pub seller_id: i32,
    pub requestor_id: i32,
    pub time_slot_id: Option<i32>,
    pub status: MeetingStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = host_properties)]
pub struct HostProperty {
    pub id: i32,
    pub name: String,
    pub address: Option<String>,
    pub rooms_allotted: i32,
    pub current_guests: i32,
    pub rooms_allocated: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = travel_plans)]
pub struct TravelPlan {
    pub id: i32,
    pub buyer_id: i32,
    pub event_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub venue: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = travel_plans)]
pub struct NewTravelPlan {
    pub buyer_id: i32,
    pub event_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub venue: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = accommodations)]
pub struct Accommodation {
    pub id: i32,
    pub travel_plan_id: i32,
    pub host_property_id: i32,
    pub buyer_id: i32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub room_type: RoomType,
    pub booking_ref: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = accommodations)]
pub struct NewAccommodation {
    pub travel_plan_id: i32,
    pub host_property_id: i32,
    pub buyer_id: i32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub room_type: RoomType,
    pub booking_ref: Option<String>,
    pub notes: Option<String>,
}

// Request/Response models for API
#[derive(Debug, Deserialize, Clone)]
pub struct GenerateSlotsRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct GenerateSlotsResponse {
    pub created_count: usize,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub user_id: Option<i32>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted_count: usize,
    pub message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuyerMeetingRequest {
    pub seller_id: i32,
    pub time_slot_id: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SellerMeetingRequest {
    pub buyer_id: i32,
    pub time_slot_id: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingStatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct MeetingQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeetingView {
    #[serde(flatten)]
    pub meeting: Meeting,
    pub slot_start: Option<NaiveDateTime>,
    pub slot_end: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub enabled: bool,
    pub expired_meetings: usize,
    pub message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AllocateAccommodationRequest {
    pub host_property_id: i32,
    pub room_type: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub booking_ref: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
}
