//! Read-only role dashboards.

use chrono::NaiveDateTime;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ServiceError;
use crate::models::{BuyerProfile, Meeting, MeetingStatus, SellerProfile, UserRole};
use crate::slots::local_now;

const FEATURED_LIMIT: i64 = 6;
const UPCOMING_LIMIT: i64 = 2;
const RECENT_LIMIT: usize = 10;

const ACTIVE_SELLER: &str = "active";
const APPROVED_BUYER: &str = "approved";

#[derive(Debug, Serialize)]
pub struct RoleCount {
    pub role: UserRole,
    pub count: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    User,
    Listing,
}

#[derive(Debug, Serialize)]
pub struct RecentActivity {
    pub kind: ActivityKind,
    pub id: i32,
    pub label: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct UpcomingMeeting {
    #[serde(flatten)]
    pub meeting: Meeting,
    pub slot_start: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub users_by_role: Vec<RoleCount>,
    pub total_listings: i64,
    pub total_meetings: i64,
    pub pending_seller_verifications: i64,
    pub recent_activity: Vec<RecentActivity>,
}

#[derive(Debug, Serialize)]
pub struct BuyerDashboard {
    pub featured_sellers: Vec<SellerProfile>,
    pub upcoming_meetings: Vec<UpcomingMeeting>,
}

#[derive(Debug, Serialize)]
pub struct SellerDashboard {
    pub featured_buyers: Vec<BuyerProfile>,
    pub upcoming_meetings: Vec<UpcomingMeeting>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Dashboard {
    Admin(AdminDashboard),
    Buyer(BuyerDashboard),
    Seller(SellerDashboard),
}

pub fn for_user(conn: &mut PgConnection, user: &AuthUser) -> Result<Dashboard, ServiceError> {
    match user.role {
        UserRole::Admin => admin(conn).map(Dashboard::Admin),
        UserRole::Buyer => Ok(Dashboard::Buyer(BuyerDashboard {
            featured_sellers: featured_sellers(conn)?,
            upcoming_meetings: upcoming(conn, user)?,
        })),
        UserRole::Seller => Ok(Dashboard::Seller(SellerDashboard {
            featured_buyers: featured_buyers(conn)?,
            upcoming_meetings: upcoming(conn, user)?,
        })),
    }
}

fn admin(conn: &mut PgConnection) -> Result<AdminDashboard, ServiceError> {
    use crate::schema::{listings, meetings, seller_profiles, users};

    let users_by_role = users::table
        .group_by(users::role)
        .select((users::role, count_star()))
        .order(users::role.asc())
        .load::<(UserRole, i64)>(conn)?
        .into_iter()
        .map(|(role, count)| RoleCount { role, count })
        .collect();

    let total_listings = listings::table.count().get_result::<i64>(conn)?;
    let total_meetings = meetings::table.count().get_result::<i64>(conn)?;
    let pending_seller_verifications = seller_profiles::table
        .filter(seller_profiles::is_verified.eq(false))
        .count()
        .get_result::<i64>(conn)?;

    let recent_users = users::table
        .order(users::created_at.desc())
        .limit(RECENT_LIMIT as i64)
        .select((users::id, users::username, users::created_at))
        .load::<(i32, String, NaiveDateTime)>(conn)?
        .into_iter()
        .map(|(id, label, created_at)| RecentActivity {
            kind: ActivityKind::User,
            id,
            label,
            created_at,
        });
    let recent_listings = listings::table
        .order(listings::created_at.desc())
        .limit(RECENT_LIMIT as i64)
        .select((listings::id, listings::name, listings::created_at))
        .load::<(i32, String, NaiveDateTime)>(conn)?
        .into_iter()
        .map(|(id, label, created_at)| RecentActivity {
            kind: ActivityKind::Listing,
            id,
            label,
            created_at,
        });

    Ok(AdminDashboard {
        users_by_role,
        total_listings,
        total_meetings,
        pending_seller_verifications,
        recent_activity: merge_recent(recent_users.chain(recent_listings).collect()),
    })
}

/// Newest first, capped.
fn merge_recent(mut items: Vec<RecentActivity>) -> Vec<RecentActivity> {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items.truncate(RECENT_LIMIT);
    items
}

fn featured_sellers(conn: &mut PgConnection) -> Result<Vec<SellerProfile>, ServiceError> {
    use crate::schema::seller_profiles::dsl::*;

    Ok(seller_profiles
        .filter(is_verified.eq(true))
        .filter(status.eq(ACTIVE_SELLER))
        .order(created_at.desc())
        .limit(FEATURED_LIMIT)
        .select(SellerProfile::as_select())
        .load(conn)?)
}

fn featured_buyers(conn: &mut PgConnection) -> Result<Vec<BuyerProfile>, ServiceError> {
    use crate::schema::buyer_profiles::dsl::*;

    Ok(buyer_profiles
        .filter(status.eq(APPROVED_BUYER))
        .order(created_at.desc())
        .limit(FEATURED_LIMIT)
        .select(BuyerProfile::as_select())
        .load(conn)?)
}

fn upcoming(conn: &mut PgConnection, user: &AuthUser) -> Result<Vec<UpcomingMeeting>, ServiceError> {
    use crate::schema::{meetings, time_slots};

    let mut query = meetings::table
        .inner_join(time_slots::table)
        .filter(meetings::status.eq(MeetingStatus::Accepted))
        .filter(time_slots::start_time.gt(local_now()))
        .order(time_slots::start_time.asc())
        .limit(UPCOMING_LIMIT)
        .select((Meeting::as_select(), time_slots::start_time))
        .into_boxed();
    query = match user.role {
        UserRole::Seller => query.filter(meetings::seller_id.eq(user.id)),
        _ => query.filter(meetings::buyer_id.eq(user.id)),
    };

    Ok(query
        .load::<(Meeting, NaiveDateTime)>(conn)?
        .into_iter()
        .map(|(meeting, slot_start)| UpcomingMeeting { meeting, slot_start })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn activity(kind: ActivityKind, id: i32, created_at: NaiveDateTime) -> RecentActivity {
        RecentActivity {
            kind,
            id,
            label: format!("item-{}", id),
            created_at,
        }
    }

    #[test]
    fn test_recent_activity_is_newest_first_and_capped() {
        let mut items = Vec::new();
        for i in 0..8 {
            items.push(activity(ActivityKind::User, i, at(1, i as u32)));
            items.push(activity(ActivityKind::Listing, 100 + i, at(2, i as u32)));
        }
        let merged = merge_recent(items);
        assert_eq!(merged.len(), RECENT_LIMIT);
        assert_eq!(merged[0].id, 107);
        assert_eq!(merged[0].kind, ActivityKind::Listing);
        assert!(merged.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn test_dashboard_serializes_without_tag() {
        let body = serde_json::to_value(Dashboard::Buyer(BuyerDashboard {
            featured_sellers: vec![],
            upcoming_meetings: vec![],
        }))
        .unwrap();
        assert!(body.get("featured_sellers").is_some());
        assert!(body.get("Buyer").is_none());
    }
}
