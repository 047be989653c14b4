//! End-to-end scenarios against Postgres.
//!
//! Set `TEST_DATABASE_URL` to a scratch database to run them; every test works inside a
//! transaction that is rolled back when the connection drops.

use std::sync::Once;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use uuid::Uuid;

use splash25::accommodation::{self, ValidatedAllocation};
use splash25::auth::AuthUser;
use splash25::db;
use splash25::meetings::{self, MeetingRequest, Transition};
use splash25::models::{AllocateAccommodationRequest, HostProperty, MeetingStatus, TimeSlot, UserRole};
use splash25::schema::{accommodations, host_properties, meetings as meetings_table, time_slots, users};
use splash25::settings::{self, MeetingBreak, MeetingMetadata, ScheduleCache, ScheduleUpdate};
use splash25::slots::{self, local_now};
use splash25::toggle;

static MIGRATE: Once = Once::new();
const DEADLINE: StdDuration = StdDuration::from_secs(15);

fn connection() -> Option<PgConnection> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };
    MIGRATE.call_once(|| {
        let mut conn = PgConnection::establish(&url).expect("connect for migrations");
        db::run_migrations(&mut conn).expect("migrations apply");
    });
    let mut conn = PgConnection::establish(&url).expect("connect to test database");
    conn.begin_test_transaction().expect("open test transaction");
    Some(conn)
}

fn user(conn: &mut PgConnection, role: UserRole) -> AuthUser {
    let tag = Uuid::new_v4().simple().to_string();
    let id = diesel::insert_into(users::table)
        .values((
            users::username.eq(format!("{}-{}", role.as_str().to_lowercase(), tag)),
            users::email.eq(format!("{}@example.test", tag)),
            users::role.eq(role),
        ))
        .returning(users::id)
        .get_result::<i32>(conn)
        .unwrap();
    AuthUser {
        id,
        role,
        jti: tag,
    }
}

fn future_day() -> NaiveDate {
    local_now().date() + Duration::days(7)
}

fn at(day: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    day.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
}

fn slot(conn: &mut PgConnection, owner: i32, start: NaiveDateTime) -> TimeSlot {
    diesel::insert_into(time_slots::table)
        .values((
            time_slots::user_id.eq(owner),
            time_slots::start_time.eq(start),
            time_slots::end_time.eq(start + Duration::minutes(30)),
        ))
        .returning(TimeSlot::as_returning())
        .get_result(conn)
        .unwrap()
}

fn reload_slot(conn: &mut PgConnection, id: i32) -> TimeSlot {
    time_slots::table
        .find(id)
        .select(TimeSlot::as_select())
        .first(conn)
        .unwrap()
}

fn request(counterparty_id: i32, time_slot_id: Option<i32>) -> MeetingRequest {
    MeetingRequest {
        counterparty_id,
        time_slot_id,
        notes: None,
    }
}

#[test]
fn half_hour_schedule_generates_fourteen_slots_once() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);

    settings::update(
        &mut conn,
        ScheduleUpdate {
            meeting_duration: Some(30),
            meeting_interval: Some(0),
            day_start_time: NaiveTime::from_hms_opt(9, 0, 0),
            day_end_time: NaiveTime::from_hms_opt(17, 0, 0),
            breaks: Some(vec![MeetingBreak {
                label: "Lunch".into(),
                start: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            }]),
            ..Default::default()
        },
    )
    .unwrap();

    let day = future_day();
    assert_eq!(slots::generate(&mut conn, seller.id, day, day, DEADLINE).unwrap(), 14);
    assert_eq!(slots::generate(&mut conn, seller.id, day, day, DEADLINE).unwrap(), 0);

    let created = slots::list_for_owner(&mut conn, seller.id, Some(day)).unwrap();
    assert_eq!(created.len(), 14);
    assert!(created
        .iter()
        .all(|s| s.end_time <= at(day, 12, 0) || s.start_time >= at(day, 13, 0)));
    assert_eq!(created[6].start_time, at(day, 13, 0));
}

#[test]
fn slot_generation_refuses_non_sellers() {
    let Some(mut conn) = connection() else { return };
    let buyer = user(&mut conn, UserRole::Buyer);
    let day = future_day();

    let err = slots::generate(&mut conn, buyer.id, day, day, DEADLINE).unwrap_err();
    assert_eq!(err.kind(), "VALIDATION");
}

#[test]
fn second_request_for_a_held_slot_conflicts() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);
    let b1 = user(&mut conn, UserRole::Buyer);
    let b2 = user(&mut conn, UserRole::Buyer);
    let s = slot(&mut conn, seller.id, at(future_day(), 10, 0));

    let first = meetings::create_request(&mut conn, &b1, &request(seller.id, Some(s.id))).unwrap();
    assert_eq!(first.status, MeetingStatus::Pending);

    let err = meetings::create_request(&mut conn, &b2, &request(seller.id, Some(s.id))).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");

    let held = reload_slot(&mut conn, s.id);
    assert!(!held.is_available);
    assert_eq!(held.meeting_id, Some(first.id));
}

#[test]
fn deleting_slots_keeps_booked_ones() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);
    let other_seller = user(&mut conn, UserRole::Seller);
    let buyer = user(&mut conn, UserRole::Buyer);

    settings::update(
        &mut conn,
        ScheduleUpdate {
            meeting_duration: Some(30),
            meeting_interval: Some(0),
            day_start_time: NaiveTime::from_hms_opt(9, 0, 0),
            day_end_time: NaiveTime::from_hms_opt(17, 0, 0),
            breaks: Some(vec![MeetingBreak {
                label: "Lunch".into(),
                start: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            }]),
            ..Default::default()
        },
    )
    .unwrap();

    let first = future_day();
    let last = first + Duration::days(1);
    assert_eq!(slots::generate(&mut conn, seller.id, first, last, DEADLINE).unwrap(), 28);

    let booked = slots::list_for_owner(&mut conn, seller.id, Some(last)).unwrap()[2].clone();
    let m = meetings::create_request(&mut conn, &buyer, &request(seller.id, Some(booked.id))).unwrap();

    let err = slots::delete_one(&mut conn, other_seller.id, booked.id).unwrap_err();
    assert_eq!(err.kind(), "FORBIDDEN");
    let err = slots::delete_one(&mut conn, seller.id, booked.id).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");

    assert_eq!(slots::delete_range(&mut conn, seller.id, first, last, DEADLINE).unwrap(), 27);
    let left = slots::list_for_owner(&mut conn, seller.id, None).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!((left[0].id, left[0].meeting_id), (booked.id, Some(m.id)));

    let err = slots::delete_range(&mut conn, seller.id, last, first, DEADLINE).unwrap_err();
    assert_eq!(err.kind(), "VALIDATION");

    let free = slot(&mut conn, seller.id, at(first, 8, 0));
    slots::delete_one(&mut conn, seller.id, free.id).unwrap();
    let err = slots::delete_one(&mut conn, seller.id, free.id).unwrap_err();
    assert_eq!(err.kind(), "NOT_FOUND");
}

#[test]
fn one_live_meeting_per_pair() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);
    let buyer = user(&mut conn, UserRole::Buyer);

    let first = meetings::create_request(&mut conn, &buyer, &request(seller.id, None)).unwrap();
    let err = meetings::create_request(&mut conn, &seller, &request(buyer.id, None)).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");

    meetings::respond(&mut conn, first.id, &seller, Transition::Reject).unwrap();
    meetings::create_request(&mut conn, &seller, &request(buyer.id, None)).unwrap();
}

#[test]
fn counterparty_must_hold_the_opposite_role() {
    let Some(mut conn) = connection() else { return };
    let b1 = user(&mut conn, UserRole::Buyer);
    let b2 = user(&mut conn, UserRole::Buyer);

    let err = meetings::create_request(&mut conn, &b1, &request(b2.id, None)).unwrap_err();
    assert_eq!(err.kind(), "VALIDATION");

    let err = meetings::create_request(&mut conn, &b1, &request(i32::MAX, None)).unwrap_err();
    assert_eq!(err.kind(), "NOT_FOUND");
}

#[test]
fn requestor_cannot_accept_but_counterparty_can() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);
    let buyer = user(&mut conn, UserRole::Buyer);
    let s = slot(&mut conn, seller.id, at(future_day(), 11, 0));

    let m = meetings::create_request(&mut conn, &buyer, &request(seller.id, Some(s.id))).unwrap();

    let err = meetings::respond(&mut conn, m.id, &buyer, Transition::Accept).unwrap_err();
    assert_eq!(err.kind(), "FORBIDDEN");
    assert_eq!(err.to_string(), "cannot accept own request");

    let accepted = meetings::respond(&mut conn, m.id, &seller, Transition::Accept).unwrap();
    assert_eq!(accepted.status, MeetingStatus::Accepted);
    assert_eq!(reload_slot(&mut conn, s.id).meeting_id, Some(m.id));

    let err = meetings::respond(&mut conn, m.id, &seller, Transition::Reject).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
}

#[test]
fn cancelling_and_completing_release_the_slot() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);
    let buyer = user(&mut conn, UserRole::Buyer);
    let admin = user(&mut conn, UserRole::Admin);
    let day = future_day();
    let s1 = slot(&mut conn, seller.id, at(day, 14, 0));
    let s2 = slot(&mut conn, seller.id, at(day, 15, 0));

    let m = meetings::create_request(&mut conn, &seller, &request(buyer.id, Some(s1.id))).unwrap();
    meetings::cancel(&mut conn, m.id, &buyer).unwrap();
    let freed = reload_slot(&mut conn, s1.id);
    assert!(freed.is_available);
    assert_eq!(freed.meeting_id, None);

    let m = meetings::create_request(&mut conn, &buyer, &request(seller.id, Some(s2.id))).unwrap();
    meetings::respond(&mut conn, m.id, &seller, Transition::Accept).unwrap();
    let err = meetings::mark_completed(&mut conn, m.id, Some(&seller)).unwrap_err();
    assert_eq!(err.kind(), "FORBIDDEN");

    let done = meetings::mark_completed(&mut conn, m.id, Some(&admin)).unwrap();
    assert_eq!(done.status, MeetingStatus::Completed);
    assert_eq!(done.time_slot_id, Some(s2.id));
    assert!(reload_slot(&mut conn, s2.id).is_available);
}

#[test]
fn listing_is_scoped_by_role() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);
    let other_seller = user(&mut conn, UserRole::Seller);
    let buyer = user(&mut conn, UserRole::Buyer);
    let s = slot(&mut conn, seller.id, at(future_day(), 9, 30));

    meetings::create_request(&mut conn, &buyer, &request(seller.id, Some(s.id))).unwrap();
    meetings::create_request(&mut conn, &buyer, &request(other_seller.id, None)).unwrap();

    let mine = meetings::list_for_user(&mut conn, &seller, None).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].slot_start, Some(s.start_time));

    let theirs = meetings::list_for_user(&mut conn, &buyer, Some(MeetingStatus::Pending)).unwrap();
    assert_eq!(theirs.len(), 2);
    assert!(meetings::list_for_user(&mut conn, &buyer, Some(MeetingStatus::Accepted))
        .unwrap()
        .is_empty());
}

#[test]
fn disabling_meetings_expires_every_pending_request() {
    let Some(mut conn) = connection() else { return };
    let seller = user(&mut conn, UserRole::Seller);
    let day = future_day();

    let mut pending = Vec::new();
    let mut accepted = Vec::new();
    for i in 0..5u32 {
        let buyer = user(&mut conn, UserRole::Buyer);
        let s = slot(&mut conn, seller.id, at(day, 9 + i, 0));
        let m = meetings::create_request(&mut conn, &buyer, &request(seller.id, Some(s.id))).unwrap();
        if i < 2 {
            meetings::respond(&mut conn, m.id, &seller, Transition::Accept).unwrap();
            accepted.push((m.id, s.id));
        } else {
            pending.push((m.id, s.id));
        }
    }

    let outcome = toggle::set_enabled(&mut conn, false, DEADLINE).unwrap();
    assert!(outcome.changed);
    for (meeting_id, _) in &pending {
        assert!(outcome.expired.contains(meeting_id));
    }
    for (meeting_id, _) in &accepted {
        assert!(!outcome.expired.contains(meeting_id));
    }

    for (meeting_id, slot_id) in &pending {
        let status = meetings_table::table
            .find(*meeting_id)
            .select(meetings_table::status)
            .first::<MeetingStatus>(&mut conn)
            .unwrap();
        assert_eq!(status, MeetingStatus::Cancelled);
        assert!(reload_slot(&mut conn, *slot_id).is_available);
    }
    for (meeting_id, slot_id) in &accepted {
        let status = meetings_table::table
            .find(*meeting_id)
            .select(meetings_table::status)
            .first::<MeetingStatus>(&mut conn)
            .unwrap();
        assert_eq!(status, MeetingStatus::Accepted);
        assert!(!reload_slot(&mut conn, *slot_id).is_available);
    }

    let buyer = user(&mut conn, UserRole::Buyer);
    let err = meetings::create_request(&mut conn, &buyer, &request(seller.id, None)).unwrap_err();
    assert_eq!(err.kind(), "DISABLED");

    let again = toggle::set_enabled(&mut conn, false, DEADLINE).unwrap();
    assert!(!again.changed);
    assert!(again.expired.is_empty());
}

#[test]
fn accommodation_capacity_is_enforced() {
    let Some(mut conn) = connection() else { return };
    let property_id = diesel::insert_into(host_properties::table)
        .values((host_properties::name.eq("Harbour View"), host_properties::rooms_allotted.eq(2)))
        .returning(host_properties::id)
        .get_result::<i32>(&mut conn)
        .unwrap();

    let allocate = |conn: &mut PgConnection, room_type: &str| {
        let buyer = user(conn, UserRole::Buyer);
        let request = ValidatedAllocation::try_from(AllocateAccommodationRequest {
            host_property_id: property_id,
            room_type: room_type.into(),
            check_in: future_day(),
            check_out: future_day() + Duration::days(3),
            booking_ref: None,
            notes: None,
        })
        .unwrap();
        accommodation::allocate(conn, buyer.id, request)
    };

    let a = allocate(&mut conn, "shared").unwrap();
    assert!(a.travel_plan_created);
    assert_eq!((a.host_property.property.rooms_allocated, a.host_property.property.current_guests), (0, 1));

    let a = allocate(&mut conn, "shared").unwrap();
    assert_eq!((a.host_property.property.rooms_allocated, a.host_property.property.current_guests), (1, 2));

    let a = allocate(&mut conn, "single").unwrap();
    assert_eq!((a.host_property.property.rooms_allocated, a.host_property.property.current_guests), (2, 4));
    assert_eq!(a.host_property.rooms_available, 0);
    let last_single = a.accommodation.id;

    let err = allocate(&mut conn, "single").unwrap_err();
    assert_eq!(err.kind(), "CAPACITY");

    let property = host_properties::table
        .find(property_id)
        .select(HostProperty::as_select())
        .first(&mut conn)
        .unwrap();
    assert_eq!((property.rooms_allocated, property.current_guests), (2, 4));
    let booked: i64 = accommodations::table
        .filter(accommodations::host_property_id.eq(property_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(booked, 3);

    let after = accommodation::deallocate(&mut conn, last_single).unwrap();
    assert_eq!((after.property.rooms_allocated, after.property.current_guests), (1, 2));
}

#[test]
fn invalid_metadata_leaves_config_unchanged() {
    let Some(mut conn) = connection() else { return };
    let before = settings::initialize(&mut conn).unwrap();

    let wire = MeetingMetadata {
        meeting_duration: Some(5),
        ..Default::default()
    };
    let err = ScheduleUpdate::try_from(wire)
        .and_then(|update| settings::update(&mut conn, update))
        .unwrap_err();
    assert_eq!(err.kind(), "VALIDATION");
    assert_eq!(settings::load(&mut conn).unwrap(), before);
}

#[test]
fn cache_reflects_writes_made_through_it() {
    let Some(mut conn) = connection() else { return };
    let cache = ScheduleCache::new();

    cache
        .write(&mut conn, |conn| toggle::set_enabled(conn, true, DEADLINE))
        .unwrap();
    assert!(cache.get_or_load(&mut conn).unwrap().meetings_enabled);

    cache
        .write(&mut conn, |conn| toggle::set_enabled(conn, false, DEADLINE))
        .unwrap();
    assert!(!cache.get_or_load(&mut conn).unwrap().meetings_enabled);

    let updated = cache
        .write(&mut conn, |conn| {
            settings::update(
                conn,
                ScheduleUpdate {
                    meeting_duration: Some(45),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    let cached = cache.get_or_load(&mut conn).unwrap();
    assert_eq!(cached, updated);
    assert_eq!(cached.meeting_duration, 45);
    assert!(!cached.meetings_enabled);

    let err = cache
        .write(&mut conn, |conn| {
            settings::update(
                conn,
                ScheduleUpdate {
                    meeting_duration: Some(5),
                    ..Default::default()
                },
            )
        })
        .unwrap_err();
    assert_eq!(err.kind(), "VALIDATION");
    assert_eq!(cache.get_or_load(&mut conn).unwrap().meeting_duration, 45);
}
