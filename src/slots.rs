//! Time-slot materialization for sellers.
//!
//! Candidates start at `day_start_time` and advance by `duration + interval`. A
//! candidate that touches a break is discarded, never shifted to the break's end.

use std::time::Duration as StdDuration;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;

use crate::db::set_transaction_deadline;
use crate::error::ServiceError;
use crate::models::{NewTimeSlot, TimeSlot, UserRole};
use crate::settings::{self, ScheduleConfig};

/// Furthest day, counted from today, that slots may be generated for.
pub const GENERATION_HORIZON_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SlotWindow {
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

/// Wall-clock "now" for the event venue.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn validate_generation_range(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Result<(), ServiceError> {
    if from > to {
        return Err(ServiceError::validation("start_date must not be after end_date"));
    }
    if from < today {
        return Err(ServiceError::validation("start_date must not be in the past"));
    }
    if to > today + Duration::days(GENERATION_HORIZON_DAYS) {
        return Err(ServiceError::validation(format!(
            "end_date must be within {} days from today",
            GENERATION_HORIZON_DAYS
        )));
    }
    Ok(())
}

/// Candidate windows for one calendar day, already filtered for breaks and `now`.
pub fn plan_day(config: &ScheduleConfig, date: NaiveDate, now: NaiveDateTime) -> Vec<SlotWindow> {
    let duration = Duration::minutes(config.meeting_duration);
    let step = Duration::minutes(config.meeting_duration + config.meeting_interval);
    let day_end = date.and_time(config.day_end_time);

    let mut windows = Vec::new();
    if step <= Duration::zero() {
        return windows;
    }

    let mut start = date.and_time(config.day_start_time);
    while start + duration <= day_end {
        let end = start + duration;
        let in_break = config.breaks.iter().any(|b| b.intersects(start.time(), end.time()));
        if !in_break && start >= now {
            windows.push(SlotWindow { start, end });
        }
        start += step;
    }
    windows
}

/// Candidate windows for every day of the inclusive range.
pub fn plan_range(config: &ScheduleConfig, from: NaiveDate, to: NaiveDate, now: NaiveDateTime) -> Vec<SlotWindow> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .flat_map(|d| plan_day(config, d, now))
        .collect()
}

fn day_bounds(from: NaiveDate, to: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let lower = from.and_time(NaiveTime::default());
    let upper = (to + Duration::days(1)).and_time(NaiveTime::default());
    (lower, upper)
}

fn ensure_seller(conn: &mut PgConnection, seller_id: i32) -> Result<(), ServiceError> {
    use crate::schema::users::dsl::{id, role, users};

    let found: UserRole = users
        .filter(id.eq(seller_id))
        .select(role)
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("User {} not found", seller_id)))?;
    if found != UserRole::Seller {
        return Err(ServiceError::validation(format!("User {} is not a seller", seller_id)));
    }
    Ok(())
}

/// Materializes the seller's slots for `[from, to]`. Returns how many rows were created.
///
/// Idempotent: windows overlapping an existing slot of the seller are skipped, and the
/// `(user_id, start_time, end_time)` unique key absorbs concurrent duplicates.
pub fn generate(
    conn: &mut PgConnection,
    seller_id: i32,
    from: NaiveDate,
    to: NaiveDate,
    deadline: StdDuration,
) -> Result<usize, ServiceError> {
    use crate::schema::time_slots::dsl::{end_time, start_time, time_slots, user_id};

    let now = local_now();
    validate_generation_range(from, to, now.date())?;

    conn.transaction(|conn| {
        set_transaction_deadline(conn, deadline)?;
        ensure_seller(conn, seller_id)?;

        let config = settings::load(conn)?;
        let (lower, upper) = day_bounds(from, to);
        let existing: Vec<(NaiveDateTime, NaiveDateTime)> = time_slots
            .filter(user_id.eq(seller_id))
            .filter(start_time.lt(upper))
            .filter(end_time.gt(lower))
            .select((start_time, end_time))
            .load(conn)?;

        let fresh = plan_range(&config, from, to, now)
            .into_iter()
            .filter(|w| !existing.iter().any(|(s, e)| w.overlaps(*s, *e)))
            .map(|w| NewTimeSlot {
                user_id: seller_id,
                start_time: w.start,
                end_time: w.end,
                is_available: true,
            })
            .collect::<Vec<_>>();

        if fresh.is_empty() {
            return Ok(0);
        }

        let created = diesel::insert_into(time_slots)
            .values(&fresh)
            .on_conflict_do_nothing()
            .execute(conn)?;

        log::info!(
            "Generated {} time slots for seller {} between {} and {}",
            created, seller_id, from, to
        );
        Ok(created)
    })
}

pub fn list_for_owner(
    conn: &mut PgConnection,
    owner_id: i32,
    date: Option<NaiveDate>,
) -> Result<Vec<TimeSlot>, ServiceError> {
    use crate::schema::time_slots::dsl::{start_time, time_slots, user_id};

    let mut query = time_slots
        .filter(user_id.eq(owner_id))
        .select(TimeSlot::as_select())
        .order(start_time.asc())
        .into_boxed();

    if let Some(day) = date {
        let (lower, upper) = day_bounds(day, day);
        query = query.filter(start_time.ge(lower)).filter(start_time.lt(upper));
    }

    Ok(query.load::<TimeSlot>(conn)?)
}

/// Removes one slot of the owner. Booked slots stay, they anchor a meeting.
pub fn delete_one(conn: &mut PgConnection, owner_id: i32, slot_id: i32) -> Result<(), ServiceError> {
    use crate::schema::time_slots::dsl::{id, time_slots};

    conn.transaction(|conn| {
        let slot = time_slots
            .filter(id.eq(slot_id))
            .select(TimeSlot::as_select())
            .for_update()
            .first::<TimeSlot>(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(format!("Time slot {} not found", slot_id)))?;

        if slot.user_id != owner_id {
            return Err(ServiceError::forbidden("Time slot belongs to another seller"));
        }
        if !slot.is_available {
            return Err(ServiceError::conflict("Time slot is booked by a meeting"));
        }

        diesel::delete(time_slots.filter(id.eq(slot_id))).execute(conn)?;
        Ok(())
    })
}

/// Removes every still-available slot of the owner starting within `[from, to]`.
pub fn delete_range(
    conn: &mut PgConnection,
    owner_id: i32,
    from: NaiveDate,
    to: NaiveDate,
    deadline: StdDuration,
) -> Result<usize, ServiceError> {
    use crate::schema::time_slots::dsl::{is_available, start_time, time_slots, user_id};

    if from > to {
        return Err(ServiceError::validation("start_date must not be after end_date"));
    }
    let (lower, upper) = day_bounds(from, to);

    conn.transaction(|conn| {
        set_transaction_deadline(conn, deadline)?;
        let deleted = diesel::delete(
            time_slots
                .filter(user_id.eq(owner_id))
                .filter(is_available.eq(true))
                .filter(start_time.ge(lower))
                .filter(start_time.lt(upper)),
        )
        .execute(conn)?;

        log::info!("Deleted {} available time slots for seller {} between {} and {}", deleted, owner_id, from, to);
        Ok(deleted)
    })
}
