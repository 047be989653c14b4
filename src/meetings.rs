//! Meeting requests between buyers and sellers.
//!
//! Every mutation runs in one transaction that locks the meeting row and, when a
//! slot is involved, the slot row. The partial unique indexes on
//! `meetings(buyer_id, seller_id)` and `time_slots(meeting_id)` back the same rules
//! at the storage level, so a lost race surfaces as `CONFLICT`.

use std::fmt;

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::auth::AuthUser;
use crate::error::ServiceError;
use crate::models::{Meeting, MeetingStatus, MeetingView, NewMeeting, TimeSlot, UserRole};
use crate::settings;
use crate::slots::local_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Accept,
    Reject,
    Cancel,
    Complete,
    /// System-driven cancellation when meetings are switched off.
    Expire,
}

impl Transition {
    pub fn verb(&self) -> &'static str {
        match self {
            Transition::Accept => "accept",
            Transition::Reject => "reject",
            Transition::Cancel => "cancel",
            Transition::Complete => "complete",
            Transition::Expire => "expire",
        }
    }

    /// Whether the meeting gives its slot back after this transition.
    pub fn releases_slot(&self) -> bool {
        !matches!(self, Transition::Accept)
    }

    /// Parses the body of `PUT /meetings/{id}/status`.
    pub fn from_requested_status(status: &str) -> Result<Transition, ServiceError> {
        let status = status
            .parse::<MeetingStatus>()
            .map_err(ServiceError::Validation)?;
        match status {
            MeetingStatus::Accepted => Ok(Transition::Accept),
            MeetingStatus::Rejected => Ok(Transition::Reject),
            MeetingStatus::Cancelled => Ok(Transition::Cancel),
            MeetingStatus::Completed => Ok(Transition::Complete),
            MeetingStatus::Pending => Err(ServiceError::validation(
                "status must be one of ACCEPTED, REJECTED, CANCELLED, COMPLETED",
            )),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// The meeting state machine. Anything not listed is a `CONFLICT`.
pub fn next_status(current: MeetingStatus, transition: Transition) -> Result<MeetingStatus, ServiceError> {
    use MeetingStatus::*;

    match (current, transition) {
        (Pending, Transition::Accept) => Ok(Accepted),
        (Pending, Transition::Reject) => Ok(Rejected),
        (Pending | Accepted, Transition::Cancel) => Ok(Cancelled),
        (Accepted, Transition::Complete) => Ok(Completed),
        (Pending, Transition::Expire) => Ok(Cancelled),
        (from, t) => Err(ServiceError::conflict(format!(
            "cannot {} a meeting that is {}",
            t, from
        ))),
    }
}

/// Who may drive `transition` on `meeting`.
pub fn authorize(meeting: &Meeting, actor: &AuthUser, transition: Transition) -> Result<(), ServiceError> {
    match transition {
        Transition::Accept | Transition::Reject => {
            if actor.is_admin() {
                return Ok(());
            }
            if !meeting.is_participant(actor.id) {
                return Err(ServiceError::forbidden("not a participant of this meeting"));
            }
            if meeting.requestor_id == actor.id {
                return Err(ServiceError::forbidden(format!("cannot {} own request", transition)));
            }
            Ok(())
        }
        Transition::Cancel => {
            if actor.is_admin() || meeting.is_participant(actor.id) {
                Ok(())
            } else {
                Err(ServiceError::forbidden("not a participant of this meeting"))
            }
        }
        Transition::Complete | Transition::Expire => {
            if actor.is_admin() {
                Ok(())
            } else {
                Err(ServiceError::forbidden(format!("only admins may {} meetings", transition)))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeetingRequest {
    pub counterparty_id: i32,
    pub time_slot_id: Option<i32>,
    pub notes: Option<String>,
}

fn load_role(conn: &mut PgConnection, user_id: i32) -> Result<UserRole, ServiceError> {
    use crate::schema::users::dsl::{id, role, users};

    users
        .filter(id.eq(user_id))
        .select(role)
        .first::<UserRole>(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("User {} not found", user_id)))
}

fn live_meetings_on_day(
    conn: &mut PgConnection,
    buyer: i32,
    day_start: NaiveDateTime,
) -> Result<i64, ServiceError> {
    use crate::schema::{meetings, time_slots};

    let count = meetings::table
        .inner_join(time_slots::table)
        .filter(meetings::buyer_id.eq(buyer))
        .filter(meetings::status.eq_any(MeetingStatus::LIVE))
        .filter(time_slots::start_time.ge(day_start))
        .filter(time_slots::start_time.lt(day_start + Duration::days(1)))
        .count()
        .get_result(conn)?;
    Ok(count)
}

/// Creates a PENDING meeting from `requestor` to the counterparty, holding the slot if one is given.
pub fn create_request(
    conn: &mut PgConnection,
    requestor: &AuthUser,
    request: &MeetingRequest,
) -> Result<Meeting, ServiceError> {
    use crate::schema::meetings::dsl as m;
    use crate::schema::time_slots::dsl as ts;

    conn.transaction(|conn| {
        if !settings::meetings_enabled_locked(conn, false)? {
            return Err(ServiceError::Disabled);
        }

        let expected = requestor
            .role
            .counterpart()
            .ok_or_else(|| ServiceError::validation("only buyers and sellers can request meetings"))?;
        let counterparty_role = load_role(conn, request.counterparty_id)?;
        if counterparty_role != expected {
            return Err(ServiceError::validation(format!(
                "counterparty {} must be a {}",
                request.counterparty_id, expected
            )));
        }
        let (buyer, seller) = match requestor.role {
            UserRole::Buyer => (requestor.id, request.counterparty_id),
            _ => (request.counterparty_id, requestor.id),
        };

        let existing: Option<i32> = m::meetings
            .filter(m::buyer_id.eq(buyer))
            .filter(m::seller_id.eq(seller))
            .filter(m::status.eq_any(MeetingStatus::LIVE))
            .select(m::id)
            .for_update()
            .first(conn)
            .optional()?;
        if let Some(existing_id) = existing {
            return Err(ServiceError::conflict(format!(
                "an active meeting ({}) already exists between buyer {} and seller {}",
                existing_id, buyer, seller
            )));
        }

        if let Some(slot_id) = request.time_slot_id {
            let slot = ts::time_slots
                .filter(ts::id.eq(slot_id))
                .select(TimeSlot::as_select())
                .for_update()
                .first::<TimeSlot>(conn)
                .optional()?
                .ok_or_else(|| ServiceError::not_found(format!("Time slot {} not found", slot_id)))?;

            if slot.user_id != seller {
                return Err(ServiceError::conflict("time slot does not belong to the seller"));
            }
            if !slot.is_available {
                return Err(ServiceError::conflict("time slot is no longer available"));
            }
            if slot.start_time <= local_now() {
                return Err(ServiceError::conflict("time slot has already started"));
            }

            let cap = settings::load(conn)?.max_buyer_meetings_per_day;
            let day_start = slot.start_time.date().and_time(chrono::NaiveTime::default());
            if live_meetings_on_day(conn, buyer, day_start)? >= cap {
                return Err(ServiceError::conflict(format!(
                    "buyer {} already has {} meetings on {}",
                    buyer,
                    cap,
                    slot.start_time.date()
                )));
            }
        }

        let meeting = diesel::insert_into(m::meetings)
            .values(&NewMeeting {
                buyer_id: buyer,
                seller_id: seller,
                requestor_id: requestor.id,
                time_slot_id: request.time_slot_id,
                status: MeetingStatus::Pending,
                notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            })
            .returning(Meeting::as_returning())
            .get_result::<Meeting>(conn)?;

        if let Some(slot_id) = request.time_slot_id {
            diesel::update(ts::time_slots.filter(ts::id.eq(slot_id)))
                .set((ts::is_available.eq(false), ts::meeting_id.eq(Some(meeting.id))))
                .execute(conn)?;
        }

        log::info!(
            "Meeting {} requested by user {} (buyer {}, seller {}, slot {:?})",
            meeting.id, requestor.id, buyer, seller, meeting.time_slot_id
        );
        Ok(meeting)
    })
}

/// Gives a slot back to the pool if it is still held by `holder`.
pub(crate) fn release_slot(conn: &mut PgConnection, slot_id: i32, holder: i32) -> Result<usize, ServiceError> {
    use crate::schema::time_slots::dsl::{id, is_available, meeting_id, time_slots};

    let released = diesel::update(
        time_slots
            .filter(id.eq(slot_id))
            .filter(meeting_id.eq(Some(holder))),
    )
    .set((is_available.eq(true), meeting_id.eq(None::<i32>)))
    .execute(conn)?;
    Ok(released)
}

/// Applies `transition` to a meeting. `actor` is `None` for system-driven transitions.
pub fn transition(
    conn: &mut PgConnection,
    meeting_id: i32,
    actor: Option<&AuthUser>,
    transition: Transition,
) -> Result<Meeting, ServiceError> {
    use crate::schema::meetings::dsl::{id, meetings, status, updated_at};

    conn.transaction(|conn| {
        let meeting = meetings
            .filter(id.eq(meeting_id))
            .select(Meeting::as_select())
            .for_update()
            .first::<Meeting>(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(format!("Meeting {} not found", meeting_id)))?;

        let next = next_status(meeting.status, transition)?;
        if let Some(actor) = actor {
            authorize(&meeting, actor, transition)?;
        }

        let updated = diesel::update(meetings.filter(id.eq(meeting_id)))
            .set((status.eq(next), updated_at.eq(Utc::now().naive_utc())))
            .returning(Meeting::as_returning())
            .get_result::<Meeting>(conn)?;

        if transition.releases_slot() {
            if let Some(slot_id) = meeting.time_slot_id {
                release_slot(conn, slot_id, meeting.id)?;
            }
        }

        log::info!(
            "Meeting {} moved {} -> {} ({} by {})",
            meeting.id,
            meeting.status,
            next,
            transition,
            actor.map(|a| a.id.to_string()).unwrap_or_else(|| "system".to_string())
        );
        Ok(updated)
    })
}

pub fn respond(
    conn: &mut PgConnection,
    meeting_id: i32,
    actor: &AuthUser,
    decision: Transition,
) -> Result<Meeting, ServiceError> {
    if !matches!(decision, Transition::Accept | Transition::Reject) {
        return Err(ServiceError::validation("a response must accept or reject"));
    }
    transition(conn, meeting_id, Some(actor), decision)
}

pub fn cancel(conn: &mut PgConnection, meeting_id: i32, actor: &AuthUser) -> Result<Meeting, ServiceError> {
    transition(conn, meeting_id, Some(actor), Transition::Cancel)
}

/// Marks an ACCEPTED meeting completed, by an admin or, with `actor = None`, when its slot ends.
pub fn mark_completed(
    conn: &mut PgConnection,
    meeting_id: i32,
    actor: Option<&AuthUser>,
) -> Result<Meeting, ServiceError> {
    transition(conn, meeting_id, actor, Transition::Complete)
}

pub fn slot_of(conn: &mut PgConnection, meeting: &Meeting) -> Result<Option<TimeSlot>, ServiceError> {
    use crate::schema::time_slots::dsl::{id, time_slots};

    match meeting.time_slot_id {
        Some(slot_id) => Ok(time_slots
            .filter(id.eq(slot_id))
            .select(TimeSlot::as_select())
            .first::<TimeSlot>(conn)
            .optional()?),
        None => Ok(None),
    }
}

/// Meetings visible to `user`: their own as buyer or seller, everything for admins.
pub fn list_for_user(
    conn: &mut PgConnection,
    user: &AuthUser,
    status_filter: Option<MeetingStatus>,
) -> Result<Vec<MeetingView>, ServiceError> {
    use crate::schema::{meetings, time_slots};

    let mut query = meetings::table
        .left_join(time_slots::table)
        .select((
            Meeting::as_select(),
            time_slots::start_time.nullable(),
            time_slots::end_time.nullable(),
        ))
        .order(meetings::created_at.desc())
        .into_boxed();

    query = match user.role {
        UserRole::Buyer => query.filter(meetings::buyer_id.eq(user.id)),
        UserRole::Seller => query.filter(meetings::seller_id.eq(user.id)),
        UserRole::Admin => query,
    };
    if let Some(wanted) = status_filter {
        query = query.filter(meetings::status.eq(wanted));
    }

    let rows = query.load::<(Meeting, Option<NaiveDateTime>, Option<NaiveDateTime>)>(conn)?;
    Ok(rows
        .into_iter()
        .map(|(meeting, slot_start, slot_end)| MeetingView {
            meeting,
            slot_start,
            slot_end,
        })
        .collect())
}
