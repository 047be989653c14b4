//! The global meeting-request switch.

use std::time::Duration as StdDuration;

use chrono::Utc;
use diesel::prelude::*;

use crate::db::set_transaction_deadline;
use crate::error::ServiceError;
use crate::models::MeetingStatus;
use crate::settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub enabled: bool,
    pub changed: bool,
    /// Meetings cancelled because requests were switched off.
    pub expired: Vec<i32>,
}

impl ToggleOutcome {
    pub fn message(&self) -> String {
        match (self.changed, self.enabled) {
            (false, true) => "Meeting requests were already enabled".to_string(),
            (false, false) => "Meeting requests were already disabled".to_string(),
            (true, true) => "Meeting requests enabled".to_string(),
            (true, false) => format!(
                "Meeting requests disabled, {} pending meetings cancelled",
                self.expired.len()
            ),
        }
    }
}

/// Flips the switch. Turning it off cancels every PENDING meeting and frees its slot in the
/// same transaction, so no request created before the commit survives as PENDING.
///
/// The settings row is held `FOR UPDATE` for the whole transaction; request creation holds it
/// `FOR SHARE`, which orders every request strictly before or after the flip.
pub fn set_enabled(
    conn: &mut PgConnection,
    enabled: bool,
    deadline: StdDuration,
) -> Result<ToggleOutcome, ServiceError> {
    use crate::schema::meetings::dsl as m;
    use crate::schema::time_slots::dsl as ts;

    conn.transaction(|conn| {
        set_transaction_deadline(conn, deadline)?;

        let current = settings::meetings_enabled_locked(conn, true)?;
        if current == enabled {
            return Ok(ToggleOutcome {
                enabled,
                changed: false,
                expired: Vec::new(),
            });
        }
        settings::write_meetings_enabled(conn, enabled)?;

        let mut expired = Vec::new();
        if !enabled {
            expired = m::meetings
                .filter(m::status.eq(MeetingStatus::Pending))
                .select(m::id)
                .for_update()
                .load::<i32>(conn)?;

            if !expired.is_empty() {
                diesel::update(ts::time_slots.filter(ts::meeting_id.eq_any(&expired)))
                    .set((ts::is_available.eq(true), ts::meeting_id.eq(None::<i32>)))
                    .execute(conn)?;
                diesel::update(m::meetings.filter(m::id.eq_any(&expired)))
                    .set((
                        m::status.eq(MeetingStatus::Cancelled),
                        m::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;
            }
        }

        log::info!(
            "Meeting requests {} ({} pending meetings expired)",
            if enabled { "enabled" } else { "disabled" },
            expired.len()
        );
        Ok(ToggleOutcome {
            enabled,
            changed: true,
            expired,
        })
    })
}
