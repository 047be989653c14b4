//! Host-property room allocation for buyers.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{
    Accommodation, AllocateAccommodationRequest, HostProperty, NewAccommodation, NewTravelPlan,
    RoomType, TravelPlan, UserRole,
};
use crate::settings;

pub const DEFAULT_EVENT_NAME: &str = "Splash25 Event";
const PLAN_STATUS: &str = "planned";

/// Rooms and guest-equivalents consumed by a property's bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub rooms_allocated: i32,
    pub current_guests: i32,
}

/// Two shared bookings fill one room; a single booking takes a room and counts as two guests.
pub fn occupancy(shared: i64, single: i64) -> Occupancy {
    Occupancy {
        rooms_allocated: (shared / 2 + single) as i32,
        current_guests: (shared + 2 * single) as i32,
    }
}

pub fn check_capacity(property: &HostProperty, next: Occupancy) -> Result<(), ServiceError> {
    if next.rooms_allocated > property.rooms_allotted {
        return Err(ServiceError::Capacity(format!(
            "Host property '{}' would need {} rooms but only {} are allotted",
            property.name, next.rooms_allocated, property.rooms_allotted
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct HostPropertyView {
    #[serde(flatten)]
    pub property: HostProperty,
    pub rooms_available: i32,
    pub is_available: bool,
}

impl From<HostProperty> for HostPropertyView {
    fn from(property: HostProperty) -> Self {
        Self {
            rooms_available: property.rooms_allotted - property.rooms_allocated,
            is_available: property.current_guests < 2 * property.rooms_allotted,
            property,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub accommodation: Accommodation,
    pub host_property: HostPropertyView,
    pub travel_plan_id: i32,
    pub travel_plan_created: bool,
}

#[derive(Debug, Clone)]
pub struct ValidatedAllocation {
    pub host_property_id: i32,
    pub room_type: RoomType,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub booking_ref: String,
    pub notes: Option<String>,
}

impl TryFrom<AllocateAccommodationRequest> for ValidatedAllocation {
    type Error = ServiceError;

    fn try_from(req: AllocateAccommodationRequest) -> Result<Self, Self::Error> {
        let room_type = req
            .room_type
            .trim()
            .to_ascii_lowercase()
            .parse::<RoomType>()
            .map_err(|_| ServiceError::validation("room_type must be 'single' or 'shared'"))?;
        if req.check_out <= req.check_in {
            return Err(ServiceError::validation("check_out must be after check_in"));
        }
        let booking_ref = req
            .booking_ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(generate_booking_ref);

        Ok(Self {
            host_property_id: req.host_property_id,
            room_type,
            check_in: req.check_in,
            check_out: req.check_out,
            booking_ref,
            notes: req.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

pub fn generate_booking_ref() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ACC-{}", hex[..8].to_ascii_uppercase())
}

fn lock_property(conn: &mut PgConnection, property_id: i32) -> Result<HostProperty, ServiceError> {
    use crate::schema::host_properties::dsl::{host_properties, id};

    host_properties
        .filter(id.eq(property_id))
        .select(HostProperty::as_select())
        .for_update()
        .first::<HostProperty>(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("Host property {} not found", property_id)))
}

fn count_bookings(conn: &mut PgConnection, property_id: i32) -> Result<Occupancy, ServiceError> {
    use crate::schema::accommodations::dsl::{accommodations, host_property_id, room_type};

    let types: Vec<RoomType> = accommodations
        .filter(host_property_id.eq(property_id))
        .select(room_type)
        .load(conn)?;
    let shared = types.iter().filter(|t| **t == RoomType::Shared).count() as i64;
    let single = types.len() as i64 - shared;
    Ok(occupancy(shared, single))
}

/// Recounts the property's bookings and stores the result, failing with `CAPACITY` on overflow.
/// The property row must already be locked by the caller's transaction.
fn recompute(conn: &mut PgConnection, property: &HostProperty) -> Result<HostProperty, ServiceError> {
    use crate::schema::host_properties::dsl::{current_guests, host_properties, id, rooms_allocated};

    let next = count_bookings(conn, property.id)?;
    check_capacity(property, next)?;

    Ok(diesel::update(host_properties.filter(id.eq(property.id)))
        .set((
            rooms_allocated.eq(next.rooms_allocated),
            current_guests.eq(next.current_guests),
        ))
        .returning(HostProperty::as_returning())
        .get_result::<HostProperty>(conn)?)
}

/// Returns the buyer's latest travel plan, creating one from the event settings if none exists.
fn travel_plan_for(
    conn: &mut PgConnection,
    buyer: i32,
    fallback: (NaiveDate, NaiveDate),
) -> Result<(TravelPlan, bool), ServiceError> {
    use crate::schema::travel_plans::dsl::{buyer_id, created_at, travel_plans};

    let existing = travel_plans
        .filter(buyer_id.eq(buyer))
        .order(created_at.desc())
        .select(TravelPlan::as_select())
        .first::<TravelPlan>(conn)
        .optional()?;
    if let Some(plan) = existing {
        return Ok((plan, false));
    }

    let event = settings::load(conn)?.event;
    let plan = NewTravelPlan {
        buyer_id: buyer,
        event_name: event.name.unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
        start_date: event.start_date.unwrap_or(fallback.0),
        end_date: event.end_date.unwrap_or(fallback.1),
        venue: event.venue,
        status: PLAN_STATUS.to_string(),
    };
    let created = diesel::insert_into(travel_plans)
        .values(&plan)
        .returning(TravelPlan::as_returning())
        .get_result::<TravelPlan>(conn)?;
    log::info!("Created travel plan {} for buyer {}", created.id, buyer);
    Ok((created, true))
}

pub fn allocate(
    conn: &mut PgConnection,
    buyer: i32,
    request: ValidatedAllocation,
) -> Result<Allocation, ServiceError> {
    use crate::schema::accommodations::dsl as a;
    use crate::schema::users::dsl as u;

    conn.transaction(|conn| {
        let role = u::users
            .filter(u::id.eq(buyer))
            .select(u::role)
            .first::<UserRole>(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(format!("Buyer {} not found", buyer)))?;
        if role != UserRole::Buyer {
            return Err(ServiceError::validation(format!("User {} is not a buyer", buyer)));
        }

        let property = lock_property(conn, request.host_property_id)?;
        let (plan, plan_created) = travel_plan_for(conn, buyer, (request.check_in, request.check_out))?;

        let duplicate: Option<i32> = a::accommodations
            .filter(a::travel_plan_id.eq(plan.id))
            .filter(a::buyer_id.eq(buyer))
            .select(a::id)
            .first(conn)
            .optional()?;
        if let Some(existing) = duplicate {
            return Err(ServiceError::conflict(format!(
                "Buyer {} already has accommodation {} for travel plan {}",
                buyer, existing, plan.id
            )));
        }

        let accommodation = diesel::insert_into(a::accommodations)
            .values(&NewAccommodation {
                travel_plan_id: plan.id,
                host_property_id: property.id,
                buyer_id: buyer,
                check_in: request.check_in,
                check_out: request.check_out,
                room_type: request.room_type,
                booking_ref: Some(request.booking_ref.clone()),
                notes: request.notes.clone(),
            })
            .returning(Accommodation::as_returning())
            .get_result::<Accommodation>(conn)?;

        let property = recompute(conn, &property)?;
        log::info!(
            "Allocated {} room at property {} to buyer {} ({} rooms, {} guests)",
            accommodation.room_type.as_str(),
            property.id,
            buyer,
            property.rooms_allocated,
            property.current_guests
        );

        Ok(Allocation {
            accommodation,
            host_property: property.into(),
            travel_plan_id: plan.id,
            travel_plan_created: plan_created,
        })
    })
}

/// Removes a booking and recounts its property.
pub fn deallocate(conn: &mut PgConnection, accommodation_id: i32) -> Result<HostPropertyView, ServiceError> {
    use crate::schema::accommodations::dsl::{accommodations, host_property_id, id};

    conn.transaction(|conn| {
        let property_id = accommodations
            .filter(id.eq(accommodation_id))
            .select(host_property_id)
            .first::<i32>(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(format!("Accommodation {} not found", accommodation_id)))?;

        let property = lock_property(conn, property_id)?;
        let deleted = diesel::delete(accommodations.filter(id.eq(accommodation_id))).execute(conn)?;
        if deleted == 0 {
            return Err(ServiceError::not_found(format!("Accommodation {} not found", accommodation_id)));
        }

        let property = recompute(conn, &property)?;
        log::info!("Deallocated accommodation {} from property {}", accommodation_id, property.id);
        Ok(property.into())
    })
}

pub fn list_host_properties(conn: &mut PgConnection) -> Result<Vec<HostPropertyView>, ServiceError> {
    use crate::schema::host_properties::dsl::{host_properties, name};

    let rows = host_properties
        .order(name.asc())
        .select(HostProperty::as_select())
        .load::<HostProperty>(conn)?;
    Ok(rows.into_iter().map(HostPropertyView::from).collect())
}
