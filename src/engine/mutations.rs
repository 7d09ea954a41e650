use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, require_non_empty, validate_facility_name, validate_user};
use super::{Engine, EngineError};

impl Engine {
    pub fn create_facility(&self, name: &str) -> Result<FacilityInfo, EngineError> {
        validate_facility_name(name)?;
        if self.facilities.len() >= MAX_FACILITIES {
            return Err(EngineError::LimitExceeded("too many facilities"));
        }

        let info = match self.facilities.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateFacility(name.to_string())),
            Entry::Vacant(slot) => {
                let fs = FacilityState::new(name.to_string(), self.next_seq());
                let info = fs.info();
                slot.insert(Arc::new(RwLock::new(fs)));
                info
            }
        };

        metrics::gauge!(crate::observability::FACILITIES_ACTIVE).set(self.facilities.len() as f64);
        info!(facility = name, "facility created");
        Ok(info)
    }

    /// Remove a facility and every booking on it. Returns how many bookings
    /// were dropped.
    pub async fn delete_facility(&self, name: &str) -> Result<usize, EngineError> {
        require_non_empty("facility name", name)?;
        let (_, fs) = self
            .facilities
            .remove(name)
            .ok_or_else(|| EngineError::FacilityNotFound(name.to_string()))?;

        // Anyone who cloned the handle before the removal sees `retired`
        // once they get the lock.
        let mut guard = fs.write().await;
        guard.retired = true;
        let dropped = guard.bookings.len();
        guard.bookings.clear();
        drop(guard);

        metrics::gauge!(crate::observability::FACILITIES_ACTIVE).set(self.facilities.len() as f64);
        info!(facility = name, dropped, "facility deleted");
        Ok(dropped)
    }

    /// Overwrite the hourly rate. Existing bookings keep the cost they were
    /// priced at.
    pub async fn set_hourly_rate(&self, name: &str, rate: f64) -> Result<FacilityInfo, EngineError> {
        self.apply_rate(name, || validate_rate(rate)).await
    }

    /// Like [`set_hourly_rate`](Self::set_hourly_rate) but takes the rate as
    /// text. The facility is looked up before the text is parsed.
    pub async fn set_hourly_rate_text(&self, name: &str, raw: &str) -> Result<FacilityInfo, EngineError> {
        self.apply_rate(name, || parse_rate(raw)).await
    }

    async fn apply_rate(
        &self,
        name: &str,
        rate: impl FnOnce() -> Result<f64, EngineError>,
    ) -> Result<FacilityInfo, EngineError> {
        let mut guard = self.facility_write(name).await?;
        let rate = rate()?;
        guard.hourly_rate = rate;
        debug!(facility = name, rate, "hourly rate set");
        Ok(guard.info())
    }

    pub async fn create_booking(
        &self,
        facility: &str,
        user: &str,
        start: &str,
        end: &str,
    ) -> Result<BookingInfo, EngineError> {
        require_non_empty("facility name", facility)?;
        validate_user(user)?;
        let mut guard = self.facility_write(facility).await?;
        let span = parse_span(start, end)?;

        if let Err(e) = check_no_conflict(&guard, &span, None) {
            debug!(facility, user, start, end, "booking rejected: {e}");
            return Err(e);
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_FACILITY {
            return Err(EngineError::LimitExceeded("too many bookings on facility"));
        }

        let booking = Booking {
            user: user.to_string(),
            span,
            cost: guard.cost_of(&span),
        };
        let created = guard.booking_info(&booking);
        guard.bookings.push(booking);
        debug!(facility, user, start, end, cost = created.cost, "booking created");
        Ok(created)
    }

    /// Move the first booking made by `user` to a new interval and reprice it
    /// at the current rate.
    ///
    /// Sibling bookings are only consulted when the engine was built with
    /// [`EngineOptions::recheck_overlap_on_update`](super::EngineOptions).
    pub async fn update_booking(
        &self,
        facility: &str,
        user: &str,
        new_start: &str,
        new_end: &str,
    ) -> Result<BookingInfo, EngineError> {
        require_non_empty("facility name", facility)?;
        require_non_empty("user", user)?;
        let mut guard = self.facility_write(facility).await?;
        let span = parse_span(new_start, new_end)?;

        let pos = guard.position_by_user(user).ok_or_else(|| EngineError::BookingNotFound {
            facility: facility.to_string(),
            user: user.to_string(),
        })?;
        if self.options.recheck_overlap_on_update {
            check_no_conflict(&guard, &span, Some(pos))?;
        }

        let cost = guard.cost_of(&span);
        let booking = &mut guard.bookings[pos];
        booking.span = span;
        booking.cost = cost;
        let updated = guard.booking_info(&guard.bookings[pos]);
        debug!(facility, user, new_start, new_end, cost, "booking updated");
        Ok(updated)
    }

    /// Remove the first booking matching both `user` and the exact start time.
    pub async fn delete_booking(
        &self,
        facility: &str,
        user: &str,
        start: &str,
    ) -> Result<BookingInfo, EngineError> {
        require_non_empty("facility name", facility)?;
        require_non_empty("user", user)?;
        let mut guard = self.facility_write(facility).await?;
        let start_ts = parse_timestamp(start)?;

        let pos = guard
            .position_by_user_and_start(user, &start_ts)
            .ok_or_else(|| EngineError::BookingNotFound {
                facility: facility.to_string(),
                user: user.to_string(),
            })?;
        let removed = guard.bookings.remove(pos);
        debug!(facility, user, start, "booking deleted");
        Ok(guard.booking_info(&removed))
    }
}
