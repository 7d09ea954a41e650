use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// All facilities in creation order. Empty engine → empty list.
    pub async fn list_facilities(&self) -> Vec<FacilityInfo> {
        let handles: Vec<_> = self.facilities.iter().map(|e| e.value().clone()).collect();
        let mut listed = Vec::with_capacity(handles.len());
        for fs in handles {
            let guard = fs.read().await;
            if !guard.retired {
                listed.push((guard.seq, guard.info()));
            }
        }
        listed.sort_by_key(|(seq, _)| *seq);
        listed.into_iter().map(|(_, info)| info).collect()
    }

    pub async fn get_facility_info(&self, name: &str) -> Result<FacilityInfo, EngineError> {
        let fs = self
            .get_facility(name)
            .ok_or_else(|| EngineError::FacilityNotFound(name.to_string()))?;
        let guard = fs.read().await;
        if guard.retired {
            return Err(EngineError::FacilityNotFound(name.to_string()));
        }
        Ok(guard.info())
    }

    /// Bookings of one facility in storage order.
    pub async fn list_bookings(&self, name: &str) -> Result<Vec<BookingInfo>, EngineError> {
        let fs = self
            .get_facility(name)
            .ok_or_else(|| EngineError::FacilityNotFound(name.to_string()))?;
        let guard = fs.read().await;
        if guard.retired {
            return Err(EngineError::FacilityNotFound(name.to_string()));
        }
        Ok(guard.bookings.iter().map(|b| guard.booking_info(b)).collect())
    }
}
