use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use harbor_core::config::PortConfig;
use harbor_core::{BerthSlot, BerthState, CargoProfile, DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 过期释放的预留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiredReservation {
    pub slot_id: String,
    pub vessel_id: String,
    pub reserved_until: Option<DateTime<Utc>>,
}

/// 泊位注册表
///
/// 每个泊位有独立的互斥区，`available → reserved` 在该互斥区内以比较并交换完成。
/// 锁内不做任何 await。过期的预留视为可用，由 `sweep_expired` 定期回收。
#[derive(Debug)]
pub struct BerthRegistry {
    // configuration order is the first-fit order
    slots: Vec<Mutex<BerthSlot>>,
    index: HashMap<String, usize>,
}

impl BerthRegistry {
    pub fn new(slots: Vec<BerthSlot>) -> DispatchResult<Self> {
        let mut index = HashMap::with_capacity(slots.len());
        for (position, slot) in slots.iter().enumerate() {
            if index.insert(slot.id.clone(), position).is_some() {
                return Err(DispatchError::InvalidConfiguration(format!(
                    "泊位ID重复: {}",
                    slot.id
                )));
            }
        }
        Ok(Self {
            slots: slots.into_iter().map(Mutex::new).collect(),
            index,
        })
    }

    pub fn from_config(port: &PortConfig) -> DispatchResult<Self> {
        Self::new(port.berth_slots())
    }

    fn lock(slot: &Mutex<BerthSlot>) -> MutexGuard<'_, BerthSlot> {
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, slot_id: &str) -> DispatchResult<&Mutex<BerthSlot>> {
        self.index
            .get(slot_id)
            .map(|position| &self.slots[*position])
            .ok_or_else(|| DispatchError::no_berth(Some(slot_id.to_string()), "未知泊位"))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot_ids(&self) -> Vec<String> {
        self.slots.iter().map(|slot| Self::lock(slot).id.clone()).collect()
    }

    pub fn get(&self, slot_id: &str) -> Option<BerthSlot> {
        self.slot(slot_id).ok().map(|slot| Self::lock(slot).clone())
    }

    pub fn snapshot(&self) -> Vec<BerthSlot> {
        self.slots.iter().map(|slot| Self::lock(slot).clone()).collect()
    }

    fn reserve_locked(slot: &mut BerthSlot, vessel_id: &str, until: DateTime<Utc>) {
        slot.state = BerthState::Reserved;
        slot.assigned_vessel = Some(vessel_id.to_string());
        slot.reserved_until = Some(until);
    }

    /// Reserve one specific slot. Fails with `BerthConflict` when it is not available at `now`.
    pub fn try_reserve(
        &self,
        slot_id: &str,
        vessel_id: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DispatchResult<()> {
        let mut slot = Self::lock(self.slot(slot_id)?);
        if !slot.is_available(now) {
            return Err(DispatchError::BerthConflict {
                slot_id: slot_id.to_string(),
                holder: slot.assigned_vessel.clone(),
            });
        }
        Self::reserve_locked(&mut slot, vessel_id, until);
        debug!(slot_id = slot_id, vessel_id = vessel_id, until = %until, "泊位已预留");
        Ok(())
    }

    /// Reserve the first slot, in configuration order, that is available, physically fits the
    /// cargo at the given tide and passes `filter`. Returns the reserved slot id.
    pub fn reserve_first_fit<F>(
        &self,
        cargo: &CargoProfile,
        tide_level: f64,
        vessel_id: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
        filter: F,
    ) -> DispatchResult<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut fits_any = false;
        for slot in &self.slots {
            let mut slot = Self::lock(slot);
            if !slot.can_accept(cargo, tide_level) {
                continue;
            }
            fits_any = true;
            // another caller may have taken it since the last scan; move on to the next one
            if !slot.is_available(now) || !filter(&slot.id) {
                continue;
            }
            Self::reserve_locked(&mut slot, vessel_id, until);
            debug!(slot_id = %slot.id, vessel_id = vessel_id, "首个可用泊位已预留");
            return Ok(slot.id.clone());
        }

        let reason = if fits_any {
            "所有满足条件的泊位均已占用"
        } else {
            "没有泊位满足吃水或船长限制"
        };
        Err(DispatchError::no_berth(None, reason))
    }

    /// Release a reservation or occupancy. Only the holder may release.
    pub fn release(&self, slot_id: &str, vessel_id: &str) -> DispatchResult<()> {
        let mut slot = Self::lock(self.slot(slot_id)?);
        let held = matches!(slot.state, BerthState::Reserved | BerthState::Occupied)
            && slot.assigned_vessel.as_deref() == Some(vessel_id);
        if !held {
            warn!(slot_id = slot_id, vessel_id = vessel_id, "非持有者尝试释放泊位");
            return Err(DispatchError::BerthConflict {
                slot_id: slot_id.to_string(),
                holder: slot.assigned_vessel.clone(),
            });
        }
        slot.state = BerthState::Available;
        slot.assigned_vessel = None;
        slot.reserved_until = None;
        debug!(slot_id = slot_id, vessel_id = vessel_id, "泊位已释放");
        Ok(())
    }

    /// `reserved → occupied` for the holder of a live reservation
    pub fn occupy(&self, slot_id: &str, vessel_id: &str, now: DateTime<Utc>) -> DispatchResult<()> {
        let mut slot = Self::lock(self.slot(slot_id)?);
        let live = slot.state == BerthState::Reserved
            && !slot.reservation_expired(now)
            && slot.assigned_vessel.as_deref() == Some(vessel_id);
        if !live {
            return Err(DispatchError::BerthConflict {
                slot_id: slot_id.to_string(),
                holder: slot.assigned_vessel.clone(),
            });
        }
        slot.state = BerthState::Occupied;
        slot.reserved_until = None;
        info!(slot_id = slot_id, vessel_id = vessel_id, "船舶已靠泊");
        Ok(())
    }

    /// Enter or leave maintenance. Entering requires the slot to be available at `now`.
    pub fn set_maintenance(
        &self,
        slot_id: &str,
        maintenance: bool,
        now: DateTime<Utc>,
    ) -> DispatchResult<()> {
        let mut slot = Self::lock(self.slot(slot_id)?);
        if maintenance {
            if slot.state == BerthState::Maintenance {
                return Ok(());
            }
            if !slot.is_available(now) {
                return Err(DispatchError::BerthConflict {
                    slot_id: slot_id.to_string(),
                    holder: slot.assigned_vessel.clone(),
                });
            }
            slot.state = BerthState::Maintenance;
            slot.assigned_vessel = None;
            slot.reserved_until = None;
            info!(slot_id = slot_id, "泊位进入维护");
        } else if slot.state == BerthState::Maintenance {
            slot.state = BerthState::Available;
            info!(slot_id = slot_id, "泊位结束维护");
        }
        Ok(())
    }

    /// Return every expired reservation to `available`
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<ExpiredReservation> {
        let mut expired = Vec::new();
        for slot in &self.slots {
            let mut slot = Self::lock(slot);
            if !slot.reservation_expired(now) {
                continue;
            }
            expired.push(ExpiredReservation {
                slot_id: slot.id.clone(),
                vessel_id: slot.assigned_vessel.take().unwrap_or_default(),
                reserved_until: slot.reserved_until.take(),
            });
            slot.state = BerthState::Available;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "回收过期泊位预留");
        }
        expired
    }
}
