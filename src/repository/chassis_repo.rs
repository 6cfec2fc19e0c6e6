use std::collections::HashMap;

use parking_lot::Mutex;

use crate::domain::{Board, Chassis};
use crate::error::RepoError;

/// A board found by a cross-chassis lookup, together with the chassis
/// number and slot it was found at.
#[derive(Debug, Clone)]
pub struct LocatedBoard {
    pub chassis_number: u32,
    pub slot: u32,
    pub board: Board,
}

#[derive(Default)]
pub struct ChassisRepository {
    inner: Mutex<HashMap<u32, Chassis>>,
}

impl ChassisRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, chassis: Chassis) {
        self.inner.lock().insert(chassis.number, chassis);
    }

    pub fn find_by_number(&self, number: u32) -> Option<Chassis> {
        self.inner.lock().get(&number).cloned()
    }

    /// Linear scan over chassis, then a per-chassis address scan.
    pub fn find_by_board_address(&self, address: &str) -> Option<LocatedBoard> {
        let guard = self.inner.lock();
        for chassis in guard.values() {
            if let Some(board) = chassis.board_by_address(address) {
                return Some(LocatedBoard {
                    chassis_number: chassis.number,
                    slot: board.slot,
                    board: board.clone(),
                });
            }
        }
        None
    }

    /// Snapshot copy of every chassis, ordered by chassis number.
    pub fn get_all(&self) -> Vec<Chassis> {
        let guard = self.inner.lock();
        let mut all: Vec<Chassis> = guard.values().cloned().collect();
        all.sort_by_key(|c| c.number);
        all
    }

    pub fn update_board(
        &self,
        chassis_number: u32,
        slot: u32,
        board: Board,
    ) -> Result<(), RepoError> {
        let mut guard = self.inner.lock();
        let chassis = guard
            .get_mut(&chassis_number)
            .ok_or(RepoError::ChassisNotFound(chassis_number))?;
        if !chassis.update_board_by_slot(slot, board) {
            return Err(RepoError::SlotOutOfRange(slot));
        }
        Ok(())
    }

    /// Batch presence update from a BMC frame: `presence` maps slot number
    /// to in-socket (`true`)/not-present (`false`). Slots absent from the
    /// map are untouched.
    pub fn update_all_boards_status(
        &self,
        chassis_number: u32,
        presence: &HashMap<u32, bool>,
    ) -> Result<(), RepoError> {
        let mut guard = self.inner.lock();
        let chassis = guard
            .get_mut(&chassis_number)
            .ok_or(RepoError::ChassisNotFound(chassis_number))?;
        for (&slot, &present) in presence {
            if let Some(board) = chassis.board_by_slot_mut(slot) {
                board.apply_presence(present);
            }
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }
}
