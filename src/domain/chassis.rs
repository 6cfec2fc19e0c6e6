use super::board::Board;
use super::SLOTS_PER_CHASSIS;

/// A physical enclosure with fixed 14 board slots, indexed 1..14. Chassis
/// exclusively owns its boards; there is no back-reference from `Board`.
#[derive(Debug, Clone)]
pub struct Chassis {
    pub number: u32,
    pub name: String,
    boards: Vec<Board>,
}

impl Chassis {
    pub fn new(number: u32, name: String) -> Self {
        let boards = (1..=SLOTS_PER_CHASSIS)
            .map(|slot| Board::new(slot, String::new(), super::BoardType::Computing))
            .collect();
        Self {
            number,
            name,
            boards,
        }
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn boards_mut(&mut self) -> &mut [Board] {
        &mut self.boards
    }

    pub fn board_by_slot(&self, slot: u32) -> Option<&Board> {
        if slot == 0 || slot > self.boards.len() as u32 {
            return None;
        }
        self.boards.get((slot - 1) as usize)
    }

    pub fn board_by_slot_mut(&mut self, slot: u32) -> Option<&mut Board> {
        if slot == 0 || slot > self.boards.len() as u32 {
            return None;
        }
        self.boards.get_mut((slot - 1) as usize)
    }

    pub fn board_by_address(&self, address: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.address == address)
    }

    /// Overwrites the board at `slot`. Returns `false` if `slot` is out of
    /// range; the slot itself (identity) never changes.
    pub fn update_board_by_slot(&mut self, slot: u32, mut board: Board) -> bool {
        if slot == 0 || slot > self.boards.len() as u32 {
            return false;
        }
        board.slot = slot;
        self.boards[(slot - 1) as usize] = board;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BoardType;

    #[test]
    fn fresh_chassis_has_14_slots() {
        let c = Chassis::new(1, "rack-1".into());
        assert_eq!(c.boards().len(), 14);
        assert!(c.board_by_slot(1).is_some());
        assert!(c.board_by_slot(14).is_some());
        assert!(c.board_by_slot(0).is_none());
        assert!(c.board_by_slot(15).is_none());
    }

    #[test]
    fn update_by_slot_preserves_slot_identity() {
        let mut c = Chassis::new(1, "rack-1".into());
        let board = Board::new(99, "10.0.0.5".into(), BoardType::Computing);
        assert!(c.update_board_by_slot(3, board));
        let b = c.board_by_slot(3).unwrap();
        assert_eq!(b.slot, 3);
        assert_eq!(b.address, "10.0.0.5");
    }

    #[test]
    fn find_by_address_scans_boards() {
        let mut c = Chassis::new(1, "rack-1".into());
        c.update_board_by_slot(2, Board::new(2, "10.0.0.2".into(), BoardType::Computing));
        assert!(c.board_by_address("10.0.0.2").is_some());
        assert!(c.board_by_address("10.0.0.99").is_none());
    }
}
