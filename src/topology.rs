//! Initial topology: either loaded from config (`/topology/chassis`) or
//! synthesized by the deterministic generator of §6.8.

use crate::config::TopologyConfig;
use crate::domain::{Board, BoardType, Chassis, CHASSIS_COUNT, SLOTS_PER_CHASSIS};

/// Builds the 9x14 topology from `config`, falling back to the
/// deterministic generator when the config's chassis list is empty.
pub fn build_topology(config: &TopologyConfig) -> Vec<Chassis> {
    if config.chassis.is_empty() {
        generate_default_topology()
    } else {
        config
            .chassis
            .iter()
            .map(|cfg| {
                let mut chassis = Chassis::new(cfg.chassis_number, cfg.chassis_name.clone());
                for board_cfg in &cfg.boards {
                    let board = Board::new(
                        board_cfg.board_number,
                        board_cfg.board_address.clone(),
                        BoardType::from_ordinal(board_cfg.board_type),
                    );
                    chassis.update_board_by_slot(board_cfg.board_number, board);
                }
                chassis
            })
            .collect()
    }
}

/// Deterministic address formula (§6.8):
/// - slot 1..5:  `192.168.(c*2).((slot-1)*32+5)`
/// - slot 6:     `192.168.(c*2).170`
/// - slot 7:     `192.168.(c*2).180`
/// - slot 8..12: `192.168.(c*2+1).((slot-8)*32+5)`
/// - slot 13:    `192.168.(c*2).182`
/// - slot 14:    `192.168.(c*2).183`
pub fn slot_address(chassis_number: u32, slot: u32) -> String {
    match slot {
        1..=5 => format!(
            "192.168.{}.{}",
            chassis_number * 2,
            (slot - 1) * 32 + 5
        ),
        6 => format!("192.168.{}.170", chassis_number * 2),
        7 => format!("192.168.{}.180", chassis_number * 2),
        8..=12 => format!(
            "192.168.{}.{}",
            chassis_number * 2 + 1,
            (slot - 8) * 32 + 5
        ),
        13 => format!("192.168.{}.182", chassis_number * 2),
        14 => format!("192.168.{}.183", chassis_number * 2),
        _ => String::new(),
    }
}

/// Slot 6/7 are `EthernetSwitch`; everything else defaults to `Computing`
/// (the generator has no way to know the real hardware mix).
fn slot_board_type(slot: u32) -> BoardType {
    match slot {
        6 | 7 => BoardType::EthernetSwitch,
        _ => BoardType::Computing,
    }
}

pub fn generate_default_topology() -> Vec<Chassis> {
    (1..=CHASSIS_COUNT)
        .map(|chassis_number| {
            let mut chassis = Chassis::new(chassis_number, format!("chassis-{chassis_number}"));
            for slot in 1..=SLOTS_PER_CHASSIS {
                let board = Board::new(slot, slot_address(chassis_number, slot), slot_board_type(slot));
                chassis.update_board_by_slot(slot, board);
            }
            chassis
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_produces_9_chassis_of_14_boards() {
        let topology = generate_default_topology();
        assert_eq!(topology.len(), 9);
        for chassis in &topology {
            assert_eq!(chassis.boards().len(), 14);
        }
    }

    #[test]
    fn address_formula_matches_spec_examples() {
        assert_eq!(slot_address(1, 1), "192.168.2.5");
        assert_eq!(slot_address(1, 5), "192.168.2.133");
        assert_eq!(slot_address(1, 6), "192.168.2.170");
        assert_eq!(slot_address(1, 7), "192.168.2.180");
        assert_eq!(slot_address(1, 8), "192.168.3.5");
        assert_eq!(slot_address(1, 13), "192.168.2.182");
        assert_eq!(slot_address(1, 14), "192.168.2.183");
        assert_eq!(slot_address(3, 1), "192.168.6.5");
    }

    #[test]
    fn config_topology_overrides_generator() {
        let cfg = TopologyConfig {
            chassis: vec![crate::config::ChassisConfig {
                chassis_number: 1,
                chassis_name: "custom".into(),
                boards: vec![crate::config::BoardConfig {
                    board_number: 1,
                    board_address: "10.1.1.1".into(),
                    board_type: 1,
                }],
            }],
        };
        let topology = build_topology(&cfg);
        assert_eq!(topology.len(), 1);
        assert_eq!(topology[0].name, "custom");
        assert_eq!(topology[0].board_by_slot(1).unwrap().address, "10.1.1.1");
    }
}
