//! Concurrent-safe stores for chassis and stacks.
//!
//! Each store holds its own `parking_lot::Mutex` and never holds that lock
//! across I/O or calls into other components (§4.1). Callers get owned
//! clones out of every read — mutating a clone never becomes visible until
//! it is explicitly re-submitted via `save`/`update_board` (redesign item 1:
//! value semantics over implicit shared mutable handles).

mod chassis_repo;
mod stack_repo;

pub use chassis_repo::{ChassisRepository, LocatedBoard};
pub use stack_repo::StackRepository;
