//! End-to-end fixtures exercising the engine against concrete targets and specifications.
//!
//! Each module pairs a target (the thing the scheduler actually drives) with, where one
//! exists, a sequential reference [`checker::Specification`] to check it against. These are
//! the six scenarios this project is built to demonstrate: an atomic and a racy register, a
//! correct and a reorder-buggy FIFO queue, a park/unpark ping-pong, and a runaway spin
//! target that only ever exhausts the round budget — plus one extra fixture whose method
//! panics outright, exercising the engine's separate panic-handling path.

mod panicking;
mod ping_pong;
mod queue;
mod register;
mod spin;

pub use panicking::panicking_factory;
pub use ping_pong::ping_pong_factory;
pub use queue::{fifo_factory, racy_push_factory, QueueSpec};
pub use register::{atomic_factory, racy_add_factory, RegisterSpec};
pub use spin::spin_factory;
