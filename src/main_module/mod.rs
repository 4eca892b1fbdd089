//! Process wiring split from main.rs: health, routing, shutdown and background jobs

mod health;
mod server;
mod shutdown;
mod sweeper;

pub use health::*;
pub use server::*;
pub use shutdown::*;
pub use sweeper::*;
