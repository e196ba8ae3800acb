pub mod dealer;
pub mod pot;
pub mod rules;
pub mod shared;
pub mod state;

pub use shared::*;
pub use state::{HandSetup, HandState};
