// Types shared by the framer (server side) and the relay (client side)

pub mod frame;
pub mod types;

pub use frame::*;
pub use types::*;
