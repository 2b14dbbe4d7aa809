pub mod health;
pub mod payments;

pub use health::{health, ready};
pub use payments::publish_payment;
