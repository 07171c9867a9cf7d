// Services module - Business logic

pub mod lifecycle;
pub mod marketplace;
pub mod notifier;
pub mod payment;
pub mod token;
