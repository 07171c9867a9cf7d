// Models module - Database entity representations

pub mod bid;
pub mod event;
pub mod money;
pub mod purchase;
pub mod ticket;
pub mod user;

pub use bid::{Bid, BidStatus};
pub use event::Event;
pub use money::Money;
pub use purchase::Purchase;
pub use ticket::{ListingType, Ticket, TicketStatus};
pub use user::{User, UserRole};
