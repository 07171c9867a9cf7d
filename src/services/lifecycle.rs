//! Listing lifecycle rules.
//!
//! Every check here is a pure function of the rows involved and the current
//! time. The transactional orchestration in `marketplace` locks the ticket
//! row first and then runs these checks against the locked state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    bid::{Bid, BidStatus},
    money::Money,
    ticket::{ListingTerms, ListingType, Ticket, TicketStatus},
    user::User,
};

/// No bid may ever be lower than one major unit.
pub const MIN_BID_FLOOR: Money = Money::from_major(1);

/// Each new bid must beat the reference amount by 10%.
const BID_INCREMENT_NUMERATOR: i64 = 11;
const BID_INCREMENT_DENOMINATOR: i64 = 10;

#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment processor unavailable")]
    PaymentUnavailable,
}

/// What a resell request does to the ticket it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResellPlan {
    /// The seller puts their own cancelled listing back on sale
    Relist,
    /// The buyer of a sold ticket lists it as a new ticket
    NewListing,
}

/// Builds listing terms from raw request fields
pub fn parse_listing_terms(
    listing_type: ListingType,
    price: Money,
    end_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<ListingTerms, MarketError> {
    if !price.is_positive() {
        return Err(MarketError::Validation(
            "Price must be greater than zero".to_string(),
        ));
    }

    match (listing_type, end_time) {
        (ListingType::DirectSale, None) => Ok(ListingTerms::DirectSale { price }),
        (ListingType::DirectSale, Some(_)) => Err(MarketError::Validation(
            "End time is only allowed for auctions".to_string(),
        )),
        (ListingType::Auction, None) => Err(MarketError::Validation(
            "Auctions require an end time".to_string(),
        )),
        (ListingType::Auction, Some(end_time)) if end_time <= now => Err(
            MarketError::Validation("Auction end time must be in the future".to_string()),
        ),
        (ListingType::Auction, Some(end_time)) => Ok(ListingTerms::Auction { price, end_time }),
    }
}

/// Banned users may read but never mutate
pub fn ensure_active(user: &User) -> Result<(), MarketError> {
    if user.banned {
        return Err(MarketError::Forbidden(
            "Your account has been banned".to_string(),
        ));
    }
    Ok(())
}

/// Smallest acceptable next bid.
///
/// The reference is the highest standing bid, or the listing price while no
/// bid has been placed. The result never drops below [`MIN_BID_FLOOR`].
pub fn minimum_bid(listing_price: Money, highest_bid: Option<Money>) -> Result<Money, MarketError> {
    let reference = highest_bid.unwrap_or(listing_price);
    let raised = reference
        .scale_ceil(BID_INCREMENT_NUMERATOR, BID_INCREMENT_DENOMINATOR)
        .ok_or_else(|| MarketError::Validation("Bid amount is out of range".to_string()))?;

    Ok(raised.max(MIN_BID_FLOOR))
}

fn ensure_open(ticket: &Ticket) -> Result<(), MarketError> {
    if ticket.status != TicketStatus::Available || !ticket.is_listed {
        return Err(MarketError::Conflict(
            "Ticket is no longer available".to_string(),
        ));
    }
    Ok(())
}

fn ensure_seller(ticket: &Ticket, user_id: Uuid) -> Result<(), MarketError> {
    if ticket.seller_id != user_id {
        return Err(MarketError::Forbidden(
            "Only the seller can manage this listing".to_string(),
        ));
    }
    Ok(())
}

pub fn check_purchasable(ticket: &Ticket, buyer_id: Uuid) -> Result<(), MarketError> {
    if ticket.seller_id == buyer_id {
        return Err(MarketError::Forbidden(
            "You cannot buy your own ticket".to_string(),
        ));
    }
    if ticket.listing_type != ListingType::DirectSale {
        return Err(MarketError::Validation(
            "Auction tickets can only be bought by bidding".to_string(),
        ));
    }
    ensure_open(ticket)
}

pub fn check_biddable(ticket: &Ticket, bidder_id: Uuid, now: DateTime<Utc>) -> Result<(), MarketError> {
    if ticket.seller_id == bidder_id {
        return Err(MarketError::Forbidden(
            "You cannot bid on your own ticket".to_string(),
        ));
    }
    if ticket.listing_type != ListingType::Auction {
        return Err(MarketError::Validation(
            "Ticket is not listed for auction".to_string(),
        ));
    }
    ensure_open(ticket)?;

    match ticket.end_time {
        Some(end_time) if now < end_time => Ok(()),
        _ => Err(MarketError::Conflict("Auction has ended".to_string())),
    }
}

pub fn check_bid_amount(amount: Money, minimum: Money) -> Result<(), MarketError> {
    if amount < minimum {
        return Err(MarketError::Validation(format!(
            "Bid must be at least {}",
            minimum
        )));
    }
    Ok(())
}

fn ensure_pending(bid: &Bid) -> Result<(), MarketError> {
    if bid.status != BidStatus::Pending {
        return Err(MarketError::Conflict(
            "Bid has already been decided".to_string(),
        ));
    }
    Ok(())
}

pub fn check_acceptable(ticket: &Ticket, bid: &Bid, seller_id: Uuid) -> Result<(), MarketError> {
    ensure_seller(ticket, seller_id)?;
    if ticket.listing_type != ListingType::Auction {
        return Err(MarketError::Validation(
            "Bids can only be accepted on auction listings".to_string(),
        ));
    }
    ensure_pending(bid)?;
    ensure_open(ticket)
}

pub fn check_rejectable(ticket: &Ticket, bid: &Bid, seller_id: Uuid) -> Result<(), MarketError> {
    ensure_seller(ticket, seller_id)?;
    ensure_pending(bid)
}

pub fn check_cancellable(ticket: &Ticket, seller_id: Uuid) -> Result<(), MarketError> {
    ensure_seller(ticket, seller_id)?;
    ensure_open(ticket)
}

pub fn plan_resell(ticket: &Ticket, user_id: Uuid, already_resold: bool) -> Result<ResellPlan, MarketError> {
    match ticket.status {
        TicketStatus::Sold => {
            if ticket.buyer_id != Some(user_id) {
                return Err(MarketError::Forbidden(
                    "Only the buyer can resell this ticket".to_string(),
                ));
            }
            if already_resold {
                return Err(MarketError::Conflict(
                    "Ticket has already been resold".to_string(),
                ));
            }
            Ok(ResellPlan::NewListing)
        }
        TicketStatus::Available => {
            ensure_seller(ticket, user_id)?;
            if ticket.is_listed {
                return Err(MarketError::Conflict(
                    "Ticket is already listed".to_string(),
                ));
            }
            Ok(ResellPlan::Relist)
        }
        TicketStatus::Reserved | TicketStatus::Expired => Err(MarketError::Conflict(
            "Ticket cannot be listed in its current state".to_string(),
        )),
    }
}
