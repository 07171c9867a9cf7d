//! Transactional listing operations.
//!
//! Each mutation opens a transaction and locks the ticket row before any
//! state check, so two requests racing on the same ticket are serialized and
//! the loser observes the winner's write.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    bid::{Bid, BidStatus},
    event::Event,
    money::Money,
    purchase::{NewPurchase, Purchase},
    ticket::{ListingTerms, ListingType, NewTicket, SeatInfo, Ticket, TicketStatus},
    user::User,
};
use crate::services::lifecycle::{self, MarketError, ResellPlan};
use crate::services::notifier::Notifier;
use crate::services::payment::{CardDetails, PaymentError, PaymentGateway};

#[derive(Debug, Clone)]
pub struct CreateListing {
    pub event_id: Uuid,
    pub terms: ListingTerms,
    pub seat: SeatInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sale {
    pub ticket: Ticket,
    pub purchase: Purchase,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedBid {
    pub ticket: Ticket,
    pub bid: Bid,
    pub purchase: Purchase,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Smallest bid the auction currently accepts; absent when bidding is closed
    pub minimum_bid: Option<Money>,
}

#[tracing::instrument(skip(pool, seller, request), fields(seller_id = %seller.id, event_id = %request.event_id))]
pub async fn create_listing(
    pool: &PgPool,
    seller: &User,
    request: CreateListing,
) -> Result<Ticket, MarketError> {
    lifecycle::ensure_active(seller)?;

    Event::find_by_id(pool, request.event_id)
        .await?
        .ok_or(MarketError::NotFound("Event"))?;

    let mut conn = pool.acquire().await?;
    let ticket = Ticket::insert(
        &mut conn,
        NewTicket {
            event_id: request.event_id,
            seller_id: seller.id,
            terms: request.terms,
            seat: request.seat,
            resold_from: None,
        },
    )
    .await?;

    tracing::info!(
        ticket_id = %ticket.id,
        listing_type = ?ticket.listing_type,
        price = %ticket.price,
        "Listing created"
    );

    Ok(ticket)
}

/// Buys a direct-sale ticket.
///
/// The card is charged while the ticket row is locked; a decline rolls the
/// transaction back and the ticket stays available.
#[tracing::instrument(skip(pool, payments, notifier, buyer, card), fields(buyer_id = %buyer.id))]
pub async fn purchase_ticket(
    pool: &PgPool,
    payments: &dyn PaymentGateway,
    notifier: &Notifier,
    buyer: &User,
    ticket_id: Uuid,
    card: CardDetails,
) -> Result<Sale, MarketError> {
    lifecycle::ensure_active(buyer)?;

    let mut tx = pool.begin().await?;

    let ticket = Ticket::lock_by_id(&mut tx, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;
    lifecycle::check_purchasable(&ticket, buyer.id)?;

    let receipt = payments
        .charge(ticket.price, card)
        .await
        .map_err(|e| match e {
            PaymentError::Declined(reason) => MarketError::PaymentDeclined(reason),
            PaymentError::Unavailable(reason) => {
                tracing::error!(error = %reason, "Payment processor unavailable");
                MarketError::PaymentUnavailable
            }
        })?;

    let sold = Ticket::mark_sold(&mut tx, ticket.id, buyer.id).await?;
    let purchase = Purchase::insert(
        &mut tx,
        NewPurchase {
            ticket_id: sold.id,
            buyer_id: buyer.id,
            seller_id: sold.seller_id,
            bid_id: None,
            amount: sold.price,
            payment_reference: Some(receipt.transaction_id.clone()),
        },
    )
    .await?;

    if let Err(e) = tx.commit().await {
        tracing::error!(
            ticket_id = %ticket.id,
            transaction_id = %receipt.transaction_id,
            error = %e,
            "Charge succeeded but sale could not be recorded"
        );
        return Err(e.into());
    }

    tracing::info!(
        ticket_id = %sold.id,
        purchase_id = %purchase.id,
        amount = %purchase.amount,
        "Ticket purchased"
    );

    notify_sale(pool, notifier, &sold, buyer, purchase.amount, false).await;

    Ok(Sale {
        ticket: sold,
        purchase,
    })
}

#[tracing::instrument(skip(pool, bidder), fields(bidder_id = %bidder.id))]
pub async fn place_bid(
    pool: &PgPool,
    bidder: &User,
    ticket_id: Uuid,
    amount: Money,
) -> Result<Bid, MarketError> {
    lifecycle::ensure_active(bidder)?;

    if !amount.is_positive() {
        return Err(MarketError::Validation(
            "Bid amount must be greater than zero".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let ticket = Ticket::lock_by_id(&mut tx, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;
    lifecycle::check_biddable(&ticket, bidder.id, Utc::now())?;

    let highest = Bid::highest_standing(&mut tx, ticket.id).await?;
    let minimum = lifecycle::minimum_bid(ticket.price, highest)?;
    lifecycle::check_bid_amount(amount, minimum)?;

    let bid = Bid::insert(&mut tx, ticket.id, bidder.id, amount).await?;
    tx.commit().await?;

    tracing::info!(bid_id = %bid.id, amount = %bid.amount, "Bid placed");

    Ok(bid)
}

#[tracing::instrument(skip(pool, notifier, seller), fields(seller_id = %seller.id))]
pub async fn accept_bid(
    pool: &PgPool,
    notifier: &Notifier,
    seller: &User,
    bid_id: Uuid,
) -> Result<AcceptedBid, MarketError> {
    lifecycle::ensure_active(seller)?;

    let ticket_id = Bid::find_by_id(pool, bid_id)
        .await?
        .ok_or(MarketError::NotFound("Bid"))?
        .ticket_id;

    let mut tx = pool.begin().await?;

    let ticket = Ticket::lock_by_id(&mut tx, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;
    let bid = Bid::lock_by_id(&mut tx, bid_id)
        .await?
        .ok_or(MarketError::NotFound("Bid"))?;
    lifecycle::check_acceptable(&ticket, &bid, seller.id)?;

    let bid = Bid::set_status(&mut tx, bid.id, BidStatus::Accepted).await?;
    let sold = Ticket::mark_sold(&mut tx, ticket.id, bid.bidder_id).await?;
    let purchase = Purchase::insert(
        &mut tx,
        NewPurchase {
            ticket_id: sold.id,
            buyer_id: bid.bidder_id,
            seller_id: sold.seller_id,
            bid_id: Some(bid.id),
            amount: bid.amount,
            payment_reference: None,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        ticket_id = %sold.id,
        bid_id = %bid.id,
        purchase_id = %purchase.id,
        amount = %bid.amount,
        "Bid accepted"
    );

    notify_bid_accepted(pool, notifier, &sold, &bid).await;

    Ok(AcceptedBid {
        ticket: sold,
        bid,
        purchase,
    })
}

#[tracing::instrument(skip(pool, seller), fields(seller_id = %seller.id))]
pub async fn reject_bid(pool: &PgPool, seller: &User, bid_id: Uuid) -> Result<Bid, MarketError> {
    lifecycle::ensure_active(seller)?;

    let ticket_id = Bid::find_by_id(pool, bid_id)
        .await?
        .ok_or(MarketError::NotFound("Bid"))?
        .ticket_id;

    let mut tx = pool.begin().await?;

    let ticket = Ticket::lock_by_id(&mut tx, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;
    let bid = Bid::lock_by_id(&mut tx, bid_id)
        .await?
        .ok_or(MarketError::NotFound("Bid"))?;
    lifecycle::check_rejectable(&ticket, &bid, seller.id)?;

    let bid = Bid::set_status(&mut tx, bid.id, BidStatus::Rejected).await?;
    tx.commit().await?;

    tracing::info!(bid_id = %bid.id, ticket_id = %ticket.id, "Bid rejected");

    Ok(bid)
}

/// Takes a listing off sale. The ticket stays with its seller, no purchase
/// is created and any pending bids are rejected.
#[tracing::instrument(skip(pool, seller), fields(seller_id = %seller.id))]
pub async fn cancel_listing(
    pool: &PgPool,
    seller: &User,
    ticket_id: Uuid,
) -> Result<Ticket, MarketError> {
    lifecycle::ensure_active(seller)?;

    let mut tx = pool.begin().await?;

    let ticket = Ticket::lock_by_id(&mut tx, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;
    lifecycle::check_cancellable(&ticket, seller.id)?;

    let ticket = Ticket::unlist(&mut tx, ticket.id).await?;
    let rejected = Bid::reject_pending(&mut tx, ticket.id).await?;
    tx.commit().await?;

    tracing::info!(ticket_id = %ticket.id, rejected_bids = rejected, "Listing cancelled");

    Ok(ticket)
}

#[tracing::instrument(skip(pool, owner, terms), fields(owner_id = %owner.id))]
pub async fn resell_ticket(
    pool: &PgPool,
    owner: &User,
    ticket_id: Uuid,
    terms: ListingTerms,
) -> Result<Ticket, MarketError> {
    lifecycle::ensure_active(owner)?;

    let mut tx = pool.begin().await?;

    let ticket = Ticket::lock_by_id(&mut tx, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;
    let already_resold = if ticket.status == TicketStatus::Sold {
        Ticket::is_resold(&mut tx, ticket.id).await?
    } else {
        false
    };

    let listed = match lifecycle::plan_resell(&ticket, owner.id, already_resold)? {
        ResellPlan::Relist => {
            // A relisted ticket starts a fresh auction
            Bid::reject_pending(&mut tx, ticket.id).await?;
            Ticket::relist(&mut tx, ticket.id, terms).await?
        }
        ResellPlan::NewListing => {
            Ticket::insert(
                &mut tx,
                NewTicket {
                    event_id: ticket.event_id,
                    seller_id: owner.id,
                    terms,
                    seat: ticket.seat_info(),
                    resold_from: Some(ticket.id),
                },
            )
            .await?
        }
    };

    tx.commit().await?;

    tracing::info!(
        ticket_id = %listed.id,
        resold_from = ?listed.resold_from,
        price = %listed.price,
        "Ticket listed for resale"
    );

    Ok(listed)
}

pub async fn ticket_detail(pool: &PgPool, ticket_id: Uuid) -> Result<TicketDetail, MarketError> {
    let ticket = Ticket::find_by_id(pool, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;

    let bidding_open = ticket.listing_type == ListingType::Auction
        && ticket.status == TicketStatus::Available
        && ticket.is_listed
        && ticket.end_time.is_some_and(|end| Utc::now() < end);

    let minimum_bid = if bidding_open {
        let mut conn = pool.acquire().await?;
        let highest = Bid::highest_standing(&mut conn, ticket.id).await?;
        Some(lifecycle::minimum_bid(ticket.price, highest)?)
    } else {
        None
    };

    Ok(TicketDetail {
        ticket,
        minimum_bid,
    })
}

/// Bids on a ticket as seen by `viewer`: sellers and admins see every bid,
/// everyone else only their own
pub async fn visible_bids(pool: &PgPool, viewer: &User, ticket_id: Uuid) -> Result<Vec<Bid>, MarketError> {
    let ticket = Ticket::find_by_id(pool, ticket_id)
        .await?
        .ok_or(MarketError::NotFound("Ticket"))?;

    let bids = Bid::list_by_ticket(pool, ticket.id).await?;
    if ticket.seller_id == viewer.id || viewer.is_admin() {
        return Ok(bids);
    }

    Ok(bids.into_iter().filter(|b| b.bidder_id == viewer.id).collect())
}

async fn notify_bid_accepted(pool: &PgPool, notifier: &Notifier, ticket: &Ticket, bid: &Bid) {
    match User::find_by_id(pool, bid.bidder_id).await {
        Ok(Some(bidder)) => notify_sale(pool, notifier, ticket, &bidder, bid.amount, true).await,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(ticket_id = %ticket.id, bid_id = %bid.id, error = %e, "Could not load bidder for notification");
        }
    }
}

/// Emails both sides of a completed sale. Lookup failures are logged and
/// never surface to the caller.
async fn notify_sale(
    pool: &PgPool,
    notifier: &Notifier,
    ticket: &Ticket,
    buyer: &User,
    amount: Money,
    via_bid: bool,
) {
    let event = match Event::find_by_id(pool, ticket.event_id).await {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(ticket_id = %ticket.id, error = %e, "Could not load event for notification");
            return;
        }
    };

    let buyer_email = if via_bid {
        notifier.bid_accepted_notice(buyer, &event, ticket, amount)
    } else {
        notifier.purchase_confirmation(buyer, &event, ticket, amount)
    };
    notifier.dispatch(buyer_email);

    match User::find_by_id(pool, ticket.seller_id).await {
        Ok(Some(seller)) => notifier.dispatch(notifier.sale_notice(&seller, &event, ticket, amount)),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(ticket_id = %ticket.id, error = %e, "Could not load seller for notification");
        }
    }
}
