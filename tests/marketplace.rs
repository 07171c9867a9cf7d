//! Listing lifecycle scenarios against a real Postgres.
//!
//! Run with `DATABASE_URL=postgres://… cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;

use ticket_market::models::{
    bid::BidStatus,
    event::{CreateEventData, Event},
    money::Money,
    purchase::Purchase,
    ticket::{ListingTerms, SeatInfo, Ticket, TicketStatus},
    user::{CreateUserData, User, UserRole},
};
use ticket_market::services::{
    lifecycle::MarketError,
    marketplace::{self, CreateListing},
    notifier::{ConsoleMailer, Notifier},
    payment::{CardDetails, CardInput, SimulatedPaymentGateway},
};

async fn user(pool: &PgPool, name: &str) -> User {
    User::create(
        pool,
        CreateUserData {
            email: format!("{}@example.com", name),
            display_name: name.to_string(),
            role: UserRole::User,
        },
    )
    .await
    .unwrap()
}

async fn event(pool: &PgPool) -> Event {
    Event::create(
        pool,
        CreateEventData {
            title: "Indie Night".to_string(),
            venue: "Blue Frog".to_string(),
            starts_at: Utc::now() + Duration::days(30),
            capacity: 300,
            category: "music".to_string(),
            description: None,
        },
    )
    .await
    .unwrap()
}

async fn list(pool: &PgPool, seller: &User, event: &Event, terms: ListingTerms) -> Ticket {
    marketplace::create_listing(
        pool,
        seller,
        CreateListing {
            event_id: event.id,
            terms,
            seat: SeatInfo {
                section: Some("A".to_string()),
                row: Some("3".to_string()),
                seat: Some("14".to_string()),
            },
        },
    )
    .await
    .unwrap()
}

fn notifier() -> Notifier {
    Notifier::new(Arc::new(ConsoleMailer::new("test@example.com")), "http://localhost")
}

fn card() -> CardDetails {
    CardDetails::parse(
        CardInput {
            cardholder_name: "Meera Iyer".to_string(),
            card_number: "4242424242424242".to_string(),
            expiry_month: 12,
            expiry_year: 2099,
            cvc: "123".to_string(),
        },
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
    )
    .unwrap()
}

fn auction(price: Money) -> ListingTerms {
    ListingTerms::Auction {
        price,
        end_time: Utc::now() + Duration::hours(1),
    }
}

#[sqlx::test]
#[ignore]
async fn direct_sale_purchase_marks_ticket_sold(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let event = event(&pool).await;
    let ticket = list(
        &pool,
        &seller,
        &event,
        ListingTerms::DirectSale {
            price: Money::from_major(500),
        },
    )
    .await;

    let gateway = SimulatedPaymentGateway::new(1.0, StdDuration::ZERO);
    let sale = marketplace::purchase_ticket(&pool, &gateway, &notifier(), &buyer, ticket.id, card())
        .await
        .unwrap();

    assert_eq!(sale.ticket.status, TicketStatus::Sold);
    assert_eq!(sale.ticket.buyer_id, Some(buyer.id));
    assert_eq!(sale.purchase.amount, Money::from_major(500));
    assert!(sale.purchase.payment_reference.is_some());

    let stored = Purchase::find_by_ticket(&pool, ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.id, sale.purchase.id);

    // A second attempt finds the ticket gone
    let other = user(&pool, "latecomer").await;
    let again = marketplace::purchase_ticket(&pool, &gateway, &notifier(), &other, ticket.id, card()).await;
    assert!(matches!(again, Err(MarketError::Conflict(_))));
}

#[sqlx::test]
#[ignore]
async fn declined_payment_leaves_ticket_available(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let event = event(&pool).await;
    let ticket = list(
        &pool,
        &seller,
        &event,
        ListingTerms::DirectSale {
            price: Money::from_major(500),
        },
    )
    .await;

    let gateway = SimulatedPaymentGateway::new(0.0, StdDuration::ZERO);
    let result = marketplace::purchase_ticket(&pool, &gateway, &notifier(), &buyer, ticket.id, card()).await;
    assert!(matches!(result, Err(MarketError::PaymentDeclined(_))));

    let reloaded = Ticket::find_by_id(&pool, ticket.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TicketStatus::Available);
    assert!(Purchase::find_by_ticket(&pool, ticket.id).await.unwrap().is_none());
}

#[sqlx::test]
#[ignore]
async fn concurrent_purchases_sell_once(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let first = user(&pool, "first").await;
    let second = user(&pool, "second").await;
    let event = event(&pool).await;
    let ticket = list(
        &pool,
        &seller,
        &event,
        ListingTerms::DirectSale {
            price: Money::from_major(500),
        },
    )
    .await;

    let gateway = SimulatedPaymentGateway::new(1.0, StdDuration::from_millis(50));
    let notifier = notifier();
    let (a, b) = tokio::join!(
        marketplace::purchase_ticket(&pool, &gateway, &notifier, &first, ticket.id, card()),
        marketplace::purchase_ticket(&pool, &gateway, &notifier, &second, ticket.id, card()),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
}

#[sqlx::test]
#[ignore]
async fn auction_bid_then_accept(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let bidder = user(&pool, "bidder").await;
    let event = event(&pool).await;
    let ticket = list(&pool, &seller, &event, auction(Money::from_major(100))).await;

    let too_low = marketplace::place_bid(&pool, &bidder, ticket.id, Money::from_major(100)).await;
    assert!(matches!(too_low, Err(MarketError::Validation(_))));

    let bid = marketplace::place_bid(&pool, &bidder, ticket.id, Money::from_major(150))
        .await
        .unwrap();
    assert_eq!(bid.status, BidStatus::Pending);

    let detail = marketplace::ticket_detail(&pool, ticket.id).await.unwrap();
    assert_eq!(detail.minimum_bid, Some(Money::from_major(165)));

    let accepted = marketplace::accept_bid(&pool, &notifier(), &seller, bid.id)
        .await
        .unwrap();
    assert_eq!(accepted.ticket.status, TicketStatus::Sold);
    assert_eq!(accepted.ticket.buyer_id, Some(bidder.id));
    assert_eq!(accepted.bid.status, BidStatus::Accepted);
    assert_eq!(accepted.purchase.amount, Money::from_major(150));
    assert_eq!(accepted.purchase.bid_id, Some(bid.id));
}

#[sqlx::test]
#[ignore]
async fn concurrent_accepts_on_one_ticket_yield_one_sale(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let alice = user(&pool, "alice").await;
    let bob = user(&pool, "bob").await;
    let event = event(&pool).await;
    let ticket = list(&pool, &seller, &event, auction(Money::from_major(100))).await;

    let first = marketplace::place_bid(&pool, &alice, ticket.id, Money::from_major(150))
        .await
        .unwrap();
    let second = marketplace::place_bid(&pool, &bob, ticket.id, Money::from_major(200))
        .await
        .unwrap();

    let notifier = notifier();
    let (a, b) = tokio::join!(
        marketplace::accept_bid(&pool, &notifier, &seller, first.id),
        marketplace::accept_bid(&pool, &notifier, &seller, second.id),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    assert!(matches!(a, Err(MarketError::Conflict(_))) || matches!(b, Err(MarketError::Conflict(_))));

    let accepted: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bids WHERE ticket_id = $1 AND status = 'ACCEPTED'")
        .bind(ticket.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(accepted, 1);
}

#[sqlx::test]
#[ignore]
async fn reject_leaves_ticket_untouched(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let bidder = user(&pool, "bidder").await;
    let event = event(&pool).await;
    let ticket = list(&pool, &seller, &event, auction(Money::from_major(100))).await;

    let bid = marketplace::place_bid(&pool, &bidder, ticket.id, Money::from_major(120))
        .await
        .unwrap();

    let not_seller = marketplace::reject_bid(&pool, &bidder, bid.id).await;
    assert!(matches!(not_seller, Err(MarketError::Forbidden(_))));

    let rejected = marketplace::reject_bid(&pool, &seller, bid.id).await.unwrap();
    assert_eq!(rejected.status, BidStatus::Rejected);

    let reloaded = Ticket::find_by_id(&pool, ticket.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TicketStatus::Available);
    assert!(reloaded.is_listed);
}

#[sqlx::test]
#[ignore]
async fn cancel_then_relist(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let event = event(&pool).await;
    let ticket = list(
        &pool,
        &seller,
        &event,
        ListingTerms::DirectSale {
            price: Money::from_major(500),
        },
    )
    .await;

    let cancelled = marketplace::cancel_listing(&pool, &seller, ticket.id).await.unwrap();
    assert!(!cancelled.is_listed);
    assert_eq!(cancelled.status, TicketStatus::Available);
    assert!(Purchase::find_by_ticket(&pool, ticket.id).await.unwrap().is_none());

    let held = Ticket::list_held_by(&pool, seller.id).await.unwrap();
    assert!(held.iter().any(|t| t.id == ticket.id));

    let relisted = marketplace::resell_ticket(&pool, &seller, ticket.id, auction(Money::from_major(400)))
        .await
        .unwrap();
    assert_eq!(relisted.id, ticket.id);
    assert!(relisted.is_listed);
    assert_eq!(relisted.price, Money::from_major(400));
}

#[sqlx::test]
#[ignore]
async fn buyer_resells_purchased_ticket_once(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let buyer = user(&pool, "buyer").await;
    let event = event(&pool).await;
    let ticket = list(
        &pool,
        &seller,
        &event,
        ListingTerms::DirectSale {
            price: Money::from_major(500),
        },
    )
    .await;

    let gateway = SimulatedPaymentGateway::new(1.0, StdDuration::ZERO);
    marketplace::purchase_ticket(&pool, &gateway, &notifier(), &buyer, ticket.id, card())
        .await
        .unwrap();

    let terms = ListingTerms::DirectSale {
        price: Money::from_major(650),
    };
    let resale = marketplace::resell_ticket(&pool, &buyer, ticket.id, terms)
        .await
        .unwrap();
    assert_ne!(resale.id, ticket.id);
    assert_eq!(resale.seller_id, buyer.id);
    assert_eq!(resale.resold_from, Some(ticket.id));
    assert_eq!(resale.seat.as_deref(), Some("14"));

    let twice = marketplace::resell_ticket(&pool, &buyer, ticket.id, terms).await;
    assert!(matches!(twice, Err(MarketError::Conflict(_))));
}

#[sqlx::test]
#[ignore]
async fn banned_user_cannot_bid(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let bidder = user(&pool, "bidder").await;
    let event = event(&pool).await;
    let ticket = list(&pool, &seller, &event, auction(Money::from_major(100))).await;

    let banned = User::set_banned(&pool, bidder.id, true).await.unwrap().unwrap();
    let result = marketplace::place_bid(&pool, &banned, ticket.id, Money::from_major(200)).await;

    assert!(matches!(result, Err(MarketError::Forbidden(_))));
}

#[sqlx::test]
#[ignore]
async fn relisted_direct_sale_refuses_old_bids(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let bidder = user(&pool, "bidder").await;
    let event = event(&pool).await;
    let ticket = list(&pool, &seller, &event, auction(Money::from_major(100))).await;

    let old_bid = marketplace::place_bid(&pool, &bidder, ticket.id, Money::from_major(150))
        .await
        .unwrap();

    marketplace::cancel_listing(&pool, &seller, ticket.id).await.unwrap();
    let terms = ListingTerms::DirectSale {
        price: Money::from_major(500),
    };
    marketplace::resell_ticket(&pool, &seller, ticket.id, terms)
        .await
        .unwrap();

    let result = marketplace::accept_bid(&pool, &notifier(), &seller, old_bid.id).await;
    assert!(matches!(result, Err(MarketError::Validation(_))));

    let reloaded = Ticket::find_by_id(&pool, ticket.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TicketStatus::Available);
    assert!(Purchase::find_by_ticket(&pool, ticket.id).await.unwrap().is_none());

    let bids = marketplace::visible_bids(&pool, &seller, ticket.id).await.unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].status, BidStatus::Rejected);
}

#[sqlx::test]
#[ignore]
async fn relisted_auction_starts_from_new_price(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let bidder = user(&pool, "bidder").await;
    let event = event(&pool).await;
    let ticket = list(&pool, &seller, &event, auction(Money::from_major(100))).await;

    marketplace::place_bid(&pool, &bidder, ticket.id, Money::from_major(150))
        .await
        .unwrap();

    marketplace::cancel_listing(&pool, &seller, ticket.id).await.unwrap();
    marketplace::resell_ticket(&pool, &seller, ticket.id, auction(Money::from_major(1000)))
        .await
        .unwrap();

    let detail = marketplace::ticket_detail(&pool, ticket.id).await.unwrap();
    assert_eq!(detail.minimum_bid, Some(Money::from_major(1100)));

    let low = marketplace::place_bid(&pool, &bidder, ticket.id, Money::from_major(200)).await;
    assert!(matches!(low, Err(MarketError::Validation(_))));
}

#[sqlx::test]
#[ignore]
async fn status_override_never_returns_to_available(pool: PgPool) {
    let seller = user(&pool, "seller").await;
    let event = event(&pool).await;
    let ticket = list(
        &pool,
        &seller,
        &event,
        ListingTerms::DirectSale {
            price: Money::from_major(500),
        },
    )
    .await;

    let expired = Ticket::set_status(&pool, ticket.id, TicketStatus::Expired)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(expired.status, TicketStatus::Expired);

    assert!(Ticket::set_status(&pool, ticket.id, TicketStatus::Available)
        .await
        .unwrap()
        .is_none());
    assert!(Ticket::set_status(&pool, ticket.id, TicketStatus::Reserved)
        .await
        .unwrap()
        .is_none());

    let reloaded = Ticket::find_by_id(&pool, ticket.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TicketStatus::Expired);
}
