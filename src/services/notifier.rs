//! Transactional email.
//!
//! Sends are fire-and-forget: the `Notifier` spawns each delivery on the
//! runtime and only logs failures.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use html_escape::encode_text;

use crate::models::{event::Event, money::Money, ticket::Ticket, user::User};

pub type MailFuture = Pin<Box<dyn Future<Output = Result<(), MailError>> + Send>>;

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: Email) -> MailFuture;
}

/// Writes emails to the log instead of delivering them
#[derive(Debug, Clone)]
pub struct ConsoleMailer {
    from: String,
}

impl ConsoleMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl Mailer for ConsoleMailer {
    fn send(&self, email: Email) -> MailFuture {
        let from = self.from.clone();
        Box::pin(async move {
            tracing::info!(
                from = %from,
                to = %email.to,
                subject = %email.subject,
                body = %email.html_body,
                "Email sent (console)"
            );
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, base_url: impl Into<String>) -> Self {
        Self {
            mailer,
            base_url: base_url.into(),
        }
    }

    fn ticket_link(&self, ticket: &Ticket) -> String {
        format!("{}/tickets/{}", self.base_url.trim_end_matches('/'), ticket.id)
    }

    pub fn purchase_confirmation(&self, buyer: &User, event: &Event, ticket: &Ticket, amount: Money) -> Email {
        Email {
            to: buyer.email.clone(),
            subject: format!("Your ticket for {}", event.title),
            html_body: format!(
                "<p>Hi {},</p><p>You bought a ticket for <strong>{}</strong> at {} on {} for {}.</p><p><a href=\"{}\">View your ticket</a></p>",
                encode_text(&buyer.display_name),
                encode_text(&event.title),
                encode_text(&event.venue),
                event.starts_at.format("%Y-%m-%d %H:%M UTC"),
                amount,
                self.ticket_link(ticket),
            ),
        }
    }

    pub fn sale_notice(&self, seller: &User, event: &Event, ticket: &Ticket, amount: Money) -> Email {
        Email {
            to: seller.email.clone(),
            subject: format!("Your ticket for {} has sold", event.title),
            html_body: format!(
                "<p>Hi {},</p><p>Your ticket for <strong>{}</strong> sold for {}.</p><p><a href=\"{}\">View the sale</a></p>",
                encode_text(&seller.display_name),
                encode_text(&event.title),
                amount,
                self.ticket_link(ticket),
            ),
        }
    }

    pub fn bid_accepted_notice(&self, bidder: &User, event: &Event, ticket: &Ticket, amount: Money) -> Email {
        Email {
            to: bidder.email.clone(),
            subject: format!("Your bid for {} was accepted", event.title),
            html_body: format!(
                "<p>Hi {},</p><p>The seller accepted your bid of {} for <strong>{}</strong>.</p><p><a href=\"{}\">View your ticket</a></p>",
                encode_text(&bidder.display_name),
                amount,
                encode_text(&event.title),
                self.ticket_link(ticket),
            ),
        }
    }

    /// Queues the email for delivery and returns immediately
    pub fn dispatch(&self, email: Email) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            let to = email.to.clone();
            let subject = email.subject.clone();
            if let Err(e) = mailer.send(email).await {
                tracing::error!(to = %to, subject = %subject, error = %e, "Failed to send email");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    use crate::models::{
        ticket::{ListingType, TicketStatus},
        user::UserRole,
    };

    struct RecordingMailer {
        sent: Arc<Mutex<Vec<Email>>>,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, email: Email) -> MailFuture {
            self.sent.lock().unwrap().push(email);
            Box::pin(async { Ok(()) })
        }
    }

    struct FailingMailer;

    impl Mailer for FailingMailer {
        fn send(&self, _email: Email) -> MailFuture {
            Box::pin(async { Err(MailError::Delivery("smtp down".to_string())) })
        }
    }

    fn fixtures() -> (User, Event, Ticket) {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "buyer@example.com".to_string(),
            display_name: "Ravi <b>".to_string(),
            role: UserRole::User,
            banned: false,
            email_verified_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        let event = Event {
            id: Uuid::new_v4(),
            title: "Rock & Roll Night".to_string(),
            venue: "Arena".to_string(),
            starts_at: now,
            capacity: 500,
            category: "music".to_string(),
            description: None,
            created_at: now,
            updated_at: now,
        };
        let ticket = Ticket {
            id: Uuid::new_v4(),
            event_id: event.id,
            seller_id: Uuid::new_v4(),
            buyer_id: Some(user.id),
            price: Money::from_major(500),
            status: TicketStatus::Sold,
            listing_type: ListingType::DirectSale,
            end_time: None,
            is_listed: true,
            section: None,
            row_label: None,
            seat: None,
            resold_from: None,
            created_at: now,
            updated_at: now,
        };
        (user, event, ticket)
    }

    #[test]
    fn test_purchase_confirmation_escapes_user_content() {
        let notifier = Notifier::new(Arc::new(ConsoleMailer::new("noreply@example.com")), "https://tix.example/");
        let (user, event, ticket) = fixtures();

        let email = notifier.purchase_confirmation(&user, &event, &ticket, Money::from_major(500));

        assert_eq!(email.to, "buyer@example.com");
        assert!(email.html_body.contains("Rock &amp; Roll Night"));
        assert!(email.html_body.contains("Ravi &lt;b&gt;"));
        assert!(email.html_body.contains("500.00"));
        assert!(email
            .html_body
            .contains(&format!("https://tix.example/tickets/{}", ticket.id)));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::new(
            Arc::new(RecordingMailer { sent: Arc::clone(&sent) }),
            "https://tix.example",
        );
        let (user, event, ticket) = fixtures();

        notifier.dispatch(notifier.sale_notice(&user, &event, &ticket, Money::from_major(500)));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_mailer_failures() {
        let notifier = Notifier::new(Arc::new(FailingMailer), "https://tix.example");
        let (user, event, ticket) = fixtures();

        notifier.dispatch(notifier.bid_accepted_notice(&user, &event, &ticket, Money::from_major(150)));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
