//! Payment processing.
//!
//! The marketplace never talks to a real processor. `SimulatedPaymentGateway`
//! approves a configurable share of charges at random and declines the rest.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::money::Money;

pub type PaymentFuture = Pin<Box<dyn Future<Output = Result<PaymentReceipt, PaymentError>> + Send>>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("{0}")]
    Declined(String),

    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("Cardholder name is required")]
    MissingHolder,

    #[error("Card number is invalid")]
    InvalidNumber,

    #[error("Card expiry is invalid")]
    InvalidExpiry,

    #[error("Card has expired")]
    Expired,

    #[error("Card security code is invalid")]
    InvalidCvc,
}

/// Raw card fields as submitted by the buyer
#[derive(Debug, Clone, Deserialize)]
pub struct CardInput {
    pub cardholder_name: String,
    pub card_number: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvc: String,
}

/// Card fields that passed validation. The number is kept out of `Debug`.
#[derive(Clone)]
pub struct CardDetails {
    holder: String,
    number: String,
    expiry_month: u32,
    expiry_year: i32,
}

impl CardDetails {
    pub fn parse(input: CardInput, today: NaiveDate) -> Result<Self, CardError> {
        let holder = input.cardholder_name.trim().to_string();
        if holder.is_empty() {
            return Err(CardError::MissingHolder);
        }

        let number: String = input
            .card_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if !(12..=19).contains(&number.len())
            || !number.chars().all(|c| c.is_ascii_digit())
            || !luhn_valid(&number)
        {
            return Err(CardError::InvalidNumber);
        }

        if !(1..=12).contains(&input.expiry_month) {
            return Err(CardError::InvalidExpiry);
        }
        let expiry_year = match input.expiry_year {
            0..=99 => 2000 + input.expiry_year,
            1000..=9999 => input.expiry_year,
            _ => return Err(CardError::InvalidExpiry),
        };
        if (expiry_year, input.expiry_month) < (today.year(), today.month()) {
            return Err(CardError::Expired);
        }

        let cvc = input.cvc.trim();
        if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|c| c.is_ascii_digit()) {
            return Err(CardError::InvalidCvc);
        }

        Ok(Self {
            holder,
            number,
            expiry_month: input.expiry_month,
            expiry_year,
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn last_four(&self) -> &str {
        &self.number[self.number.len() - 4..]
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("holder", &self.holder)
            .field("last_four", &self.last_four())
            .field("expiry", &format_args!("{:02}/{}", self.expiry_month, self.expiry_year))
            .finish()
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub amount: Money,
    pub card_last_four: String,
}

pub trait PaymentGateway: Send + Sync {
    /// Charges the card. Any error is final for this attempt.
    fn charge(&self, amount: Money, card: CardDetails) -> PaymentFuture;
}

#[derive(Debug, Clone)]
pub struct SimulatedPaymentGateway {
    success_rate: f64,
    latency: Duration,
    rng: SystemRandom,
}

impl SimulatedPaymentGateway {
    pub fn new(success_rate: f64, latency: Duration) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            latency,
            rng: SystemRandom::new(),
        }
    }

    pub fn shared(success_rate: f64, latency: Duration) -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new(success_rate, latency))
    }

    /// Uniform draw in `[0, 1)`
    fn roll(&self) -> Result<f64, PaymentError> {
        let mut bytes = [0u8; 4];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| PaymentError::Unavailable("random source failed".to_string()))?;
        Ok(f64::from(u32::from_be_bytes(bytes)) / (f64::from(u32::MAX) + 1.0))
    }
}

impl PaymentGateway for SimulatedPaymentGateway {
    fn charge(&self, amount: Money, card: CardDetails) -> PaymentFuture {
        let latency = self.latency;
        let approved = self.roll().map(|roll| roll < self.success_rate);

        Box::pin(async move {
            tokio::time::sleep(latency).await;

            if !approved? {
                tracing::warn!(
                    amount = %amount,
                    card_last_four = %card.last_four(),
                    "Simulated payment declined"
                );
                return Err(PaymentError::Declined("Card declined by issuer".to_string()));
            }

            let transaction_id = format!("sim_txn_{}", Uuid::new_v4());

            tracing::info!(
                amount = %amount,
                transaction_id = %transaction_id,
                "Simulated payment approved"
            );

            Ok(PaymentReceipt {
                transaction_id,
                amount,
                card_last_four: card.last_four().to_string(),
            })
        })
    }
}
