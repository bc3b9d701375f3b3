//! Saved payment methods.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::PaymentMethodId;

/// Reasons a set of payment details is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentDetailsError {
    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },
    #[error("{field} must be exactly four digits")]
    LastFour { field: &'static str },
    #[error("expiry month must be between 1 and 12 (got {0})")]
    ExpiryMonth(u8),
}

/// Kind-specific payment details. Each variant carries only its own fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentDetails {
    CreditCard {
        cardholder_name: String,
        last_four: String,
        expiry_month: u8,
        expiry_year: u16,
    },
    #[serde(rename = "paypal")]
    PayPal { email: Email },
    BankTransfer {
        account_name: String,
        bank_name: String,
        account_last_four: String,
    },
}

impl PaymentDetails {
    /// Check field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns the first constraint violated.
    pub fn validate(&self) -> Result<(), PaymentDetailsError> {
        match self {
            Self::CreditCard {
                cardholder_name,
                last_four,
                expiry_month,
                ..
            } => {
                require_non_empty(cardholder_name, "cardholder_name")?;
                require_last_four(last_four, "last_four")?;
                if !(1..=12).contains(expiry_month) {
                    return Err(PaymentDetailsError::ExpiryMonth(*expiry_month));
                }
                Ok(())
            }
            // Email is validated at construction
            Self::PayPal { .. } => Ok(()),
            Self::BankTransfer {
                account_name,
                bank_name,
                account_last_four,
            } => {
                require_non_empty(account_name, "account_name")?;
                require_non_empty(bank_name, "bank_name")?;
                require_last_four(account_last_four, "account_last_four")
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> PaymentKind {
        match self {
            Self::CreditCard { .. } => PaymentKind::CreditCard,
            Self::PayPal { .. } => PaymentKind::PayPal,
            Self::BankTransfer { .. } => PaymentKind::BankTransfer,
        }
    }

    /// Short label safe to show back to the customer.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::CreditCard {
                last_four,
                expiry_month,
                expiry_year,
                ..
            } => format!("Card ending {last_four} ({expiry_month:02}/{expiry_year})"),
            Self::PayPal { email } => format!("PayPal {}", email.masked()),
            Self::BankTransfer {
                bank_name,
                account_last_four,
                ..
            } => format!("{bank_name} account ending {account_last_four}"),
        }
    }
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), PaymentDetailsError> {
    if value.trim().is_empty() {
        return Err(PaymentDetailsError::EmptyField { field });
    }
    Ok(())
}

fn require_last_four(value: &str, field: &'static str) -> Result<(), PaymentDetailsError> {
    if value.len() != 4 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PaymentDetailsError::LastFour { field });
    }
    Ok(())
}

/// Discriminant of [`PaymentDetails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    CreditCard,
    #[serde(rename = "paypal")]
    PayPal,
    BankTransfer,
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreditCard => write!(f, "credit_card"),
            Self::PayPal => write!(f, "paypal"),
            Self::BankTransfer => write!(f, "bank_transfer"),
        }
    }
}

/// A saved payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    #[serde(flatten)]
    pub details: PaymentDetails,
    pub is_default: bool,
}

/// A new payment method before an ID is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentMethod {
    #[serde(flatten)]
    pub details: PaymentDetails,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial update for a [`PaymentMethod`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodPatch {
    /// Replacement details; may switch the payment kind.
    pub details: Option<PaymentDetails>,
    pub is_default: Option<bool>,
}
