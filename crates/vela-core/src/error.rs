//! Domain errors shared by the scalar and identifier types.
//!
//! Corresponds to the `DomainError` category of the error taxonomy:
//! currency mismatch in money arithmetic, negative quantity construction,
//! non-positive price construction, and malformed identifiers. Manual
//! `Display` + `std::error::Error`, no `thiserror`, matching the teacher
//! crate's error style throughout.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    EmptyIdentifier,
    MalformedInstrumentId { input: String },
    CurrencyMismatch { expected: String, found: String },
    NegativeQuantity,
    NonPositivePrice,
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::EmptyIdentifier => write!(f, "identifier must be a non-empty string"),
            DomainError::MalformedInstrumentId { input } => {
                write!(f, "malformed instrument id: {input:?}")
            }
            DomainError::CurrencyMismatch { expected, found } => {
                write!(f, "currency mismatch: expected {expected}, found {found}")
            }
            DomainError::NegativeQuantity => write!(f, "quantity must be non-negative"),
            DomainError::NonPositivePrice => write!(f, "price must be strictly positive"),
        }
    }
}

impl std::error::Error for DomainError {}
