//! Price, Quantity, Money, and AccountBalance.
//!
//! Grounded on `original_source/nautilus_core/objects.py`'s `Price`,
//! `Quantity`, `Money`, and `AccountBalance` classes, reimplemented over
//! [`crate::decimal::Decimal`] instead of Python's `decimal.Decimal`.

use std::fmt;
use std::ops::Add;

use crate::currency::Currency;
use crate::decimal::Decimal;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Price(Decimal);

impl Price {
    /// Construct a price; must be strictly positive, per the invariant
    /// that order/market prices are never zero or negative except through
    /// explicit negation (used internally by P&L formulas, never as a
    /// standalone price).
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if !value.is_negative() && !value.is_zero() {
            Ok(Price(value))
        } else {
            Err(DomainError::NonPositivePrice)
        }
    }

    pub fn parse(input: &str, precision: u8) -> Result<Self, DomainError> {
        let value = Decimal::parse(input, precision)
            .map_err(|_| DomainError::NonPositivePrice)?;
        Price::new(value)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn precision(self) -> u8 {
        self.0.precision()
    }

    /// Negate for use inside a formula (e.g. unrealized P&L on a short
    /// position); the result is not itself a constructible `Price`.
    pub fn negated_decimal(self) -> Decimal {
        -self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value.is_negative() {
            Err(DomainError::NegativeQuantity)
        } else {
            Ok(Quantity(value))
        }
    }

    pub fn parse(input: &str, precision: u8) -> Result<Self, DomainError> {
        let value =
            Decimal::parse(input, precision).map_err(|_| DomainError::NegativeQuantity)?;
        Quantity::new(value)
    }

    pub fn zero(precision: u8) -> Self {
        Quantity(Decimal::zero(precision))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn precision(self) -> u8 {
        self.0.precision()
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl Add for Quantity {
    type Output = Quantity;
    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        let amount = amount.rescale(currency.precision());
        Money { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Money::new(Decimal::zero(currency.precision()), currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    fn check_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(DomainError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                found: other.currency.code().to_string(),
            })
        }
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        self.check_same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, DomainError> {
        self.check_same_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency.clone()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// `(total, locked, free)`, all in one currency. `free = total - locked`
/// is the caller's responsibility to maintain (per spec); the constructor
/// only checks that the three amounts share a currency.
#[derive(Debug, Clone)]
pub struct AccountBalance {
    total: Money,
    locked: Money,
    free: Money,
}

impl AccountBalance {
    pub fn new(total: Money, locked: Money, free: Money) -> Result<Self, DomainError> {
        total.check_same_currency(&locked)?;
        total.check_same_currency(&free)?;
        Ok(AccountBalance { total, locked, free })
    }

    pub fn total(&self) -> &Money {
        &self.total
    }

    pub fn locked(&self) -> &Money {
        &self.locked
    }

    pub fn free(&self) -> &Money {
        &self.free
    }

    pub fn currency(&self) -> &Currency {
        self.total.currency()
    }
}
