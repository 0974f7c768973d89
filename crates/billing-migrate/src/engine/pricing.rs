//! Package price points.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{LocalId, Record};
use crate::error::MigrateError;

/// Billing period unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
    Onetime,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::Onetime => "onetime",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            "onetime" => Ok(Period::Onetime),
            other => Err(MigrateError::Mapping(format!("Unknown period '{}'", other))),
        }
    }
}

/// One price of a package: term and period, amounts, currency.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub term: u32,
    pub period: Period,
    pub price: Decimal,
    pub setup_fee: Decimal,
    pub cancel_fee: Decimal,
    pub currency: String,
}

impl PricePoint {
    pub fn new(term: u32, period: Period, price: Decimal, currency: impl Into<String>) -> Self {
        Self {
            term,
            period,
            price,
            setup_fee: Decimal::ZERO,
            cancel_fee: Decimal::ZERO,
            currency: currency.into(),
        }
    }

    #[must_use]
    pub fn setup_fee(mut self, fee: Decimal) -> Self {
        self.setup_fee = fee;
        self
    }

    /// Identity key of this price point for a foreign package id.
    pub fn key(&self, remote_package: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            remote_package, self.term, self.period, self.currency
        )
    }

    pub fn to_record(&self, package_id: LocalId) -> Record {
        Record::new()
            .with("package_id", package_id)
            .with("term", i64::from(self.term))
            .with("period", self.period.as_str())
            .with("price", self.price)
            .with("setup_fee", self.setup_fee)
            .with("cancel_fee", self.cancel_fee)
            .with("currency", self.currency.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_record() {
        let point = PricePoint::new(3, Period::Month, Decimal::new(2997, 2), "USD")
            .setup_fee(Decimal::new(500, 2));
        assert_eq!(point.key("14"), "14:3:month:USD");

        let record = point.to_record(8);
        assert_eq!(record.int("package_id"), Some(8));
        assert_eq!(record.text("period").as_deref(), Some("month"));
        assert_eq!(record.decimal("setup_fee"), Decimal::new(500, 2));
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("Year".parse::<Period>().unwrap(), Period::Year);
        assert!("fortnight".parse::<Period>().is_err());
    }
}
