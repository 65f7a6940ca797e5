use std::io::{Read, Write};

use crate::encoding;
use crate::error::Result;

/// A single sale: product name, units sold, unit price. Immutable once
/// created and owned by exactly one day container.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    product: String,
    quantity: i32,
    price: f64,
}

impl Event {
    pub fn new(product: impl Into<String>, quantity: i32, price: f64) -> Self {
        Self {
            product: product.into(),
            quantity,
            price,
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    /// quantity × price
    pub fn volume(&self) -> f64 {
        self.quantity as f64 * self.price
    }

    /// Ingestion rule: positive quantity, non-negative price, named product.
    pub fn is_valid(&self) -> bool {
        !self.product.is_empty() && self.quantity > 0 && self.price >= 0.0
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        encoding::write_str(w, &self.product)?;
        encoding::write_i32(w, self.quantity)?;
        encoding::write_f64(w, self.price)?;
        Ok(())
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let product = encoding::read_str(r)?;
        let quantity = encoding::read_i32(r)?;
        let price = encoding::read_f64(r)?;
        Ok(Self {
            product,
            quantity,
            price,
        })
    }
}
