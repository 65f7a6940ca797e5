use crate::error::{Error, Result};
use crate::event::Event;

/// Sentinel max price meaning "no matching event".
pub const NO_PRICE: f64 = -1.0;

/// Per-product summary of one day. Combinable with another summary for the
/// same product (associative, day number collapses to 0).
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    product: String,
    day_number: u32,
    total_quantity: i64,
    total_volume: f64,
    max_price: f64,
    event_count: u32,
}

impl Aggregation {
    pub fn new(
        product: impl Into<String>,
        day_number: u32,
        total_quantity: i64,
        total_volume: f64,
        max_price: f64,
        event_count: u32,
    ) -> Self {
        Self {
            product: product.into(),
            day_number,
            total_quantity,
            total_volume,
            max_price,
            event_count,
        }
    }

    /// Summary of a day with no sales of this product.
    pub fn empty(product: impl Into<String>, day_number: u32) -> Self {
        Self::new(product, day_number, 0, 0.0, NO_PRICE, 0)
    }

    /// Fold a stream of events into a summary, ignoring other products.
    pub fn from_events<'a>(
        product: &str,
        day_number: u32,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Self {
        let mut agg = Self::empty(product, day_number);
        for event in events {
            agg.absorb(event);
        }
        agg
    }

    /// Add one event to this summary if it matches the product.
    pub fn absorb(&mut self, event: &Event) {
        if event.product() != self.product {
            return;
        }
        self.total_quantity += event.quantity() as i64;
        self.total_volume += event.volume();
        if event.price() > self.max_price {
            self.max_price = event.price();
        }
        self.event_count += 1;
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn day_number(&self) -> u32 {
        self.day_number
    }

    pub fn total_quantity(&self) -> i64 {
        self.total_quantity
    }

    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    pub fn max_price(&self) -> f64 {
        self.max_price
    }

    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    /// volume / quantity, 0 when nothing was sold.
    pub fn average_price(&self) -> f64 {
        if self.total_quantity == 0 {
            return 0.0;
        }
        self.total_volume / self.total_quantity as f64
    }

    /// Merge two summaries for the same product. The result no longer belongs
    /// to a single day, so its day number is 0.
    pub fn combine(&self, other: &Aggregation) -> Result<Aggregation> {
        if self.product != other.product {
            return Err(Error::ProductMismatch(
                self.product.clone(),
                other.product.clone(),
            ));
        }
        Ok(Aggregation {
            product: self.product.clone(),
            day_number: 0,
            total_quantity: self.total_quantity + other.total_quantity,
            total_volume: self.total_volume + other.total_volume,
            max_price: self.max_price.max(other.max_price),
            event_count: self.event_count + other.event_count,
        })
    }
}
