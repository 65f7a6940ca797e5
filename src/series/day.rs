use std::collections::HashSet;
use std::sync::RwLock;

use crate::aggregation::NO_PRICE;
use crate::event::Event;

/// One historical day. Writable only while open; once closed it never mutates
/// again, so concurrent aggregate readers never contend with a writer.
/// Queries are full scans in insertion order; days are assumed
/// query-tractable, there is no secondary index.
#[derive(Debug)]
pub struct DaySeries {
    day_number: u32,
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    events: Vec<Event>,
    products: HashSet<String>,
    closed: bool,
}

impl DaySeries {
    pub fn new(day_number: u32) -> Self {
        Self {
            day_number,
            inner: RwLock::new(Inner {
                events: Vec::new(),
                products: HashSet::new(),
                closed: false,
            }),
        }
    }

    /// Build an already-closed day from an ordered event sequence.
    pub fn from_events(day_number: u32, events: Vec<Event>) -> Self {
        let products = events.iter().map(|e| e.product().to_string()).collect();
        Self {
            day_number,
            inner: RwLock::new(Inner {
                events,
                products,
                closed: true,
            }),
        }
    }

    pub fn day_number(&self) -> u32 {
        self.day_number
    }

    /// Appends an event. Returns false once the day has been closed.
    pub fn add_event(&self, event: Event) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.closed {
            return false;
        }
        inner.products.insert(event.product().to_string());
        inner.events.push(event);
        true
    }

    /// One-way transition; calling it again has no effect.
    pub fn close(&self) {
        self.inner.write().unwrap().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.read().unwrap().events.clone()
    }

    pub fn has_product(&self, product: &str) -> bool {
        self.inner.read().unwrap().products.contains(product)
    }

    pub fn products(&self) -> HashSet<String> {
        self.inner.read().unwrap().products.clone()
    }

    pub fn total_quantity(&self, product: &str) -> i64 {
        let inner = self.inner.read().unwrap();
        inner
            .events
            .iter()
            .filter(|e| e.product() == product)
            .map(|e| e.quantity() as i64)
            .sum()
    }

    pub fn total_volume(&self, product: &str) -> f64 {
        let inner = self.inner.read().unwrap();
        inner
            .events
            .iter()
            .filter(|e| e.product() == product)
            .map(Event::volume)
            .sum()
    }

    /// Highest price paid for the product, -1.0 if it was never sold.
    pub fn max_price(&self, product: &str) -> f64 {
        let inner = self.inner.read().unwrap();
        inner
            .events
            .iter()
            .filter(|e| e.product() == product)
            .map(Event::price)
            .fold(NO_PRICE, f64::max)
    }

    pub fn event_count(&self, product: &str) -> u32 {
        let inner = self.inner.read().unwrap();
        inner.events.iter().filter(|e| e.product() == product).count() as u32
    }

    /// Events for any of the given products, preserving arrival order.
    pub fn events_by_products(&self, products: &HashSet<String>) -> Vec<Event> {
        let inner = self.inner.read().unwrap();
        inner
            .events
            .iter()
            .filter(|e| products.contains(e.product()))
            .cloned()
            .collect()
    }
}
