//! Per-connection request dispatch. A `Session` is created when a connection
//! arrives and shared by every worker thread serving it; authentication state
//! and the cancellation token live here, not in the store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::event::Event;
use crate::protocol::{
    Request, ResponseWriter, STATUS_AUTH_FAILED, STATUS_ERROR, STATUS_INVALID_DAY,
    STATUS_NOT_AUTHENTICATED, STATUS_NO_DATA, STATUS_OK, STATUS_USER_EXISTS,
};
use crate::series::{WaitOutcome, WaitToken};
use crate::store::{FilterOutcome, TimeSeriesDb};
use crate::users::{User, UserManager};

pub struct Session {
    db: Arc<TimeSeriesDb>,
    users: Arc<UserManager>,
    authenticated: Mutex<Option<User>>,
    token: WaitToken,
}

impl Session {
    pub fn new(db: Arc<TimeSeriesDb>, users: Arc<UserManager>) -> Self {
        Self {
            db,
            users,
            authenticated: Mutex::new(None),
            token: WaitToken::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.lock().unwrap().is_some()
    }

    /// Aborts this session's blocked waits; call on connection teardown.
    pub fn cancel(&self) {
        self.db.cancel_waits(&self.token);
    }

    /// Handles one request payload and produces one response payload. Never
    /// panics and never gives up the connection: malformed input comes back
    /// as an error status.
    pub fn handle(&self, payload: &[u8]) -> Vec<u8> {
        let request = match Request::decode(payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "rejected undecodable request");
                return error_response(&err.to_string());
            }
        };

        if request.requires_auth() && !self.is_authenticated() {
            return ResponseWriter::with_status(STATUS_NOT_AUTHENTICATED).finish();
        }

        match request {
            Request::Register { username, password } => self.register(&username, &password),
            Request::Login { username, password } => self.login(&username, &password),
            Request::AddEvent {
                product,
                quantity,
                price,
            } => self.add_event(Event::new(product, quantity, price)),
            Request::NewDay => self.new_day(),
            Request::Quantity { product, lookback } => {
                self.quantity_query(&product, lookback)
            }
            Request::Volume { product, lookback } => {
                self.price_query(lookback, |d| self.db.volume(&product, d))
            }
            Request::AveragePrice { product, lookback } => {
                self.price_query(lookback, |d| self.db.average_price(&product, d))
            }
            Request::MaxPrice { product, lookback } => {
                self.price_query(lookback, |d| self.db.max_price(&product, d))
            }
            Request::FilterEvents { lookback, products } => {
                self.filter_events(lookback, &products)
            }
            Request::WaitSimultaneous { first, second } => {
                self.wait_simultaneous(&first, &second)
            }
            Request::WaitConsecutive { run } => self.wait_consecutive(run),
        }
    }

    fn register(&self, username: &str, password: &str) -> Vec<u8> {
        match self.users.register(username, password) {
            Ok(true) => {
                debug!(username, "registered user");
                ResponseWriter::with_status(STATUS_OK).finish()
            }
            Ok(false) => ResponseWriter::with_status(STATUS_USER_EXISTS).finish(),
            Err(err) => error_response(&err.to_string()),
        }
    }

    fn login(&self, username: &str, password: &str) -> Vec<u8> {
        match self.users.authenticate(username, password) {
            Some(user) => {
                debug!(username, "authenticated");
                *self.authenticated.lock().unwrap() = Some(user);
                ResponseWriter::with_status(STATUS_OK).finish()
            }
            None => ResponseWriter::with_status(STATUS_AUTH_FAILED).finish(),
        }
    }

    fn add_event(&self, event: Event) -> Vec<u8> {
        if !event.is_valid() {
            return error_response("invalid event");
        }
        // A false from a valid event means the day closed under us. One
        // retry re-reads the day pointer and lands on the freshly opened
        // day; a second false means rotation failed and the day was never
        // replaced, which is an error, not a reason to spin.
        for _ in 0..2 {
            if self.db.add_event(event.clone()) {
                return ResponseWriter::with_status(STATUS_OK).finish();
            }
        }
        warn!(product = event.product(), "event rejected, day not writable");
        error_response("event rejected")
    }

    fn new_day(&self) -> Vec<u8> {
        match self.db.new_day() {
            Ok(day) => ResponseWriter::with_status(STATUS_OK).push_u32(day).finish(),
            Err(err) => error_response(&err.to_string()),
        }
    }

    fn quantity_query(&self, product: &str, lookback: i32) -> Vec<u8> {
        let Some(lookback) = positive(lookback) else {
            return ResponseWriter::with_status(STATUS_INVALID_DAY).finish();
        };
        match self.db.quantity(product, lookback) {
            // totals accumulate as i64 internally; the wire field is an i32,
            // saturated rather than wrapped
            Ok(Some(total)) => ResponseWriter::with_status(STATUS_OK)
                .push_i32(i32::try_from(total).unwrap_or(i32::MAX))
                .finish(),
            Ok(None) => ResponseWriter::with_status(STATUS_INVALID_DAY).finish(),
            Err(err) => error_response(&err.to_string()),
        }
    }

    fn price_query<F>(&self, lookback: i32, query: F) -> Vec<u8>
    where
        F: FnOnce(u32) -> crate::error::Result<Option<f64>>,
    {
        let Some(lookback) = positive(lookback) else {
            return ResponseWriter::with_status(STATUS_INVALID_DAY).finish();
        };
        match query(lookback) {
            Ok(Some(value)) => ResponseWriter::with_status(STATUS_OK)
                .push_f64(value)
                .finish(),
            Ok(None) => ResponseWriter::with_status(STATUS_INVALID_DAY).finish(),
            Err(err) => error_response(&err.to_string()),
        }
    }

    /// Matched events go out in dictionary form: the distinct product names
    /// that actually occur, once each, then every event as an index into
    /// that table.
    fn filter_events(&self, lookback: i32, products: &HashSet<String>) -> Vec<u8> {
        let Some(lookback) = positive(lookback) else {
            return ResponseWriter::with_status(STATUS_INVALID_DAY).finish();
        };
        match self.db.filter_events(lookback, products) {
            Ok(FilterOutcome::InvalidRange) => {
                ResponseWriter::with_status(STATUS_INVALID_DAY).finish()
            }
            Ok(FilterOutcome::NoData) => ResponseWriter::with_status(STATUS_NO_DATA).finish(),
            Ok(FilterOutcome::Matched(events)) => {
                let mut table: Vec<&str> = Vec::new();
                for event in &events {
                    if !table.contains(&event.product()) {
                        table.push(event.product());
                    }
                }

                let mut response =
                    ResponseWriter::with_status(STATUS_OK).push_u32(table.len() as u32);
                for product in &table {
                    response = response.push_str(product);
                }
                response = response.push_u32(events.len() as u32);
                for event in &events {
                    let index = table
                        .iter()
                        .position(|p| *p == event.product())
                        .unwrap_or(0) as u32;
                    response = response
                        .push_u32(index)
                        .push_i32(event.quantity())
                        .push_f64(event.price());
                }
                response.finish()
            }
            Err(err) => error_response(&err.to_string()),
        }
    }

    fn wait_simultaneous(&self, first: &str, second: &str) -> Vec<u8> {
        match self.db.wait_for_simultaneous(first, second, &self.token) {
            WaitOutcome::Satisfied(()) => ResponseWriter::with_status(STATUS_OK)
                .push_bool(true)
                .finish(),
            WaitOutcome::DayClosed => ResponseWriter::with_status(STATUS_OK)
                .push_bool(false)
                .finish(),
            WaitOutcome::Cancelled => ResponseWriter::with_status(STATUS_ERROR)
                .push_bool(false)
                .finish(),
        }
    }

    fn wait_consecutive(&self, run: i32) -> Vec<u8> {
        let Some(run) = positive(run) else {
            return error_response("run length must be positive");
        };
        match self.db.wait_for_consecutive(run, &self.token) {
            WaitOutcome::Satisfied(product) => ResponseWriter::with_status(STATUS_OK)
                .push_bool(true)
                .push_str(&product)
                .finish(),
            WaitOutcome::DayClosed => ResponseWriter::with_status(STATUS_OK)
                .push_bool(false)
                .finish(),
            WaitOutcome::Cancelled => ResponseWriter::with_status(STATUS_ERROR)
                .push_bool(false)
                .finish(),
        }
    }
}

fn positive(value: i32) -> Option<u32> {
    (value > 0).then_some(value as u32)
}

fn error_response(message: &str) -> Vec<u8> {
    ResponseWriter::with_status(STATUS_ERROR)
        .push_str(message)
        .finish()
}
