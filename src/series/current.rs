use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::event::Event;
use crate::series::day::DaySeries;

/// How a blocking live-day query resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    /// The condition held when the waiter woke up.
    Satisfied(T),
    /// The day closed before the condition became true.
    DayClosed,
    /// The wait was aborted through its token (e.g. connection teardown).
    Cancelled,
}

/// Shared cancellation flag for blocking waits. Setting it alone does not wake
/// a sleeping waiter; the owner of the live day must also broadcast, which is
/// what `TimeSeriesDb::cancel_waits` does.
#[derive(Debug, Clone, Default)]
pub struct WaitToken {
    cancelled: Arc<AtomicBool>,
}

impl WaitToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The single open, writable day. Writers append events; blocking queries
/// wait on one broadcast condition and re-check their own predicate on every
/// wake, so there is no per-product wait-handle growth.
#[derive(Debug)]
pub struct CurrentDaySeries {
    day_number: u32,
    state: Mutex<State>,
    waiters: Condvar,
}

#[derive(Debug)]
struct State {
    events: Vec<Event>,
    products: HashSet<String>,
    closed: bool,
    last_product: Option<String>,
    run_length: u32,
}

impl CurrentDaySeries {
    pub fn new(day_number: u32) -> Self {
        Self {
            day_number,
            state: Mutex::new(State {
                events: Vec::new(),
                products: HashSet::new(),
                closed: false,
                last_product: None,
                run_length: 0,
            }),
            waiters: Condvar::new(),
        }
    }

    pub fn day_number(&self) -> u32 {
        self.day_number
    }

    /// Appends an event and wakes every waiter. Returns false if the day has
    /// already closed; the caller is expected to retry against the new day.
    pub fn add_event(&self, event: Event) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return false;
        }

        let product = event.product().to_string();
        state.products.insert(product.clone());

        if state.last_product.as_deref() == Some(event.product()) {
            state.run_length += 1;
        } else {
            state.last_product = Some(product);
            state.run_length = 1;
        }

        state.events.push(event);
        self.waiters.notify_all();
        true
    }

    /// One-way transition. Every waiter is woken so it can observe the closed
    /// flag; repeated calls only re-broadcast, which is harmless.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.waiters.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_product(&self, product: &str) -> bool {
        self.state.lock().unwrap().products.contains(product)
    }

    pub fn last_product(&self) -> Option<String> {
        self.state.lock().unwrap().last_product.clone()
    }

    pub fn run_length(&self) -> u32 {
        self.state.lock().unwrap().run_length
    }

    /// Ordered copy of today's events.
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Immutable snapshot for rotation. The series should be closed first.
    pub fn to_day_series(&self) -> DaySeries {
        let state = self.state.lock().unwrap();
        DaySeries::from_events(self.day_number, state.events.clone())
    }

    /// Wake all waiters without changing state, so they can notice a fired
    /// cancellation token.
    pub fn wake_waiters(&self) {
        let _state = self.state.lock().unwrap();
        self.waiters.notify_all();
    }

    /// Blocks until both products have been sold today, the day closes, or
    /// the token fires. A wait started on this instance never observes the
    /// next day's events.
    pub fn wait_for_simultaneous(
        &self,
        p1: &str,
        p2: &str,
        token: &WaitToken,
    ) -> WaitOutcome<()> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.products.contains(p1) && state.products.contains(p2) {
                return WaitOutcome::Satisfied(());
            }
            if state.closed {
                return WaitOutcome::DayClosed;
            }
            if token.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            state = self.waiters.wait(state).unwrap();
        }
    }

    /// Blocks until `n` consecutive events name the same product, the day
    /// closes, or the token fires. On success returns the run's product.
    pub fn wait_for_consecutive(&self, n: u32, token: &WaitToken) -> WaitOutcome<String> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.run_length >= n {
                if let Some(product) = state.last_product.clone() {
                    return WaitOutcome::Satisfied(product);
                }
            }
            if state.closed {
                return WaitOutcome::DayClosed;
            }
            if token.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            state = self.waiters.wait(state).unwrap();
        }
    }
}
