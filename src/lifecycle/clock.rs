use chrono::{Local, NaiveDate};
use std::sync::RwLock;

/// Source of "today" for due dates, return dates and due-soon flags.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a settable date.
#[derive(Debug)]
pub struct FixedClock {
    today: RwLock<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: RwLock::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.write().unwrap_or_else(|poison| poison.into_inner()) = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.read().unwrap_or_else(|poison| poison.into_inner())
    }
}
