use std::time::Duration;

/// When the next periodic full-frame export may happen, on the frame clock.
#[derive(Debug)]
pub struct ExportSchedule {
    period: Duration,
    initial_delay: Duration,
    next: Option<Duration>,
}

impl ExportSchedule {
    pub fn new(period: Duration, initial_delay: Duration) -> Self {
        Self {
            period,
            initial_delay,
            next: None,
        }
    }

    /// Whether an export is due at `now`. The first call arms the schedule
    /// `initial_delay` after `now`.
    pub fn is_due(&mut self, now: Duration) -> bool {
        let next = *self.next.get_or_insert(now + self.initial_delay);
        now >= next
    }

    /// Record a successful export at `now`.
    pub fn advance(&mut self, now: Duration) {
        self.next = Some(now + self.period);
    }

    pub fn next_eligible(&self) -> Option<Duration> {
        self.next
    }
}
