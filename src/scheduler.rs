use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scheduled,
    Running,
}

/// Single-flight scan trigger.
///
/// Any number of requests collapse into one pending run, and consecutive
/// runs start at least `min_spacing` apart. A request made too early moves
/// the run later; it is never dropped.
#[derive(Debug)]
pub struct ScanScheduler {
    state: ScanState,
    due: Option<Instant>,
    last_start: Option<Instant>,
    rerun: bool,
    min_spacing: Duration,
}

impl ScanScheduler {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            state: ScanState::Idle,
            due: None,
            last_start: None,
            rerun: false,
            min_spacing,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// When the pending run may start, if one is scheduled.
    pub fn due_at(&self) -> Option<Instant> {
        match self.state {
            ScanState::Scheduled => self.due,
            _ => None,
        }
    }

    pub fn request(&mut self, now: Instant) {
        self.request_at(now);
    }

    /// Asks for a run no earlier than `at`. An already scheduled run keeps
    /// its earlier slot.
    pub fn request_at(&mut self, at: Instant) {
        match self.state {
            ScanState::Running => self.rerun = true,
            ScanState::Scheduled => {
                let at = self.spaced(at);
                if self.due.map_or(true, |due| at < due) {
                    self.due = Some(at);
                }
            }
            ScanState::Idle => {
                self.state = ScanState::Scheduled;
                self.due = Some(self.spaced(at));
            }
        }
    }

    fn spaced(&self, at: Instant) -> Instant {
        match self.last_start {
            Some(last) => at.max(last + self.min_spacing),
            None => at,
        }
    }

    /// Moves a due run into `Running`. Returns false when nothing is due.
    pub fn begin(&mut self, now: Instant) -> bool {
        match (self.state, self.due) {
            (ScanState::Scheduled, Some(due)) if due <= now => {
                self.state = ScanState::Running;
                self.due = None;
                self.last_start = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Ends the current run, rescheduling once if requests arrived meanwhile.
    pub fn finish(&mut self) {
        if self.state != ScanState::Running {
            return;
        }
        self.state = ScanState::Idle;
        if std::mem::take(&mut self.rerun) {
            if let Some(last) = self.last_start {
                self.request_at(last);
            }
        }
    }
}
