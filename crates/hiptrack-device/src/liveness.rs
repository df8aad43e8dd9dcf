use crate::status::DeviceStatus;

/// Empty polls tolerated before the status is demoted (about 4 s at 22 ms).
pub const DEFAULT_RETRY_THRESHOLD: u32 = 180;

/// Outcome of one classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A sample arrived this tick: status is `Ok`, compute the pose.
    Fresh,
    /// Nothing arrived, still inside the grace period: keep the status.
    Quiet,
    /// The grace period ran out: demote to the given status and drop tracking.
    Lost(DeviceStatus),
}

/// Classifies the data channel as fresh, quiet or lost.
///
/// Promotion to `Ok` is immediate; demotion needs `threshold` consecutive
/// empty polls so isolated drops do not flap the host-visible status.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    threshold: u32,
    empty_polls: u32,
}

impl LivenessTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            empty_polls: 0,
        }
    }

    pub fn observe(&mut self, data_available: bool, connection_alive: bool) -> Verdict {
        if data_available {
            self.empty_polls = 0;
            return Verdict::Fresh;
        }

        self.empty_polls += 1;
        if self.empty_polls < self.threshold {
            return Verdict::Quiet;
        }

        self.empty_polls = 0;
        if connection_alive {
            Verdict::Lost(DeviceStatus::NoData)
        } else {
            Verdict::Lost(DeviceStatus::ConnectionDead)
        }
    }

    pub fn empty_polls(&self) -> u32 {
        self.empty_polls
    }

    pub fn reset(&mut self) {
        self.empty_polls = 0;
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply verdicts to a status the way the polling loop does.
    fn run(tracker: &mut LivenessTracker, status: &mut DeviceStatus, polls: u32, alive: bool) {
        for _ in 0..polls {
            match tracker.observe(false, alive) {
                Verdict::Fresh => *status = DeviceStatus::Ok,
                Verdict::Quiet => {}
                Verdict::Lost(next) => *status = next,
            }
        }
    }

    #[test]
    fn grace_period_keeps_ok() {
        let mut tracker = LivenessTracker::default();
        let mut status = DeviceStatus::Ok;

        run(&mut tracker, &mut status, 179, true);
        assert_eq!(status, DeviceStatus::Ok);

        run(&mut tracker, &mut status, 1, true);
        assert_eq!(status, DeviceStatus::NoData);
        assert_eq!(tracker.empty_polls(), 0);
    }

    #[test]
    fn dead_connection_after_four_seconds() {
        let mut tracker = LivenessTracker::default();
        let mut status = DeviceStatus::Ok;

        // 4 s at 22 ms.
        run(&mut tracker, &mut status, 4000 / 22, false);
        assert_eq!(status, DeviceStatus::ConnectionDead);
    }

    #[test]
    fn fresh_data_promotes_and_restarts_grace() {
        let mut tracker = LivenessTracker::default();
        let mut status = DeviceStatus::NoData;

        run(&mut tracker, &mut status, 100, true);
        assert_eq!(tracker.observe(true, true), Verdict::Fresh);
        assert_eq!(tracker.empty_polls(), 0);

        status = DeviceStatus::Ok;
        run(&mut tracker, &mut status, 179, false);
        assert_eq!(status, DeviceStatus::Ok);
    }
}
