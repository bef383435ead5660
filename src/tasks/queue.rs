use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::domain::{ProcessingJob, QueueSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Requests,
    Traffic,
}

pub trait Laned {
    fn lane(&self) -> Lane;
}

impl Laned for ProcessingJob {
    fn lane(&self) -> Lane {
        match self {
            ProcessingJob::Access(_) => Lane::Requests,
            ProcessingJob::Traffic(_) => Lane::Traffic,
        }
    }
}

#[derive(Debug)]
struct Lanes<T> {
    requests: VecDeque<T>,
    traffic: VecDeque<T>,
}

/// Claimed jobs waiting for the processor. Access requests are answered
/// interactively, so their lane always drains ahead of traffic reports.
#[derive(Debug)]
pub struct JobQueue<T> {
    lanes: Mutex<Lanes<T>>,
}

impl<T: Laned> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                requests: VecDeque::new(),
                traffic: VecDeque::new(),
            }),
        }
    }

    pub fn enqueue(&self, jobs: impl IntoIterator<Item = T>) -> usize {
        let mut lanes = self.lanes.lock();
        let mut added = 0;
        for job in jobs {
            match job.lane() {
                Lane::Requests => lanes.requests.push_back(job),
                Lane::Traffic => lanes.traffic.push_back(job),
            }
            added += 1;
        }
        added
    }

    pub fn take_all(&self) -> Vec<T> {
        let mut lanes = self.lanes.lock();
        let mut jobs = Vec::with_capacity(lanes.requests.len() + lanes.traffic.len());
        jobs.extend(lanes.requests.drain(..));
        jobs.extend(lanes.traffic.drain(..));
        jobs
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let lanes = self.lanes.lock();
        QueueSnapshot {
            access_requests: lanes.requests.len(),
            traffic_reports: lanes.traffic.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Laned for (Lane, &'static str) {
        fn lane(&self) -> Lane {
            self.0
        }
    }

    #[test]
    fn request_lane_drains_first_in_arrival_order() {
        let queue = JobQueue::new();
        assert_eq!(queue.enqueue([(Lane::Traffic, "t1")]), 1);
        queue.enqueue([(Lane::Requests, "r1"), (Lane::Traffic, "t2"), (Lane::Requests, "r2")]);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.access_requests, 2);
        assert_eq!(snapshot.traffic_reports, 2);

        let order: Vec<&str> = queue.take_all().into_iter().map(|(_, name)| name).collect();
        assert_eq!(order, vec!["r1", "r2", "t1", "t2"]);
        assert_eq!(queue.snapshot().access_requests, 0);
        assert!(queue.take_all().is_empty());
    }
}
