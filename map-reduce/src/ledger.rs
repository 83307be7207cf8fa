use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use log::{debug, info, warn};

use crate::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Reduce task whose partition has not heard from every map task yet.
    Pending,
    Idle,
    InProgress { assigned_at: Instant },
    Completed,
}

#[derive(Debug, Clone)]
struct Entry {
    task: Task,
    state: TaskState,
}

impl Entry {
    fn assignable(&self, now: Instant, staleness: Duration) -> bool {
        match self.state {
            TaskState::Idle => true,
            TaskState::InProgress { assigned_at } => {
                now.saturating_duration_since(assigned_at) >= staleness
            }
            TaskState::Pending | TaskState::Completed => false,
        }
    }
}

/// Every task of a job together with its state.
///
/// Map tasks are indexed by map id and reduce tasks by partition, so a report
/// always lands on the one record of that task.
#[derive(Debug)]
pub struct Ledger {
    maps: Vec<Entry>,
    reduces: Vec<Entry>,
    // Number of map tasks that have delivered their output for each partition.
    arrivals: Vec<usize>,
    staleness: Duration,
}

impl Ledger {
    pub fn new(files: Vec<PathBuf>, nreduce: usize, staleness: Duration) -> Result<Self> {
        ensure!(nreduce > 0, "the number of reduce tasks must be non-zero");

        let nmap = files.len();
        let maps = files
            .into_iter()
            .enumerate()
            .map(|(map_id, input)| Entry {
                task: Task::Map {
                    map_id,
                    input,
                    nreduce,
                },
                state: TaskState::Idle,
            })
            .collect();
        // With no input at all there is nothing to wait for.
        let initial = if nmap == 0 {
            TaskState::Idle
        } else {
            TaskState::Pending
        };
        let reduces = (0..nreduce)
            .map(|partition| Entry {
                task: Task::Reduce { partition, nmap },
                state: initial,
            })
            .collect();

        Ok(Self {
            maps,
            reduces,
            arrivals: vec![0; nreduce],
            staleness,
        })
    }

    pub fn nmap(&self) -> usize {
        self.maps.len()
    }

    pub fn nreduce(&self) -> usize {
        self.reduces.len()
    }

    /// Pick the first idle or stale task, map tasks before reduce tasks, and
    /// mark it in progress as of `now`.
    pub fn assign_next_task(&mut self, now: Instant) -> Option<Task> {
        let staleness = self.staleness;
        let entry = self
            .maps
            .iter_mut()
            .chain(self.reduces.iter_mut())
            .find(|e| e.assignable(now, staleness))?;

        if let TaskState::InProgress { assigned_at } = entry.state {
            info!(
                "{:?} unreported for {:?}, reassigning",
                entry.task,
                now.saturating_duration_since(assigned_at)
            );
        }
        entry.state = TaskState::InProgress { assigned_at: now };
        Some(entry.task.clone())
    }

    pub fn record_map_done(&mut self, map_id: usize) {
        let nmap = self.maps.len();
        let entry = match self.maps.get_mut(map_id) {
            Some(entry) => entry,
            None => {
                warn!("ignoring report for unknown map task {}", map_id);
                return;
            }
        };
        if entry.state == TaskState::Completed {
            debug!("duplicate report for map task {}", map_id);
            return;
        }
        entry.state = TaskState::Completed;

        for (partition, (arrived, reduce)) in self
            .arrivals
            .iter_mut()
            .zip(self.reduces.iter_mut())
            .enumerate()
        {
            *arrived += 1;
            if *arrived == nmap && reduce.state == TaskState::Pending {
                debug!("partition {} has all map output", partition);
                reduce.state = TaskState::Idle;
            }
        }
    }

    pub fn record_reduce_done(&mut self, partition: usize) {
        match self.reduces.get_mut(partition) {
            Some(entry) if entry.state == TaskState::Completed => {
                debug!("duplicate report for reduce task {}", partition);
            }
            Some(entry) => entry.state = TaskState::Completed,
            None => warn!("ignoring report for unknown reduce task {}", partition),
        }
    }

    pub fn job_complete(&self) -> bool {
        self.maps
            .iter()
            .chain(self.reduces.iter())
            .all(|e| e.state == TaskState::Completed)
    }

    /// Number of completed map and reduce tasks.
    pub fn progress(&self) -> (usize, usize) {
        let done = |entries: &[Entry]| {
            entries
                .iter()
                .filter(|e| e.state == TaskState::Completed)
                .count()
        };
        (done(&self.maps), done(&self.reduces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STALE: Duration = Duration::from_secs(10);

    fn ledger(nmap: usize, nreduce: usize) -> Ledger {
        let files = (0..nmap).map(|i| PathBuf::from(format!("in-{}", i))).collect();
        Ledger::new(files, nreduce, STALE).unwrap()
    }

    fn drain(l: &mut Ledger, now: Instant) -> Vec<Task> {
        std::iter::from_fn(|| l.assign_next_task(now)).collect()
    }

    #[test]
    fn test_zero_reduce_rejected() {
        assert!(Ledger::new(vec![PathBuf::from("a")], 0, STALE).is_err());
    }

    #[test]
    fn test_maps_in_order_then_none() {
        let mut l = ledger(3, 2);
        let now = Instant::now();
        let tasks = drain(&mut l, now);
        let ids: Vec<usize> = tasks
            .iter()
            .map(|t| match t {
                Task::Map { map_id, nreduce, .. } => {
                    assert_eq!(*nreduce, 2);
                    *map_id
                }
                Task::Reduce { .. } => panic!("reduce handed out before maps finished"),
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(l.assign_next_task(now).is_none());
    }

    #[test]
    fn test_reduce_waits_for_every_map() {
        let mut l = ledger(3, 2);
        let now = Instant::now();
        drain(&mut l, now);

        l.record_map_done(2);
        l.record_map_done(0);
        assert!(l.assign_next_task(now).is_none());

        l.record_map_done(1);
        let reduces = drain(&mut l, now);
        assert_eq!(
            reduces,
            vec![
                Task::Reduce {
                    partition: 0,
                    nmap: 3
                },
                Task::Reduce {
                    partition: 1,
                    nmap: 3
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_map_report_counts_once() {
        let mut l = ledger(2, 3);
        let now = Instant::now();
        drain(&mut l, now);

        l.record_map_done(0);
        l.record_map_done(0);
        assert_eq!(l.arrivals, vec![1, 1, 1]);
        assert!(l.assign_next_task(now).is_none());

        l.record_map_done(1);
        assert_eq!(l.arrivals, vec![2, 2, 2]);
        assert_eq!(drain(&mut l, now).len(), 3);
    }

    #[test]
    fn test_stale_task_reassigned() {
        let mut l = ledger(2, 1);
        let start = Instant::now();
        let first = l.assign_next_task(start).unwrap();
        let second = l.assign_next_task(start).unwrap();
        assert_ne!(first, second);

        let almost = start + STALE - Duration::from_millis(1);
        assert!(l.assign_next_task(almost).is_none());

        let later = start + STALE;
        assert_eq!(l.assign_next_task(later), Some(first.clone()));
        // Reassignment refreshes the timestamp of the same record.
        assert_eq!(l.assign_next_task(later), Some(second));
        assert!(l.assign_next_task(later).is_none());
        assert_eq!(l.maps.len(), 2);
    }

    #[test]
    fn test_late_report_from_presumed_dead_worker() {
        let mut l = ledger(1, 1);
        let start = Instant::now();
        l.assign_next_task(start).unwrap();
        l.assign_next_task(start + STALE).unwrap();

        // Both the original holder and the new one report.
        l.record_map_done(0);
        l.record_map_done(0);
        assert_eq!(l.arrivals, vec![1]);

        let later = start + STALE;
        assert_eq!(
            l.assign_next_task(later),
            Some(Task::Reduce {
                partition: 0,
                nmap: 1
            })
        );
        l.record_reduce_done(0);
        assert!(l.job_complete());
    }

    #[test]
    fn test_job_complete() {
        let mut l = ledger(2, 2);
        let now = Instant::now();
        assert!(!l.job_complete());
        drain(&mut l, now);
        l.record_map_done(0);
        l.record_map_done(1);
        assert!(!l.job_complete());
        drain(&mut l, now);
        l.record_reduce_done(1);
        assert!(!l.job_complete());
        l.record_reduce_done(0);
        assert!(l.job_complete());
        assert_eq!(l.progress(), (2, 2));

        l.record_reduce_done(0);
        l.record_map_done(1);
        assert!(l.job_complete());
        assert!(l.assign_next_task(now + STALE).is_none());
    }

    #[test]
    fn test_unknown_ids_ignored() {
        let mut l = ledger(1, 1);
        l.record_map_done(7);
        l.record_reduce_done(7);
        assert_eq!(l.arrivals, vec![0]);
        assert_eq!(l.progress(), (0, 0));
    }

    #[test]
    fn test_no_input_goes_straight_to_reduce() {
        let mut l = ledger(0, 2);
        let now = Instant::now();
        assert_eq!(
            l.assign_next_task(now),
            Some(Task::Reduce {
                partition: 0,
                nmap: 0
            })
        );
    }
}
