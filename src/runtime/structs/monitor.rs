use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Reentrant per-object lock with wait sets.
///
/// Owners are identified by Java thread id.
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    released: Condvar,
    notified: Condvar,
}

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<i64>,
    count: u32,
    waiters: u32,
    /// notifications not yet consumed by a waiter
    permits: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MonitorError {
    NotOwner,
    Interrupted,
}

const POLL: Duration = Duration::from_millis(10);

impl Monitor {
    pub fn enter(&self, thread_id: i64) {
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(thread_id);
                    state.count = 1;
                    return;
                }
                Some(owner) if owner == thread_id => {
                    state.count += 1;
                    return;
                }
                Some(_) => self.released.wait(&mut state),
            }
        }
    }

    pub fn try_enter(&self, thread_id: i64) -> bool {
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(thread_id);
                state.count = 1;
                true
            }
            Some(owner) if owner == thread_id => {
                state.count += 1;
                true
            }
            Some(_) => false,
        }
    }

    pub fn exit(&self, thread_id: i64) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if state.owner != Some(thread_id) {
            return Err(MonitorError::NotOwner);
        }
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            self.released.notify_one();
        }
        Ok(())
    }

    pub fn holds(&self, thread_id: i64) -> bool {
        self.state.lock().owner == Some(thread_id)
    }

    /// Releases the monitor completely, waits for a notification, the timeout
    /// or an interrupt, then reacquires it with the previous recursion count.
    pub fn wait(
        &self,
        thread_id: i64,
        timeout: Option<Duration>,
        interrupted: impl Fn() -> bool,
    ) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if state.owner != Some(thread_id) {
            return Err(MonitorError::NotOwner);
        }
        let saved = state.count;
        state.owner = None;
        state.count = 0;
        state.waiters += 1;
        self.released.notify_one();

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut result = Ok(());
        loop {
            if state.permits > 0 {
                state.permits -= 1;
                break;
            }
            if interrupted() {
                result = Err(MonitorError::Interrupted);
                break;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    POLL.min(deadline - now)
                }
                None => POLL,
            };
            self.notified.wait_for(&mut state, slice);
        }
        state.waiters -= 1;
        state.permits = state.permits.min(state.waiters);

        while state.owner.is_some() {
            self.released.wait(&mut state);
        }
        state.owner = Some(thread_id);
        state.count = saved;
        result
    }

    pub fn notify(&self, thread_id: i64) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if state.owner != Some(thread_id) {
            return Err(MonitorError::NotOwner);
        }
        if state.permits < state.waiters {
            state.permits += 1;
            self.notified.notify_one();
        }
        Ok(())
    }

    pub fn notify_all(&self, thread_id: i64) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if state.owner != Some(thread_id) {
            return Err(MonitorError::NotOwner);
        }
        state.permits = state.waiters;
        self.notified.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    #[test]
    fn test_reentrant_enter_exit() {
        let monitor = Monitor::default();
        monitor.enter(1);
        monitor.enter(1);
        assert!(!monitor.try_enter(2));
        monitor.exit(1).unwrap();
        assert!(monitor.holds(1));
        monitor.exit(1).unwrap();
        assert!(!monitor.holds(1));
        assert_eq!(monitor.exit(1), Err(MonitorError::NotOwner));
        assert!(monitor.try_enter(2));
    }

    #[test]
    fn test_wait_requires_ownership() {
        let monitor = Monitor::default();
        assert_eq!(
            monitor.wait(5, Some(Duration::from_millis(1)), || false),
            Err(MonitorError::NotOwner)
        );
        assert_eq!(monitor.notify(5), Err(MonitorError::NotOwner));
    }

    #[test]
    fn test_wait_timeout_reacquires() {
        let monitor = Monitor::default();
        monitor.enter(1);
        monitor.enter(1);
        monitor
            .wait(1, Some(Duration::from_millis(20)), || false)
            .unwrap();
        monitor.exit(1).unwrap();
        assert!(monitor.holds(1));
        monitor.exit(1).unwrap();
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let monitor = Arc::new(Monitor::default());
        let woke = Arc::new(AtomicBool::new(false));
        let waiter = {
            let monitor = Arc::clone(&monitor);
            let woke = Arc::clone(&woke);
            std::thread::spawn(move || {
                monitor.enter(2);
                monitor.wait(2, None, || false).unwrap();
                woke.store(true, Ordering::SeqCst);
                monitor.exit(2).unwrap();
            })
        };
        loop {
            monitor.enter(1);
            let waiting = monitor.state.lock().waiters == 1;
            if waiting {
                monitor.notify(1).unwrap();
                monitor.exit(1).unwrap();
                break;
            }
            monitor.exit(1).unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
        waiter.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_interrupted() {
        let monitor = Monitor::default();
        monitor.enter(3);
        assert_eq!(monitor.wait(3, None, || true), Err(MonitorError::Interrupted));
        assert!(monitor.holds(3));
    }
}
