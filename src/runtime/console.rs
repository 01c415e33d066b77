use std::{
    cell::RefCell,
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct Output {
    pub out: Vec<u8>,
    pub err: Vec<u8>,
}

pub type Capture = Arc<Mutex<Output>>;

thread_local! {
    static CAPTURE: RefCell<Option<Capture>> = const { RefCell::new(None) };
}

/// Sends this thread's Java output into `capture` (or back to the process streams).
pub fn redirect(capture: Option<Capture>) {
    CAPTURE.with(|c| *c.borrow_mut() = capture);
}

pub fn current() -> Option<Capture> {
    CAPTURE.with(|c| c.borrow().clone())
}

pub(crate) fn write_out(bytes: &[u8]) {
    match current() {
        Some(capture) => capture.lock().out.extend_from_slice(bytes),
        None => {
            let mut out = io::stdout().lock();
            if let Err(e) = out.write_all(bytes).and_then(|_| out.flush()) {
                log::warn!("writing to stdout failed: {e}");
            }
        }
    }
}

pub(crate) fn write_err(bytes: &[u8]) {
    match current() {
        Some(capture) => capture.lock().err.extend_from_slice(bytes),
        None => {
            if let Err(e) = io::stderr().lock().write_all(bytes) {
                log::warn!("writing to stderr failed: {e}");
            }
        }
    }
}

/// Writes to the stream numbered like a file descriptor (1 = out, 2 = err).
pub(crate) fn write_fd(fd: i64, bytes: &[u8]) {
    if fd == 2 {
        write_err(bytes);
    } else {
        write_out(bytes);
    }
}

pub(crate) fn flush() {
    if current().is_none() {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirection_is_per_thread() {
        let capture = Capture::default();
        redirect(Some(capture.clone()));
        write_out(b"hi\n");
        write_fd(2, b"oops\n");
        std::thread::spawn(|| assert!(current().is_none())).join().unwrap();
        redirect(None);
        let output = capture.lock();
        assert_eq!(output.out, b"hi\n");
        assert_eq!(output.err, b"oops\n");
    }
}
