//! Panic-site backtraces.
//!
//! By the time `catch_unwind` returns, the stack that panicked is gone. A
//! process-wide hook, chained in front of whatever hook was installed before,
//! records a backtrace on the panicking thread so the catch site can pick it
//! up with [`take_backtrace`].

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

static INSTALL: Once = Once::new();

thread_local! {
    static LAST_PANIC: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// Install the capturing hook. Safe to call any number of times.
pub fn install_hook() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            // A panic while the slot is borrowed must not turn into an abort.
            let _ = LAST_PANIC.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(backtrace);
                }
            });
            previous(info);
        }));
    });
}

/// Take the backtrace of the most recent panic on this thread.
///
/// Unwinding and catching happen on the same thread within one poll, so
/// calling this right after a caught panic yields that panic's stack.
pub fn take_backtrace() -> Option<Backtrace> {
    LAST_PANIC
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn explode_in_marked_frame() {
        panic!("marked");
    }

    #[test]
    fn test_hook_records_panic_site() {
        install_hook();
        install_hook();

        let caught = std::panic::catch_unwind(explode_in_marked_frame);
        assert!(caught.is_err());

        let backtrace = take_backtrace().unwrap().to_string();
        assert!(backtrace.contains("explode_in_marked_frame"), "{}", backtrace);
        assert!(take_backtrace().is_none());
    }

    #[test]
    fn test_nothing_recorded_without_panic() {
        install_hook();
        assert!(take_backtrace().is_none());
    }
}
