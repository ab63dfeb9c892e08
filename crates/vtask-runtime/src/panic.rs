//! Panic plane
//!
//! A panicking task is caught at the poll boundary in [`crate::task`] and
//! turned into `Outcome::Failed` — it never reaches this module. This
//! module only handles the other case: a panic hook installed once, at
//! scheduler startup, so that *any* panic (including ones in scheduler
//! internals rather than task futures) gets logged through the same
//! `kprint` machinery as everything else instead of going straight to
//! stderr in Rust's default format. This replaces the old
//! longjmp-to-safe-point panic boundary with Rust's structured
//! `catch_unwind` plus a cooperative hook.

use std::panic::PanicHookInfo;
use std::sync::Once;
use vtask_core::kerror;

static INSTALL: Once = Once::new();

/// Install the runtime's panic hook. Idempotent; safe to call from every
/// `Scheduler::new()`.
pub fn install_hook() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            log_panic(info);
            previous(info);
        }));
    });
}

fn log_panic(info: &PanicHookInfo<'_>) {
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown location>".to_string());
    let worker = crate::tls::worker_id().map(|w| w.to_string()).unwrap_or_else(|| "?".to_string());
    let task = crate::tls::current_task_id();
    kerror!("panic at {} (worker {}, task {})", location, worker, task);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_hook_is_idempotent() {
        install_hook();
        install_hook();
    }
}
