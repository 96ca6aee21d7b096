//! Process-wide panic reporting

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;

/// Route panics through `tracing` with a backtrace
///
/// Connection tasks catch their own panics and keep the server running; the
/// hook makes sure the fault and where it happened still reach the logs.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!(
            panic = %panic_payload(info),
            location = %panic_location(info),
            "Panic occurred\n{}",
            backtrace
        );
    }));
}

fn panic_payload<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

fn panic_location(info: &PanicHookInfo<'_>) -> String {
    info.location()
        .map(|location| format!("{}:{}", location.file(), location.line()))
        .unwrap_or_else(|| "unknown".to_string())
}
