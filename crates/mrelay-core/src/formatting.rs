//! Formatting helpers for Telegram HTML status messages.

use std::time::Duration;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `"1h 02m"`, `"3m 05s"`, `"42s"`.
pub fn format_wait(wait: Duration) -> String {
    let secs = wait.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Percentage of `done` over a loose estimate. Capped at 100; `None` without an estimate.
pub fn percent(done: u64, estimate: u64) -> Option<u64> {
    if estimate == 0 {
        return None;
    }
    Some((done.saturating_mul(100) / estimate).min(100))
}

/// Text progress bar, e.g. `▰▰▰▱▱▱▱▱▱▱`.
pub fn progress_bar(pct: u64, width: usize) -> String {
    let filled = ((pct.min(100) as usize) * width + 50) / 100;
    let mut out = String::with_capacity(width * 3);
    for i in 0..width {
        out.push(if i < filled { '▰' } else { '▱' });
    }
    out
}
