//! Human-readable registry dump.

use std::fmt::Write;

use tokio::time::Instant;

use crate::registry::Session;

/// Renders one block describing every session, as seen at `now`.
pub fn render(sessions: &[Session], now: Instant) -> String {
    let mut out = String::from("=== Clients list ===\n");
    if sessions.is_empty() {
        out.push_str("No connected client\n");
    }
    for s in sessions {
        let _ = writeln!(out, "- {}", s.endpoint);
        if let Some(p) = &s.participant {
            let _ = writeln!(out, "  Type: {}", p.kind);
            let _ = writeln!(
                out,
                "  Location: ({:.2}, {:.2}, {:.2})",
                p.location.x, p.location.y, p.location.z
            );
            let _ = writeln!(out, "  Orientation: {:.2}°", p.orientation);
            let _ = writeln!(out, "  Active: {}", p.active);
        }
        let idle = now.saturating_duration_since(s.last_activity_at);
        let _ = writeln!(out, "  Last activity: {}s", idle.as_secs());
    }
    out.push_str("====================");
    out
}
