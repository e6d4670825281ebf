//! Remote watcher-pane variant: scans multiplexer pane output for sentinel
//! lines emitted by a small watcher script running in a hidden pane
//! (`inotifywait` when available, falling back to 2-second polling).
//!
//! Grounded on `dk-protocol::watch::matches_filter`'s glob-style matching
//! for the analogous "scan a stream for markers" shape, applied here to raw
//! PTY output instead of an event-bus stream.

use crate::signal::{parse_status_line, AgentSignal};

const SENTINEL_PREFIX: &str = "__SCHMUX_SIGNAL__";
const SENTINEL_SUFFIX: &str = "__END__";

/// The shell snippet a hidden watcher pane runs to emit sentinel lines
/// whenever `status_file` changes. Prefers `inotifywait`; falls back to
/// polling when it's unavailable.
pub fn watcher_pane_script(status_file: &str) -> String {
    format!(
        r#"if command -v inotifywait >/dev/null 2>&1; then
  while inotifywait -qq -e modify,create "{status_file}" 2>/dev/null; do
    echo "{SENTINEL_PREFIX}$(cat "{status_file}" 2>/dev/null){SENTINEL_SUFFIX}"
  done
else
  last=""
  while true; do
    cur=$(cat "{status_file}" 2>/dev/null)
    if [ "$cur" != "$last" ]; then
      last="$cur"
      echo "{SENTINEL_PREFIX}${{cur}}{SENTINEL_SUFFIX}"
    fi
    sleep 2
  done
fi
"#
    )
}

/// Append `chunk` to `buffer` and extract every complete sentinel found,
/// leaving any trailing partial sentinel in `buffer` for the next call.
pub fn scan_for_signals(session_id: &str, buffer: &mut String, chunk: &str) -> Vec<AgentSignal> {
    buffer.push_str(chunk);
    let mut signals = Vec::new();

    loop {
        let Some(start) = buffer.find(SENTINEL_PREFIX) else {
            // Keep a tail long enough to catch a prefix split across chunks.
            let keep_from = buffer.len().saturating_sub(SENTINEL_PREFIX.len().saturating_sub(1));
            let remainder = buffer[keep_from..].to_string();
            *buffer = remainder;
            break;
        };
        let after_prefix = start + SENTINEL_PREFIX.len();
        let Some(end_rel) = buffer[after_prefix..].find(SENTINEL_SUFFIX) else {
            // Incomplete sentinel: keep from the prefix onward for next time.
            let remainder = buffer[start..].to_string();
            *buffer = remainder;
            break;
        };
        let payload_end = after_prefix + end_rel;
        let payload = buffer[after_prefix..payload_end].to_string();
        let consumed_end = payload_end + SENTINEL_SUFFIX.len();
        *buffer = buffer[consumed_end..].to_string();

        if let Some(signal) = parse_status_line(session_id, &payload) {
            signals.push(signal);
        }
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_complete_sentinel_in_one_chunk() {
        let mut buf = String::new();
        let signals = scan_for_signals("sess-1", &mut buf, "noise __SCHMUX_SIGNAL__completed done__END__ trailing");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].message.as_deref(), Some("done"));
        assert!(buf.is_empty() || !buf.contains(SENTINEL_PREFIX));
    }

    #[test]
    fn handles_sentinel_split_across_chunks() {
        let mut buf = String::new();
        let first = scan_for_signals("sess-1", &mut buf, "prefix __SCHMUX_SIGNAL__wor");
        assert!(first.is_empty());
        let second = scan_for_signals("sess-1", &mut buf, "king__END__");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].state.to_string(), "working");
    }

    #[test]
    fn extracts_multiple_sentinels_in_one_chunk() {
        let mut buf = String::new();
        let signals = scan_for_signals(
            "sess-1",
            &mut buf,
            "__SCHMUX_SIGNAL__working__END__ __SCHMUX_SIGNAL__completed done__END__",
        );
        assert_eq!(signals.len(), 2);
    }
}
