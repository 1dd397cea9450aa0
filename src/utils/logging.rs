use serde::Serialize;

/// Longest rendering handed to the logger; large result sets are cut here.
const MAX_DEBUG_CHARS: usize = 4096;

/// Pretty-prints `value` as JSON for a DEBUG log line. Does nothing unless DEBUG is enabled.
pub(crate) fn with_pretty_json_debug<T, F>(value: &T, log_action: F)
where
    T: Serialize + ?Sized,
    F: FnOnce(&str),
{
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let mut pretty_json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|error| format!("<pretty serialize failed: {error}>"));
    if pretty_json.len() > MAX_DEBUG_CHARS {
        let cut = pretty_json
            .char_indices()
            .map(|(idx, _)| idx)
            .take_while(|idx| *idx <= MAX_DEBUG_CHARS)
            .last()
            .unwrap_or(0);
        let total = pretty_json.len();
        pretty_json.truncate(cut);
        pretty_json.push_str(&format!("... <{total} bytes total>"));
    }
    log_action(pretty_json.as_str());
}
