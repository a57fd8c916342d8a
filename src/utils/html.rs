// src/utils/html.rs

use ammonia;

/// Sanitizes user-authored HTML. Chat transcripts and session titles are
/// stored as sent and rendered by the client, so everything user-authored
/// passes through here first. Safe tags (like <b>, <p>) survive; <script>,
/// <iframe> and event-handler attributes do not.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
