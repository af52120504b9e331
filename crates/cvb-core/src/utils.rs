use chrono::Local;
use rand::Rng;

/// Human wall-clock timestamp for status messages.
pub fn human_timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Elapsed time rendered as `m:ss`.
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub fn truncate_with_ellipsis(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    format!("{}...", s.chars().take(max_len).collect::<String>())
}

/// First-letter uppercase, used for reply headers.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

const LETTERS_AND_DIGITS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SPECIAL: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Random password over the ASCII charset the operator expects.
pub fn generate_password(length: usize, include_special: bool) -> String {
    let mut charset: Vec<u8> = LETTERS_AND_DIGITS.to_vec();
    if include_special {
        charset.extend_from_slice(SPECIAL);
    }

    let mut rng = rand::rng();
    (0..length)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}
