use rustrict::CensorStr;

pub const MAX_NAME_CHARS: usize = 32;
pub const FALLBACK_NAME: &str = "Player";

/// Validate and sanitize a player display name.
/// Returns the trimmed name on success, or an error message.
pub fn validate_player_name(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Name cannot be empty".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err("Name must be 32 characters or fewer".to_string());
    }
    if trimmed.is_inappropriate() {
        return Err("Name contains inappropriate language".to_string());
    }
    Ok(trimmed.to_string())
}

/// Chat clients hand us whatever the account's first name is. Long names are
/// cut down to size, anything else unusable becomes [`FALLBACK_NAME`].
pub fn display_name_or_fallback(raw: &str) -> String {
    let truncated: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    validate_player_name(&truncated).unwrap_or_else(|_| FALLBACK_NAME.to_string())
}
