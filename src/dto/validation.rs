//! Validation helpers for DTOs.

use std::time::SystemTime;

use validator::ValidationError;

/// Upper bound on lobby capacity accepted from clients.
pub const MAX_CAPACITY: u32 = 50;
/// Upper bound on the free-form lobby note, in characters.
pub const MAX_NOTE_CHARS: usize = 500;

/// Validates that a lobby capacity is within `1..=MAX_CAPACITY`.
pub fn validate_capacity(capacity: u32) -> Result<(), ValidationError> {
    if capacity < 1 || capacity > MAX_CAPACITY {
        let mut err = ValidationError::new("capacity_range");
        err.message = Some(format!("capacity must be between 1 and {MAX_CAPACITY}").into());
        return Err(err);
    }
    Ok(())
}

/// Validates that the declared initial group size fits within the capacity.
pub fn validate_group_size(initial_group_size: u32, capacity: u32) -> Result<(), ValidationError> {
    if initial_group_size < 1 || initial_group_size > capacity {
        let mut err = ValidationError::new("group_size_range");
        err.message = Some("initial group size must be between 1 and the lobby capacity".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a booking window starts strictly before it ends.
pub fn validate_window(starts_at: SystemTime, ends_at: SystemTime) -> Result<(), ValidationError> {
    if starts_at >= ends_at {
        let mut err = ValidationError::new("window_order");
        err.message = Some("window start must be before its end".into());
        return Err(err);
    }
    Ok(())
}

/// Validates the length of the optional lobby note.
pub fn validate_note(note: &str) -> Result<(), ValidationError> {
    if note.chars().count() > MAX_NOTE_CHARS {
        let mut err = ValidationError::new("note_length");
        err.message = Some(format!("note must not exceed {MAX_NOTE_CHARS} characters").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validate_capacity_bounds() {
        assert!(validate_capacity(1).is_ok());
        assert!(validate_capacity(MAX_CAPACITY).is_ok());
        assert!(validate_capacity(0).is_err());
        assert!(validate_capacity(MAX_CAPACITY + 1).is_err());
    }

    #[test]
    fn test_validate_group_size_bounds() {
        assert!(validate_group_size(1, 4).is_ok());
        assert!(validate_group_size(4, 4).is_ok());
        assert!(validate_group_size(0, 4).is_err());
        assert!(validate_group_size(5, 4).is_err());
    }

    #[test]
    fn test_validate_window_ordering() {
        let now = SystemTime::now();
        assert!(validate_window(now, now + Duration::from_secs(1)).is_ok());
        assert!(validate_window(now, now).is_err());
        assert!(validate_window(now + Duration::from_secs(1), now).is_err());
    }

    #[test]
    fn test_validate_note_length() {
        assert!(validate_note("").is_ok());
        assert!(validate_note(&"x".repeat(MAX_NOTE_CHARS)).is_ok());
        assert!(validate_note(&"x".repeat(MAX_NOTE_CHARS + 1)).is_err());
    }
}
