// ABOUTME: Validation of free-text journal fields
// ABOUTME: Length bounds for mood notes and note content, mood value range

use thiserror::Error;

/// Maximum characters accepted in a mood entry's notes
pub const MAX_MOOD_NOTES_LENGTH: usize = 5000;

/// Maximum characters accepted in a free-form note
pub const MAX_NOTE_CONTENT_LENGTH: usize = 10000;

pub const MIN_MOOD_VALUE: i64 = 1;
pub const MAX_MOOD_VALUE: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: String },
    #[error("{field} must contain at least {min} character(s)")]
    TooShort { field: String, min: usize },
    #[error("{field} cannot exceed {max} characters")]
    TooLong { field: String, max: usize },
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },
}

/// Trim and bound a text input.
///
/// `None` is treated as an empty string. Lengths are counted in characters,
/// not bytes.
pub fn validate_text_input(
    text: Option<&str>,
    field: &str,
    min_length: usize,
    max_length: usize,
    allow_empty: bool,
) -> Result<String, ValidationError> {
    let trimmed = text.unwrap_or_default().trim();

    if trimmed.is_empty() {
        if allow_empty {
            return Ok(String::new());
        }
        return Err(ValidationError::Empty {
            field: field.to_string(),
        });
    }

    let length = trimmed.chars().count();

    if length < min_length {
        return Err(ValidationError::TooShort {
            field: field.to_string(),
            min: min_length,
        });
    }

    if length > max_length {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: max_length,
        });
    }

    Ok(trimmed.to_string())
}

/// Optional notes attached to a mood entry
pub fn validate_mood_notes(notes: Option<&str>) -> Result<String, ValidationError> {
    validate_text_input(notes, "Notes", 0, MAX_MOOD_NOTES_LENGTH, true)
}

pub fn validate_note_content(content: Option<&str>) -> Result<String, ValidationError> {
    validate_text_input(content, "Note content", 1, MAX_NOTE_CONTENT_LENGTH, false)
}

pub fn validate_mood_value(value: i64) -> Result<i64, ValidationError> {
    if !(MIN_MOOD_VALUE..=MAX_MOOD_VALUE).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: "Mood".to_string(),
            min: MIN_MOOD_VALUE,
            max: MAX_MOOD_VALUE,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_trimmed() {
        let result = validate_text_input(Some("  bonjour  "), "Field", 1, 10, false).unwrap();
        assert_eq!(result, "bonjour");
    }

    #[test]
    fn test_empty_rejected_unless_allowed() {
        assert_eq!(
            validate_text_input(Some("   "), "Field", 1, 10, false),
            Err(ValidationError::Empty {
                field: "Field".to_string()
            })
        );
        assert_eq!(validate_text_input(None, "Field", 1, 10, true), Ok(String::new()));
    }

    #[test]
    fn test_length_bounds() {
        assert!(matches!(
            validate_text_input(Some("ab"), "Prénom", 3, 50, false),
            Err(ValidationError::TooShort { min: 3, .. })
        ));
        assert!(matches!(
            validate_text_input(Some("abcdef"), "Field", 1, 5, false),
            Err(ValidationError::TooLong { max: 5, .. })
        ));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 5 characters, 10 bytes
        let accented = "éééée";
        assert!(validate_text_input(Some(accented), "Field", 1, 5, false).is_ok());
    }

    #[test]
    fn test_mood_notes_limits() {
        assert_eq!(validate_mood_notes(None).unwrap(), "");
        let too_long = "a".repeat(MAX_MOOD_NOTES_LENGTH + 1);
        assert!(validate_mood_notes(Some(&too_long)).is_err());
    }

    #[test]
    fn test_note_content_required() {
        assert!(validate_note_content(Some("")).is_err());
        assert_eq!(validate_note_content(Some("ça va")).unwrap(), "ça va");
        let too_long = "a".repeat(MAX_NOTE_CONTENT_LENGTH + 1);
        assert!(validate_note_content(Some(&too_long)).is_err());
    }

    #[test]
    fn test_mood_value_range() {
        assert_eq!(validate_mood_value(1), Ok(1));
        assert_eq!(validate_mood_value(10), Ok(10));
        assert!(validate_mood_value(0).is_err());
        assert!(validate_mood_value(11).is_err());
    }
}
