use murmur_store::{ErrorKind, Message};

pub const OWN_AUTHOR_LABEL: &str = "you";
pub const OLDER_HISTORY_MARKER: &str = "--- earlier messages ---";

/// `[HH:MM] author: text`, with continuation lines indented under the text.
pub fn format_message(message: &Message, own: bool) -> String {
    let author = if own {
        OWN_AUTHOR_LABEL
    } else {
        message.author_display_name()
    };
    let prefix = format!("[{}] {author}: ", message.created_at.format("%H:%M"));
    let indent = " ".repeat(prefix.chars().count());

    let mut lines = message.text.lines();
    let mut rendered = format!("{prefix}{}", lines.next().unwrap_or_default());
    for line in lines {
        rendered.push('\n');
        rendered.push_str(&indent);
        rendered.push_str(line);
    }
    rendered
}

pub fn format_error(kind: ErrorKind) -> String {
    match kind {
        ErrorKind::Unauthorized => "! session expired, log in again".to_string(),
        ErrorKind::TransportFailure => "! connection problem, will retry".to_string(),
        ErrorKind::ValidationError => "! message was rejected".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use murmur_store::{Author, MemberId, MessageId};

    use super::*;

    fn message(text: &str) -> Message {
        let created_at = match Utc.with_ymd_and_hms(2024, 5, 1, 9, 7, 42).single() {
            Some(created_at) => created_at,
            None => panic!("fixed timestamp should be valid"),
        };
        Message::new(
            MessageId::new(1),
            Author::new(MemberId::new(2), "mara"),
            text,
            created_at,
        )
    }

    #[test]
    fn others_are_shown_by_display_name() {
        assert_eq!(format_message(&message("hello"), false), "[09:07] mara: hello");
    }

    #[test]
    fn own_messages_are_labelled_you() {
        assert_eq!(format_message(&message("hello"), true), "[09:07] you: hello");
    }

    #[test]
    fn multiline_text_is_indented() {
        assert_eq!(
            format_message(&message("first\nsecond"), true),
            "[09:07] you: first\n             second"
        );
    }

    #[test]
    fn errors_read_as_status_lines() {
        assert!(format_error(ErrorKind::Unauthorized).starts_with('!'));
    }
}
