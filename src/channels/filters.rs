//! Admission helpers shared by the listener and the control plane.

use std::sync::LazyLock;

use regex::Regex;

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").expect("valid regex"));

/// Reaction / tapback prefixes. The channel renders them with curly quotes.
const REACTION_PREFIXES: &[&str] = &[
    "Liked \u{201c}",
    "Loved \u{201c}",
    "Disliked \u{201c}",
    "Laughed at \u{201c}",
    "Emphasized \u{201c}",
    "Questioned \u{201c}",
    "Removed a Like",
    "Removed a Love",
];

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".heic", ".heif"];

/// Normalize a phone-style address to `+<digits>`.
///
/// Ten digits are assumed domestic and get the `+1` country code.
pub fn normalize_address(address: &str) -> String {
    let digits = NON_DIGITS.replace_all(address, "");
    if digits.len() == 10 {
        format!("+1{digits}")
    } else {
        format!("+{digits}")
    }
}

/// Whether the text is a reaction rather than real chat content.
pub fn is_reaction_message(text: &str) -> bool {
    REACTION_PREFIXES
        .iter()
        .any(|prefix| text.starts_with(prefix))
}

/// Whether a filename carries an image extension we can extract from.
pub fn is_image_file(filename: Option<&str>) -> bool {
    let Some(name) = filename else {
        return false;
    };
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Mime type for an image filename. Anything unrecognized is sent as JPEG.
pub fn mime_type_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".heic") {
        "image/heic"
    } else if lower.ends_with(".heif") {
        "image/heif"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_format_independent() {
        let plain = normalize_address("5551234567");
        assert_eq!(plain, "+15551234567");
        assert_eq!(normalize_address("(555) 123-4567"), plain);
        assert_eq!(normalize_address("+15551234567"), plain);
    }

    #[test]
    fn non_domestic_numbers_get_generic_prefix() {
        assert_eq!(normalize_address("+44 20 7946 0958"), "+442079460958");
        assert_eq!(normalize_address("12345"), "+12345");
    }

    #[test]
    fn reactions_are_detected() {
        assert!(is_reaction_message("Liked \u{201c}hello\u{201d}"));
        assert!(is_reaction_message("Laughed at \u{201c}that\u{201d}"));
        assert!(is_reaction_message("Removed a Like from \u{201c}x\u{201d}"));
        assert!(!is_reaction_message("Liked \"straight quotes\""));
        assert!(!is_reaction_message("I liked \u{201c}that\u{201d}"));
        assert!(!is_reaction_message("what did I spend this week?"));
    }

    #[test]
    fn image_detection_is_case_insensitive() {
        assert!(is_image_file(Some("IMG_0001.HEIC")));
        assert!(is_image_file(Some("receipt.jpeg")));
        assert!(!is_image_file(Some("statement.pdf")));
        assert!(!is_image_file(None));
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type_for("a.PNG"), "image/png");
        assert_eq!(mime_type_for("a.heic"), "image/heic");
        assert_eq!(mime_type_for("a.heif"), "image/heif");
        assert_eq!(mime_type_for("a.jpg"), "image/jpeg");
    }
}
