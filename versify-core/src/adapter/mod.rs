//! Request/reply contract shared by the `caption` and `verse` binaries.
//!
//! Each binary handles exactly one request per process and prints exactly one
//! reply object on stdout: a single success field on success, a single
//! `error` field on failure. stderr is free for logging; stdout is not.

pub mod caption;
pub mod verse;

use serde::Serialize;

pub use caption::{CaptionReply, CaptionRequest, ImageCaptioner};
pub use verse::{TextGenerator, VerseReply, VerseRequest};

// Fallback reply for the (practically unreachable) case where the reply
// itself fails to serialize. Still valid JSON with a single error field.
const ENCODE_FAILURE: &str = r#"{"error":"failed to encode reply"}"#;

/// Serializes a reply to its single-line JSON form.
pub fn to_json<T: Serialize>(reply: &T) -> String {
    serde_json::to_string(reply).unwrap_or_else(|_| ENCODE_FAILURE.to_string())
}

/// Prints a reply on stdout as one JSON line.
pub fn emit<T: Serialize>(reply: &T) {
    println!("{}", to_json(reply));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_serialize_to_a_single_field() {
        let ok = CaptionReply::caption("a cat on a mat");
        let v: serde_json::Value = serde_json::from_str(&to_json(&ok)).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["caption"], "a cat on a mat");

        let err = VerseReply::error("boom");
        let v: serde_json::Value = serde_json::from_str(&to_json(&err)).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["error"], "boom");
    }

    #[test]
    fn caption_reply_feeds_verse_request() {
        // The orchestrator pipes one tool's stdout into the other's stdin, so
        // a successful caption reply must parse as a verse request.
        let reply = CaptionReply::caption("two dogs running on a beach");
        let req: VerseRequest = serde_json::from_str(&to_json(&reply)).unwrap();
        assert_eq!(req.caption.as_deref(), Some("two dogs running on a beach"));
    }
}
