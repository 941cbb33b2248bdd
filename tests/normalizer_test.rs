use ordertracker::email::{BodyPart, MediaType, RawMessage, TransferEncoding};
use ordertracker::extract::{FieldExtractors, OrderStatus};
use ordertracker::normalizer::ContentNormalizer;

fn message(parts: Vec<BodyPart>) -> RawMessage {
    RawMessage {
        id: "m1".to_string(),
        subject: String::new(),
        from: String::new(),
        date: None,
        parts,
    }
}

#[test]
fn test_html_only_message() {
    let normalizer = ContentNormalizer::new().unwrap();
    let text = normalizer.normalize(&message(vec![BodyPart::html(
        "<p>Your order <b>#12345</b> has shipped</p>",
    )]));
    assert!(text.contains("Your order #12345 has shipped"));
}

#[test]
fn test_span_layout_keeps_fields_apart() {
    let normalizer = ContentNormalizer::new().unwrap();
    let text = normalizer.normalize(&message(vec![BodyPart::html(
        "<div><span>Order ID:</span><span>ABC12345</span><span>Shipped</span></div>",
    )]));
    assert!(text.contains("Order ID: ABC12345 Shipped"));

    let extractors = FieldExtractors::with_defaults().unwrap();
    assert_eq!(extractors.order_id(&text).as_deref(), Some("ABC12345"));
    assert_eq!(extractors.status(&text), OrderStatus::Shipped);
}

#[test]
fn test_plain_text_preferred_over_html() {
    let normalizer = ContentNormalizer::new().unwrap();
    let text = normalizer.normalize(&message(vec![
        BodyPart::html("<p>HTML version</p>"),
        BodyPart::plain("Plain   version\n\n\nsecond line"),
    ]));
    assert_eq!(text, "Plain version\nsecond line");
}

#[test]
fn test_blank_plain_part_falls_back_to_html() {
    let normalizer = ContentNormalizer::new().unwrap();
    let text = normalizer.normalize(&message(vec![
        BodyPart::plain("  \r\n "),
        BodyPart::html("<div>Out for delivery</div>"),
    ]));
    assert_eq!(text, "Out for delivery");
}

#[test]
fn test_base64_html_part() {
    let normalizer = ContentNormalizer::new().unwrap();
    let part = BodyPart {
        media_type: MediaType::Html,
        encoding: TransferEncoding::Base64,
        // "<p>Track &amp; trace</p>" in base64url without padding
        data: b"PHA-VHJhY2sgJmFtcDsgdHJhY2U8L3A-".to_vec(),
    };
    assert_eq!(normalizer.normalize(&message(vec![part])), "Track & trace");
}

#[test]
fn test_undecodable_or_empty_body_is_empty_text() {
    let normalizer = ContentNormalizer::new().unwrap();
    assert_eq!(normalizer.normalize(&message(Vec::new())), "");

    let garbage = BodyPart {
        media_type: MediaType::PlainText,
        encoding: TransferEncoding::Base64,
        data: b"%%% not base64 %%%".to_vec(),
    };
    assert_eq!(normalizer.normalize(&message(vec![garbage])), "");
}
