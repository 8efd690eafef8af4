//! Wire format and fulfillment tests for the message model.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use measurement_plane::model::{
    parse, unparse, unparse_pretty, Bound, Capability, Envelope, Exception, Interrupt,
    MeasurementResult, Message, MessageKind, Receipt, Specification, When, Withdrawal,
    CALLBACK_LABEL, CONTENT_TYPE,
};

fn ping_capability() -> Capability {
    Capability::new("ping-test")
        .with_when("now ... future".parse().unwrap())
        .with_parameter("destination.ip4", "*".parse().unwrap())
        .with_parameter("count", "1 ... 100".parse().unwrap())
        .with_result("delay.twoway.icmp.us")
}

fn ping_specification() -> Specification {
    Specification::from_capability(&ping_capability(), "now + 0s ... now + 5s".parse().unwrap())
        .with_parameter("destination.ip4", "192.0.2.1")
        .with_parameter("count", "3")
}

#[test]
fn test_content_type() {
    assert_eq!(CONTENT_TYPE, "application/x-mplane+json");
}

#[test]
fn test_parse_specification_wire_form() {
    let raw = br#"{"specification": {
        "label": "ping-test",
        "token": "K",
        "when": "now + 0s ... now + 5s",
        "parameters": {"destination.ip4": "192.0.2.1", "count": "3"},
        "results": ["delay.twoway.icmp.us"],
        "link": "http://client.example.org/result"
    }}"#;
    match parse(raw).unwrap() {
        Message::Specification(spec) => {
            assert_eq!(spec.token(), "K");
            assert_eq!(spec.link.as_deref(), Some("http://client.example.org/result"));
            assert!(spec.fulfills(&ping_capability()));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(parse(b"not json").is_err());
    assert!(parse(br#"{"bogus": {}}"#).is_err());
    assert!(parse(br#"{"specification": {"label": "x", "when": "sometime"}}"#).is_err());
}

#[test]
fn test_round_trip_preserves_identity_of_every_kind() {
    let spec = ping_specification().with_token("K");
    let envelope: Envelope = vec![
        Message::from(ping_capability()),
        Message::from(Interrupt::for_token("K")),
    ]
    .into_iter()
    .collect();
    let messages = vec![
        Message::from(ping_capability()),
        Message::from(spec.clone()),
        Message::from(Receipt::for_specification(&spec)),
        Message::from(MeasurementResult::for_specification(&spec).with_row(vec![1200.into()])),
        Message::from(Exception::new("K", "probe failed").with_label("ping-test")),
        Message::from(Withdrawal::of(ping_capability())),
        Message::from(Interrupt::for_token("K")),
        Message::from(envelope),
    ];
    for message in messages {
        let decoded = parse(&unparse(&message).unwrap()).unwrap();
        assert_eq!(decoded.kind(), message.kind());
        assert_eq!(decoded.label(), message.label());
        assert_eq!(decoded.token(), message.token());
    }
}

#[test]
fn test_withdrawal_wire_form_is_a_capability_body() {
    let json = unparse_pretty(&Withdrawal::of(ping_capability()).into()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["withdrawal"]["label"], "ping-test");
}

#[test]
fn test_capability_token_survives_round_trip() {
    let cap = ping_capability();
    let decoded = parse(&unparse(&cap.clone().into()).unwrap()).unwrap();
    assert_eq!(decoded.token(), cap.token());
}

#[test]
fn test_fulfillment_scenario() {
    let cap = ping_capability();
    let spec = ping_specification();
    assert!(spec.fulfills(&cap));

    let mut relabelled = spec.clone();
    relabelled.label = "ping-other".into();
    assert!(!relabelled.fulfills(&cap));

    let bounded = cap.clone().with_when("now ... now + 10s".parse().unwrap());
    assert!(spec.fulfills(&bounded));
    let too_long = Specification {
        when: "now ... now + 1m".parse().unwrap(),
        ..ping_specification()
    };
    assert!(!too_long.fulfills(&bounded));
}

#[test]
fn test_absolute_windows() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let cap = ping_capability().with_when("2024-05-01 00:00:00 ... 2024-05-02 00:00:00".parse().unwrap());
    let inside = Specification {
        when: "2024-05-01 13:00:00 ... 2024-05-01 14:00:00".parse().unwrap(),
        ..ping_specification()
    };
    let outside = Specification {
        when: "2024-05-01 23:00:00 ... 2024-05-02 01:00:00".parse().unwrap(),
        ..ping_specification()
    };
    assert!(inside.fulfills_at(&cap, now));
    assert!(!outside.fulfills_at(&cap, now));
}

#[test]
fn test_callback_window_delays() {
    let callback = Capability::callback(When::now_for(Duration::from_secs(30)));
    assert_eq!(callback.label, CALLBACK_LABEL);
    let (start, end) = callback.when.timer_delays(Utc::now());
    assert_eq!(start, Duration::ZERO);
    let end = end.unwrap();
    assert!(end <= Duration::from_secs(30) && end >= Duration::from_secs(29));
    assert_eq!(When::now_to_future().end(), Bound::Future);
}

#[test]
fn test_envelope_kind_and_label() {
    let envelope: Envelope = vec![Message::from(
        MeasurementResult::for_specification(&ping_specification()),
    )]
    .into_iter()
    .collect();
    let message = Message::from(envelope);
    assert_eq!(message.kind(), MessageKind::Envelope);
    assert_eq!(message.label(), "ping-test");
    assert!(message.is_terminal_reply());
}
