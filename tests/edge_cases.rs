#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests: malformed wire input, frame limits, signing and
//! component lifecycle corners

use bytes::{BufMut, BytesMut};
use serde_json::{json, Value};
use socket_runtime::component::{
    ActivityTracker, Component, ComponentSet, Heartbeat, PermissionGroup, PermissionLevel,
};
use socket_runtime::core::codec::{PacketCodec, LENGTH_PREFIX_LEN};
use socket_runtime::core::packet::{Packet, PacketType};
use socket_runtime::core::signing::PacketSigner;
use socket_runtime::error::FrameworkError;
use socket_runtime::session::{CloseReason, Session, SessionState};
use socket_runtime::utils::pool::buffer_pool;
use std::sync::{Arc, Mutex};
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

// ============================================================================
// PACKET DECODE EDGE CASES
// ============================================================================

fn assert_format_error(bytes: &[u8]) {
    match Packet::decode(bytes) {
        Err(FrameworkError::ProtocolFormat(_)) => {}
        other => panic!("expected ProtocolFormat for {:?}, got {other:?}", String::from_utf8_lossy(bytes)),
    }
}

#[test]
fn test_decode_rejects_non_packets() {
    assert_format_error(b"");
    assert_format_error(b"not json");
    assert_format_error(b"[1,2,3]");
    assert_format_error(b"\"h\"");
    assert_format_error(b"{\"h\":\"x\"");
    assert_format_error(&[0xFF, 0xFE, 0x00]);
}

#[test]
fn test_decode_requires_string_header() {
    assert_format_error(br#"{"b":1,"t":0}"#);
    assert_format_error(br#"{"h":7,"b":1,"t":0}"#);
    assert_format_error(br#"{"h":null,"t":0}"#);
}

#[test]
fn test_decode_rejects_bad_type_code() {
    assert_format_error(br#"{"h":"x","t":"1"}"#);
    assert_format_error(br#"{"h":"x","t":1.5}"#);
    assert_format_error(br#"{"h":"x","t":[1]}"#);
}

#[test]
fn test_decode_rejects_non_string_key() {
    assert_format_error(br#"{"h":"x","t":1,"k":5}"#);
    assert_format_error(br#"{"h":"x","t":1,"s":{}}"#);
}

#[test]
fn test_decode_lenient_optional_fields() {
    let bare = Packet::decode(br#"{"h":"ping"}"#).unwrap();
    assert_eq!(bare.body, Value::Null);
    assert_eq!(bare.packet_type, PacketType::Unknown);
    assert_eq!(bare.key, None);

    let nulls = Packet::decode(br#"{"h":"ping","b":null,"t":null,"k":null}"#).unwrap();
    assert_eq!(nulls.key, None);

    let extra = Packet::decode(br#"{"h":"ping","t":2,"zz":true}"#).unwrap();
    assert_eq!(extra.packet_type, PacketType::Response);
}

#[test]
fn test_negative_and_huge_type_codes_are_unknown() {
    for raw in [
        br#"{"h":"x","t":-1}"#.as_slice(),
        br#"{"h":"x","t":8}"#.as_slice(),
        br#"{"h":"x","t":18446744073709551615}"#.as_slice(),
    ] {
        assert_eq!(Packet::decode(raw).unwrap().packet_type, PacketType::Unknown);
    }
}

#[test]
fn test_unicode_header_and_body_survive() {
    let packet = Packet::message("聊天 💬", json!({"text": "héllo\n\"quoted\""}));
    let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
    assert_eq!(decoded, packet);
}

#[test]
fn test_empty_header_is_valid() {
    let packet = Packet::new("", PacketType::Message);
    assert_eq!(Packet::decode(&packet.encode().unwrap()).unwrap().header, "");
}

// ============================================================================
// FRAME CODEC EDGE CASES
// ============================================================================

#[test]
fn test_frame_length_checked_before_body_arrives() {
    let mut codec = PacketCodec::new(1024);
    let mut buf = BytesMut::new();
    buf.put_u32(1_000_000);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(FrameworkError::OversizedPacket(1_000_000))
    ));
}

#[test]
fn test_encode_refuses_oversized_packet() {
    let mut codec = PacketCodec::new(64);
    let mut buf = BytesMut::new();
    let packet = Packet::message("big", "x".repeat(200));
    assert!(matches!(
        codec.encode(packet, &mut buf),
        Err(FrameworkError::OversizedPacket(_))
    ));
    assert!(buf.is_empty());
}

#[test]
fn test_byte_at_a_time_delivery() {
    let mut codec = PacketCodec::default();
    let packet = Packet::request("login", json!({"user": "ada"})).with_key("k1");
    let mut wire = BytesMut::new();
    codec.encode(packet.clone(), &mut wire).unwrap();

    let mut buf = BytesMut::new();
    let mut decoded = None;
    for (i, byte) in wire.iter().enumerate() {
        buf.put_u8(*byte);
        match codec.decode(&mut buf).unwrap() {
            Some(p) => {
                assert_eq!(i, wire.len() - 1, "decoded before the last byte");
                decoded = Some(p);
            }
            None => assert!(i < wire.len() - 1),
        }
    }
    assert_eq!(decoded, Some(packet));
}

#[test]
fn test_zero_length_frame_is_malformed() {
    let mut codec = PacketCodec::default();
    let mut buf = BytesMut::new();
    buf.put_u32(0);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(FrameworkError::ProtocolFormat(_))
    ));
    assert_eq!(buf.len(), 0, "the bad frame is consumed");
}

#[test]
fn test_scratch_pool_exhaustion_falls_back() {
    let pool = buffer_pool(1);
    let _held = pool.lease().unwrap();
    let mut codec = PacketCodec::default().with_scratch(pool.clone());
    let mut buf = BytesMut::new();

    codec.encode(Packet::heartbeat(), &mut buf).unwrap();
    assert!(buf.len() > LENGTH_PREFIX_LEN);
    assert_eq!(pool.total_count(), 1);
}

// ============================================================================
// SIGNING EDGE CASES
// ============================================================================

#[test]
fn test_signed_frames_round_trip_and_tamper_fails() {
    let signer = PacketSigner::new("0123456789abcdef0123456789abcdef").unwrap();
    let mut codec = PacketCodec::default().with_signer(signer.clone());
    let mut buf = BytesMut::new();

    codec
        .encode(Packet::message("chat", json!("hi")), &mut buf)
        .unwrap();
    let decoded = codec.decode(&mut buf).unwrap().unwrap();
    assert!(decoded.signature.is_some());

    let mut tampered = decoded.clone();
    tampered.body = json!("bye");
    assert!(matches!(
        signer.verify(&tampered),
        Err(FrameworkError::SignatureMismatch)
    ));

    let mut unsigned = decoded;
    unsigned.signature = None;
    assert!(matches!(
        signer.verify(&unsigned),
        Err(FrameworkError::SignatureMismatch)
    ));
}

#[test]
fn test_short_signing_key_rejected() {
    assert!(matches!(
        PacketSigner::new("short"),
        Err(FrameworkError::ConfigError(_))
    ));
}

#[test]
fn test_unsigned_frame_rejected_by_signing_codec() {
    let mut plain = PacketCodec::default();
    let signer = PacketSigner::new("0123456789abcdef0123456789abcdef").unwrap();
    let mut signing = PacketCodec::default().with_signer(signer);
    let mut buf = BytesMut::new();

    plain.encode(Packet::heartbeat(), &mut buf).unwrap();
    assert!(matches!(
        signing.decode(&mut buf),
        Err(FrameworkError::SignatureMismatch)
    ));
}

// ============================================================================
// COMPONENT LIFECYCLE EDGE CASES
// ============================================================================

#[derive(Default)]
struct Probe {
    log: Arc<Mutex<Vec<String>>>,
    tag: &'static str,
}

impl Component for Probe {
    fn awake(&mut self, _owner: Uuid) {
        self.log.lock().unwrap().push(format!("{}:awake", self.tag));
    }

    fn start(&mut self) {
        self.log.lock().unwrap().push(format!("{}:start", self.tag));
    }

    fn on_destroy(&mut self) {
        self.log.lock().unwrap().push(format!("{}:destroy", self.tag));
    }

    fn dispose(&mut self) {
        self.log.lock().unwrap().push(format!("{}:dispose", self.tag));
    }
}

struct Other(Probe);

impl Component for Other {
    fn on_destroy(&mut self) {
        self.0.on_destroy();
    }
}

#[test]
fn test_duplicate_component_keeps_original() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut set = ComponentSet::new(Uuid::new_v4());
    set.add(Probe { log: log.clone(), tag: "first" }).unwrap();

    let err = set
        .add(Probe { log: log.clone(), tag: "second" })
        .err()
        .expect("duplicate rejected");
    assert!(matches!(err, FrameworkError::DuplicateComponent("Probe")));
    assert_eq!(set.get::<Probe>().unwrap().tag, "first");
    assert_eq!(*log.lock().unwrap(), vec!["first:awake", "first:start"]);
}

#[test]
fn test_teardown_runs_reverse_order_once() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut set = ComponentSet::new(Uuid::new_v4());
    set.add(Probe { log: log.clone(), tag: "a" }).unwrap();
    set.add(Other(Probe { log: log.clone(), tag: "b" })).unwrap();
    log.lock().unwrap().clear();

    assert_eq!(set.teardown(), 2);
    assert_eq!(set.teardown(), 0);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["b:destroy", "a:destroy", "a:dispose"]
    );
    assert!(set.is_sealed());
    assert!(matches!(
        set.add(Probe::default()),
        Err(FrameworkError::ConnectionClosed)
    ));
}

#[test]
fn test_remove_missing_component_is_false() {
    let mut set = ComponentSet::new(Uuid::new_v4());
    assert!(!set.remove::<Heartbeat>());
    set.add_default::<ActivityTracker>().unwrap();
    assert!(set.remove::<ActivityTracker>());
    assert!(!set.remove::<ActivityTracker>());
    assert!(set.is_empty());
}

#[test]
fn test_close_is_first_call_only() {
    let session = Session::detached();
    session
        .components()
        .add(PermissionGroup::new(PermissionLevel::ADMIN))
        .unwrap();
    session.activate();

    assert!(session.close(CloseReason::Kicked));
    assert!(!session.close(CloseReason::HeartbeatTimeout));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.components().is_empty());
    assert!(session.closed_token().is_cancelled());
    assert!(!session.activate());
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    let session = Session::new(None, Some(tx));
    session.activate();
    session.send(Packet::heartbeat()).await.unwrap();
    assert!(rx.recv().await.is_some());

    session.close(CloseReason::Disconnected);
    assert!(matches!(
        session.send(Packet::heartbeat()).await,
        Err(FrameworkError::ConnectionClosed)
    ));
    assert!(rx.recv().await.is_none());
}
