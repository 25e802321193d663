use shv_rpc::{ErrorCode, Kind, RpcMessage};
use shv_value::Value;

#[test]
fn request_survives_chainpack_round_trip() {
    let msg = RpcMessage::new_request("test/device/track/1", "set", 42, Value::from(1i64));
    let bytes = shv_chainpack::encode(msg.value()).unwrap();
    let decoded = shv_chainpack::decode(&bytes).unwrap();
    let msg2 = RpcMessage::from_value(decoded);
    assert_eq!(msg2.kind(), Kind::Request);
    assert_eq!(msg2.request_id(), Some(42));
    assert_eq!(msg2.shv_path(), "test/device/track/1");
    assert_eq!(msg2.method(), Some("set"));
}

#[test]
fn error_response_survives_cpon_round_trip() {
    let msg = RpcMessage::new_error_response(5, &[1, 2], ErrorCode::MethodCallException, "boom");
    let text = shv_cpon::encode(msg.value()).unwrap();
    let decoded = shv_cpon::decode(&text).unwrap();
    let msg2 = RpcMessage::from_value(decoded);
    assert_eq!(msg2.kind(), Kind::Response);
    assert_eq!(msg2.caller_ids(), vec![1, 2]);
    let (code, text) = msg2.error().unwrap();
    assert_eq!(code, ErrorCode::MethodCallException);
    assert_eq!(text, "boom");
}
