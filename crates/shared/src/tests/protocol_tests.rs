use super::*;

#[test]
fn unit_codes_encode_without_payload() {
    let raw = WorkerMessage::ModelReady.encode().expect("encode");
    assert_eq!(raw, r#"{"code":"MODEL_READY"}"#);
}

#[test]
fn progress_and_response_carry_payloads() {
    assert_eq!(
        WorkerMessage::ModelProgress(45).encode().expect("encode"),
        r#"{"code":"MODEL_PROGRESS","payload":45}"#
    );
    assert_eq!(
        WorkerMessage::ResponseReady("hello".into())
            .encode()
            .expect("encode"),
        r#"{"code":"RESPONSE_READY","payload":"hello"}"#
    );
}

#[test]
fn every_code_survives_the_wire() {
    let messages = [
        WorkerMessage::PreparingModel,
        WorkerMessage::ModelProgress(100),
        WorkerMessage::ModelReady,
        WorkerMessage::GeneratingResponse,
        WorkerMessage::ResponseReady(String::new()),
        WorkerMessage::ModelError,
        WorkerMessage::InferenceError,
    ];
    for message in messages {
        let raw = message.encode().expect("encode");
        assert_eq!(WorkerMessage::decode(&raw).expect("decode"), message);
    }
}

#[test]
fn missing_code_is_rejected() {
    for raw in [r#"{}"#, r#"{"payload":3}"#, r#"{"code":null}"#, r#"{"code":""}"#, "null", "\"MODEL_READY\""] {
        let err = WorkerMessage::decode(raw).expect_err(raw);
        assert!(
            matches!(err, ProtocolError::MissingCode { .. }),
            "{raw} produced {err:?}"
        );
    }
}

#[test]
fn missing_code_error_keeps_the_envelope() {
    match WorkerMessage::decode(r#"{"payload":3,"code":null}"#) {
        Err(ProtocolError::MissingCode { raw }) => {
            assert_eq!(raw, r#"{"code":null,"payload":3}"#)
        }
        other => panic!("unexpected result: {other:?}"),
    }
    match WorkerMessage::decode("[1,2]") {
        Err(ProtocolError::MissingCode { raw }) => assert_eq!(raw, "[1,2]"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unknown_code_is_rejected() {
    let err = WorkerMessage::decode(r#"{"code":"FOO"}"#).expect_err("unknown code");
    match err {
        ProtocolError::UnknownCode { code } => assert_eq!(code, "FOO"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = WorkerMessage::decode(r#"{"code":7}"#).expect_err("numeric code");
    assert!(matches!(err, ProtocolError::UnknownCode { .. }));
}

#[test]
fn codes_are_case_sensitive() {
    let err = WorkerMessage::decode(r#"{"code":"model_ready"}"#).expect_err("lowercase");
    assert!(matches!(err, ProtocolError::UnknownCode { .. }));
}

#[test]
fn progress_payload_must_be_a_percent() {
    for raw in [
        r#"{"code":"MODEL_PROGRESS"}"#,
        r#"{"code":"MODEL_PROGRESS","payload":"45"}"#,
        r#"{"code":"MODEL_PROGRESS","payload":101}"#,
        r#"{"code":"MODEL_PROGRESS","payload":-1}"#,
        r#"{"code":"MODEL_PROGRESS","payload":4.5}"#,
    ] {
        let err = WorkerMessage::decode(raw).expect_err(raw);
        assert!(
            matches!(err, ProtocolError::MalformedPayload { code: "MODEL_PROGRESS", .. }),
            "{raw} produced {err:?}"
        );
    }

    let whole_float = WorkerMessage::decode(r#"{"code":"MODEL_PROGRESS","payload":45.0}"#)
        .expect("integral float");
    assert_eq!(whole_float, WorkerMessage::ModelProgress(45));
}

#[test]
fn response_payload_must_be_text() {
    let err = WorkerMessage::decode(r#"{"code":"RESPONSE_READY"}"#).expect_err("no text");
    assert!(matches!(
        err,
        ProtocolError::MalformedPayload {
            code: "RESPONSE_READY",
            ..
        }
    ));
}

#[test]
fn stray_payload_on_unit_code_is_ignored() {
    let message =
        WorkerMessage::decode(r#"{"code":"MODEL_ERROR","payload":"boom"}"#).expect("decode");
    assert_eq!(message, WorkerMessage::ModelError);
}

#[test]
fn garbage_is_invalid_json() {
    let err = WorkerMessage::decode("{code:").expect_err("garbage");
    assert!(matches!(err, ProtocolError::InvalidJson(_)));
}

#[test]
fn terminal_codes() {
    let terminal: Vec<_> = MessageCode::ALL
        .into_iter()
        .filter(|code| code.is_terminal())
        .collect();
    assert_eq!(
        terminal,
        vec![
            MessageCode::ModelReady,
            MessageCode::ResponseReady,
            MessageCode::ModelError,
            MessageCode::InferenceError,
        ]
    );
}

#[test]
fn request_is_a_bare_string() {
    let raw = encode_request("why is the sky blue?").expect("encode");
    assert_eq!(raw, "\"why is the sky blue?\"");
    assert_eq!(decode_request(&raw).expect("decode"), "why is the sky blue?");

    let err = decode_request(r#"{"prompt":"hi"}"#).expect_err("object envelope");
    assert!(matches!(err, ProtocolError::InvalidRequest { .. }));
}
