use crate::message::MessageKind;
use crate::protocol::{OutgoingMessage, SendMsgRequest};
use crate::session::Session;
use rand::Rng;

/// Client message id in the web client's form: epoch milliseconds followed
/// by four random digits, so two sends within one millisecond still differ.
pub fn new_client_msg_id(now_ms: i64) -> String {
    let suffix: u16 = rand::rng().random_range(0..10_000);
    format!("{now_ms}{suffix:04}")
}

/// Builds the `webwxsendmsg` body for a text message from the session's
/// account to `to`. The device id is the client message id with an `e`
/// prefix, fresh per call.
pub fn build_text_message(
    session: &Session,
    to: &str,
    text: &str,
    client_msg_id: String,
) -> SendMsgRequest {
    let device_id = format!("e{client_msg_id}");
    SendMsgRequest {
        base_request: session.credentials.base_request(device_id),
        msg: OutgoingMessage {
            local_id: client_msg_id.clone(),
            client_msg_id,
            content: text.to_string(),
            from_user_name: session.self_user.user_name.clone(),
            to_user_name: to.to_string(),
            kind: MessageKind::TEXT_CODE,
        },
    }
}
