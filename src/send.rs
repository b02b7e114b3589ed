use crate::client::{Client, now_ms};
use crate::error::SendError;
use log::{debug, info};
use wxcore::endpoints;
use wxcore::protocol::SendMsgResponse;
use wxcore::send::{build_text_message, new_client_msg_id};

/// Acknowledgement of an accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    /// Server-assigned id.
    pub msg_id: String,
    pub local_id: String,
    pub client_msg_id: String,
}

impl Client {
    /// Sends a text message from the logged-in account to `to`, a user or
    /// group id. Fails without any request when not logged in.
    pub async fn send_text(&self, to: &str, text: &str) -> Result<SendAck, SendError> {
        let client_msg_id = new_client_msg_id(now_ms());
        let (url, body) = {
            let guard = self.session.read().await;
            let session = guard.as_ref().ok_or(SendError::NotLoggedIn)?;
            (
                endpoints::send_msg(&session.base_url, &session.credentials),
                build_text_message(session, to, text, client_msg_id.clone()),
            )
        };

        debug!(target: "Client/Send", "Sending {} chars to {to}", text.chars().count());
        let response: SendMsgResponse = self.transport.post_json(url, &body).await?;
        info!(target: "Client/Send", "Message {} delivered to {to}", response.msg_id);
        Ok(SendAck {
            msg_id: response.msg_id,
            local_id: response.local_id,
            client_msg_id,
        })
    }
}
