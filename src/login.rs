//! QR-confirmation login.
//!
//! The handshake is a chain of dependent round-trips: fetch a one-time
//! identifier, long-poll its status until someone confirms it on a phone,
//! resolve the confirmation redirect into session tokens, initialize the
//! session, and announce it as active. Any failure after the identifier is
//! issued aborts the whole login; nothing is kept.

use crate::client::{Client, now_ms};
use crate::error::{LoginError, LoginStage, TransportError};
use crate::types::events::Event;
use log::{debug, info, warn};
use std::sync::Arc;
use wxcore::DecodeError;
use wxcore::contacts::ContactDirectory;
use wxcore::endpoints::{self, LoginEndpoints};
use wxcore::net::HttpRequest;
use wxcore::protocol::{
    InitRequest, InitResponse, LoginStatus, StatusNotifyRequest, StatusNotifyResponse,
    parse_login_status, parse_login_tokens, parse_qr_uuid,
};
use wxcore::session::{Credentials, SelfUser, Session, new_device_id};

fn failed(stage: LoginStage) -> impl FnOnce(TransportError) -> LoginError {
    move |source| LoginError::Failed { stage, source }
}

fn decode_failed(stage: LoginStage) -> impl FnOnce(DecodeError) -> LoginError {
    move |e| LoginError::Failed {
        stage,
        source: e.into(),
    }
}

impl Client {
    /// Runs the full handshake and installs the resulting session.
    ///
    /// Publishes [`Event::QrCode`] once the identifier is known and
    /// [`Event::QrScanned`] when the phone reports a scan. Waiting for the
    /// confirmation has no deadline; [`Client::stop`] ends it with
    /// [`LoginError::Cancelled`].
    pub async fn login(self: &Arc<Self>) -> Result<SelfUser, LoginError> {
        if self.is_logged_in().await {
            return Err(LoginError::AlreadyLoggedIn);
        }
        let login_endpoints = self.config.login_endpoints();

        let uuid = self.fetch_uuid(&login_endpoints).await?;
        let qr_url = login_endpoints.qrcode(&uuid);
        info!(target: "Client/Login", "Scan the code to log in: {qr_url}");
        self.dispatch_event(Event::QrCode {
            uuid: uuid.clone(),
            url: qr_url,
        });

        let redirect_url = self.wait_for_confirmation(&login_endpoints, &uuid).await?;
        let (credentials, base_url) = self.resolve_redirect(&redirect_url).await?;

        let init = self.init_session(&base_url, &credentials).await?;
        let contacts = ContactDirectory::from_contacts(&init.contact_list);
        info!(
            target: "Client/Login",
            "Logged in as {} ({} groups in contact list)",
            init.user.nick_name,
            contacts.len()
        );

        self.notify_presence(&base_url, &credentials, &init.user).await?;

        let self_user = init.user.clone();
        let session = Session::new(init.user, credentials, base_url, init.sync_key);
        self.install_session(session, contacts).await;
        self.dispatch_event(Event::LoggedIn(self_user.clone()));
        Ok(self_user)
    }

    async fn fetch_uuid(&self, login_endpoints: &LoginEndpoints) -> Result<String, LoginError> {
        let request = HttpRequest::get(login_endpoints.jslogin(now_ms()));
        let body = self
            .transport
            .get_text(request)
            .await
            .map_err(failed(LoginStage::Handshake))?;
        let uuid = parse_qr_uuid(&body).map_err(decode_failed(LoginStage::Handshake))?;
        debug!(target: "Client/Login", "Handshake identifier {uuid}");
        Ok(uuid)
    }

    /// Re-polls while the code is pending. Returns the redirect URL.
    async fn wait_for_confirmation(
        &self,
        login_endpoints: &LoginEndpoints,
        uuid: &str,
    ) -> Result<String, LoginError> {
        let mut scanned = false;
        loop {
            tokio::task::yield_now().await;
            if self.is_stop_requested() {
                return Err(LoginError::Cancelled);
            }
            let request = HttpRequest::get(login_endpoints.login_status(uuid, now_ms()))
                .with_timeout(self.config.long_poll_timeout());
            let body = self
                .until_stopped(self.transport.get_text(request))
                .await
                .ok_or(LoginError::Cancelled)?
                .map_err(failed(LoginStage::StatusPoll))?;

            match parse_login_status(&body) {
                Ok(LoginStatus::WaitingForScan) => {
                    debug!(target: "Client/Login", "Still waiting for scan");
                }
                Ok(LoginStatus::Scanned) => {
                    if !scanned {
                        scanned = true;
                        info!(target: "Client/Login", "Code scanned, waiting for confirmation");
                        self.dispatch_event(Event::QrScanned);
                    }
                }
                Ok(LoginStatus::Confirmed { redirect_url }) => {
                    info!(target: "Client/Login", "Login confirmed");
                    return Ok(redirect_url);
                }
                Err(DecodeError::Backend { code }) => {
                    warn!(target: "Client/Login", "Login rejected with code {code}");
                    return Err(LoginError::Rejected { code });
                }
                Err(e) => return Err(decode_failed(LoginStage::StatusPoll)(e)),
            }
        }
    }

    async fn resolve_redirect(
        &self,
        redirect_url: &str,
    ) -> Result<(Credentials, String), LoginError> {
        let separator = if redirect_url.contains('?') { '&' } else { '?' };
        let url = format!("{redirect_url}{separator}fun=new&version=v2");
        let body = self
            .transport
            .get_text(HttpRequest::get(url).without_redirects())
            .await
            .map_err(failed(LoginStage::Redirect))?;
        let credentials = parse_login_tokens(&body).map_err(decode_failed(LoginStage::Redirect))?;
        let base_url = endpoints::base_url_from_redirect(redirect_url)
            .map_err(decode_failed(LoginStage::Redirect))?;
        debug!(target: "Client/Login", "Session base url {base_url}");
        Ok((credentials, base_url))
    }

    async fn init_session(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<InitResponse, LoginError> {
        let body = InitRequest {
            base_request: credentials.base_request(new_device_id()),
        };
        self.transport
            .post_json(endpoints::init(base_url, credentials, now_ms()), &body)
            .await
            .map_err(failed(LoginStage::Init))
    }

    async fn notify_presence(
        &self,
        base_url: &str,
        credentials: &Credentials,
        self_user: &SelfUser,
    ) -> Result<(), LoginError> {
        let body = StatusNotifyRequest {
            base_request: credentials.base_request(new_device_id()),
            code: StatusNotifyRequest::CODE_INITED,
            from_user_name: self_user.user_name.clone(),
            to_user_name: self_user.user_name.clone(),
            client_msg_id: now_ms(),
        };
        let _: StatusNotifyResponse = self
            .transport
            .post_json(endpoints::status_notify(base_url, credentials), &body)
            .await
            .map_err(failed(LoginStage::StatusNotify))?;
        Ok(())
    }
}
