use crate::error::DecodeError;
use crate::session::{Credentials, SyncKey};
use urlencoding::encode;

/// Fixed parameters of the pre-login handshake.
#[derive(Debug, Clone)]
pub struct LoginEndpoints {
    pub host: String,
    pub app_id: String,
    pub redirect_target: String,
    pub lang: String,
}

impl LoginEndpoints {
    pub fn jslogin(&self, ts: i64) -> String {
        format!(
            "{}/jslogin?appid={}&redirect_uri={}&fun=new&lang={}&_={}",
            self.host,
            encode(&self.app_id),
            encode(&self.redirect_target),
            encode(&self.lang),
            ts
        )
    }

    /// `tip=0`: the poll does not ask the phone to show a "scan" hint.
    pub fn login_status(&self, uuid: &str, ts: i64) -> String {
        format!(
            "{}/cgi-bin/mmwebwx-bin/login?loginicon=true&uuid={}&tip=0&_={}",
            self.host,
            encode(uuid),
            ts
        )
    }

    pub fn qrcode(&self, uuid: &str) -> String {
        format!("{}/qrcode/{}", self.host, uuid)
    }
}

/// Everything before the final path segment of the confirmed-login redirect.
pub fn base_url_from_redirect(redirect_url: &str) -> Result<String, DecodeError> {
    let path_end = redirect_url.find('?').unwrap_or(redirect_url.len());
    let without_query = &redirect_url[..path_end];
    let scheme_end = without_query.find("://").map(|i| i + 3).unwrap_or(0);
    match without_query.rfind('/') {
        Some(idx) if idx >= scheme_end => Ok(without_query[..idx].to_string()),
        _ => Err(DecodeError::malformed(format!(
            "redirect url without path: {redirect_url}"
        ))),
    }
}

// The pass ticket arrives percent-encoded inside the login body and is
// forwarded untouched.

pub fn init(base: &str, creds: &Credentials, ts: i64) -> String {
    format!("{base}/webwxinit?r={ts}&pass_ticket={}", creds.pass_ticket)
}

pub fn status_notify(base: &str, creds: &Credentials) -> String {
    format!("{base}/webwxstatusnotify?pass_ticket={}", creds.pass_ticket)
}

pub fn sync_check(
    base: &str,
    creds: &Credentials,
    device_id: &str,
    sync_key: &SyncKey,
    ts: i64,
) -> String {
    format!(
        "{base}/synccheck?r={ts}&skey={}&sid={}&uin={}&deviceid={}&synckey={}&_={ts}",
        encode(&creds.skey),
        encode(&creds.sid),
        creds.uin,
        encode(device_id),
        encode(&sync_key.to_string()),
    )
}

pub fn sync(base: &str, creds: &Credentials) -> String {
    format!(
        "{base}/webwxsync?sid={}&skey={}&pass_ticket={}",
        encode(&creds.sid),
        encode(&creds.skey),
        creds.pass_ticket
    )
}

pub fn send_msg(base: &str, creds: &Credentials) -> String {
    format!("{base}/webwxsendmsg?pass_ticket={}", creds.pass_ticket)
}
