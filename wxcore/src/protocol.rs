//! Decoding of backend responses and the JSON request bodies.
//!
//! Pre-login endpoints answer with script assignments (`window.code = 201;`)
//! or XML-ish fragments rather than structured data. Every such body is
//! pattern-matched here and turned into a typed value or a [`DecodeError`],
//! so the login and sync state machines never look at raw text.

use crate::contacts::Contact;
use crate::error::DecodeError;
use crate::message::RawMessage;
use crate::session::{BaseRequest, Credentials, SelfUser, SyncKey};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

static QR_UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"window\.QRLogin\.code\s*=\s*(\d+);\s*window\.QRLogin\.uuid\s*=\s*"([^"]*)""#)
        .expect("valid regex")
});
static LOGIN_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"window\.code\s*=\s*(\d+)").expect("valid regex"));
static REDIRECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"window\.redirect_uri\s*=\s*"(\S+?)""#).expect("valid regex"));
static SYNC_CHECK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"window\.synccheck\s*=\s*\{\s*retcode\s*:\s*"(\d+)"\s*,\s*selector\s*:\s*"(\d+)"\s*\}"#,
    )
    .expect("valid regex")
});

fn parse_code(raw: &str) -> Result<i64, DecodeError> {
    raw.parse()
        .map_err(|_| DecodeError::malformed(format!("non-numeric code '{raw}'")))
}

/// Extracts the one-time handshake identifier from the `jslogin` response.
pub fn parse_qr_uuid(body: &str) -> Result<String, DecodeError> {
    let caps = QR_UUID_RE
        .captures(body)
        .ok_or_else(|| DecodeError::malformed("no QRLogin assignment in handshake response"))?;
    let code = parse_code(&caps[1])?;
    if code != 200 {
        return Err(DecodeError::Backend { code });
    }
    let uuid = caps[2].to_string();
    if uuid.is_empty() {
        return Err(DecodeError::malformed("empty handshake uuid"));
    }
    Ok(uuid)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    /// The long-poll window closed before anyone scanned the code (408).
    WaitingForScan,
    /// Scanned, waiting for the confirm button (201).
    Scanned,
    Confirmed { redirect_url: String },
}

impl LoginStatus {
    pub fn is_pending(&self) -> bool {
        !matches!(self, LoginStatus::Confirmed { .. })
    }
}

/// Decodes a status-poll body. Codes other than 200/201/408 mean the
/// handshake was rejected or expired and come back as `Backend`.
pub fn parse_login_status(body: &str) -> Result<LoginStatus, DecodeError> {
    let caps = LOGIN_CODE_RE
        .captures(body)
        .ok_or_else(|| DecodeError::malformed("no window.code in status response"))?;
    match parse_code(&caps[1])? {
        408 => Ok(LoginStatus::WaitingForScan),
        201 => Ok(LoginStatus::Scanned),
        200 => {
            let redirect = REDIRECT_RE
                .captures(body)
                .ok_or_else(|| DecodeError::malformed("confirmed login without redirect_uri"))?;
            Ok(LoginStatus::Confirmed {
                redirect_url: redirect[1].to_string(),
            })
        }
        code => Err(DecodeError::Backend { code }),
    }
}

fn xml_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    Some(&body[start..start + len])
}

/// Pulls the four session tokens out of the redirect-resolve body.
pub fn parse_login_tokens(body: &str) -> Result<Credentials, DecodeError> {
    if let Some(ret) = xml_tag(body, "ret") {
        let code = parse_code(ret.trim())?;
        if code != 0 {
            return Err(DecodeError::Backend { code });
        }
    }
    let tag = |name: &str| {
        xml_tag(body, name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DecodeError::malformed(format!("missing <{name}> in login body")))
    };
    let uin_raw = tag("wxuin")?;
    let uin = uin_raw
        .parse()
        .map_err(|_| DecodeError::malformed(format!("non-numeric wxuin '{uin_raw}'")))?;
    Ok(Credentials {
        skey: tag("skey")?,
        sid: tag("wxsid")?,
        uin,
        pass_ticket: tag("pass_ticket")?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCheckOutcome {
    NoChange,
    HasChanges { selector: i64 },
}

/// Decodes `window.synccheck={retcode:"0",selector:"2"}`. A non-zero
/// retcode comes back as `Backend` so callers can retry it.
pub fn parse_sync_check(body: &str) -> Result<SyncCheckOutcome, DecodeError> {
    let caps = SYNC_CHECK_RE
        .captures(body)
        .ok_or_else(|| DecodeError::malformed("no synccheck assignment in response"))?;
    let retcode = parse_code(&caps[1])?;
    if retcode != 0 {
        return Err(DecodeError::Backend { code: retcode });
    }
    match parse_code(&caps[2])? {
        0 => Ok(SyncCheckOutcome::NoChange),
        selector => Ok(SyncCheckOutcome::HasChanges { selector }),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseResponse {
    #[serde(default)]
    pub ret: i64,
    #[serde(default)]
    pub err_msg: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "BaseResponse")]
    base_response: Option<BaseResponse>,
}

/// Decodes a JSON body after checking its `BaseResponse.Ret`. A non-zero
/// `Ret` wins over a body that is otherwise incomplete.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    let base = envelope
        .base_response
        .ok_or_else(|| DecodeError::malformed("missing BaseResponse"))?;
    if base.ret != 0 {
        return Err(DecodeError::Backend { code: base.ret });
    }
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitResponse {
    pub user: SelfUser,
    pub sync_key: SyncKey,
    #[serde(default)]
    pub contact_list: Vec<Contact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusNotifyResponse {
    #[serde(default, rename = "MsgID")]
    pub msg_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncResponse {
    #[serde(default)]
    pub add_msg_count: usize,
    #[serde(default)]
    pub add_msg_list: Vec<RawMessage>,
    pub sync_key: SyncKey,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMsgResponse {
    #[serde(default, rename = "MsgID")]
    pub msg_id: String,
    #[serde(default, rename = "LocalID")]
    pub local_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitRequest {
    pub base_request: BaseRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusNotifyRequest {
    pub base_request: BaseRequest,
    pub code: u32,
    pub from_user_name: String,
    pub to_user_name: String,
    pub client_msg_id: i64,
}

impl StatusNotifyRequest {
    /// Presence code announcing the session as active.
    pub const CODE_INITED: u32 = 3;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncRequest {
    pub base_request: BaseRequest,
    pub sync_key: SyncKey,
    #[serde(rename = "rr")]
    pub rr: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMsgRequest {
    pub base_request: BaseRequest,
    pub msg: OutgoingMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutgoingMessage {
    pub client_msg_id: String,
    pub content: String,
    pub from_user_name: String,
    #[serde(rename = "LocalID")]
    pub local_id: String,
    pub to_user_name: String,
    #[serde(rename = "Type")]
    pub kind: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_uuid_success_and_failure() {
        let ok = r#"window.QRLogin.code = 200; window.QRLogin.uuid = "gYmgd1grLg==";"#;
        assert_eq!(parse_qr_uuid(ok).unwrap(), "gYmgd1grLg==");

        let refused = r#"window.QRLogin.code = 400; window.QRLogin.uuid = "";"#;
        assert_eq!(parse_qr_uuid(refused), Err(DecodeError::Backend { code: 400 }));

        assert!(matches!(
            parse_qr_uuid("<html>gateway timeout</html>"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn login_status_codes() {
        assert_eq!(
            parse_login_status("window.code=201;").unwrap(),
            LoginStatus::Scanned
        );
        assert_eq!(
            parse_login_status("window.code=408;").unwrap(),
            LoginStatus::WaitingForScan
        );
        let confirmed = r#"window.code=200;
window.redirect_uri="https://wx2.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage?ticket=AX&uuid=u&lang=en_US&scan=1";"#;
        assert_eq!(
            parse_login_status(confirmed).unwrap(),
            LoginStatus::Confirmed {
                redirect_url: "https://wx2.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage?ticket=AX&uuid=u&lang=en_US&scan=1".into()
            }
        );
        assert_eq!(
            parse_login_status("window.code=400;"),
            Err(DecodeError::Backend { code: 400 })
        );
        assert!(matches!(
            parse_login_status("window.code=200;"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn login_tokens() {
        let body = "<error><ret>0</ret><message></message><skey>@crypt_1</skey>\
                    <wxsid>SID</wxsid><wxuin>12345</wxuin><pass_ticket>PT%2B</pass_ticket>\
                    <isgrayscale>1</isgrayscale></error>";
        let creds = parse_login_tokens(body).unwrap();
        assert_eq!(creds.skey, "@crypt_1");
        assert_eq!(creds.sid, "SID");
        assert_eq!(creds.uin, 12345);
        assert_eq!(creds.pass_ticket, "PT%2B");

        let refused = "<error><ret>1203</ret><message>denied</message></error>";
        assert_eq!(
            parse_login_tokens(refused),
            Err(DecodeError::Backend { code: 1203 })
        );

        let partial = "<error><ret>0</ret><skey>k</skey><wxsid>s</wxsid></error>";
        assert!(matches!(
            parse_login_tokens(partial),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn sync_check_outcomes() {
        assert_eq!(
            parse_sync_check(r#"window.synccheck={retcode:"0",selector:"0"}"#).unwrap(),
            SyncCheckOutcome::NoChange
        );
        assert_eq!(
            parse_sync_check(r#"window.synccheck={retcode:"0",selector:"2"}"#).unwrap(),
            SyncCheckOutcome::HasChanges { selector: 2 }
        );
        assert_eq!(
            parse_sync_check(r#"window.synccheck={retcode:"1101",selector:"0"}"#),
            Err(DecodeError::Backend { code: 1101 })
        );
        assert!(matches!(
            parse_sync_check(""),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn json_base_response_is_checked() {
        let ok = br#"{"BaseResponse":{"Ret":0,"ErrMsg":""},"AddMsgCount":0,"AddMsgList":[],
                     "SyncKey":{"Count":1,"List":[{"Key":1,"Val":2}]}}"#;
        let resp: SyncResponse = decode_json(ok).unwrap();
        assert_eq!(resp.sync_key, SyncKey::from_pairs([(1, 2)]));

        let failed = br#"{"BaseResponse":{"Ret":1101,"ErrMsg":""}}"#;
        assert_eq!(
            decode_json::<SyncResponse>(failed).unwrap_err(),
            DecodeError::Backend { code: 1101 }
        );

        let missing_base = br#"{"SyncKey":{"Count":0,"List":[]}}"#;
        assert!(matches!(
            decode_json::<SyncResponse>(missing_base),
            Err(DecodeError::Malformed(_))
        ));

        let missing_cursor = br#"{"BaseResponse":{"Ret":0}}"#;
        assert!(matches!(
            decode_json::<SyncResponse>(missing_cursor),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn send_request_field_names() {
        let msg = OutgoingMessage {
            client_msg_id: "1".into(),
            content: "hi".into(),
            from_user_name: "@me".into(),
            local_id: "1".into(),
            to_user_name: "@you".into(),
            kind: 1,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["ClientMsgId"], "1");
        assert_eq!(v["LocalID"], "1");
        assert_eq!(v["ToUserName"], "@you");
        assert_eq!(v["Type"], 1);
    }
}
