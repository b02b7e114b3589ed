use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifiers of multi-party chats carry this reserved prefix.
pub const GROUP_PREFIX: &str = "@@";

pub fn is_group_id(id: &str) -> bool {
    id.starts_with(GROUP_PREFIX)
}

/// The four opaque tokens handed out when the login redirect is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub skey: String,
    pub sid: String,
    pub uin: u64,
    pub pass_ticket: String,
}

impl Credentials {
    pub fn base_request(&self, device_id: impl Into<String>) -> BaseRequest {
        BaseRequest {
            uin: self.uin,
            sid: self.sid.clone(),
            skey: self.skey.clone(),
            device_id: device_id.into(),
        }
    }
}

/// Credential bundle attached to every authenticated JSON call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseRequest {
    pub uin: u64,
    pub sid: String,
    pub skey: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
}

/// A fresh per-request device id in the web client's `e` + 15 digits form.
pub fn new_device_id() -> String {
    let n: u64 = rand::rng().random_range(100_000_000_000_000..1_000_000_000_000_000);
    format!("e{n}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncKeyEntry {
    pub key: i64,
    pub val: i64,
}

/// The synchronization cursor. Echoed back verbatim and replaced wholesale
/// after every successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncKey {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub list: Vec<SyncKeyEntry>,
}

impl SyncKey {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let list: Vec<SyncKeyEntry> = pairs
            .into_iter()
            .map(|(key, val)| SyncKeyEntry { key, val })
            .collect();
        Self {
            count: list.len(),
            list,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// Pipe-delimited `key_val` form used by the long-poll check.
impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.list.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}_{}", entry.key, entry.val)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelfUser {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub nick_name: String,
}

/// Everything an authenticated client needs to talk to the backend.
#[derive(Debug, Clone)]
pub struct Session {
    pub self_user: SelfUser,
    pub credentials: Credentials,
    /// Redirect URL minus its final path segment; every post-login call hangs off it.
    pub base_url: String,
    sync_key: SyncKey,
}

impl Session {
    pub fn new(
        self_user: SelfUser,
        credentials: Credentials,
        base_url: impl Into<String>,
        sync_key: SyncKey,
    ) -> Self {
        Self {
            self_user,
            credentials,
            base_url: base_url.into(),
            sync_key,
        }
    }

    pub fn sync_key(&self) -> &SyncKey {
        &self.sync_key
    }

    /// Swaps in the cursor the server just issued and returns the old one.
    pub fn replace_sync_key(&mut self, next: SyncKey) -> SyncKey {
        std::mem::replace(&mut self.sync_key, next)
    }

    pub fn base_request(&self) -> BaseRequest {
        self.credentials.base_request(new_device_id())
    }

    pub fn is_self(&self, user_name: &str) -> bool {
        self.self_user.user_name == user_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            skey: "@crypt_skey".into(),
            sid: "sid123".into(),
            uin: 4242,
            pass_ticket: "ticket".into(),
        }
    }

    #[test]
    fn sync_key_pipe_format() {
        let key = SyncKey::from_pairs([(1, 650), (2, 651), (3, 640)]);
        assert_eq!(key.to_string(), "1_650|2_651|3_640");
        assert_eq!(key.count, 3);
        assert_eq!(SyncKey::default().to_string(), "");
    }

    #[test]
    fn sync_key_decodes_from_backend_shape() {
        let json = r#"{"Count":2,"List":[{"Key":1,"Val":7},{"Key":1000,"Val":0}]}"#;
        let key: SyncKey = serde_json::from_str(json).unwrap();
        assert_eq!(key, SyncKey::from_pairs([(1, 7), (1000, 0)]));
    }

    #[test]
    fn replace_is_wholesale() {
        let mut session = Session::new(
            SelfUser::default(),
            creds(),
            "https://wx.example.com/cgi-bin/mmwebwx-bin",
            SyncKey::from_pairs([(1, 1), (2, 2), (3, 3)]),
        );
        let old = session.replace_sync_key(SyncKey::from_pairs([(1, 9)]));
        assert_eq!(old.list.len(), 3);
        assert_eq!(session.sync_key(), &SyncKey::from_pairs([(1, 9)]));
    }

    #[test]
    fn base_request_serializes_with_backend_names() {
        let value = serde_json::to_value(creds().base_request("e123")).unwrap();
        assert_eq!(value["Uin"], 4242);
        assert_eq!(value["Sid"], "sid123");
        assert_eq!(value["Skey"], "@crypt_skey");
        assert_eq!(value["DeviceID"], "e123");
    }

    #[test]
    fn device_ids_have_web_client_shape() {
        let id = new_device_id();
        assert!(id.starts_with('e'));
        assert_eq!(id.len(), 16);
        assert!(id[1..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn group_prefix() {
        assert!(is_group_id("@@abcdef"));
        assert!(!is_group_id("@abcdef"));
        assert!(!is_group_id("filehelper"));
    }
}
