use crate::session::is_group_id;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A contact entry as returned by the session-init call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default)]
    pub remark_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
}

/// Group id -> metadata, filled once at login. Iteration follows the order
/// the backend listed the groups in, so indices stay stable for a session.
#[derive(Debug, Clone, Default)]
pub struct ContactDirectory {
    groups: IndexMap<String, GroupInfo>,
}

impl ContactDirectory {
    pub fn from_contacts<'a>(contacts: impl IntoIterator<Item = &'a Contact>) -> Self {
        let groups = contacts
            .into_iter()
            .filter(|c| is_group_id(&c.user_name))
            .map(|c| {
                let name = if c.nick_name.is_empty() {
                    c.remark_name.clone()
                } else {
                    c.nick_name.clone()
                };
                (
                    c.user_name.clone(),
                    GroupInfo {
                        id: c.user_name.clone(),
                        name,
                    },
                )
            })
            .collect();
        Self { groups }
    }

    pub fn group(&self, id: &str) -> Option<&GroupInfo> {
        self.groups.get(id)
    }

    pub fn group_name(&self, id: &str) -> Option<&str> {
        self.groups.get(id).map(|g| g.name.as_str())
    }

    pub fn group_at(&self, index: usize) -> Option<&GroupInfo> {
        self.groups.get_index(index).map(|(_, g)| g)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupInfo> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
