use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a user record.
/// The API is not consistent about numeric vs string ids, so both are accepted
/// and compared strictly (`1` is not `"1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId::Number(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId::Text(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId::Text(id)
    }
}

impl FromStr for UserId {
    type Err = std::convert::Infallible;

    /// Digits-only input becomes a numeric id, anything else stays text
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map(UserId::Number)
            .unwrap_or_else(|_| UserId::Text(s.to_string())))
    }
}

/// The authenticated user: identity, bearer token and whatever profile
/// fields the server returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: UserId,
    #[serde(alias = "jwtToken")]
    pub token: String,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl Session {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.profile.get(name)
    }

    fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// "First Last", falling back to email, then to the id
    pub fn display_name(&self) -> String {
        match (self.field_str("firstName"), self.field_str("lastName")) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => self
                .field_str("email")
                .map(str::to_string)
                .unwrap_or_else(|| format!("user {}", self.id)),
        }
    }

    /// Overlay `update` on top of this session. Fields present in `update`
    /// win, including `id` and `token`. When `update` carries both `token`
    /// and its `jwtToken` alias, `token` wins.
    pub fn merged_with(&self, update: &Map<String, Value>) -> serde_json::Result<Session> {
        let mut fields = self.profile.clone();
        fields.insert("id".to_string(), serde_json::to_value(&self.id)?);
        fields.insert("token".to_string(), Value::String(self.token.clone()));
        fields.extend(update.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(alias) = fields.remove("jwtToken") {
            if !update.contains_key("token") {
                fields.insert("token".to_string(), alias);
            }
        }
        serde_json::from_value(Value::Object(fields))
    }
}

/// A user record from the user collection endpoints (no token).
/// `id` is optional: the record is passed through as the server sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Account {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The full record as a JSON object, `id` included when present
    pub fn to_map(&self) -> serde_json::Result<Map<String, Value>> {
        let mut map = self.fields.clone();
        if let Some(id) = &self.id {
            map.insert("id".to_string(), serde_json::to_value(id)?);
        }
        Ok(map)
    }
}

/// What `update` hands back: the merged session when the signed-in user
/// changed their own record, otherwise the server's record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdatedUser {
    Current(Session),
    Other(Account),
}

impl UpdatedUser {
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            UpdatedUser::Current(session) => session.field(name),
            UpdatedUser::Other(account) => account.field(name),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            UpdatedUser::Current(session) => Some(session),
            UpdatedUser::Other(_) => None,
        }
    }
}
