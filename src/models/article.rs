use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Lifecycle flag of an article. Only `Disponible` articles can be lent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Disponible,
    EnPret,
    Maintenance,
    Retire,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Disponible => "disponible",
            ArticleStatus::EnPret => "en_pret",
            ArticleStatus::Maintenance => "maintenance",
            ArticleStatus::Retire => "retire",
        }
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        ArticleStatus::Disponible
    }
}

/// Physical condition of an article, independent of its status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleState {
    Neuf,
    TresBon,
    Bon,
    Usage,
    AReparer,
}

impl ArticleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleState::Neuf => "neuf",
            ArticleState::TresBon => "tres_bon",
            ArticleState::Bon => "bon",
            ArticleState::Usage => "usage",
            ArticleState::AReparer => "a_reparer",
        }
    }

    /// Status an article takes when it comes back from a loan in this state
    pub fn status_after_return(&self) -> ArticleStatus {
        match self {
            ArticleState::AReparer => ArticleStatus::Maintenance,
            _ => ArticleStatus::Disponible,
        }
    }
}

impl Default for ArticleState {
    fn default() -> Self {
        ArticleState::Bon
    }
}

/// Name of a joined row (category, donor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
    pub status: ArticleStatus,
    pub state: ArticleState,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub donor_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donors: Option<NamedRef>,
}

/// Status and condition of an article before a flow touched it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSnapshot {
    pub id: Uuid,
    pub status: ArticleStatus,
    pub state: ArticleState,
}

/// Create/update form for an article. `status` and `state` are optional:
/// on create they default to `disponible`/`bon`, on update an absent value
/// leaves the stored one untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleForm {
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub state: Option<ArticleState>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub donor_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ArticleForm {
    /// Row for an update: status and state only when given
    pub fn to_row(&self) -> Value {
        let mut row = json!({
            "name": self.name.trim(),
            "identifier": self.identifier,
            "category_id": self.category_id,
            "donor_id": self.donor_id,
            "description": self.description,
        });
        if let Some(status) = self.status {
            row["status"] = json!(status);
        }
        if let Some(state) = self.state {
            row["state"] = json!(state);
        }
        row
    }

    /// Row for an insert, with the defaults filled in
    pub fn to_new_row(&self) -> Value {
        let mut row = self.to_row();
        row["status"] = json!(self.status.unwrap_or_default());
        row["state"] = json!(self.state.unwrap_or_default());
        row
    }
}
