// src/model.rs
//! Data model shared by the sync engine and the backend contract.
//!
//! Wire names follow the sorter API (`intitule_projet`, `lien`, `keyword_fr`,
//! `Selection`); Rust-side names describe what the field means.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The two server-owned buckets a consultation can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Filtered,
    Rejected,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Filtered, Partition::Rejected];

    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Filtered => "filtered",
            Partition::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filtered" => Ok(Partition::Filtered),
            "rejected" => Ok(Partition::Rejected),
            other => Err(format!("unknown partition '{other}'")),
        }
    }
}

/// One value per partition. Used wherever the engine keeps symmetric state.
#[derive(Debug, Clone, Default)]
pub struct ByPartition<T> {
    pub filtered: T,
    pub rejected: T,
}

impl<T> ByPartition<T> {
    pub fn from_fn(mut f: impl FnMut(Partition) -> T) -> Self {
        Self {
            filtered: f(Partition::Filtered),
            rejected: f(Partition::Rejected),
        }
    }

    pub fn get(&self, partition: Partition) -> &T {
        match partition {
            Partition::Filtered => &self.filtered,
            Partition::Rejected => &self.rejected,
        }
    }

    pub fn get_mut(&mut self, partition: Partition) -> &mut T {
        match partition {
            Partition::Filtered => &mut self.filtered,
            Partition::Rejected => &mut self.rejected,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Partition, &T)> {
        [
            (Partition::Filtered, &self.filtered),
            (Partition::Rejected, &self.rejected),
        ]
        .into_iter()
    }
}

/// Stable consultation identifier. The backend emits it as either a JSON
/// number or a string depending on the scraper source; both normalise here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsultationId(String);

impl ConsultationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsultationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsultationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for ConsultationId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl Serialize for ConsultationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ConsultationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum AnyId {
            Text(String),
            Int(i64),
            Float(f64),
        }

        Ok(match AnyId::deserialize(deserializer)? {
            AnyId::Text(s) => ConsultationId(s.trim().to_string()),
            AnyId::Int(n) => ConsultationId(n.to_string()),
            AnyId::Float(f) => ConsultationId(f.to_string()),
        })
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A procurement opportunity as served by `filtered_data` / `rejected_data`.
/// The client never edits these fields; only partition membership moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationRecord {
    pub consultation_id: ConsultationId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub client: String,
    #[serde(rename = "intitule_projet", default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(rename = "lien", default, deserialize_with = "null_as_empty")]
    pub link: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source: String,
    #[serde(rename = "date_publication", default)]
    pub publication_date: Option<String>,
    #[serde(rename = "date_expiration", default)]
    pub expiration_date: Option<String>,
}

/// Server-assigned keyword used by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    #[serde(rename = "keyword_fr")]
    pub text: String,
}

/// Operator classification decision. On the wire it is the `Selection` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Keep,
    Reject,
}

impl Decision {
    /// `1` keeps (FILTERED), `0` rejects (REJECTED).
    pub fn selection(self) -> u8 {
        match self {
            Decision::Keep => 1,
            Decision::Reject => 0,
        }
    }

    /// Where the server is expected to place the record. Informational only;
    /// the authoritative placement is whatever the next poll shows.
    pub fn intended_partition(self) -> Partition {
        match self {
            Decision::Keep => Partition::Filtered,
            Decision::Reject => Partition::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Keep => "keep",
            Decision::Reject => "reject",
        })
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" | "1" => Ok(Decision::Keep),
            "reject" | "0" => Ok(Decision::Reject),
            other => Err(format!("unknown decision '{other}' (expected keep|reject)")),
        }
    }
}

impl Serialize for Decision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.selection())
    }
}

/// One-shot payload for `POST /sorter/api/feedback/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackEvent {
    pub consultation_id: ConsultationId,
    pub client: String,
    #[serde(rename = "intitule_projet")]
    pub title: String,
    #[serde(rename = "lien")]
    pub link: String,
    #[serde(rename = "Selection")]
    pub decision: Decision,
}

impl FeedbackEvent {
    pub fn for_record(record: &ConsultationRecord, decision: Decision) -> Self {
        Self {
            consultation_id: record.consultation_id.clone(),
            client: record.client.clone(),
            title: record.title.clone(),
            link: record.link.clone(),
            decision,
        }
    }
}

/// The caller on whose behalf the session acts, as reported by `/api/user/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn staff(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            is_staff: true,
            is_superuser: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_decodes_backend_column_names_and_numeric_ids() {
        let json = r#"[
            {"consultation_id": 101, "date_publication": "2025-03-01", "client": "Ville de Lyon",
             "intitule_projet": "Maintenance éclairage", "date_expiration": null,
             "lien": "https://example.org/c/101", "source": "boamp"},
            {"consultation_id": "AO-77", "client": null, "intitule_projet": "Audit",
             "lien": "https://example.org/c/77", "source": "email"}
        ]"#;
        let rows: Vec<ConsultationRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].consultation_id, ConsultationId::from("101"));
        assert_eq!(rows[0].title, "Maintenance éclairage");
        assert_eq!(rows[0].expiration_date, None);
        assert_eq!(rows[1].consultation_id.as_str(), "AO-77");
        assert_eq!(rows[1].client, "");
        assert_eq!(rows[1].publication_date, None);
    }

    #[test]
    fn feedback_event_uses_selection_flag() {
        let rec = ConsultationRecord {
            consultation_id: "103".into(),
            client: "SNCF".into(),
            title: "Travaux".into(),
            link: "https://example.org/103".into(),
            source: "boamp".into(),
            publication_date: None,
            expiration_date: None,
        };
        let v = serde_json::to_value(FeedbackEvent::for_record(&rec, Decision::Reject)).unwrap();
        assert_eq!(v["Selection"], 0);
        assert_eq!(v["consultation_id"], "103");
        assert_eq!(v["intitule_projet"], "Travaux");
        assert_eq!(v["lien"], "https://example.org/103");

        let v = serde_json::to_value(FeedbackEvent::for_record(&rec, Decision::Keep)).unwrap();
        assert_eq!(v["Selection"], 1);
    }

    #[test]
    fn keyword_maps_keyword_fr() {
        let kws: Vec<Keyword> =
            serde_json::from_str(r#"[{"id": 3, "keyword_fr": "éclairage public"}]"#).unwrap();
        assert_eq!(kws[0].text, "éclairage public");
    }

    #[test]
    fn partition_and_decision_parse_case_insensitively() {
        assert_eq!("FILTERED".parse::<Partition>().unwrap(), Partition::Filtered);
        assert_eq!(" rejected".parse::<Partition>().unwrap(), Partition::Rejected);
        assert!("archive".parse::<Partition>().is_err());
        assert_eq!("Keep".parse::<Decision>().unwrap(), Decision::Keep);
        assert_eq!(Decision::Reject.intended_partition(), Partition::Rejected);
    }
}
