//! Transfer objects returned by projections and the controller layer.

use crate::model::member::Member;
use crate::model::Identifiable;
use serde::{Deserialize, Serialize};

/// Member view without the entity graph; serialized as
/// `{ "id", "username", "teamName" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: i64,
    pub username: String,
    pub team_name: Option<String>,
}

impl MemberDto {
    pub fn new(id: i64, username: impl Into<String>, team_name: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            team_name,
        }
    }

    /// DTO without team name; `None` for a transient member.
    pub fn from_member(member: &Member) -> Option<Self> {
        member
            .id()
            .map(|id| Self::new(id.0, member.username.clone(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::MemberDto;

    #[test]
    fn serializes_camel_case_with_null_team() {
        let json = serde_json::to_value(MemberDto::new(3, "member3", None)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": 3, "username": "member3", "teamName": null })
        );
    }
}
