use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deserializer for PATCH fields where an explicit `null` clears the value
/// and an absent key leaves it untouched. Pair with `#[serde(default)]`:
/// absent stays `None`, `null` becomes `Some(None)`.
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// Represents a registered user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub profile_pic: String,
    pub created_at: DateTime<Utc>,
}

/// User shape returned to clients (no password hash).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublicUser {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub profile_pic: String,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        PublicUser {
            user_id: u.user_id,
            full_name: u.full_name,
            email: u.email,
            profile_pic: u.profile_pic,
        }
    }
}

/// Role of a user within a project team.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Regular,
}

impl Role {
    pub fn can_manage(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Regular => "regular",
        }
    }
}

/// One entry in a project's team list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TeamMember {
    pub user: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Active,
    Completed,
    OnHold,
}

/// A project document. Tasks and issues reference it by id, nothing is
/// embedded besides the team list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: ProjectStatus,
    pub team: Vec<TeamMember>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn member_role(&self, user_id: &str) -> Option<Role> {
        self.team.iter().find(|m| m.user == user_id).map(|m| m.role)
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_role(user_id).is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    ToDo,
    InProgress,
    Done,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Standalone tasks are allowed; only project tasks get assignment
    /// validation against the team.
    pub project: Option<String>,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Issue {
    pub issue_id: String,
    pub description: String,
    pub project: String,
    pub reported_by: String,
    pub status: IssueStatus,
    #[serde(default)]
    pub resolution: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invite record kept for tracking; the token itself carries the signed
/// payload and expiry. Deleted once accepted.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Invite {
    pub invite_id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub project: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationRecipient {
    pub user: String,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub notification_id: String,
    pub recipients: Vec<NotificationRecipient>,
    pub message: String,
    pub task: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(
            serde_json::to_string(&ProjectStatus::OnHold).unwrap(),
            "\"on-hold\""
        );
        assert_eq!(
            serde_json::to_string(&IssueStatus::Open).unwrap(),
            "\"open\""
        );
    }

    #[test]
    fn roles_round_trip() {
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
        assert!(role.can_manage());
        assert!(!Role::Regular.can_manage());
        assert_eq!(Role::Owner.as_str(), "owner");
    }

    #[test]
    fn member_role_lookup() {
        let project = Project {
            project_id: "p1".into(),
            name: "Apollo".into(),
            description: String::new(),
            start_date: Utc::now(),
            end_date: None,
            status: ProjectStatus::Active,
            team: vec![
                TeamMember { user: "u1".into(), role: Role::Owner },
                TeamMember { user: "u2".into(), role: Role::Regular },
            ],
            created_by: "u1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(project.member_role("u1"), Some(Role::Owner));
        assert_eq!(project.member_role("u2"), Some(Role::Regular));
        assert!(!project.is_member("u3"));
    }
}
