//! Team membership and role permissions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a user inside one organisation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
}

/// Action class checked before a handler touches organisation data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Delete,
    ManageTeam,
    ManageOrganisation,
}

impl Role {
    pub fn allows(self, permission: Permission) -> bool {
        match self {
            Self::Owner => true,
            Self::Admin => !matches!(permission, Permission::ManageOrganisation),
            Self::Member => matches!(permission, Permission::Read | Permission::Write),
            Self::Viewer => matches!(permission, Permission::Read),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: Role,
}

/// Whether removing or demoting one owner would leave none.
pub fn would_orphan(current: Role, next: Option<Role>, owner_count: i64) -> bool {
    current == Role::Owner && next != Some(Role::Owner) && owner_count <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Permission; 5] = [
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::ManageTeam,
        Permission::ManageOrganisation,
    ];

    fn allowed(role: Role) -> Vec<Permission> {
        ALL.into_iter().filter(|p| role.allows(*p)).collect()
    }

    #[test]
    fn permission_matrix() {
        assert_eq!(allowed(Role::Owner), ALL.to_vec());
        assert_eq!(
            allowed(Role::Admin),
            vec![
                Permission::Read,
                Permission::Write,
                Permission::Delete,
                Permission::ManageTeam
            ]
        );
        assert_eq!(allowed(Role::Member), vec![Permission::Read, Permission::Write]);
        assert_eq!(allowed(Role::Viewer), vec![Permission::Read]);
    }

    #[test]
    fn last_owner_is_protected() {
        assert!(would_orphan(Role::Owner, None, 1));
        assert!(would_orphan(Role::Owner, Some(Role::Admin), 1));
        assert!(!would_orphan(Role::Owner, Some(Role::Owner), 1));
        assert!(!would_orphan(Role::Owner, None, 2));
        assert!(!would_orphan(Role::Admin, None, 1));
    }

    #[test]
    fn roles_parse_from_storage() {
        for role in [Role::Owner, Role::Admin, Role::Member, Role::Viewer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }
}
