//! Domain types shared by the HTTP layer, the database and the ingest pipeline.

use serde::{Deserialize, Serialize};

/// Project role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Manager,
    Admin,
    Owner,
}

serde_plain::derive_display_from_serialize!(Role);
serde_plain::derive_fromstr_from_deserialize!(Role);

impl Role {
    /// Every role, in the order they are listed to API users.
    pub const ALL: [Self; 4] = [Self::Owner, Self::Admin, Self::Manager, Self::Member];

    /// The single role a holder of `self` may grant and revoke.
    pub const fn subordinate(self) -> Option<Self> {
        match self {
            Self::Owner => Some(Self::Admin),
            Self::Admin => Some(Self::Manager),
            Self::Manager => Some(Self::Member),
            Self::Member => None,
        }
    }

    /// Most privileged role in `roles`.
    pub fn highest(roles: &[Self]) -> Option<Self> {
        roles.iter().copied().max()
    }
}

/// A company / team / project triple. Tokens, memberships, documents and
/// vector metadata are all bound to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub company_id: String,
    pub team_id: String,
    pub project_id: String,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    /// `None` only for owner tokens minted without a project.
    pub scope: Option<Scope>,
    pub roles: Vec<Role>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn highest_role(&self) -> Option<Role> {
        Role::highest(&self.roles)
    }

    /// Admins and owners may work in their project without a membership row.
    pub fn bypasses_membership(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::Owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_strings() {
        assert_eq!(Role::Manager.to_string(), "manager");
        assert_eq!("owner".parse::<Role>().ok(), Some(Role::Owner));
        assert!("superuser".parse::<Role>().is_err(), "unknown role");
    }

    #[test]
    fn hierarchy() {
        assert_eq!(
            Role::highest(&[Role::Member, Role::Admin, Role::Manager]),
            Some(Role::Admin)
        );
        assert_eq!(Role::highest(&[]), None);
        assert_eq!(Role::Owner.subordinate(), Some(Role::Admin));
        assert_eq!(Role::Manager.subordinate(), Some(Role::Member));
        assert_eq!(Role::Member.subordinate(), None);
    }
}
