use crate::{jwt::SessionData, schema::UserRole};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnMarks,
            ActionType::ManageOwnSubscriptions,
            ActionType::ManageOwnProfile,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnMarks,
            ActionType::ManageOwnSubscriptions,
            ActionType::ManageOwnProfile,
            ActionType::ManageAllRecipes,
            ActionType::ManageUsers,
        ],
    ),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    ManageOwnRecipes,
    ManageOwnMarks,
    ManageOwnSubscriptions,
    ManageOwnProfile,

    ManageAllRecipes,
    ManageUsers,
}

impl ActionType {
    pub fn permitted(self, session: &SessionData) -> bool {
        ACTION_TABLE
            .iter()
            .find_map(|(role, actions)| {
                if &session.role != role {
                    return None;
                }
                Some(actions.contains(&self))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: UserRole) -> SessionData {
        SessionData {
            user_id: 1,
            email: String::from("kokki@example.org"),
            username: String::from("kokki"),
            role: role.clone(),
            is_admin: role == UserRole::Admin,
        }
    }

    #[test]
    fn users_manage_only_their_own() {
        let user = session(UserRole::User);
        assert!(ActionType::ManageOwnRecipes.permitted(&user));
        assert!(ActionType::ManageOwnMarks.permitted(&user));
        assert!(!ActionType::ManageAllRecipes.permitted(&user));
        assert!(!ActionType::ManageUsers.permitted(&user));
    }

    #[test]
    fn admins_manage_everything() {
        let admin = session(UserRole::Admin);
        assert!(ActionType::ManageOwnRecipes.permitted(&admin));
        assert!(ActionType::ManageAllRecipes.permitted(&admin));
        assert!(ActionType::ManageUsers.permitted(&admin));
    }
}
