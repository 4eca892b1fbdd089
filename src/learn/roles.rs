use serde::{Deserialize, Serialize};

use super::error::LearnError;
use super::types::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    EnrollCourses,
    LeaveReviews,
    ParticipateDiscussions,
    CreateCourses,
    EditCourses,
    DeleteCourses,
    ApproveCourses,
    ManageUsers,
    ManageCategories,
    ViewAnalytics,
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    use Capability::*;
    match role {
        Role::Admin => true,
        Role::Instructor => matches!(
            capability,
            EnrollCourses
                | LeaveReviews
                | ParticipateDiscussions
                | CreateCourses
                | EditCourses
                | DeleteCourses
        ),
        Role::Student => matches!(
            capability,
            EnrollCourses | LeaveReviews | ParticipateDiscussions
        ),
    }
}

pub fn require(user: &User, capability: Capability) -> Result<(), LearnError> {
    if has_capability(user.role, capability) {
        Ok(())
    } else {
        Err(LearnError::Forbidden(format!(
            "role {} lacks {capability:?}",
            user.role
        )))
    }
}

/// Owner holding `capability`, or an admin.
pub fn require_owner(user: &User, owner_id: uuid::Uuid, capability: Capability) -> Result<(), LearnError> {
    if user.role == Role::Admin || (user.id == owner_id && has_capability(user.role, capability)) {
        Ok(())
    } else {
        Err(LearnError::Forbidden("not the owner of this course".to_string()))
    }
}
