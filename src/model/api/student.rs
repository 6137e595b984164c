use serde::{Deserialize, Serialize};

use crate::model::{
    common::{Role, YearGroup},
    db::student::StudentProfile,
    mongodb::Id,
};

/// An API-friendly profile description, containing no password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDescription {
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub student_id: String,
    pub year_group: YearGroup,
    pub role: Role,
    pub is_eligible: bool,
}

impl From<StudentProfile> for StudentDescription {
    fn from(profile: StudentProfile) -> Self {
        Self {
            id: profile.id,
            username: profile.profile.username,
            first_name: profile.profile.first_name,
            last_name: profile.profile.last_name,
            email: profile.profile.email,
            student_id: profile.profile.student_id,
            year_group: profile.profile.year_group,
            role: profile.profile.role,
            is_eligible: profile.profile.is_eligible,
        }
    }
}
