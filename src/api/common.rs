use chrono::Utc;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use rocket::{
    futures::TryStreamExt,
    request::{self, FromRequest, Request},
};

use crate::error::{Error, Result};
use crate::model::{
    api::{auth::AuthToken, results::{ElectionResults, PositionResults}},
    common::AuditAction,
    db::{
        audit_log::NewAuditLog,
        candidate::Candidate,
        election::Election,
        position::Position,
        student::StudentProfile,
        vote::Vote,
    },
    mongodb::{Coll, Id},
};

/// Return the profile behind an auth token.
///
/// The token guard has already checked the account exists, so a miss here
/// means it was deleted mid-request.
pub async fn profile_by_token<U>(
    token: &AuthToken<U>,
    students: &Coll<StudentProfile>,
) -> Result<StudentProfile> {
    students
        .find_one(token.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Profile with ID '{}'", token.id)))
}

/// Return the election with the given ID.
pub async fn election_by_id(election_id: Id, elections: &Coll<Election>) -> Result<Election> {
    elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{}'", election_id)))
}

/// Return the positions of an election in display order.
pub async fn positions_for_election(
    election_id: Id,
    positions: &Coll<Position>,
) -> Result<Vec<Position>> {
    let display_order = FindOptions::builder()
        .sort(doc! {"display_order": 1, "title": 1})
        .build();
    let election_positions = positions
        .find(doc! {"election_id": election_id}, display_order)
        .await?
        .try_collect()
        .await?;
    Ok(election_positions)
}

/// Compute the full results of an election: per-position vote counts,
/// percentages, and winner flags over the approved candidates.
pub async fn results_for_election(
    election: &Election,
    positions: &Coll<Position>,
    candidates: &Coll<Candidate>,
    students: &Coll<StudentProfile>,
    votes: &Coll<Vote>,
) -> Result<ElectionResults> {
    let election_positions = positions_for_election(election.id, positions).await?;

    let mut results = Vec::with_capacity(election_positions.len());
    for position in election_positions {
        let approved = doc! {
            "position_id": position.id,
            "is_approved": true,
        };
        let position_candidates: Vec<Candidate> =
            candidates.find(approved, None).await?.try_collect().await?;

        let mut counts = Vec::with_capacity(position_candidates.len());
        for candidate in position_candidates {
            let student = students
                .find_one(candidate.student_id.as_doc(), None)
                .await?
                .ok_or_else(|| {
                    Error::not_found(format!("Profile for candidate '{}'", candidate.id))
                })?;
            let vote_count = votes
                .count_documents(doc! {"candidate_id": candidate.id}, None)
                .await?;
            counts.push((
                candidate.id,
                student.full_name(),
                student.year_group,
                vote_count,
            ));
        }

        results.push(PositionResults::compute(
            position.id,
            position.title.clone(),
            counts,
        ));
    }

    Ok(ElectionResults {
        election_id: election.id,
        title: election.title.clone(),
        positions: results,
    })
}

/// The client IP a request came from, for the audit log. Honours
/// `X-Forwarded-For` so deployments behind a reverse proxy record the real
/// address rather than the proxy's.
pub struct ClientIp(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|forwarded| forwarded.split(',').next())
            .map(|ip| ip.trim().to_string())
            .or_else(|| req.client_ip().map(|ip| ip.to_string()));
        request::Outcome::Success(ClientIp(ip))
    }
}

/// Record a management action in the audit log.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn audit(
    logs: &Coll<NewAuditLog>,
    actor: &StudentProfile,
    action: AuditAction,
    description: String,
    target_kind: &str,
    target_id: Option<Id>,
    ip: &ClientIp,
) -> Result<()> {
    let entry = NewAuditLog {
        user_id: actor.id,
        username: actor.username.clone(),
        action,
        description,
        target_kind: target_kind.to_string(),
        target_id,
        ip_address: ip.0.clone(),
        timestamp: Utc::now(),
    };
    logs.insert_one(entry, None).await?;
    Ok(())
}

/// Shared test data: a small but fully-populated election.
#[cfg(test)]
pub(crate) mod fixtures {
    use mongodb::Database;

    use crate::model::{
        db::{
            candidate::NewCandidate,
            election::{ElectionCore, NewElection},
            position::PositionCore,
            student::NewStudentProfile,
        },
        mongodb::MongoCollection,
    };

    use super::*;

    /// An election with two positions; the first has one approved candidate
    /// ("Billy Odinga") and one unapproved candidate.
    pub struct ElectionFixture {
        pub election_id: Id,
        pub position_id: Id,
        pub second_position_id: Id,
        pub candidate_id: Id,
        pub candidate_profile_id: Id,
        pub unapproved_candidate_id: Id,
    }

    impl ElectionFixture {
        /// Insert the fixture around a currently-active election.
        pub async fn insert(db: &Database) -> Self {
            Self::insert_election(db, ElectionCore::active_example()).await
        }

        /// Insert the fixture around the given election.
        pub async fn insert_election(db: &Database, election: NewElection) -> Self {
            let election_id = insert_one_id(&Coll::<NewElection>::from_db(db), election).await;

            let position_id = insert_one_id(
                &Coll::<PositionCore>::from_db(db),
                PositionCore::example(election_id),
            )
            .await;
            let second_position_id = insert_one_id(
                &Coll::<PositionCore>::from_db(db),
                PositionCore::example2(election_id),
            )
            .await;

            // The standing students. Usernames and student IDs are unique
            // per fixture so a test can insert several fixtures.
            let tag: u16 = rand::random();
            let mut approved_profile = NewStudentProfile::example2();
            approved_profile.username = format!("billy-o-{tag}");
            approved_profile.student_id = format!("STU1{tag:05}");
            let candidate_profile_id = insert_one_id(
                &Coll::<NewStudentProfile>::from_db(db),
                approved_profile,
            )
            .await;
            let mut unapproved_profile = NewStudentProfile::example2();
            unapproved_profile.username = format!("casey.w-{tag}");
            unapproved_profile.first_name = "Casey".to_string();
            unapproved_profile.last_name = "Wu".to_string();
            unapproved_profile.student_id = format!("STU2{tag:05}");
            let unapproved_profile_id = insert_one_id(
                &Coll::<NewStudentProfile>::from_db(db),
                unapproved_profile,
            )
            .await;

            let candidate_id = insert_one_id(
                &Coll::<NewCandidate>::from_db(db),
                NewCandidate::example(position_id, election_id, candidate_profile_id),
            )
            .await;
            let mut unapproved =
                NewCandidate::example(position_id, election_id, unapproved_profile_id);
            unapproved.is_approved = false;
            let unapproved_candidate_id =
                insert_one_id(&Coll::<NewCandidate>::from_db(db), unapproved).await;

            Self {
                election_id,
                position_id,
                second_position_id,
                candidate_id,
                candidate_profile_id,
                unapproved_candidate_id,
            }
        }
    }

    async fn insert_one_id<T>(coll: &Coll<T>, document: T) -> Id
    where
        T: MongoCollection + serde::Serialize,
    {
        coll.insert_one(document, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into()
    }
}
