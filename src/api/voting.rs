use mongodb::bson::doc;
use rocket::{http::Status, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{AuthToken, Student},
        vote::{VoteConfirmation, VoteRequest},
    },
    db::{
        candidate::Candidate,
        election::Election,
        position::Position,
        student::StudentProfile,
        vote::{NewVote, Vote},
    },
    mongodb::{errors::is_duplicate_key_error, Coll, Id},
};

use super::common::{election_by_id, profile_by_token};

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

/// Cast a vote for a candidate.
///
/// The "one vote per student per position" rule is checked twice: a friendly
/// pre-check here, and the `(student_id, position_id)` unique index for the
/// race where two requests pass the pre-check together.
#[post(
    "/elections/<election_id>/positions/<position_id>/votes",
    data = "<request>",
    format = "json"
)]
#[allow(clippy::too_many_arguments)]
async fn cast_vote(
    token: AuthToken<Student>,
    election_id: Id,
    position_id: Id,
    request: Json<VoteRequest>,
    students: Coll<StudentProfile>,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    new_votes: Coll<NewVote>,
    votes: Coll<Vote>,
) -> Result<Json<VoteConfirmation>> {
    let election = election_by_id(election_id, &elections).await?;
    if !election.is_voting_open() {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Voting is not open for '{}'.", election.title),
        ));
    }

    let voter = profile_by_token(&token, &students).await?;
    if !election.is_student_eligible(&voter) {
        return Err(Error::Status(
            Status::Forbidden,
            "You are not eligible to vote in this election.".to_string(),
        ));
    }

    // The position must belong to the election in the URL.
    let position = positions
        .find_one(doc! {"_id": position_id, "election_id": election_id}, None)
        .await?
        .ok_or_else(|| {
            Error::not_found(format!(
                "Position '{}' in election '{}'",
                position_id, election_id
            ))
        })?;

    // The chosen candidate must stand for that position and be approved.
    let valid_candidate = doc! {
        "_id": request.candidate_id,
        "position_id": position_id,
        "is_approved": true,
    };
    let candidate = candidates
        .find_one(valid_candidate, None)
        .await?
        .ok_or_else(|| {
            Error::not_found(format!(
                "Candidate '{}' for position '{}'",
                request.candidate_id, position_id
            ))
        })?;

    // Friendly pre-check before we hit the unique index.
    let existing = votes
        .find_one(
            doc! {"student_id": voter.id, "position_id": position_id},
            None,
        )
        .await?;
    if existing.is_some() {
        return Err(already_voted(&position));
    }

    let vote = NewVote::new(voter.id, election_id, position_id, candidate.id);
    let id: Id = match new_votes.insert_one(&vote, None).await {
        Ok(result) => result.inserted_id.as_object_id().unwrap().into(), // Valid because the ID comes directly from the DB
        Err(err) if is_duplicate_key_error(&err) => {
            // A concurrent request won the race; same answer as the pre-check.
            return Err(already_voted(&position));
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        "Vote recorded for position '{}' in election '{}'",
        position.title, election.title
    );

    let vote = votes.find_one(id.as_doc(), None).await?.unwrap(); // Just inserted.
    Ok(Json(vote.into()))
}

fn already_voted(position: &Position) -> Error {
    Error::Status(
        Status::Conflict,
        format!("You have already voted for {}.", position.title),
    )
}
