use mongodb::{bson::doc, options::FindOptions, Client};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        analytics::DashboardStats,
        audit::AuditLogDescription,
        auth::{Admin, AuthToken},
        election::{CandidateSpec, ElectionDescription, ElectionSpec, ElectionSummary, PositionSpec},
        student::StudentDescription,
    },
    common::{AuditAction, ElectionState, Role},
    db::{
        audit_log::{AuditLog, NewAuditLog},
        candidate::{Candidate, NewCandidate, MAX_MANIFESTO_LENGTH},
        election::{Election, NewElection},
        position::{NewPosition, Position},
        student::StudentProfile,
        vote::Vote,
    },
    mongodb::{errors::is_duplicate_key_error, Coll, Id},
};

use super::common::{audit, election_by_id, profile_by_token, ClientIp};

pub fn routes() -> Vec<Route> {
    routes![
        management_dashboard,
        create_election,
        list_elections,
        update_election,
        delete_election,
        set_election_state,
        publish_results,
        unpublish_results,
        create_position,
        update_position,
        delete_position,
        create_candidate,
        update_candidate,
        delete_candidate,
        get_voters,
        toggle_eligibility,
    ]
}

/// Top-level counts plus recent audit activity.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManagementDashboard {
    pub stats: DashboardStats,
    pub recent_activity: Vec<AuditLogDescription>,
}

/// How many recent audit entries the dashboard shows.
const DASHBOARD_ACTIVITY: i64 = 10;

#[get("/management/dashboard")]
#[allow(clippy::too_many_arguments)]
async fn management_dashboard(
    _token: AuthToken<Admin>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    students: Coll<StudentProfile>,
    logs: Coll<AuditLog>,
) -> Result<Json<ManagementDashboard>> {
    let stats = DashboardStats {
        total_elections: elections.count_documents(None, None).await?,
        active_elections: elections
            .count_documents(doc! {"state": ElectionState::Active}, None)
            .await?,
        total_candidates: candidates.count_documents(None, None).await?,
        total_votes: votes.count_documents(None, None).await?,
        total_students: students
            .count_documents(doc! {"role": Role::Student}, None)
            .await?,
    };

    let newest_first = FindOptions::builder()
        .sort(doc! {"timestamp": -1})
        .limit(DASHBOARD_ACTIVITY)
        .build();
    let recent_activity = logs
        .find(None, newest_first)
        .await?
        .map_ok(Into::into)
        .try_collect()
        .await?;

    Ok(Json(ManagementDashboard {
        stats,
        recent_activity,
    }))
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
    elections: Coll<Election>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<Json<ElectionDescription>> {
    spec.validate()
        .map_err(|msg| Error::Status(Status::BadRequest, msg.to_string()))?;

    let election: NewElection = spec.0.into();
    let id: Id = new_elections
        .insert_one(&election, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB
        .into();
    let election = elections.find_one(id.as_doc(), None).await?.unwrap(); // Just inserted.

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Create,
        format!("Created election: {}", election.title),
        "Election",
        Some(id),
        &ip,
    )
    .await?;

    Ok(Json(election.into()))
}

/// An election row in the management listing, with content counts.
#[derive(Debug, Serialize, Deserialize)]
pub struct ElectionOverview {
    #[serde(flatten)]
    pub summary: ElectionSummary,
    pub position_count: u64,
    pub candidate_count: u64,
}

#[get("/management/elections")]
async fn list_elections(
    _token: AuthToken<Admin>,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<ElectionOverview>>> {
    let newest_first = FindOptions::builder().sort(doc! {"created_at": -1}).build();
    let all_elections: Vec<Election> = elections
        .find(None, newest_first)
        .await?
        .try_collect()
        .await?;

    let mut overviews = Vec::with_capacity(all_elections.len());
    for election in all_elections {
        let by_election = doc! {"election_id": election.id};
        let position_count = positions.count_documents(by_election.clone(), None).await?;
        let candidate_count = candidates.count_documents(by_election, None).await?;
        overviews.push(ElectionOverview {
            summary: election.into(),
            position_count,
            candidate_count,
        });
    }

    Ok(Json(overviews))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn update_election(
    token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
    elections: Coll<Election>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<Json<ElectionDescription>> {
    spec.validate()
        .map_err(|msg| Error::Status(Status::BadRequest, msg.to_string()))?;

    let election = election_by_id(election_id, &elections).await?;

    // Only the submitted fields change; lifecycle bookkeeping is preserved.
    let mut updated: NewElection = spec.0.into();
    updated.state = election.state;
    updated.results_published = election.results_published;
    updated.created_at = election.created_at;
    let result = new_elections
        .replace_one(election_id.as_doc(), &updated, None)
        .await?;
    // A no-change update matches without modifying, so only absence is an error.
    if result.matched_count == 0 {
        return Err(Error::not_found(format!(
            "Election with ID '{}'",
            election_id
        )));
    }

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Update,
        format!("Updated election: {}", updated.title),
        "Election",
        Some(election_id),
        &ip,
    )
    .await?;

    let election = elections.find_one(election_id.as_doc(), None).await?.unwrap(); // Just replaced.
    Ok(Json(election.into()))
}

#[delete("/elections/<election_id>")]
#[allow(clippy::too_many_arguments)]
async fn delete_election(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
    db_client: &State<Client>,
) -> Result<()> {
    let election = election_by_id(election_id, &elections).await?;

    // Atomically delete the election and everything hanging off it.
    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = elections
            .delete_one_with_session(election_id.as_doc(), None, &mut session)
            .await?;
        assert_eq!(result.deleted_count, 1);

        let by_election = doc! {"election_id": election_id};
        positions
            .delete_many_with_session(by_election.clone(), None, &mut session)
            .await?;
        candidates
            .delete_many_with_session(by_election.clone(), None, &mut session)
            .await?;
        votes
            .delete_many_with_session(by_election, None, &mut session)
            .await?;

        session.commit_transaction().await?;
    }

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Delete,
        format!("Deleted election: {}", election.title),
        "Election",
        Some(election_id),
        &ip,
    )
    .await?;

    Ok(())
}

/// A requested lifecycle transition.
#[derive(Debug, Serialize, Deserialize)]
pub struct StateChange {
    pub state: ElectionState,
}

#[post("/elections/<election_id>/state", data = "<change>", format = "json")]
async fn set_election_state(
    token: AuthToken<Admin>,
    election_id: Id,
    change: Json<StateChange>,
    elections: Coll<Election>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<Json<ElectionDescription>> {
    let election = election_by_id(election_id, &elections).await?;

    let next = change.state;
    if !election.state.can_transition_to(next) {
        return Err(Error::Status(
            Status::BadRequest,
            format!(
                "Election '{}' cannot move from {:?} to {:?}.",
                election.title, election.state, next
            ),
        ));
    }

    // Filter on the old state so a raced transition can't apply twice.
    let filter = doc! {
        "_id": election_id,
        "state": election.state,
    };
    let update = doc! {
        "$set": {
            "state": next,
        }
    };
    let result = elections.update_one(filter, update, None).await?;
    if result.modified_count != 1 {
        return Err(Error::Status(
            Status::Conflict,
            format!("Election '{}' was modified concurrently.", election.title),
        ));
    }

    let action = match next {
        ElectionState::Closed => AuditAction::Close,
        _ => AuditAction::Update,
    };
    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        action,
        format!("Moved election '{}' to {:?}", election.title, next),
        "Election",
        Some(election_id),
        &ip,
    )
    .await?;

    let election = elections.find_one(election_id.as_doc(), None).await?.unwrap(); // Just updated.
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/publish-results")]
async fn publish_results(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<()> {
    set_results_published(
        token, election_id, true, elections, students, logs, ip,
    )
    .await
}

#[post("/elections/<election_id>/unpublish-results")]
async fn unpublish_results(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<()> {
    set_results_published(
        token, election_id, false, elections, students, logs, ip,
    )
    .await
}

async fn set_results_published(
    token: AuthToken<Admin>,
    election_id: Id,
    published: bool,
    elections: Coll<Election>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<()> {
    let election = election_by_id(election_id, &elections).await?;
    if published && election.state == ElectionState::Draft {
        return Err(Error::Status(
            Status::BadRequest,
            "A draft election has no results to publish.".to_string(),
        ));
    }

    elections
        .update_one(
            election_id.as_doc(),
            doc! {"$set": {"results_published": published}},
            None,
        )
        .await?;

    let verb = if published { "Published" } else { "Unpublished" };
    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Publish,
        format!("{} results for election: {}", verb, election.title),
        "Election",
        Some(election_id),
        &ip,
    )
    .await?;

    Ok(())
}

#[post("/elections/<election_id>/positions", data = "<spec>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn create_position(
    token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<PositionSpec>,
    elections: Coll<Election>,
    new_positions: Coll<NewPosition>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<Json<Id>> {
    spec.validate()
        .map_err(|msg| Error::Status(Status::BadRequest, msg.to_string()))?;
    let election = election_by_id(election_id, &elections).await?;

    let position = NewPosition {
        election_id,
        title: spec.0.title,
        description: spec.0.description,
        display_order: spec.0.display_order,
        max_candidates: spec.0.max_candidates,
    };
    let id: Id = new_positions
        .insert_one(&position, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB
        .into();

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Create,
        format!(
            "Created position '{}' in election: {}",
            position.title, election.title
        ),
        "Position",
        Some(id),
        &ip,
    )
    .await?;

    Ok(Json(id))
}

#[put("/positions/<position_id>", data = "<spec>", format = "json")]
async fn update_position(
    token: AuthToken<Admin>,
    position_id: Id,
    spec: Json<PositionSpec>,
    positions: Coll<Position>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<()> {
    spec.validate()
        .map_err(|msg| Error::Status(Status::BadRequest, msg.to_string()))?;

    let set_fields = doc! {
        "$set": {
            "title": &spec.title,
            "description": &spec.description,
            "display_order": spec.display_order,
            "max_candidates": spec.max_candidates,
        }
    };
    let result = positions
        .update_one(position_id.as_doc(), set_fields, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!(
            "Position with ID '{}'",
            position_id
        )));
    }

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Update,
        format!("Updated position: {}", spec.title),
        "Position",
        Some(position_id),
        &ip,
    )
    .await?;

    Ok(())
}

#[delete("/positions/<position_id>")]
#[allow(clippy::too_many_arguments)]
async fn delete_position(
    token: AuthToken<Admin>,
    position_id: Id,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
    db_client: &State<Client>,
) -> Result<()> {
    let position = positions
        .find_one(position_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Position with ID '{}'", position_id)))?;

    // Atomically delete the position, its candidates, and its votes.
    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = positions
            .delete_one_with_session(position_id.as_doc(), None, &mut session)
            .await?;
        assert_eq!(result.deleted_count, 1);

        let by_position = doc! {"position_id": position_id};
        candidates
            .delete_many_with_session(by_position.clone(), None, &mut session)
            .await?;
        votes
            .delete_many_with_session(by_position, None, &mut session)
            .await?;

        session.commit_transaction().await?;
    }

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Delete,
        format!("Deleted position: {}", position.title),
        "Position",
        Some(position_id),
        &ip,
    )
    .await?;

    Ok(())
}

#[post("/positions/<position_id>/candidates", data = "<spec>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn create_candidate(
    token: AuthToken<Admin>,
    position_id: Id,
    spec: Json<CandidateSpec>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<Json<Id>> {
    let position = positions
        .find_one(position_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Position with ID '{}'", position_id)))?;

    // The standing student must exist.
    let standing = students
        .find_one(spec.student_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Student with ID '{}'", spec.student_id)))?;

    if spec.manifesto.chars().count() > MAX_MANIFESTO_LENGTH {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Manifestos are capped at {MAX_MANIFESTO_LENGTH} characters."),
        ));
    }

    // Enforce the candidate cap.
    let standing_count = candidates
        .count_documents(doc! {"position_id": position_id}, None)
        .await?;
    if standing_count >= u64::from(position.max_candidates) {
        return Err(Error::Status(
            Status::BadRequest,
            format!(
                "'{}' already has the maximum of {} candidates.",
                position.title, position.max_candidates
            ),
        ));
    }

    let candidate = NewCandidate {
        position_id,
        election_id: position.election_id,
        student_id: spec.student_id,
        manifesto: spec.0.manifesto,
        is_approved: spec.0.is_approved,
    };
    // One candidacy per student per position, enforced by the unique index.
    let id: Id = match new_candidates.insert_one(&candidate, None).await {
        Ok(result) => result.inserted_id.as_object_id().unwrap().into(), // Valid because the ID comes directly from the DB
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::Status(
                Status::BadRequest,
                format!(
                    "{} is already standing for {}.",
                    standing.full_name(),
                    position.title
                ),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Create,
        format!(
            "Added candidate {} for position: {}",
            standing.full_name(),
            position.title
        ),
        "Candidate",
        Some(id),
        &ip,
    )
    .await?;

    Ok(Json(id))
}

/// The editable parts of an existing candidacy.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateUpdate {
    pub manifesto: String,
    pub is_approved: bool,
}

#[put("/candidates/<candidate_id>", data = "<update>", format = "json")]
async fn update_candidate(
    token: AuthToken<Admin>,
    candidate_id: Id,
    update: Json<CandidateUpdate>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<()> {
    if update.manifesto.chars().count() > MAX_MANIFESTO_LENGTH {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Manifestos are capped at {MAX_MANIFESTO_LENGTH} characters."),
        ));
    }

    let set_fields = doc! {
        "$set": {
            "manifesto": &update.manifesto,
            "is_approved": update.is_approved,
        }
    };
    let result = candidates
        .update_one(candidate_id.as_doc(), set_fields, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!(
            "Candidate with ID '{}'",
            candidate_id
        )));
    }

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Update,
        format!("Updated candidate '{}'", candidate_id),
        "Candidate",
        Some(candidate_id),
        &ip,
    )
    .await?;

    Ok(())
}

#[delete("/candidates/<candidate_id>")]
#[allow(clippy::too_many_arguments)]
async fn delete_candidate(
    token: AuthToken<Admin>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
    db_client: &State<Client>,
) -> Result<()> {
    let candidate = candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate with ID '{}'", candidate_id)))?;

    // Atomically delete the candidacy and any votes it received.
    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = candidates
            .delete_one_with_session(candidate_id.as_doc(), None, &mut session)
            .await?;
        assert_eq!(result.deleted_count, 1);

        votes
            .delete_many_with_session(doc! {"candidate_id": candidate_id}, None, &mut session)
            .await?;

        session.commit_transaction().await?;
    }

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Delete,
        format!("Removed candidate for position '{}'", candidate.position_id),
        "Candidate",
        Some(candidate_id),
        &ip,
    )
    .await?;

    Ok(())
}

#[get("/voters")]
async fn get_voters(
    _token: AuthToken<Admin>,
    students: Coll<StudentProfile>,
) -> Result<Json<Vec<StudentDescription>>> {
    let by_name = FindOptions::builder()
        .sort(doc! {"last_name": 1, "first_name": 1})
        .build();
    let voters = students
        .find(doc! {"role": Role::Student}, by_name)
        .await?
        .map_ok(Into::into)
        .try_collect()
        .await?;
    Ok(Json(voters))
}

#[post("/voters/<profile_id>/eligibility")]
async fn toggle_eligibility(
    token: AuthToken<Admin>,
    profile_id: Id,
    students: Coll<StudentProfile>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<Json<StudentDescription>> {
    let voter = students
        .find_one(doc! {"_id": profile_id, "role": Role::Student}, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter with ID '{}'", profile_id)))?;

    let now_eligible = !voter.is_eligible;
    students
        .update_one(
            profile_id.as_doc(),
            doc! {"$set": {"is_eligible": now_eligible}},
            None,
        )
        .await?;

    let verb = if now_eligible { "Restored" } else { "Suspended" };
    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Eligibility,
        format!("{} voting rights for {}", verb, voter.full_name()),
        "StudentProfile",
        Some(profile_id),
        &ip,
    )
    .await?;

    let voter = students.find_one(profile_id.as_doc(), None).await?.unwrap(); // Just updated.
    Ok(Json(voter.into()))
}
