use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{Admin, AdminOrObserver, AuthToken, Student},
        election::{
            CandidateDescription, ElectionDetail, ElectionProgress, ElectionSummary,
            PositionDetail,
        },
        results::ElectionResults,
    },
    common::ElectionState,
    db::{
        candidate::Candidate, election::Election, position::Position, student::StudentProfile,
        vote::Vote,
    },
    mongodb::{Coll, Id},
};

use super::common::{
    election_by_id, positions_for_election, profile_by_token, results_for_election,
};

pub fn routes() -> Vec<Route> {
    routes![
        elections_admin,
        elections_non_admin,
        election_admin,
        election_student,
        election_public,
        get_candidate,
        dashboard,
        results_privileged,
        results_public,
    ]
}

#[get("/elections?<archived>", rank = 1)]
async fn elections_admin(
    _token: AuthToken<Admin>,
    archived: Option<bool>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionSummary>>> {
    summaries_for_elections(elections, true, archived.unwrap_or(false)).await
}

#[get("/elections?<archived>", rank = 2)]
async fn elections_non_admin(
    archived: Option<bool>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionSummary>>> {
    summaries_for_elections(elections, false, archived.unwrap_or(false)).await
}

#[get("/elections/<election_id>", rank = 1)]
async fn election_admin(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionDetail>> {
    // Admins see all states, including drafts.
    let election = election_by_id(election_id, &elections).await?;
    let caller = profile_by_token(&token, &students).await?;
    detail_for_election(
        election,
        Some(&caller),
        &positions,
        &candidates,
        &students,
        &votes,
    )
    .await
}

#[get("/elections/<election_id>", rank = 2)]
async fn election_student(
    token: AuthToken<Student>,
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionDetail>> {
    let election = visible_election_by_id(election_id, &elections).await?;
    let caller = profile_by_token(&token, &students).await?;
    detail_for_election(
        election,
        Some(&caller),
        &positions,
        &candidates,
        &students,
        &votes,
    )
    .await
}

#[get("/elections/<election_id>", rank = 3)]
async fn election_public(
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionDetail>> {
    let election = visible_election_by_id(election_id, &elections).await?;
    detail_for_election(election, None, &positions, &candidates, &students, &votes).await
}

/// An approved candidate's public profile.
#[get("/candidates/<candidate_id>")]
async fn get_candidate(
    candidate_id: Id,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
) -> Result<Json<CandidateDescription>> {
    let approved = doc! {
        "_id": candidate_id,
        "is_approved": true,
    };
    let candidate = candidates
        .find_one(approved, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate with ID '{}'", candidate_id)))?;
    let student = students
        .find_one(candidate.student_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Profile for candidate '{}'", candidate_id)))?;
    Ok(Json(CandidateDescription::new(&candidate, &student)))
}

/// The caller's voting dashboard: every election their year group can vote
/// in, with their progress through its positions.
#[get("/dashboard")]
async fn dashboard(
    token: AuthToken<Student>,
    elections: Coll<Election>,
    positions: Coll<Position>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<ElectionProgress>>> {
    let caller = profile_by_token(&token, &students).await?;

    // `eligible_year_groups` is stored as an array, so equality here is an
    // element match.
    let relevant = doc! {
        "state": ElectionState::Active,
        "eligible_year_groups": caller.year_group,
    };
    let relevant_elections: Vec<Election> =
        elections.find(relevant, None).await?.try_collect().await?;

    let mut progress = Vec::with_capacity(relevant_elections.len());
    for election in relevant_elections {
        let total_positions = positions
            .count_documents(doc! {"election_id": election.id}, None)
            .await?;
        let voted_positions = votes
            .count_documents(
                doc! {"student_id": caller.id, "election_id": election.id},
                None,
            )
            .await?;
        progress.push(ElectionProgress::new(
            election.into(),
            total_positions,
            voted_positions,
        ));
    }

    Ok(Json(progress))
}

#[get("/elections/<election_id>/results", rank = 1)]
async fn results_privileged(
    _token: AuthToken<AdminOrObserver>,
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionResults>> {
    // Admins and observers can always see results, published or not.
    let election = election_by_id(election_id, &elections).await?;
    let results =
        results_for_election(&election, &positions, &candidates, &students, &votes).await?;
    Ok(Json(results))
}

#[get("/elections/<election_id>/results", rank = 2)]
async fn results_public(
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionResults>> {
    let election = visible_election_by_id(election_id, &elections).await?;
    // Hidden until an admin publishes them; a 404 reveals nothing.
    if !election.results_published {
        return Err(Error::not_found(format!(
            "Results for election '{}'",
            election_id
        )));
    }
    let results =
        results_for_election(&election, &positions, &candidates, &students, &votes).await?;
    Ok(Json(results))
}

/// Return a non-draft election with the given ID.
async fn visible_election_by_id(
    election_id: Id,
    elections: &Coll<Election>,
) -> Result<Election> {
    let visible = doc! {
        "_id": election_id,
        "state": {"$ne": ElectionState::Draft},
    };
    elections
        .find_one(visible, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{}'", election_id)))
}

/// Retrieve election summaries.
/// If `admin` is false, drafts are hidden.
/// If `archived` is true, archived elections are returned instead of current ones.
async fn summaries_for_elections(
    elections: Coll<Election>,
    admin: bool,
    archived: bool,
) -> Result<Json<Vec<ElectionSummary>>> {
    let filter = if archived {
        doc! {
            "state": ElectionState::Archived,
        }
    } else if admin {
        doc! {
            "state": {"$ne": ElectionState::Archived},
        }
    } else {
        doc! {
            "$or": [{"state": ElectionState::Active}, {"state": ElectionState::Closed}],
        }
    };

    let elections: Vec<Election> = elections.find(filter, None).await?.try_collect().await?;
    let summaries = elections.into_iter().map(Into::into).collect();

    Ok(Json(summaries))
}

/// Assemble the full detail view: positions in display order, each with its
/// approved candidates, plus voting flags when the caller is known.
async fn detail_for_election(
    election: Election,
    caller: Option<&StudentProfile>,
    positions: &Coll<Position>,
    candidates: &Coll<Candidate>,
    students: &Coll<StudentProfile>,
    votes: &Coll<Vote>,
) -> Result<Json<ElectionDetail>> {
    let election_positions = positions_for_election(election.id, positions).await?;

    let mut details = Vec::with_capacity(election_positions.len());
    for position in &election_positions {
        let approved = doc! {
            "position_id": position.id,
            "is_approved": true,
        };
        let position_candidates: Vec<Candidate> =
            candidates.find(approved, None).await?.try_collect().await?;

        let mut descriptions = Vec::with_capacity(position_candidates.len());
        for candidate in &position_candidates {
            let student = students
                .find_one(candidate.student_id.as_doc(), None)
                .await?
                .ok_or_else(|| {
                    Error::not_found(format!("Profile for candidate '{}'", candidate.id))
                })?;
            descriptions.push(CandidateDescription::new(candidate, &student));
        }

        let mut detail = PositionDetail::new(position, descriptions);
        if let Some(caller) = caller {
            let voted = votes
                .find_one(
                    doc! {"student_id": caller.id, "position_id": position.id},
                    None,
                )
                .await?;
            detail.has_voted = Some(voted.is_some());
        }
        details.push(detail);
    }

    let eligible = caller.map(|caller| election.is_student_eligible(caller));

    Ok(Json(ElectionDetail {
        election: election.into(),
        positions: details,
        eligible,
    }))
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{http::Status, local::asynchronous::Client, serde::json::serde_json};

    use crate::api::common::fixtures::ElectionFixture;
    use crate::model::{
        api::credentials::RegistrationRequest,
        db::{
            election::{ElectionCore, NewElection},
            vote::NewVote,
        },
    };

    use super::*;

    #[backend_test(admin)]
    async fn admin_sees_drafts(client: Client, db: Database) {
        insert_elections(&db).await;

        let summaries = list_elections(&client, false).await;
        let states: Vec<ElectionState> = summaries.iter().map(|e| e.state).collect();
        assert!(states.contains(&ElectionState::Draft));
        assert!(states.contains(&ElectionState::Active));
        assert!(states.contains(&ElectionState::Closed));
        assert!(!states.contains(&ElectionState::Archived));
    }

    #[backend_test(student)]
    async fn students_do_not_see_drafts(client: Client, db: Database) {
        insert_elections(&db).await;

        let summaries = list_elections(&client, false).await;
        let states: Vec<ElectionState> = summaries.iter().map(|e| e.state).collect();
        assert!(!states.contains(&ElectionState::Draft));
        assert!(states.contains(&ElectionState::Active));
        assert!(states.contains(&ElectionState::Closed));

        // Archived elections appear only on request.
        let summaries = list_elections(&client, true).await;
        assert!(summaries.iter().all(|e| e.state == ElectionState::Archived));
    }

    #[backend_test(student)]
    async fn draft_election_hidden_from_students(client: Client, db: Database) {
        insert_elections(&db).await;
        let draft = election_in_state(&db, ElectionState::Draft).await;

        let response = client
            .get(uri!(election_student(draft.id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(student)]
    async fn election_detail_has_voting_flags(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        let response = client
            .get(uri!(election_student(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let detail: ElectionDetail =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        // Registered test student is in year 9, which is eligible.
        assert_eq!(detail.eligible, Some(true));
        assert_eq!(detail.positions.len(), 2);
        // Positions come back in display order.
        assert_eq!(detail.positions[0].title, "Head Student");
        assert_eq!(detail.positions[1].title, "Sports Captain");
        // Only the approved candidate is listed.
        assert_eq!(detail.positions[0].candidates.len(), 1);
        assert_eq!(detail.positions[0].has_voted, Some(false));

        // Vote, then check the flag flips.
        let voter = Coll::<StudentProfile>::from_db(&db)
            .find_one(
                doc! {"username": &RegistrationRequest::example().username},
                None,
            )
            .await
            .unwrap()
            .unwrap();
        Coll::<NewVote>::from_db(&db)
            .insert_one(
                NewVote::new(
                    voter.id,
                    fixture.election_id,
                    fixture.position_id,
                    fixture.candidate_id,
                ),
                None,
            )
            .await
            .unwrap();

        let response = client
            .get(uri!(election_student(fixture.election_id)))
            .dispatch()
            .await;
        let detail: ElectionDetail =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(detail.positions[0].has_voted, Some(true));
        assert_eq!(detail.positions[1].has_voted, Some(false));
    }

    #[backend_test]
    async fn anonymous_detail_has_no_flags(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        let response = client
            .get(uri!(election_public(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let raw_response = response.into_string().await.unwrap();
        let detail: ElectionDetail = serde_json::from_str(&raw_response).unwrap();
        assert_eq!(detail.eligible, None);
        assert!(detail.positions.iter().all(|p| p.has_voted.is_none()));
        // The optional fields are omitted entirely, not null.
        assert!(!raw_response.contains("has_voted"));
    }

    #[backend_test]
    async fn candidate_profile(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        let response = client
            .get(uri!(get_candidate(fixture.candidate_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let description: CandidateDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(description.name, "Billy Odinga");
        assert!(!description.manifesto.is_empty());

        // Unapproved candidates are not exposed.
        let response = client
            .get(uri!(get_candidate(fixture.unapproved_candidate_id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(student)]
    async fn dashboard_progress(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        let progress = get_dashboard(&client).await;
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].total_positions, 2);
        assert_eq!(progress[0].voted_positions, 0);
        assert_eq!(progress[0].progress_percentage, 0);

        // Cast a vote for one of the two positions.
        let voter = Coll::<StudentProfile>::from_db(&db)
            .find_one(
                doc! {"username": &RegistrationRequest::example().username},
                None,
            )
            .await
            .unwrap()
            .unwrap();
        Coll::<NewVote>::from_db(&db)
            .insert_one(
                NewVote::new(
                    voter.id,
                    fixture.election_id,
                    fixture.position_id,
                    fixture.candidate_id,
                ),
                None,
            )
            .await
            .unwrap();

        let progress = get_dashboard(&client).await;
        assert_eq!(progress[0].voted_positions, 1);
        assert_eq!(progress[0].progress_percentage, 50);
        assert!(!progress[0].voting_complete);
    }

    #[backend_test(student)]
    async fn results_hidden_until_published(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        let response = client
            .get(uri!(results_public(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        // Publish and try again.
        Coll::<Election>::from_db(&db)
            .update_one(
                fixture.election_id.as_doc(),
                doc! {"$set": {"results_published": true}},
                None,
            )
            .await
            .unwrap();

        let response = client
            .get(uri!(results_public(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results: ElectionResults =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(results.positions.len(), 2);
    }

    #[backend_test(observer)]
    async fn observers_always_see_results(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        // Unpublished, but the observer token takes the privileged route.
        let response = client
            .get(uri!(results_privileged(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    async fn insert_elections(db: &Database) {
        let mut archived = ElectionCore::closed_example();
        archived.state = ElectionState::Archived;
        Coll::<NewElection>::from_db(db)
            .insert_many(
                [
                    ElectionCore::draft_example(),
                    ElectionCore::active_example(),
                    ElectionCore::closed_example(),
                    archived,
                ],
                None,
            )
            .await
            .unwrap();
    }

    async fn election_in_state(db: &Database, state: ElectionState) -> Election {
        Coll::<Election>::from_db(db)
            .find_one(doc! {"state": state}, None)
            .await
            .unwrap()
            .unwrap()
    }

    async fn list_elections(client: &Client, archived: bool) -> Vec<ElectionSummary> {
        let response = client
            .get(uri!(elections_non_admin(Some(archived))))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    async fn get_dashboard(client: &Client) -> Vec<ElectionProgress> {
        let response = client.get(uri!(dashboard)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }
}
