use chrono::Utc;
use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    api::{
        ballot::{Ballot, CastResponse, ValidationReport},
        receipt::VoteReceipt,
    },
    auth::AuthToken,
    common::election::ElectionId,
    mongodb::Id,
    store::DynStore,
};
use crate::voting::{catalog::BallotCatalog, pipeline::SubmissionPipeline};

pub fn routes() -> Vec<Route> {
    routes![get_ballot, validate_ballot, cast_ballot, get_receipt]
}

#[get("/elections/<election_id>/ballot")]
async fn get_ballot(election_id: ElectionId, store: &State<DynStore>) -> Result<Json<BallotCatalog>> {
    let catalog = BallotCatalog::fetch(store.inner().as_ref(), election_id, Utc::now()).await?;
    Ok(Json(catalog))
}

#[post("/ballot/validate", data = "<ballot>", format = "json")]
async fn validate_ballot(
    token: AuthToken,
    ballot: Json<Ballot>,
    pipeline: &State<SubmissionPipeline>,
) -> Result<Json<ValidationReport>> {
    let report = pipeline.validate(token.voter_id(), &ballot).await?;
    Ok(Json(report))
}

#[post("/ballot/cast", data = "<ballot>", format = "json")]
async fn cast_ballot(
    token: AuthToken,
    ballot: Json<Ballot>,
    pipeline: &State<SubmissionPipeline>,
    request_id: &RequestId,
) -> Result<Json<CastResponse>> {
    debug!("{request_id}: casting ballot for session {}", ballot.session_id);
    let receipt = pipeline.cast(token.voter_id(), &ballot).await?;
    Ok(Json(CastResponse { receipt }))
}

#[get("/ballot/receipt/<session_id>")]
async fn get_receipt(
    token: AuthToken,
    session_id: Id,
    pipeline: &State<SubmissionPipeline>,
) -> Result<Json<VoteReceipt>> {
    let receipt = pipeline.receipt(token.voter_id(), session_id).await?;
    Ok(Json(receipt))
}
