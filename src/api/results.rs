use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::results::{ElectionResults, ResultsDump},
    common::election::ElectionId,
};
use crate::voting::tally::TallyEngine;

pub fn routes() -> Vec<Route> {
    routes![get_results, get_dump]
}

/// Preliminary results while an election runs, final ones once it completes.
#[get("/elections/<election_id>/results")]
async fn get_results(
    election_id: ElectionId,
    tally: &State<TallyEngine>,
) -> Result<Json<ElectionResults>> {
    Ok(Json(tally.compute(election_id).await?))
}

#[get("/elections/<election_id>/dump")]
async fn get_dump(election_id: ElectionId, tally: &State<TallyEngine>) -> Result<Json<ResultsDump>> {
    Ok(Json(tally.dump(election_id).await?))
}
