use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::session::{AbstainRequest, SelectRequest, SessionStarted, SessionView, StartSessionRequest},
    auth::AuthToken,
    db::session::VotingSession,
    mongodb::Id,
};
use crate::voting::session::SessionManager;

pub fn routes() -> Vec<Route> {
    routes![start_session, get_session, select, abstain]
}

#[post("/session/start", data = "<request>", format = "json")]
async fn start_session(
    token: AuthToken,
    request: Json<StartSessionRequest>,
    sessions: &State<SessionManager>,
) -> Result<Json<SessionStarted>> {
    let session = sessions
        .start(request.election_id, token.voter_id())
        .await?;
    Ok(Json(SessionStarted::from(&session)))
}

#[get("/session/<session_id>")]
async fn get_session(
    token: AuthToken,
    session_id: Id,
    sessions: &State<SessionManager>,
) -> Result<Json<SessionView>> {
    let session = sessions
        .session_for_voter(session_id, token.voter_id())
        .await?;
    view(sessions, session).await
}

#[post("/session/<session_id>/select", data = "<request>", format = "json")]
async fn select(
    token: AuthToken,
    session_id: Id,
    request: Json<SelectRequest>,
    sessions: &State<SessionManager>,
) -> Result<Json<SessionView>> {
    let session = sessions
        .select(
            session_id,
            token.voter_id(),
            request.position_id,
            &request.candidate_id,
        )
        .await?;
    view(sessions, session).await
}

#[post("/session/<session_id>/abstain", data = "<request>", format = "json")]
async fn abstain(
    token: AuthToken,
    session_id: Id,
    request: Json<AbstainRequest>,
    sessions: &State<SessionManager>,
) -> Result<Json<SessionView>> {
    let session = sessions
        .abstain(session_id, token.voter_id(), request.position_id)
        .await?;
    view(sessions, session).await
}

async fn view(sessions: &SessionManager, session: VotingSession) -> Result<Json<SessionView>> {
    let catalog = sessions.catalog(session.election_id).await?;
    Ok(Json(SessionView::new(&session, &catalog)))
}
