use rocket::Route;

mod ballot;
mod results;
mod session;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(ballot::routes());
    routes.extend(session::routes());
    routes.extend(results::routes());
    routes
}
