use rocket::Route;

mod elections;
mod otp;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(otp::routes());
    routes.extend(voting::routes());
    routes.extend(elections::routes());
    routes
}
