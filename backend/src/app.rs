use rocket::{catchers, routes, Build, Rocket};

use crate::catchers::{
    bad_request, conflict, forbidden, internal_error, not_found, service_unavailable,
    too_many_requests, unauthorized, unprocessable,
};
use crate::cors::Cors;
use crate::routes::{
    add_candidate, admin_results, all_options, declare_results, login, logout, register, reset,
    results, session_status, vote, AppState,
};

pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let cors = Cors::new(state.allowed_origin.clone());

    rocket::build()
        .attach(cors)
        .manage(state)
        .mount(
            "/api",
            routes![
                register,
                login,
                logout,
                session_status,
                results,
                vote,
                admin_results,
                add_candidate,
                declare_results,
                reset,
                all_options
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                conflict,
                unprocessable,
                too_many_requests,
                internal_error,
                service_unavailable
            ],
        )
}
