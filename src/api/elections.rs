use chrono::Utc;
use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::election::{ElectionDescription, ElectionSummary},
        common::election::ElectionState,
        db::election::Election,
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![elections, election]
}

/// List all published elections, with the phase derived at response time.
#[get("/elections")]
async fn elections(elections: Coll<Election>) -> Result<Json<Vec<ElectionSummary>>> {
    let now = Utc::now();
    let published = elections
        .find(doc! { "state": ElectionState::Published }, None)
        .await?
        .try_collect::<Vec<_>>()
        .await?;

    Ok(Json(
        published
            .iter()
            .map(|election| ElectionSummary::for_election(election, now))
            .collect(),
    ))
}

/// Fetch one published election with its candidates in display order.
#[get("/elections/<election_id>")]
async fn election(election_id: Id, elections: Coll<Election>) -> Result<Json<ElectionDescription>> {
    let election = elections
        .find_one(
            doc! { "_id": election_id, "state": ElectionState::Published },
            None,
        )
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{}'", election_id)))?;

    Ok(Json(ElectionDescription::for_election(&election, Utc::now())))
}
