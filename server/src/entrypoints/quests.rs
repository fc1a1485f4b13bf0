use evergreeners_server::{
    db::DB,
    quests::{
        accept_quest, check_progress, create_quest, drop_quest, list_quests, NewQuest, QuestCheck,
        QuestListing,
    },
};
use rocket::{http::Status, serde::json::Json, State};
use shared::{Quest, QuestAssignment, QuestId};

use super::types::{ApiError, ApiResult, CallerId};
use super::user::github_client;

#[get("/")]
async fn get_quests(caller: Option<CallerId>, db: &State<DB>) -> ApiResult<Vec<QuestListing>> {
    let viewer = caller.as_ref().map(|caller| caller.0.as_str());
    let quests = list_quests(db.inner(), viewer).await?;
    Ok(Json(quests))
}

#[post("/", data = "<quest>")]
async fn post_quest(caller: CallerId, db: &State<DB>, quest: Json<NewQuest>) -> ApiResult<Quest> {
    let quest = create_quest(db.inner(), &caller.0, quest.into_inner()).await?;
    Ok(Json(quest))
}

#[post("/<quest_id>/accept")]
async fn accept(quest_id: QuestId, caller: CallerId, db: &State<DB>) -> ApiResult<QuestAssignment> {
    let assignment = accept_quest(db.inner(), quest_id, &caller.0, chrono::Utc::now()).await?;
    Ok(Json(assignment))
}

#[post("/<quest_id>/drop")]
async fn drop_active(quest_id: QuestId, caller: CallerId, db: &State<DB>) -> Result<Status, ApiError> {
    drop_quest(db.inner(), quest_id, &caller.0).await?;
    Ok(Status::NoContent)
}

#[post("/<quest_id>/check")]
async fn check(quest_id: QuestId, caller: CallerId, db: &State<DB>) -> ApiResult<QuestCheck> {
    let client = github_client(db, &caller.0).await?;
    let check = check_progress(
        db.inner(),
        &client,
        quest_id,
        &caller.0,
        &client.login,
        chrono::Utc::now(),
    )
    .await?;
    Ok(Json(check))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing quest entrypoints", |rocket| async {
        rocket.mount("/api/quests", rocket::routes![get_quests, post_quest, accept, drop_active, check])
    })
}
