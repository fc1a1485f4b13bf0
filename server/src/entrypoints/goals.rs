use evergreeners_server::{
    db::DB,
    goals::{create_goal, list_goals, update_goal, GoalPatch, GoalView, NewGoal},
};
use rocket::{serde::json::Json, State};

use super::types::{ApiError, ApiResult, CallerId};

#[get("/")]
async fn get_goals(caller: CallerId, db: &State<DB>) -> ApiResult<Vec<GoalView>> {
    let goals = list_goals(db.inner(), &caller.0)
        .await
        .map_err(|e| ApiError::internal("Failed to list goals", e))?;
    Ok(Json(goals.into_iter().map(GoalView::from).collect()))
}

#[post("/", data = "<goal>")]
async fn post_goal(caller: CallerId, db: &State<DB>, goal: Json<NewGoal>) -> ApiResult<GoalView> {
    let goal = create_goal(db.inner(), &caller.0, goal.into_inner()).await?;
    Ok(Json(goal.into()))
}

#[put("/<goal_id>", data = "<patch>")]
async fn put_goal(
    goal_id: i32,
    caller: CallerId,
    db: &State<DB>,
    patch: Json<GoalPatch>,
) -> ApiResult<GoalView> {
    let goal = update_goal(db.inner(), &caller.0, goal_id, patch.into_inner()).await?;
    Ok(Json(goal.into()))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing goal entrypoints", |rocket| async {
        rocket.mount("/api/goals", rocket::routes![get_goals, post_goal, put_goal])
    })
}
