use evergreeners_server::{
    goals::GoalError, profile::ProfileError, quests::QuestError, store::LeaderboardUser,
};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use shared::{LeaderboardMetric, QuestAccessError, Rank, RankRecord, RankedEntry, UserId, UserStats};

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Identity of the caller, set by the authenticating gateway in front of us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub UserId);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CallerId {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.headers().get_one(USER_ID_HEADER).map(str::trim) {
            Some(id) if !id.is_empty() => Outcome::Success(Self(id.to_string())),
            _ => Outcome::Error((Status::Unauthorized, "missing caller identity")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: Status,
    pub message: String,
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

impl ApiError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Logs the cause and hides it from the client.
    pub fn internal(context: &str, error: anyhow::Error) -> Self {
        tracing::error!("{context}: {error:#}");
        Self::new(Status::InternalServerError, "internal server error")
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).respond_to(request)
    }
}

pub const fn access_status(error: &QuestAccessError) -> Status {
    match error {
        QuestAccessError::Taken
        | QuestAccessError::AlreadyActive
        | QuestAccessError::AlreadyCompleted => Status::Conflict,
        QuestAccessError::OwnQuest | QuestAccessError::NotHolder => Status::Forbidden,
    }
}

impl From<QuestError> for ApiError {
    fn from(error: QuestError) -> Self {
        match error {
            QuestError::NotFound(_) => Self::new(Status::NotFound, error.to_string()),
            QuestError::Access(access) => Self::new(access_status(&access), access.to_string()),
            QuestError::Invalid(_) => Self::new(Status::BadRequest, error.to_string()),
            QuestError::Store(e) => Self::internal("Quest storage failed", e),
        }
    }
}

impl From<GoalError> for ApiError {
    fn from(error: GoalError) -> Self {
        match error {
            GoalError::NotFound(_) => Self::new(Status::NotFound, error.to_string()),
            GoalError::UnknownType(_) => Self::new(Status::BadRequest, error.to_string()),
            GoalError::Store(e) => Self::internal("Goal storage failed", e),
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(error: ProfileError) -> Self {
        match error {
            ProfileError::NotFound(_) => Self::new(Status::NotFound, error.to_string()),
            ProfileError::Private(_) => Self::new(Status::Forbidden, error.to_string()),
            ProfileError::Store(e) => Self::internal("Profile lookup failed", e),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: Option<Rank>,
    pub score: u64,
    pub id: UserId,
    pub username: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub stats: UserStats,
}

impl LeaderboardEntry {
    pub fn new(ranked: RankedEntry<usize>, user: LeaderboardUser) -> Self {
        Self {
            rank: ranked.rank,
            score: ranked.score,
            id: user.id,
            username: user.username,
            name: user.name,
            image: user.image,
            stats: user.stats,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub metric: LeaderboardMetric,
    pub entries: Vec<LeaderboardEntry>,
    /// Rank of the caller, when identified.
    pub me: Option<RankRecord>,
}
