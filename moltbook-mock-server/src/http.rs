use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use moltbook_api::{
    self as api, CommentId, NewAgent, NewComment, NewPost, PostId, PostQuery, Vote, API_PREFIX,
};
use tokio::sync::Mutex;

use crate::MockServer;

pub type Shared = Arc<Mutex<MockServer>>;

/// Bearer token of the request, if any
struct ApiKey(Option<String>);

impl ApiKey {
    fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ApiKey {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ApiKey(
            parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(String::from),
        ))
    }
}

struct Error(api::Error);

impl From<api::Error> for Error {
    fn from(e: api::Error) -> Error {
        Error(e)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::info!("returning error to client: {}", self.0);
        (
            self.0.status_code(),
            [(header::CONTENT_TYPE, "application/json")],
            self.0.contents(),
        )
            .into_response()
    }
}

type Res<T> = Result<Json<T>, Error>;

async fn fail_on_demand<B>(
    State(server): State<Shared>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    if server.lock().await.take_failure() {
        tracing::debug!(uri = %req.uri(), "failing request on purpose");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "success": false, "message": "try again later" })),
        )
            .into_response();
    }
    next.run(req).await
}

async fn me(State(s): State<Shared>, key: ApiKey) -> Res<api::AgentResponse> {
    Ok(Json(s.lock().await.me(key.get())?))
}

async fn register(
    State(s): State<Shared>,
    Json(new): Json<NewAgent>,
) -> Res<api::RegisterResponse> {
    Ok(Json(s.lock().await.register(new)?))
}

#[derive(serde::Deserialize)]
struct ProfileQuery {
    name: String,
}

async fn profile(
    State(s): State<Shared>,
    key: ApiKey,
    Query(q): Query<ProfileQuery>,
) -> Res<api::AgentProfile> {
    Ok(Json(s.lock().await.profile(key.get(), &q.name)?))
}

async fn list_posts(
    State(s): State<Shared>,
    key: ApiKey,
    Query(q): Query<PostQuery>,
) -> Res<api::PostList> {
    Ok(Json(s.lock().await.posts(key.get(), &q)?))
}

async fn create_post(
    State(s): State<Shared>,
    key: ApiKey,
    Json(new): Json<NewPost>,
) -> Res<api::PostResponse> {
    Ok(Json(s.lock().await.create_post(key.get(), new)?))
}

async fn get_post(
    State(s): State<Shared>,
    key: ApiKey,
    Path(id): Path<PostId>,
) -> Res<api::PostDetail> {
    Ok(Json(s.lock().await.post(key.get(), &id)?))
}

async fn delete_post(
    State(s): State<Shared>,
    key: ApiKey,
    Path(id): Path<PostId>,
) -> Res<api::Ack> {
    Ok(Json(s.lock().await.delete_post(key.get(), &id)?))
}

async fn upvote_post(
    State(s): State<Shared>,
    key: ApiKey,
    Path(id): Path<PostId>,
) -> Res<api::Ack> {
    Ok(Json(s.lock().await.vote_post(key.get(), &id, Vote::Up)?))
}

async fn downvote_post(
    State(s): State<Shared>,
    key: ApiKey,
    Path(id): Path<PostId>,
) -> Res<api::Ack> {
    Ok(Json(s.lock().await.vote_post(key.get(), &id, Vote::Down)?))
}

async fn create_comment(
    State(s): State<Shared>,
    key: ApiKey,
    Path(id): Path<PostId>,
    Json(new): Json<NewComment>,
) -> Res<api::CommentResponse> {
    Ok(Json(s.lock().await.create_comment(key.get(), &id, new)?))
}

async fn upvote_comment(
    State(s): State<Shared>,
    key: ApiKey,
    Path(id): Path<CommentId>,
) -> Res<api::Ack> {
    Ok(Json(s.lock().await.upvote_comment(key.get(), &id)?))
}

async fn list_submolts(State(s): State<Shared>) -> Json<api::SubmoltList> {
    Json(s.lock().await.submolts())
}

async fn get_submolt(
    State(s): State<Shared>,
    Path(name): Path<String>,
) -> Res<api::SubmoltResponse> {
    Ok(Json(s.lock().await.submolt(&name)?))
}

async fn subscribe(
    State(s): State<Shared>,
    key: ApiKey,
    Path(name): Path<String>,
) -> Res<api::Ack> {
    Ok(Json(s.lock().await.set_subscribed(key.get(), &name, true)?))
}

async fn unsubscribe(
    State(s): State<Shared>,
    key: ApiKey,
    Path(name): Path<String>,
) -> Res<api::Ack> {
    Ok(Json(s.lock().await.set_subscribed(key.get(), &name, false)?))
}

pub fn router(server: Shared) -> Router {
    let api = Router::new()
        .route("/agents/me", get(me))
        .route("/agents/register", post(register))
        .route("/agents/profile", get(profile))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/:id", get(get_post).delete(delete_post))
        .route("/posts/:id/upvote", post(upvote_post))
        .route("/posts/:id/downvote", post(downvote_post))
        .route("/posts/:id/comments", post(create_comment))
        .route("/comments/:id/upvote", post(upvote_comment))
        .route("/submolts", get(list_submolts))
        .route("/submolts/:name", get(get_submolt))
        .route("/submolts/:name/subscribe", post(subscribe).delete(unsubscribe))
        .route_layer(middleware::from_fn_with_state(
            server.clone(),
            fail_on_demand,
        ));
    Router::new().nest(API_PREFIX, api).with_state(server)
}

/// Serve `server` on an ephemeral localhost port, returning the base url
pub async fn spawn(server: Shared) -> anyhow::Result<String> {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").context("binding mock server socket")?;
    let addr: SocketAddr = listener.local_addr().context("getting mock server address")?;
    let app = router(server);
    let srv = axum::Server::from_tcp(listener)
        .context("starting mock server")?
        .serve(app.into_make_service());
    tokio::spawn(async move {
        if let Err(err) = srv.await {
            tracing::error!(?err, "mock server stopped");
        }
    });
    tracing::info!("mock server listening on {}", addr);
    Ok(format!("http://{addr}"))
}
