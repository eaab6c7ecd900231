use serde::{de::DeserializeOwned, Serialize};
use urlencoding::encode;

use crate::{
    api::{self, CommentId, PostId},
    transport::{ApiRequest, Method, ReqwestTransport, Transport, TransportError},
    RetryPolicy, TimedOut,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] api::Error),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    TimedOut(#[from] TimedOut),

    #[error("parsing response to {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serializing request body: {0}")]
    Body(#[source] serde_json::Error),

    #[error("server reported failure for {0}")]
    NotSuccessful(String),
}

impl Error {
    /// Whether trying the same request again might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) | Error::TimedOut(_) => true,
            Error::Api(e) => {
                let status = e.status_code();
                status.is_server_error() || matches!(status.as_u16(), 408 | 429)
            }
            Error::Parse { .. } | Error::Body(_) | Error::NotSuccessful(_) => false,
        }
    }
}

/// Typed access to the forum API.
///
/// Every call goes through the retry policy; the api key, when set, is sent
/// as a bearer token.
pub struct Client<T = ReqwestTransport> {
    transport: T,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl Client<ReqwestTransport> {
    pub fn new(host: &str) -> Client<ReqwestTransport> {
        Client::with_transport(ReqwestTransport::new(host))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T) -> Client<T> {
        Client {
            transport,
            api_key: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Client<T> {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Client<T> {
        self.retry = retry;
        self
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key;
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send_with<R>(&self, policy: &RetryPolicy, req: &ApiRequest) -> Result<R, Error>
    where
        R: DeserializeOwned,
    {
        policy
            .run(
                |attempt| async move {
                    tracing::debug!(attempt, method = ?req.method, path = %req.path, "sending request");
                    let resp = self.transport.send(req).await?;
                    if !resp.is_success() {
                        return Err(Error::Api(api::Error::parse(resp.status, &resp.body)));
                    }
                    serde_json::from_slice(&resp.body).map_err(|source| Error::Parse {
                        path: req.path.clone(),
                        source,
                    })
                },
                Error::is_transient,
            )
            .await
    }

    async fn call<R>(&self, method: Method, path: String, body: Option<Vec<u8>>) -> Result<R, Error>
    where
        R: DeserializeOwned,
    {
        let req = ApiRequest {
            method,
            path,
            body,
            api_key: self.api_key.clone(),
        };
        self.send_with(&self.retry, &req).await
    }

    async fn ack(&self, method: Method, path: String) -> Result<(), Error> {
        let ack: api::Ack = self.call(method, path.clone(), None).await?;
        match ack.success {
            true => Ok(()),
            false => Err(Error::NotSuccessful(path)),
        }
    }

    pub async fn me(&self) -> Result<api::Agent, Error> {
        let resp: api::AgentResponse = self
            .call(Method::Get, String::from("/agents/me"), None)
            .await?;
        Ok(resp.agent)
    }

    /// Check `api_key` without touching the key this client uses.
    ///
    /// Makes a single attempt, and any failure just means the key is not usable.
    pub async fn verify_api_key(&self, api_key: &str) -> Option<api::Agent> {
        let req = ApiRequest {
            method: Method::Get,
            path: String::from("/agents/me"),
            body: None,
            api_key: Some(String::from(api_key)),
        };
        let policy = RetryPolicy::single_attempt(self.retry.attempt_timeout);
        match self.send_with::<api::AgentResponse>(&policy, &req).await {
            Ok(resp) => Some(resp.agent),
            Err(Error::TimedOut(TimedOut(after))) => {
                tracing::error!(
                    ?after,
                    "verifying api key timed out, check the network connection or proxy settings"
                );
                None
            }
            Err(err) => {
                tracing::debug!(%err, "api key verification failed");
                None
            }
        }
    }

    pub async fn register_agent(
        &self,
        agent: &api::NewAgent,
    ) -> Result<api::RegisterResponse, Error> {
        agent.validate()?;
        self.call(Method::Post, String::from("/agents/register"), json_body(agent)?)
            .await
    }

    pub async fn agent_profile(&self, name: &str) -> Result<api::AgentProfile, Error> {
        self.call(Method::Get, format!("/agents/profile?name={}", encode(name)), None)
            .await
    }

    pub async fn posts(&self, query: &api::PostQuery) -> Result<Vec<api::Post>, Error> {
        let resp: api::PostList = self
            .call(Method::Get, format!("/posts{}", query.to_query_string()), None)
            .await?;
        Ok(resp.posts)
    }

    /// A post and all of its comments, as the server laid them out
    pub async fn post(&self, id: &PostId) -> Result<api::PostDetail, Error> {
        self.call(Method::Get, format!("/posts/{}", encode(id.as_str())), None).await
    }

    pub async fn create_post(&self, post: &api::NewPost) -> Result<api::Post, Error> {
        post.validate()?;
        let resp: api::PostResponse = self
            .call(Method::Post, String::from("/posts"), json_body(post)?)
            .await?;
        Ok(resp.post)
    }

    pub async fn delete_post(&self, id: &PostId) -> Result<(), Error> {
        self.ack(Method::Delete, format!("/posts/{}", encode(id.as_str()))).await
    }

    pub async fn upvote_post(&self, id: &PostId) -> Result<(), Error> {
        self.ack(Method::Post, format!("/posts/{}/upvote", encode(id.as_str()))).await
    }

    pub async fn downvote_post(&self, id: &PostId) -> Result<(), Error> {
        self.ack(Method::Post, format!("/posts/{}/downvote", encode(id.as_str()))).await
    }

    /// Comment on `post`, or reply to comment `parent` of that post
    pub async fn create_comment(
        &self,
        post: &PostId,
        content: &str,
        parent: Option<&CommentId>,
    ) -> Result<api::Comment, Error> {
        let body = api::NewComment {
            content: String::from(content.trim()),
            parent_id: parent.cloned(),
        };
        body.validate()?;
        let resp: api::CommentResponse = self
            .call(
                Method::Post,
                format!("/posts/{}/comments", encode(post.as_str())),
                json_body(&body)?,
            )
            .await?;
        Ok(resp.comment)
    }

    pub async fn upvote_comment(&self, id: &CommentId) -> Result<(), Error> {
        self.ack(Method::Post, format!("/comments/{}/upvote", encode(id.as_str()))).await
    }

    pub async fn submolts(&self) -> Result<Vec<api::Submolt>, Error> {
        let resp: api::SubmoltList = self
            .call(Method::Get, String::from("/submolts"), None)
            .await?;
        Ok(resp.submolts)
    }

    pub async fn submolt(&self, name: &str) -> Result<api::Submolt, Error> {
        let resp: api::SubmoltResponse = self
            .call(Method::Get, format!("/submolts/{}", encode(name)), None)
            .await?;
        Ok(resp.submolt)
    }

    pub async fn subscribe(&self, name: &str) -> Result<(), Error> {
        self.ack(Method::Post, format!("/submolts/{}/subscribe", encode(name)))
            .await
    }

    pub async fn unsubscribe(&self, name: &str) -> Result<(), Error> {
        self.ack(Method::Delete, format!("/submolts/{}/subscribe", encode(name)))
            .await
    }
}

fn json_body<B: Serialize>(body: &B) -> Result<Option<Vec<u8>>, Error> {
    serde_json::to_vec(body).map(Some).map_err(Error::Body)
}
