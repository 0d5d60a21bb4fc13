use crate::model::{Movie, Rating, Review};
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const SERVER_ERROR_MESSAGE: &str = "Server error, please try again later.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("could not reach the movie API: {0}")]
    Network(#[source] reqwest::Error),

    #[error("movie API answered {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Application {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("unexpected response from the movie API: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err)
        } else {
            ApiError::Network(err)
        }
    }
}

impl ApiError {
    /// Message shown to the user in place of the failed action.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Application {
                message: Some(message),
                ..
            } => message.clone(),
            ApiError::Network(_) => SERVER_ERROR_MESSAGE.to_owned(),
            _ => fallback.to_owned(),
        }
    }

    /// The bearer token was refused; the stored session is stale.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            ApiError::Application { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub token: String,
    pub email: String,
    pub username: String,
}

#[derive(Serialize, Debug)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RegisterResponse {
    pub token: String,
}

#[derive(Serialize, Debug)]
pub struct NewReview<'a> {
    pub movie_id: u64,
    pub review: &'a str,
    pub rating: Rating,
    pub username: &'a str,
}

#[derive(Serialize, Debug)]
pub struct ReviewEdit<'a> {
    pub id: u64,
    pub review: &'a str,
    pub rating: Rating,
}

/// Client for the remote movie API.
pub struct MovieApi {
    client: Client,
    base_url: String,
}

impl MovieApi {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(MovieApi {
            client: builder.build().map_err(ApiError::Network)?,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn movies(&self) -> Result<Vec<Movie>, ApiError> {
        self.fetch(self.client.get(self.url("/movies"))).await
    }

    /// The API answers with zero or one movies; zero means it does not exist.
    pub async fn movie(&self, id: u64) -> Result<Option<Movie>, ApiError> {
        let movies: Vec<Movie> = self
            .fetch(self.client.get(self.url(&format!("/movies/{}", id))))
            .await?;
        Ok(movies.into_iter().next())
    }

    pub async fn reviews(&self, movie_id: u64) -> Result<Vec<Review>, ApiError> {
        self.fetch(
            self.client
                .get(self.url(&format!("/movies/reviews/{}", movie_id))),
        )
        .await
    }

    pub async fn add_review(&self, token: &str, review: &NewReview<'_>) -> Result<(), ApiError> {
        self.send(
            self.client
                .post(self.url("/add_review"))
                .bearer_auth(token)
                .json(review),
        )
        .await
    }

    pub async fn edit_review(&self, token: &str, edit: &ReviewEdit<'_>) -> Result<(), ApiError> {
        self.send(
            self.client
                .put(self.url(&format!("/edit_review/{}", edit.id)))
                .bearer_auth(token)
                .json(edit),
        )
        .await
    }

    pub async fn delete_review(&self, token: &str, id: u64) -> Result<(), ApiError> {
        self.send(
            self.client
                .delete(self.url(&format!("/delete_review/{}", id)))
                .bearer_auth(token),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.fetch(
            self.client
                .post(self.url("/login"))
                .json(&LoginBody { email, password }),
        )
        .await
    }

    pub async fn register(
        &self,
        registration: &Registration<'_>,
    ) -> Result<RegisterResponse, ApiError> {
        self.fetch(self.client.post(self.url("/register")).json(registration))
            .await
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Mutations only care about the status; their bodies are informational.
    async fn send(&self, request: RequestBuilder) -> Result<(), ApiError> {
        checked(request.send().await?).await?;
        Ok(())
    }
}

async fn checked(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error);
    debug!("{} answered {}: {:?}", url, status, message);
    Err(ApiError::Application { status, message })
}
