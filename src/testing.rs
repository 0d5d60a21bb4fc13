//! In-process stand-in for the movie API and a cookie-keeping browser that
//! drives the real front end.

use crate::api::MovieApi;
use crate::config::Config;
use crate::shell;
use actix_web::{http::header, web, App, HttpRequest, HttpResponse, HttpServer};
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub struct FakeUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct FakeReview {
    pub id: u64,
    pub movie_id: u64,
    pub username: String,
    pub review: Option<String>,
    pub rating: u8,
    pub last_updated: String,
}

pub struct State {
    movies: Vec<Value>,
    pub users: Vec<FakeUser>,
    pub reviews: Vec<FakeReview>,
    tokens: HashMap<String, String>,
    next_id: u64,
    /// Authenticated write requests received, accepted or not.
    pub mutations: usize,
    /// Answer writes from valid tokens with a 500.
    failing_writes: bool,
}

impl State {
    fn seeded() -> Self {
        let user = |username: &str, email: &str, password: &str| FakeUser {
            username: username.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let review = |id, username: &str, text: &str, rating| FakeReview {
            id,
            movie_id: 1,
            username: username.to_owned(),
            review: Some(text.to_owned()),
            rating,
            last_updated: format!("2024-01-0{} 12:00:00", id),
        };
        State {
            movies: vec![
                json!({
                    "id": 1,
                    "title": "Toy Story",
                    "director": "John Lasseter",
                    "year": 1995,
                    "description": "A cowboy doll feels threatened by a new spaceman toy."
                }),
                json!({
                    "id": 2,
                    "title": "Up",
                    "director": "Pete Docter",
                    "year": 2009,
                    "description": "A house flies away on balloons."
                }),
            ],
            users: vec![
                user("woody", "woody@example.com", "andy"),
                user("buzz", "buzz@example.com", "infinity"),
            ],
            reviews: vec![
                review(1, "buzz", "To infinity and beyond", 9),
                review(2, "woody", "You've got a friend in me", 8),
            ],
            tokens: HashMap::new(),
            next_id: 3,
            mutations: 0,
            failing_writes: false,
        }
    }

    fn movie_json(&self, movie: &Value) -> Value {
        let id = movie["id"].as_u64();
        let ratings: Vec<f64> = self
            .reviews
            .iter()
            .filter(|r| Some(r.movie_id) == id)
            .map(|r| f64::from(r.rating))
            .collect();
        let mut movie = movie.clone();
        // Decimals arrive as strings, like a SQL ROUND(AVG(...), 1).
        movie["avg_review"] = if ratings.is_empty() {
            Value::Null
        } else {
            json!(format!(
                "{:.1}",
                ratings.iter().sum::<f64>() / ratings.len() as f64
            ))
        };
        movie
    }

    fn issue_token(&mut self, email: &str) -> String {
        self.next_id += 1;
        let token = format!("token-{}-{}", self.next_id, email);
        self.tokens.insert(token.clone(), email.to_owned());
        token
    }

    fn username_for(&self, req: &HttpRequest) -> Result<String, HttpResponse> {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| HttpResponse::Forbidden().json(json!({ "error": "Missing token" })))?;
        self.tokens
            .get(token)
            .and_then(|email| self.users.iter().find(|u| &u.email == email))
            .map(|u| u.username.clone())
            .ok_or_else(|| HttpResponse::Forbidden().json(json!({ "error": "Invalid token" })))
    }

    /// Authorizes a write the way the API does, then applies the failure switch.
    fn writer(&mut self, req: &HttpRequest) -> Result<String, HttpResponse> {
        self.mutations += 1;
        let username = self.username_for(req)?;
        if self.failing_writes {
            return Err(HttpResponse::InternalServerError()
                .json(json!({ "error": "Database unavailable" })));
        }
        Ok(username)
    }
}

type Shared = web::Data<Mutex<State>>;

fn lock(state: &Shared) -> MutexGuard<'_, State> {
    state.lock().unwrap()
}

async fn movies(state: Shared) -> HttpResponse {
    let state = lock(&state);
    let movies: Vec<Value> = state.movies.iter().map(|m| state.movie_json(m)).collect();
    HttpResponse::Ok().json(movies)
}

async fn movie(state: Shared, path: web::Path<u64>) -> HttpResponse {
    let id = path.into_inner();
    let state = lock(&state);
    let found: Vec<Value> = state
        .movies
        .iter()
        .filter(|m| m["id"].as_u64() == Some(id))
        .map(|m| state.movie_json(m))
        .collect();
    HttpResponse::Ok().json(found)
}

async fn reviews(state: Shared, path: web::Path<u64>) -> HttpResponse {
    let movie_id = path.into_inner();
    let state = lock(&state);
    let mut reviews: Vec<&FakeReview> = state
        .reviews
        .iter()
        .filter(|r| r.movie_id == movie_id)
        .collect();
    reviews.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    let body: Vec<Value> = reviews
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "username": r.username,
                "review": r.review,
                "rating": r.rating,
                "last_updated": r.last_updated,
            })
        })
        .collect();
    HttpResponse::Ok().json(body)
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(state: Shared, body: web::Json<LoginBody>) -> HttpResponse {
    let mut state = lock(&state);
    let username = state
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .map(|u| u.username.clone());
    match username {
        Some(username) => {
            let token = state.issue_token(&body.email);
            HttpResponse::Ok().json(json!({
                "token": token,
                "email": body.email,
                "username": username,
            }))
        }
        None => HttpResponse::Unauthorized().json(json!({ "error": "Wrong email or password" })),
    }
}

#[derive(Deserialize)]
struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

async fn register(state: Shared, body: web::Json<RegisterBody>) -> HttpResponse {
    let mut state = lock(&state);
    let body = body.into_inner();
    if state
        .users
        .iter()
        .any(|u| u.username == body.username || u.email == body.email)
    {
        return HttpResponse::BadRequest()
            .json(json!({ "error": "Username or email already exists" }));
    }
    let token = state.issue_token(&body.email);
    state.users.push(FakeUser {
        username: body.username,
        email: body.email,
        password: body.password,
    });
    HttpResponse::Ok().json(json!({ "token": token, "message": "Registration succesfull" }))
}

#[derive(Deserialize)]
struct ReviewBody {
    movie_id: Option<u64>,
    review: Option<String>,
    rating: u8,
}

async fn add_review(state: Shared, req: HttpRequest, body: web::Json<ReviewBody>) -> HttpResponse {
    let mut state = lock(&state);
    let username = match state.writer(&req) {
        Ok(username) => username,
        Err(response) => return response,
    };
    state.next_id += 1;
    let review = FakeReview {
        id: state.next_id,
        movie_id: body.movie_id.unwrap_or_default(),
        username,
        review: body.review.clone(),
        rating: body.rating,
        last_updated: "2024-02-01 09:30:00".to_owned(),
    };
    state.reviews.push(review);
    HttpResponse::Ok().json(json!({ "message": "Added review succesfully" }))
}

async fn edit_review(
    state: Shared,
    req: HttpRequest,
    path: web::Path<u64>,
    body: web::Json<ReviewBody>,
) -> HttpResponse {
    let mut state = lock(&state);
    if let Err(response) = state.writer(&req) {
        return response;
    }
    let id = path.into_inner();
    if let Some(review) = state.reviews.iter_mut().find(|r| r.id == id) {
        review.review = body.review.clone();
        review.rating = body.rating;
        review.last_updated = "2024-03-01 10:00:00".to_owned();
    }
    HttpResponse::Ok().json(json!({ "message": "Edit succesfull" }))
}

async fn delete_review(state: Shared, req: HttpRequest, path: web::Path<u64>) -> HttpResponse {
    let mut state = lock(&state);
    if let Err(response) = state.writer(&req) {
        return response;
    }
    let id = path.into_inner();
    state.reviews.retain(|r| r.id != id);
    HttpResponse::Ok().json(json!({ "message": "Deletion succesfull" }))
}

pub struct FakeApi {
    state: Shared,
    pub url: String,
}

impl FakeApi {
    pub fn start() -> Self {
        let state = web::Data::new(Mutex::new(State::seeded()));
        let data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/movies", web::get().to(movies))
                .route("/movies/{id}", web::get().to(movie))
                .route("/movies/reviews/{id}", web::get().to(reviews))
                .route("/login", web::post().to(login))
                .route("/register", web::post().to(register))
                .route("/add_review", web::post().to(add_review))
                .route("/edit_review/{id}", web::put().to(edit_review))
                .route("/delete_review/{id}", web::delete().to(delete_review))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let url = format!("http://{}", server.addrs()[0]);
        actix_rt::spawn(server.run());
        FakeApi { state, url }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Makes every issued token invalid, as if they all expired.
    pub fn revoke_tokens(&self) {
        self.state().tokens.clear();
    }

    /// Every later add, edit or delete fails with a server error.
    pub fn fail_writes(&self) {
        self.state().failing_writes = true;
    }

    /// Stores a review without text, as the API does when `review` is null.
    pub fn add_blank_review(&self, movie_id: u64, username: &str, rating: u8) {
        let mut state = self.state();
        state.next_id += 1;
        let review = FakeReview {
            id: state.next_id,
            movie_id,
            username: username.to_owned(),
            review: None,
            rating,
            last_updated: "2024-01-05 08:00:00".to_owned(),
        };
        state.reviews.push(review);
    }
}

pub struct Page {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

/// The front end on a random port plus a browser keeping its cookies.
pub struct Frontend {
    pub url: String,
    pub db: sled::Db,
    client: Client,
}

impl Frontend {
    pub fn start(api_url: &str) -> Self {
        let config = Config {
            bind_addr: "127.0.0.1:0".to_owned(),
            api_base_url: api_url.to_owned(),
            storage_path: String::new(),
            session_secret: Some("a test secret that is long enough for key derivation".to_owned()),
            session_ttl_hours: 1,
            secure_cookies: false,
            api_timeout: Some(Duration::from_secs(5)),
        };
        let db = sled::Config::new().temporary(true).open().unwrap();
        let api = MovieApi::new(&config.api_base_url, config.api_timeout).unwrap();
        let (server, addrs) = shell::serve(&config, db.clone(), api).unwrap();
        actix_rt::spawn(server);
        Frontend {
            url: format!("http://{}", addrs[0]),
            db,
            client: Client::builder()
                .cookie_store(true)
                .redirect(Policy::none())
                .build()
                .unwrap(),
        }
    }

    /// Whether any browser has a session stored.
    pub fn storage_is_empty(&self) -> bool {
        self.db.open_tree("local_storage").unwrap().is_empty()
    }

    async fn page(response: reqwest::Response) -> Page {
        let status = response.status();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .map(|v| v.to_str().unwrap().to_owned());
        Page {
            status,
            location,
            body: response.text().await.unwrap(),
        }
    }

    pub async fn get(&self, path: &str) -> Page {
        let response = self
            .client
            .get(format!("{}{}", self.url, path))
            .send()
            .await
            .unwrap();
        Self::page(response).await
    }

    pub async fn post(&self, path: &str, form: &[(&str, &str)]) -> Page {
        let response = self
            .client
            .post(format!("{}{}", self.url, path))
            .form(form)
            .send()
            .await
            .unwrap();
        Self::page(response).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Page {
        self.post("/login", &[("email", email), ("password", password)])
            .await
    }
}
