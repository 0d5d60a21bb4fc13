use crate::api::{ApiError, MovieApi, NewReview, Registration, ReviewEdit};
use crate::auth::{local_path, AuthContext, Protected};
use crate::dialog::{DeleteDialog, DeleteEvent, Draft, ReviewDialog, ReviewEvent};
use crate::model::{Movie, Rating, Review};
use crate::session::Credentials;
use crate::shell::{redirect, render, Api, Tera};
use actix_web::{http::StatusCode, web, HttpResponse};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

const RATING_MESSAGE: &str = "Rating must be a whole number between 0 and 10";

fn movie_path(movie_id: u64) -> String {
    format!("/movies/{}", movie_id)
}

#[derive(Serialize)]
struct MovieView<'a> {
    id: u64,
    title: &'a str,
    director: &'a str,
    year: Option<i32>,
    description: &'a str,
    score: String,
}

impl<'a> From<&'a Movie> for MovieView<'a> {
    fn from(movie: &'a Movie) -> Self {
        MovieView {
            id: movie.id,
            title: &movie.title,
            director: movie.director.as_deref().unwrap_or(""),
            year: movie.year,
            description: movie.description.as_deref().unwrap_or(""),
            score: movie.score_label(),
        }
    }
}

#[derive(Serialize)]
struct ReviewCard<'a> {
    id: u64,
    username: &'a str,
    date: String,
    review: &'a str,
    rating: Rating,
    own: bool,
}

pub async fn movies(auth: AuthContext, api: Api, tera: Tera) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    let status = match api.movies().await {
        Ok(movies) => {
            let rows: Vec<MovieView> = movies.iter().map(MovieView::from).collect();
            ctx.insert("movies", &rows);
            StatusCode::OK
        }
        Err(err) => {
            warn!("Error fetching movies: {}", err);
            ctx.insert("error", &err.user_message("Could not load movies"));
            StatusCode::BAD_GATEWAY
        }
    };
    render(&tera, "movies.html", &auth, status, ctx)
}

/// Details page of one movie with its reviews and, optionally, an open dialog.
async fn movie_page(
    auth: &AuthContext,
    api: &MovieApi,
    tera: &tera::Tera,
    movie_id: u64,
    review_dialog: ReviewDialog,
    delete_dialog: DeleteDialog,
) -> actix_web::Result<HttpResponse> {
    let (movie, reviews) = futures_util::join!(api.movie(movie_id), api.reviews(movie_id));
    let mut ctx = tera::Context::new();

    let movie = match movie {
        Ok(Some(movie)) => movie,
        Ok(None) => {
            debug!("movie {} does not exist", movie_id);
            return render(tera, "not_found.html", auth, StatusCode::NOT_FOUND, ctx);
        }
        Err(err) => {
            warn!("Error fetching movie {}: {}", movie_id, err);
            ctx.insert("error", &err.user_message("Could not load the movie"));
            return render(tera, "error.html", auth, StatusCode::BAD_GATEWAY, ctx);
        }
    };
    ctx.insert("movie", &MovieView::from(&movie));

    let username = auth.user().map(|user| user.username);
    match &reviews {
        Ok(reviews) => {
            let cards: Vec<ReviewCard> = reviews
                .iter()
                .map(|review| ReviewCard {
                    id: review.id,
                    username: &review.username,
                    date: review.updated_on(),
                    review: review.review.as_deref().unwrap_or(""),
                    rating: review.rating,
                    own: username.as_deref() == Some(review.username.as_str()),
                })
                .collect();
            ctx.insert("reviews", &cards);
        }
        Err(err) => {
            warn!("Error fetching reviews of movie {}: {}", movie_id, err);
            ctx.insert("reviews_error", &err.user_message("Could not load reviews"));
        }
    }

    let ratings: Vec<Rating> = Rating::all().collect();
    ctx.insert("ratings", &ratings);
    ctx.insert("review_dialog", &review_dialog);
    ctx.insert("delete_dialog", &delete_dialog);
    render(tera, "movie.html", auth, StatusCode::OK, ctx)
}

pub async fn movie(
    view: Protected,
    path: web::Path<u64>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    movie_page(
        &view,
        &api,
        &tera,
        path.into_inner(),
        ReviewDialog::Closed,
        DeleteDialog::Closed,
    )
    .await
}

/// Review of `review_id` on `movie_id`, if it exists and was written by `username`.
async fn owned_review(
    api: &MovieApi,
    movie_id: u64,
    review_id: u64,
    username: &str,
) -> Result<Option<Review>, ApiError> {
    Ok(api
        .reviews(movie_id)
        .await?
        .into_iter()
        .find(|review| review.id == review_id && review.username == username))
}

#[derive(Deserialize)]
pub struct ReviewForm {
    review: String,
    rating: String,
}

impl ReviewForm {
    fn rating(&self) -> Option<Rating> {
        self.rating
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|n| Rating::try_from(n).ok())
    }
}

pub async fn new_review(
    view: Protected,
    path: web::Path<u64>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let dialog = ReviewDialog::Closed.next(ReviewEvent::Open(Draft::new_review()));
    movie_page(&view, &api, &tera, path.into_inner(), dialog, DeleteDialog::Closed).await
}

pub async fn new_review_post(
    view: Protected,
    path: web::Path<u64>,
    form: web::Form<ReviewForm>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    submit_review(view, &api, &tera, path.into_inner(), None, form.into_inner()).await
}

pub async fn edit_review(
    view: Protected,
    path: web::Path<(u64, u64)>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let (movie_id, review_id) = path.into_inner();
    match owned_review(&api, movie_id, review_id, &view.credentials().username).await {
        Ok(Some(review)) => {
            let dialog = ReviewDialog::Closed.next(ReviewEvent::Open(Draft::editing(&review)));
            movie_page(&view, &api, &tera, movie_id, dialog, DeleteDialog::Closed).await
        }
        Ok(None) => Ok(redirect(&movie_path(movie_id))),
        Err(err) => {
            warn!("Error fetching review {}: {}", review_id, err);
            Ok(redirect(&movie_path(movie_id)))
        }
    }
}

pub async fn edit_review_post(
    view: Protected,
    path: web::Path<(u64, u64)>,
    form: web::Form<ReviewForm>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let (movie_id, review_id) = path.into_inner();
    submit_review(
        view,
        &api,
        &tera,
        movie_id,
        Some(review_id),
        form.into_inner(),
    )
    .await
}

/// Runs the review dialog from `Open` through `Submitting`; a closed dialog
/// means success and reloads the details page.
async fn submit_review(
    mut view: Protected,
    api: &MovieApi,
    tera: &tera::Tera,
    movie_id: u64,
    review_id: Option<u64>,
    form: ReviewForm,
) -> actix_web::Result<HttpResponse> {
    let rating = form.rating();
    let draft = Draft {
        review_id,
        rating: rating.unwrap_or_default(),
        text: form.review,
    };
    let rating = match rating {
        Some(rating) => rating,
        None => {
            // Never sent to the movie API.
            let dialog = ReviewDialog::Open {
                draft,
                error: Some(RATING_MESSAGE.to_owned()),
            };
            return movie_page(&view, api, tera, movie_id, dialog, DeleteDialog::Closed).await;
        }
    };

    let dialog = ReviewDialog::Closed
        .next(ReviewEvent::Open(draft.clone()))
        .next(ReviewEvent::Confirm);
    let Credentials {
        username, token, ..
    } = view.credentials().clone();

    let result = match review_id {
        Some(id) => match owned_review(api, movie_id, id, &username).await {
            Ok(Some(_)) => {
                api.edit_review(
                    &token,
                    &ReviewEdit {
                        id,
                        review: &draft.text,
                        rating,
                    },
                )
                .await
            }
            Ok(None) => return Ok(redirect(&movie_path(movie_id))),
            Err(err) => Err(err),
        },
        None => {
            api.add_review(
                &token,
                &NewReview {
                    movie_id,
                    review: &draft.text,
                    rating,
                    username: &username,
                },
            )
            .await
        }
    };

    let dialog = match result {
        Ok(()) => dialog.next(ReviewEvent::Succeeded),
        Err(err) if err.is_token_rejection() => return Ok(view.expire()?),
        Err(err) => {
            warn!("Failed to submit review: {}", err);
            dialog.next(ReviewEvent::Failed(
                err.user_message("Failed to submit review"),
            ))
        }
    };
    match dialog {
        ReviewDialog::Closed => Ok(redirect(&movie_path(movie_id))),
        dialog => movie_page(&view, api, tera, movie_id, dialog, DeleteDialog::Closed).await,
    }
}

pub async fn delete_review(
    view: Protected,
    path: web::Path<(u64, u64)>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let (movie_id, review_id) = path.into_inner();
    match owned_review(&api, movie_id, review_id, &view.credentials().username).await {
        Ok(Some(_)) => {
            let dialog = DeleteDialog::Closed.next(DeleteEvent::Request(review_id));
            movie_page(&view, &api, &tera, movie_id, ReviewDialog::Closed, dialog).await
        }
        Ok(None) => Ok(redirect(&movie_path(movie_id))),
        Err(err) => {
            warn!("Error fetching review {}: {}", review_id, err);
            Ok(redirect(&movie_path(movie_id)))
        }
    }
}

pub async fn delete_review_post(
    mut view: Protected,
    path: web::Path<(u64, u64)>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let (movie_id, review_id) = path.into_inner();
    let dialog = DeleteDialog::Closed
        .next(DeleteEvent::Request(review_id))
        .next(DeleteEvent::Confirm);
    let Credentials {
        username, token, ..
    } = view.credentials().clone();

    let result = match owned_review(&api, movie_id, review_id, &username).await {
        Ok(Some(_)) => api.delete_review(&token, review_id).await,
        Ok(None) => return Ok(redirect(&movie_path(movie_id))),
        Err(err) => Err(err),
    };

    let dialog = match result {
        Ok(()) => dialog.next(DeleteEvent::Succeeded),
        Err(err) if err.is_token_rejection() => return Ok(view.expire()?),
        Err(err) => {
            warn!("Failed to delete review {}: {}", review_id, err);
            dialog.next(DeleteEvent::Failed(
                err.user_message("Failed to delete review"),
            ))
        }
    };
    match dialog {
        DeleteDialog::Closed => Ok(redirect(&movie_path(movie_id))),
        dialog => movie_page(&view, &api, &tera, movie_id, ReviewDialog::Closed, dialog).await,
    }
}

#[derive(Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
    logout: Option<String>,
    expired: Option<String>,
}

pub async fn login(
    auth: AuthContext,
    query: web::Query<LoginQuery>,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    if query.expired.is_some() {
        ctx.insert("notice", "Your session has expired, please log in again.");
    } else if query.logout.is_some() {
        ctx.insert("notice", "You have been logged out.");
    }
    ctx.insert("email", "");
    ctx.insert("next", &query.next.as_deref().and_then(local_path));
    render(&tera, "login.html", &auth, StatusCode::OK, ctx)
}

#[derive(Deserialize)]
pub struct LoginParams {
    email: String,
    password: String,
    next: Option<String>,
}

pub async fn login_post(
    mut auth: AuthContext,
    params: web::Form<LoginParams>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let next = params.next.as_deref().and_then(local_path);
    match api.login(&params.email, &params.password).await {
        Ok(response) => {
            auth.login(Credentials {
                email: response.email,
                username: response.username,
                token: response.token,
            })?;
            Ok(redirect(next.unwrap_or("/")))
        }
        Err(err) => {
            debug!("login of {} failed: {}", params.email, err);
            let mut ctx = tera::Context::new();
            ctx.insert("error", &err.user_message("Login failed"));
            ctx.insert("email", &params.email);
            ctx.insert("next", &next);
            render(&tera, "login.html", &auth, StatusCode::OK, ctx)
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterParams {
    username: String,
    email: String,
    password: String,
    confirm_password: String,
}

impl RegisterParams {
    fn validate(&self) -> Result<(), &'static str> {
        if self.username.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty()
        {
            return Err("All fields are required!");
        }
        if self.password != self.confirm_password {
            return Err("Passwords do not match!");
        }
        Ok(())
    }
}

fn register_page(
    tera: &tera::Tera,
    auth: &AuthContext,
    params: Option<&RegisterParams>,
    error: Option<&str>,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("username", params.map_or("", |p| p.username.as_str()));
    ctx.insert("email", params.map_or("", |p| p.email.as_str()));
    ctx.insert("error", &error);
    render(tera, "register.html", auth, StatusCode::OK, ctx)
}

pub async fn register(auth: AuthContext, tera: Tera) -> actix_web::Result<HttpResponse> {
    register_page(&tera, &auth, None, None)
}

pub async fn register_post(
    mut auth: AuthContext,
    params: web::Form<RegisterParams>,
    api: Api,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    if let Err(message) = params.validate() {
        return register_page(&tera, &auth, Some(&*params), Some(message));
    }
    let registration = Registration {
        username: params.username.trim(),
        email: params.email.trim(),
        password: &params.password,
    };
    match api.register(&registration).await {
        Ok(response) => {
            auth.login(Credentials {
                email: registration.email.to_owned(),
                username: registration.username.to_owned(),
                token: response.token,
            })?;
            Ok(redirect("/"))
        }
        Err(err) => {
            debug!("registration of {} failed: {}", registration.username, err);
            let message = err.user_message("Registration failed");
            register_page(&tera, &auth, Some(&*params), Some(&message))
        }
    }
}

pub async fn logout(mut auth: AuthContext) -> actix_web::Result<HttpResponse> {
    auth.logout()?;
    Ok(redirect("/login?logout"))
}
