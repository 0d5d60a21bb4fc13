use crate::api::MovieApi;
use crate::auth::{AuthContext, SessionLifetime};
use crate::config::Config;
use crate::views;
use actix_identity::IdentityMiddleware;
use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::{time::Duration, Key},
    dev::Server,
    error, http::header, http::StatusCode,
    middleware::Logger,
    web, App, HttpResponse, HttpServer,
};
use log::debug;
use std::io;
use std::net::SocketAddr;

pub type Tera = web::Data<tera::Tera>;
pub type Api = web::Data<MovieApi>;

const SESSION_COOKIE: &str = "auth-cookie";

pub fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Renders a page inside the shared header, which shows the current user.
pub fn render(
    tera: &tera::Tera,
    template: &str,
    auth: &AuthContext,
    status: StatusCode,
    mut ctx: tera::Context,
) -> actix_web::Result<HttpResponse> {
    ctx.insert("user", &auth.user());
    let body = tera
        .render(template, &ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(views::movies))
        .route("/movies/{id}", web::get().to(views::movie))
        .route("/movies/{id}/reviews/new", web::get().to(views::new_review))
        .route("/movies/{id}/reviews/new", web::post().to(views::new_review_post))
        .route(
            "/movies/{id}/reviews/{review_id}/edit",
            web::get().to(views::edit_review),
        )
        .route(
            "/movies/{id}/reviews/{review_id}/edit",
            web::post().to(views::edit_review_post),
        )
        .route(
            "/movies/{id}/reviews/{review_id}/delete",
            web::get().to(views::delete_review),
        )
        .route(
            "/movies/{id}/reviews/{review_id}/delete",
            web::post().to(views::delete_review_post),
        )
        .route("/login", web::get().to(views::login))
        .route("/login", web::post().to(views::login_post))
        .route("/register", web::get().to(views::register))
        .route("/register", web::post().to(views::register_post))
        .route("/logout", web::get().to(views::logout))
        .route("/logout", web::post().to(views::logout));
}

pub fn load_templates() -> tera::Result<tera::Tera> {
    tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"))
}

fn session_key(config: &Config) -> Key {
    match &config.session_secret {
        Some(secret) => Key::derive_from(secret.as_bytes()),
        None => Key::generate(),
    }
}

/// Binds the front end to `config.bind_addr`. The returned server has to be
/// awaited (or spawned) to start serving.
pub fn serve(config: &Config, db: sled::Db, api: MovieApi) -> io::Result<(Server, Vec<SocketAddr>)> {
    let tera = web::Data::new(
        load_templates()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?,
    );
    let db = web::Data::new(db);
    let lifetime = web::Data::new(SessionLifetime(chrono::Duration::hours(
        config.session_ttl_hours,
    )));
    let api = web::Data::new(api);
    let key = session_key(config);
    let secure = config.secure_cookies;
    let ttl = Duration::hours(config.session_ttl_hours);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_name(SESSION_COOKIE.to_owned())
                    .cookie_secure(secure)
                    .session_lifecycle(PersistentSession::default().session_ttl(ttl))
                    .build(),
            )
            .wrap(Logger::default())
            .app_data(tera.clone())
            .app_data(db.clone())
            .app_data(lifetime.clone())
            .app_data(api.clone())
            .configure(routes)
    })
    .bind(&config.bind_addr)?;

    let addrs = server.addrs();
    Ok((server.run(), addrs))
}
