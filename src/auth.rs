use crate::session::{Credentials, Session, User};
use crate::shell::redirect;
use crate::storage::SessionStore;
use actix_identity::{Identity, IdentityExt};
use actix_web::{dev::Payload, error, web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use chrono::{Duration, Utc};
use log::{debug, error, warn};
use std::future::{ready, Ready};
use std::ops::{Deref, DerefMut};
use thiserror::Error;
use url::form_urlencoded;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("session storage failed: {0}")]
    Storage(#[from] sled::Error),

    #[error("identity cookie could not be set: {0}")]
    Identity(String),

    #[error("{0} is not registered as app data")]
    MissingAppData(&'static str),
}

impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        error!("{}", self);
        HttpResponse::InternalServerError().body("Session error")
    }
}

/// How long a login stays valid, for the identity cookie and the stored entry alike.
#[derive(Clone, Copy, Debug)]
pub struct SessionLifetime(pub Duration);

/// Session of the browser making the current request, plus the transitions
/// that change it. Handlers receive it as an extractor.
pub struct AuthContext {
    req: HttpRequest,
    db: web::Data<sled::Db>,
    lifetime: SessionLifetime,
    browser: Option<u64>,
    session: Session,
}

impl AuthContext {
    fn load(req: &HttpRequest) -> Result<Self, AuthError> {
        let db = req
            .app_data::<web::Data<sled::Db>>()
            .cloned()
            .ok_or(AuthError::MissingAppData("session storage"))?;
        let lifetime = req
            .app_data::<web::Data<SessionLifetime>>()
            .map(|lifetime| **lifetime)
            .ok_or(AuthError::MissingAppData("session lifetime"))?;
        let browser = req
            .get_identity()
            .ok()
            .and_then(|identity| identity.id().ok())
            .and_then(|id| id.parse::<u64>().ok());
        let session = match browser {
            Some(browser) => SessionStore::get(&**db, browser, Utc::now().timestamp())?,
            None => Session::anonymous(),
        };
        Ok(AuthContext {
            req: req.clone(),
            db,
            lifetime,
            browser,
            session,
        })
    }

    pub fn user(&self) -> Option<User> {
        self.session.user()
    }

    /// Applies the login transition, then persists the result under a fresh
    /// browser id and hands that id to the identity cookie. The previous
    /// entry of this browser is only dropped once the cookie is set.
    pub fn login(&mut self, credentials: Credentials) -> Result<(), AuthError> {
        let Credentials {
            email,
            username,
            token,
        } = credentials;
        let session = self.session.login(email, username, token);
        let credentials = match session.credentials() {
            Some(credentials) => credentials,
            None => return Ok(()),
        };

        let now = Utc::now();
        let expires = (now + self.lifetime.0).timestamp();
        let req = &self.req;
        let browser = rotate(&self.db, credentials, expires, |browser| {
            Identity::login(&req.extensions(), browser.to_string())
                .map(|_| ())
                .map_err(|err| AuthError::Identity(err.to_string()))
        })?;
        if let Some(previous) = self.browser.replace(browser) {
            SessionStore::clear(&**self.db, previous)?;
        }
        let swept = SessionStore::sweep(&**self.db, now.timestamp())?;
        if swept > 0 {
            debug!("dropped {} expired sessions", swept);
        }

        debug!("browser {} logged in", browser);
        self.session = session;
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.session = self.session.logout();
        if let Some(browser) = self.browser.take() {
            SessionStore::clear(&**self.db, browser)?;
            debug!("browser {} logged out", browser);
        }
        if let Ok(identity) = self.req.get_identity() {
            identity.logout();
        }
        Ok(())
    }

    /// The movie API refused the stored token: drop it and send the user to log in again.
    pub fn expire(&mut self) -> Result<HttpResponse, AuthError> {
        warn!(
            "token of {:?} was rejected, logging out",
            self.session.user().map(|user| user.username)
        );
        self.logout()?;
        Ok(redirect("/login?expired"))
    }
}

/// Stores `credentials` under a fresh browser id and binds that id with
/// `bind`. A failed bind leaves nothing stored.
fn rotate<F>(db: &sled::Db, credentials: &Credentials, expires: i64, bind: F) -> Result<u64, AuthError>
where
    F: FnOnce(u64) -> Result<(), AuthError>,
{
    let browser = db.generate_browser_id()?;
    db.set(browser, credentials, expires)?;
    if let Err(err) = bind(browser) {
        db.clear(browser)?;
        return Err(err);
    }
    Ok(browser)
}

impl FromRequest for AuthContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(AuthContext::load(req).map_err(Into::into))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow(Credentials),
    RedirectToLogin(String),
}

/// Decides whether `requested` may be rendered for `session`.
pub fn decide(session: &Session, requested: &str) -> GateDecision {
    match session.credentials() {
        Some(credentials) => GateDecision::Allow(credentials.clone()),
        None => GateDecision::RedirectToLogin(format!(
            "/login?{}",
            form_urlencoded::Serializer::new(String::new())
                .append_pair("next", requested)
                .finish()
        )),
    }
}

/// Only paths on this site are followed after login.
pub fn local_path(next: &str) -> Option<&str> {
    if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') {
        Some(next)
    } else {
        None
    }
}

/// Extractor for views that need a logged-in user. Anonymous requests are
/// answered with a redirect to the login view before the handler runs.
pub struct Protected {
    auth: AuthContext,
    credentials: Credentials,
}

impl Protected {
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

impl Deref for Protected {
    type Target = AuthContext;

    fn deref(&self) -> &AuthContext {
        &self.auth
    }
}

impl DerefMut for Protected {
    fn deref_mut(&mut self) -> &mut AuthContext {
        &mut self.auth
    }
}

impl FromRequest for Protected {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let requested = match req.query_string() {
            "" => req.path().to_owned(),
            query => format!("{}?{}", req.path(), query),
        };
        ready(
            AuthContext::load(req)
                .map_err(actix_web::Error::from)
                .and_then(|auth| match decide(&auth.session, &requested) {
                    GateDecision::Allow(credentials) => Ok(Protected { auth, credentials }),
                    GateDecision::RedirectToLogin(location) => {
                        debug!("{} requires login", requested);
                        Err(error::InternalError::from_response(
                            "login required",
                            redirect(&location),
                        )
                        .into())
                    }
                }),
        )
    }
}
