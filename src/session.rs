use serde::Serialize;

/// Everything the movie API handed out on login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub username: String,
    pub token: String,
}

/// Identity shown to views; never carries the token.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub email: String,
    pub username: String,
}

/// Immutable session value. Email, username and token are present together or
/// not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session(Option<Credentials>);

impl Session {
    pub fn anonymous() -> Self {
        Session(None)
    }

    pub fn login(&self, email: String, username: String, token: String) -> Self {
        Session(Some(Credentials {
            email,
            username,
            token,
        }))
    }

    pub fn logout(&self) -> Self {
        Session::anonymous()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.0.as_ref()
    }

    pub fn user(&self) -> Option<User> {
        self.0.as_ref().map(|c| User {
            email: c.email.clone(),
            username: c.username.clone(),
        })
    }
}

impl From<Credentials> for Session {
    fn from(credentials: Credentials) -> Self {
        Session(Some(credentials))
    }
}
