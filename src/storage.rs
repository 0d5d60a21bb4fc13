use crate::session::{Credentials, Session};
use std::collections::BTreeMap;

fn serialize_id(id: u64) -> [u8; 8] {
    id.to_le_bytes()
}

fn storage_key(browser: u64, key: &str) -> Vec<u8> {
    let mut k = serialize_id(browser).to_vec();
    k.extend_from_slice(key.as_bytes());
    k
}

const LOCAL_STORAGE: &[u8] = b"local_storage";
const TOKEN: &str = "token";
const USERNAME: &str = "username";
const EMAIL: &str = "email";
const EXPIRES: &str = "expires";
const KEYS: [&str; 4] = [TOKEN, USERNAME, EMAIL, EXPIRES];

fn browser_of(key: &[u8]) -> Option<u64> {
    let id: [u8; 8] = key.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(id))
}

fn timestamp(value: &[u8]) -> Option<i64> {
    Some(i64::from_le_bytes(value.try_into().ok()?))
}

/// Durable per-browser storage for the session, surviving page reloads.
/// Entries carry a unix timestamp after which they read as anonymous.
pub trait SessionStore {
    type Error;
    fn generate_browser_id(&self) -> Result<u64, Self::Error>;
    fn set(&self, browser: u64, credentials: &Credentials, expires: i64)
        -> Result<(), Self::Error>;
    fn get(&self, browser: u64, now: i64) -> Result<Session, Self::Error>;
    fn clear(&self, browser: u64) -> Result<(), Self::Error>;
    /// Removes every entry that expired or is incomplete, returning how many
    /// browsers were dropped.
    fn sweep(&self, now: i64) -> Result<usize, Self::Error>;
}

impl SessionStore for sled::Db {
    type Error = sled::Error;

    fn generate_browser_id(&self) -> sled::Result<u64> {
        self.generate_id()
    }

    fn set(&self, browser: u64, credentials: &Credentials, expires: i64) -> sled::Result<()> {
        let storage = self.open_tree(LOCAL_STORAGE)?;
        let mut batch = sled::Batch::default();
        batch.insert(storage_key(browser, TOKEN), credentials.token.as_bytes());
        batch.insert(storage_key(browser, USERNAME), credentials.username.as_bytes());
        batch.insert(storage_key(browser, EMAIL), credentials.email.as_bytes());
        batch.insert(storage_key(browser, EXPIRES), &expires.to_le_bytes());
        storage.apply_batch(batch)
    }

    fn get(&self, browser: u64, now: i64) -> sled::Result<Session> {
        let storage = self.open_tree(LOCAL_STORAGE)?;
        let item = |key: &str| -> sled::Result<Option<String>> {
            Ok(storage
                .get(storage_key(browser, key))?
                .map(|v| String::from_utf8_lossy(&v).into_owned()))
        };
        let expires = storage
            .get(storage_key(browser, EXPIRES))?
            .and_then(|v| timestamp(&v));
        match (item(TOKEN)?, item(USERNAME)?, item(EMAIL)?, expires) {
            (Some(token), Some(username), Some(email), Some(expires)) if expires > now => {
                Ok(Credentials {
                    email,
                    username,
                    token,
                }
                .into())
            }
            (None, None, None, None) => Ok(Session::anonymous()),
            _ => {
                self.clear(browser)?;
                Ok(Session::anonymous())
            }
        }
    }

    fn clear(&self, browser: u64) -> sled::Result<()> {
        let storage = self.open_tree(LOCAL_STORAGE)?;
        let mut batch = sled::Batch::default();
        for key in &KEYS {
            batch.remove(storage_key(browser, key));
        }
        storage.apply_batch(batch)
    }

    fn sweep(&self, now: i64) -> sled::Result<usize> {
        let storage = self.open_tree(LOCAL_STORAGE)?;
        let mut browsers: BTreeMap<u64, bool> = BTreeMap::new();
        for entry in storage.iter() {
            let (key, value) = entry?;
            let browser = match browser_of(&key) {
                Some(browser) => browser,
                None => {
                    storage.remove(key)?;
                    continue;
                }
            };
            let live = browsers.entry(browser).or_insert(false);
            if &key[8..] == EXPIRES.as_bytes() {
                *live = timestamp(&value).map_or(false, |expires| expires > now);
            }
        }
        let mut dropped = 0;
        for (browser, live) in browsers {
            if !live {
                self.clear(browser)?;
                dropped += 1;
            } else if self.get(browser, now)? == Session::anonymous() {
                // `get` already dropped the incomplete entry.
                dropped += 1;
            }
        }
        Ok(dropped)
    }
}
