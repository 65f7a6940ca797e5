use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::Result;
use crate::persist::PersistenceManager;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    username: String,
    password: String,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn check_password(&self, candidate: &str) -> bool {
        self.password == candidate
    }
}

/// Credential registry with write-through persistence.
#[derive(Debug)]
pub struct UserManager {
    users: RwLock<HashMap<String, User>>,
    persistence: Option<Arc<PersistenceManager>>,
}

impl UserManager {
    pub fn new(persistence: Option<Arc<PersistenceManager>>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            persistence,
        }
    }

    /// Like `new`, but repopulates credentials from the users file.
    pub fn with_recovery(persistence: Option<Arc<PersistenceManager>>) -> Result<Self> {
        let users = match &persistence {
            Some(persist) => {
                let users = persist.load_users()?;
                info!(count = users.len(), "recovered users from disk");
                users
            }
            None => HashMap::new(),
        };
        Ok(Self {
            users: RwLock::new(users),
            persistence,
        })
    }

    /// Registers a new user. Returns false when the username is taken.
    pub fn register(&self, username: &str, password: &str) -> Result<bool> {
        let mut users = self.users.write().unwrap();
        if users.contains_key(username) {
            return Ok(false);
        }
        users.insert(username.to_string(), User::new(username, password));

        if let Some(persist) = &self.persistence {
            persist.save_users(&users)?;
        }
        Ok(true)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<User> {
        let users = self.users.read().unwrap();
        users
            .get(username)
            .filter(|user| user.check_password(password))
            .cloned()
    }

    pub fn exists(&self, username: &str) -> bool {
        self.users.read().unwrap().contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
