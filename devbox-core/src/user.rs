use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};

/// A verified developer identity.
///
/// `id` is stable and doubles as the guest id and the address suffix of the
/// user's workload, so it must never be reassigned to another login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

impl User {
    pub fn new(login: &str, id: u32) -> Self {
        Self {
            login: normalize_login(login),
            id,
            pubkey: None,
        }
    }

    pub fn with_pubkey(mut self, pubkey: impl Into<String>) -> Self {
        self.pubkey = Some(pubkey.into());
        self
    }

    /// Public hostname of this user's workspace under `base_domain`.
    pub fn subdomain(&self, base_domain: &str) -> String {
        format!("{}.{}", self.login, base_domain.trim_matches('.'))
    }
}

pub fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

/// Logins become DNS labels, so only lowercase alphanumerics and inner hyphens.
fn validate_login(login: &str) -> Result<()> {
    let valid = !login.is_empty()
        && login.len() <= 63
        && !login.starts_with('-')
        && !login.ends_with('-')
        && login
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidUser(format!(
            "login '{}' is not a valid DNS label",
            login
        )))
    }
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<User>,
}

/// Immutable snapshot of the users allowed to launch a workspace.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, User>,
}

impl UserDirectory {
    pub fn from_users(users: impl IntoIterator<Item = User>) -> Result<Self> {
        let mut by_login = HashMap::new();
        let mut ids = HashSet::new();

        for mut user in users {
            user.login = normalize_login(&user.login);
            validate_login(&user.login)?;

            if !ids.insert(user.id) {
                return Err(CoreError::DuplicateUser(format!("id {}", user.id)));
            }
            if by_login.contains_key(&user.login) {
                return Err(CoreError::DuplicateUser(user.login));
            }

            by_login.insert(user.login.clone(), user);
        }

        Ok(Self { users: by_login })
    }

    /// Load a `{"users": [...]}` document. YAML for `.yaml`/`.yml`, JSON otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        let list: UserList = if is_yaml {
            serde_yaml_ng::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };

        let directory = Self::from_users(list.users)?;
        info!(
            path = %path.display(),
            count = directory.len(),
            "Loaded user directory"
        );
        Ok(directory)
    }

    pub fn get(&self, login: &str) -> Option<&User> {
        let user = self.users.get(&normalize_login(login));
        if user.is_none() {
            debug!(login, "User not found in directory");
        }
        user
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_login_is_normalized() {
        let user = User::new("  Alice ", 42);
        assert_eq!(user.login, "alice");
        assert_eq!(user.subdomain("code.example.com."), "alice.code.example.com");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let directory = UserDirectory::from_users(vec![User::new("alice", 42)]).unwrap();
        assert_eq!(directory.get("ALICE").map(|u| u.id), Some(42));
        assert!(directory.get("bob").is_none());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let result = UserDirectory::from_users(vec![User::new("alice", 42), User::new("bob", 42)]);
        assert!(matches!(result, Err(CoreError::DuplicateUser(_))));
    }

    #[test]
    fn test_duplicate_logins_are_rejected() {
        let result = UserDirectory::from_users(vec![User::new("alice", 42), User::new("Alice", 43)]);
        assert!(matches!(result, Err(CoreError::DuplicateUser(_))));
    }

    #[test]
    fn test_login_must_be_dns_label() {
        let result = UserDirectory::from_users(vec![User::new("alice.smith", 42)]);
        assert!(matches!(result, Err(CoreError::InvalidUser(_))));
    }

    #[test]
    fn test_load_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("users.json");
        let mut file = std::fs::File::create(&json_path).unwrap();
        write!(
            file,
            r#"{{"users": [{{"login": "CarolDev", "id": 7500}}, {{"login": "alice", "id": 42, "pubkey": "ssh-ed25519 AAAA"}}]}}"#
        )
        .unwrap();

        let directory = UserDirectory::load(&json_path).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.get("caroldev").unwrap().id, 7500);
        assert_eq!(
            directory.get("alice").unwrap().pubkey.as_deref(),
            Some("ssh-ed25519 AAAA")
        );

        let yaml_path = dir.path().join("users.yaml");
        std::fs::write(&yaml_path, "users:\n  - login: bob\n    id: 101\n").unwrap();
        let directory = UserDirectory::load(&yaml_path).unwrap();
        assert_eq!(directory.get("bob").unwrap().id, 101);
    }
}
