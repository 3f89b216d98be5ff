use serde::{Deserialize, Serialize};

use crate::user::User;

/// Desired routing rule: public host → private upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub match_host: String,
    pub upstream_address: String,
    pub terminal: bool,
}

impl RouteSpec {
    pub fn for_user(user: &User, base_domain: &str, upstream_address: impl Into<String>) -> Self {
        Self {
            match_host: user.subdomain(base_domain),
            upstream_address: upstream_address.into(),
            terminal: true,
        }
    }
}
