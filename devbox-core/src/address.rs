//! Deterministic private addressing.
//!
//! A workload's private address is a pure function of configuration and the
//! user id. The same template is rendered when the guest's network is
//! configured at clone time and again whenever the reconciler reports the
//! address, so both sides always agree without asking the platform.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

const DECIMAL: &str = "%d";
const HEX: &str = "%x";

/// Address template such as `10.0.0.%d` or `10.0.0.%d/24`.
///
/// `%d` writes the id in decimal and `%x` in lowercase hex. In an IPv6 group
/// the decimal digits are read as hex, so `fd00::%d` maps id 7500 to
/// `fd00::7500` (0x7500) and accepts ids up to 9999 only; `fd00::%x` maps
/// 7500 to `fd00::1d4c` and covers ids up to 65535 in one group. Ids that do
/// not fit render an invalid address and are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressTemplate {
    template: String,
}

impl AddressTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into().trim().to_string();
        if template.matches(DECIMAL).count() + template.matches(HEX).count() != 1 {
            return Err(CoreError::InvalidTemplate(template));
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Render the value handed to the platform, including any CIDR suffix.
    pub fn render(&self, id: u32) -> Result<String> {
        let rendered = if self.template.contains(HEX) {
            self.template.replacen(HEX, &format!("{id:x}"), 1)
        } else {
            self.template.replacen(DECIMAL, &id.to_string(), 1)
        };
        let (host, prefix) = split_prefix(&rendered);

        let ip: IpAddr = host
            .parse()
            .map_err(|_| CoreError::InvalidAddress(rendered.clone()))?;

        if let Some(prefix) = prefix {
            let max = if ip.is_ipv4() { 32 } else { 128 };
            match prefix.parse::<u8>() {
                Ok(len) if len <= max => {}
                _ => return Err(CoreError::InvalidAddress(rendered)),
            }
        }

        Ok(rendered)
    }

    /// Bare IP address used as the routing upstream.
    pub fn host(&self, id: u32) -> Result<IpAddr> {
        let rendered = self.render(id)?;
        let (host, _) = split_prefix(&rendered);
        host.parse()
            .map_err(|_| CoreError::InvalidAddress(rendered.clone()))
    }
}

fn split_prefix(value: &str) -> (&str, Option<&str>) {
    match value.split_once('/') {
        Some((host, prefix)) => (host, Some(prefix)),
        None => (value, None),
    }
}

impl TryFrom<String> for AddressTemplate {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AddressTemplate> for String {
    fn from(template: AddressTemplate) -> Self {
        template.template
    }
}

impl fmt::Display for AddressTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
