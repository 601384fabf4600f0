//! Listen addresses and socket file options

use std::{
    fmt::{Display, Formatter},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    str::FromStr,
};

use mlogtail_common::internal;
use nix::unistd::{Group, User, geteuid};

use crate::{ControlError, Result};

/// Where the command socket listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket at a filesystem path
    Unix(PathBuf),
    /// TCP address: `IPv4:PORT`, `[IPv6]:PORT` or `host:PORT`
    Tcp(String),
}

impl FromStr for Endpoint {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ControlError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Self::Tcp(s.to_string()))
            }
            _ => Err(ControlError::InvalidEndpoint(s.to_string())),
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(address) => f.write_str(address),
        }
    }
}

/// Permissions applied to a Unix socket file after binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// File mode, e.g. `0o666`
    pub mode: u32,
    /// `OWNER[:GROUP]`, names or numeric ids
    pub owner: Option<String>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            mode: 0o666,
            owner: None,
        }
    }
}

/// Parse a mode written as octal digits (`"660"`)
///
/// # Errors
///
/// Returns [`ControlError::InvalidMode`] for non-octal input or values above
/// `777`.
pub fn parse_mode(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode, 8)
        .ok()
        .filter(|mode| *mode <= 0o777)
        .ok_or_else(|| ControlError::InvalidMode(mode.to_string()))
}

/// Numeric ids from `OWNER[:GROUP]`; a missing group leaves it unchanged
///
/// # Errors
///
/// Returns [`ControlError::InvalidOwner`] when the value is malformed or a name
/// does not resolve.
pub fn resolve_owner(owner: &str) -> Result<(u32, Option<u32>)> {
    let invalid = || ControlError::InvalidOwner(owner.to_string());

    let mut parts = owner.split(':');
    let user = parts.next().filter(|u| !u.is_empty()).ok_or_else(invalid)?;
    let group = parts.next();
    if parts.next().is_some() {
        return Err(invalid());
    }

    let uid = match user.parse::<u32>() {
        Ok(uid) => uid,
        Err(_) => lookup_user(user).ok_or_else(invalid)?,
    };

    let gid = match group {
        None => None,
        Some(group) => Some(match group.parse::<u32>() {
            Ok(gid) => gid,
            Err(_) => lookup_group(group).ok_or_else(invalid)?,
        }),
    };

    Ok((uid, gid))
}

fn lookup_user(name: &str) -> Option<u32> {
    User::from_name(name)
        .ok()
        .flatten()
        .map(|user| user.uid.as_raw())
}

fn lookup_group(name: &str) -> Option<u32> {
    Group::from_name(name)
        .ok()
        .flatten()
        .map(|group| group.gid.as_raw())
}

/// Apply mode and owner to a freshly bound socket file
///
/// Failures are logged and otherwise ignored: the socket still works, just
/// with the default permissions.
pub(crate) fn apply_options(path: &Path, options: &SocketOptions) {
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(options.mode)) {
        internal!(level = WARN, "Cannot chmod {}: {e}", path.display());
    }

    let Some(owner) = options.owner.as_deref() else {
        return;
    };

    if !geteuid().is_root() {
        internal!(
            level = WARN,
            "You need to be a superuser (root) to set the socket owner"
        );
        return;
    }

    match resolve_owner(owner) {
        Ok((uid, gid)) => {
            if let Err(e) = std::os::unix::fs::chown(path, Some(uid), gid) {
                internal!(level = WARN, "Cannot set socket owner: {e}");
            }
        }
        Err(e) => internal!(level = WARN, "Cannot set socket owner: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_unix_endpoint() {
        assert_eq!(
            "unix:/var/run/mlogtail.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/var/run/mlogtail.sock"))
        );
    }

    #[test]
    fn test_parse_tcp_endpoints() {
        for address in ["127.0.0.1:3333", "[::1]:3333", "localhost:0"] {
            assert_eq!(
                address.parse::<Endpoint>().unwrap(),
                Endpoint::Tcp(address.to_string())
            );
        }
    }

    #[test]
    fn test_parse_invalid_endpoints() {
        for address in ["unix:", "", "localhost", ":3333", "127.0.0.1:http", "1.2.3.4:70000"] {
            assert!(
                matches!(
                    address.parse::<Endpoint>(),
                    Err(ControlError::InvalidEndpoint(_))
                ),
                "{address}"
            );
        }
    }

    #[test]
    fn test_endpoint_display_round_trips() {
        for address in ["unix:/tmp/x.sock", "127.0.0.1:1"] {
            assert_eq!(address.parse::<Endpoint>().unwrap().to_string(), address);
        }
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("666").unwrap(), 0o666);
        assert_eq!(parse_mode("0600").unwrap(), 0o600);
        assert!(matches!(parse_mode("778"), Err(ControlError::InvalidMode(_))));
        assert!(matches!(parse_mode("1777"), Err(ControlError::InvalidMode(_))));
        assert!(matches!(parse_mode("rw"), Err(ControlError::InvalidMode(_))));
    }

    #[test]
    fn test_resolve_numeric_owner() {
        assert_eq!(resolve_owner("1000").unwrap(), (1000, None));
        assert_eq!(resolve_owner("1000:50").unwrap(), (1000, Some(50)));
        assert_eq!(resolve_owner("root").unwrap(), (0, None));
    }

    #[test]
    fn test_resolve_named_group() {
        let (uid, gid) = resolve_owner("root:root").unwrap();
        assert_eq!((uid, gid), (0, Some(0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_resolve_owner_from_many_threads() {
        let lookups = (0..16)
            .map(|_| tokio::task::spawn_blocking(|| resolve_owner("root:root")))
            .collect::<Vec<_>>();
        for lookup in lookups {
            assert_eq!(lookup.await.unwrap().unwrap(), (0, Some(0)));
        }
    }

    #[test]
    fn test_resolve_invalid_owner() {
        for owner in [
            "",
            ":12",
            "1:2:3",
            "no-such-user-for-mlogtail",
            "root:no-such-group-for-mlogtail",
        ] {
            assert!(
                matches!(resolve_owner(owner), Err(ControlError::InvalidOwner(_))),
                "{owner}"
            );
        }
    }
}
