//! Consistency checks over a parsed configuration.

use crate::types::{RepositoryKind, ServerConfig};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use url::Url;

/// One problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending setting.
    pub field: String,
    /// What is wrong.
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Configuration validator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Validator;

impl Validator {
    /// Every issue in `config`, in declaration order.
    #[must_use]
    pub fn validate(config: &ServerConfig) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if config.listen.parse::<SocketAddr>().is_err() {
            issues.push(ValidationIssue::new(
                "listen",
                format!("'{}' is not a socket address", config.listen),
            ));
        }
        if let Err(e) = config.public_url() {
            issues.push(ValidationIssue::new("public_url", e.to_string()));
        }
        if config.http.timeout_secs == 0 {
            issues.push(ValidationIssue::new("http.timeout_secs", "must be greater than 0"));
        }

        let mut declared: HashSet<&str> = HashSet::new();
        for (i, repo) in config.repositories.iter().enumerate() {
            let field = |name: &str| format!("repositories[{i}].{name}");

            if !is_url_segment(&repo.name) {
                issues.push(ValidationIssue::new(
                    field("name"),
                    format!("'{}' must be a non-empty name without '/'", repo.name),
                ));
            }
            if declared.contains(repo.name.as_str()) {
                issues.push(ValidationIssue::new(
                    field("name"),
                    format!("duplicate repository name '{}'", repo.name),
                ));
            }
            if repo.paging_size == Some(0) {
                issues.push(ValidationIssue::new(field("paging_size"), "must be greater than 0"));
            }

            match repo.kind {
                RepositoryKind::Hosted => {}
                RepositoryKind::Proxy => match repo.remote_url.as_deref().map(Url::parse) {
                    None => issues.push(ValidationIssue::new(
                        field("remote_url"),
                        "proxy repositories need a remote_url",
                    )),
                    Some(Err(e)) => {
                        issues.push(ValidationIssue::new(field("remote_url"), e.to_string()));
                    }
                    Some(Ok(url)) if !matches!(url.scheme(), "http" | "https") => {
                        issues.push(ValidationIssue::new(
                            field("remote_url"),
                            format!("unsupported scheme '{}'", url.scheme()),
                        ));
                    }
                    Some(Ok(_)) => {}
                },
                RepositoryKind::Group => {
                    if repo.members.is_empty() {
                        issues.push(ValidationIssue::new(
                            field("members"),
                            "group repositories need at least one member",
                        ));
                    }
                    for member in &repo.members {
                        if *member == repo.name {
                            issues.push(ValidationIssue::new(
                                field("members"),
                                format!("group '{}' cannot contain itself", repo.name),
                            ));
                        } else if !declared.contains(member.as_str()) {
                            issues.push(ValidationIssue::new(
                                field("members"),
                                format!("member '{member}' must be declared before the group"),
                            ));
                        }
                    }
                }
            }

            declared.insert(repo.name.as_str());
        }

        issues
    }
}

fn is_url_segment(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('/') && name != "." && name != ".."
}
