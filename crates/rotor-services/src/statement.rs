//! Administrative SQL statements.
//!
//! Role DDL cannot take bind parameters, so identifiers and secrets are
//! rendered with quoting. Principal names are already restricted to
//! lowercase identifiers; quoting still applies to every name so that
//! database and schema names from configuration are handled the same way.

use rotor_types::{Grant, GrantTarget, PrincipalName, Secret};
use std::fmt;

/// A statement issued on an administrative session.
pub(crate) enum AdminStatement<'a> {
    DropRoleIfExists(&'a PrincipalName),
    CreateLoginRole {
        name: &'a PrincipalName,
        secret: &'a Secret,
    },
    SetPassword {
        name: &'a PrincipalName,
        secret: &'a Secret,
    },
    RenameRole {
        from: &'a PrincipalName,
        to: &'a PrincipalName,
    },
    Grant {
        grant: &'a Grant,
        to: &'a PrincipalName,
    },
    RevokeAll {
        target: &'a GrantTarget,
        from: &'a PrincipalName,
    },
}

impl AdminStatement<'_> {
    /// SQL text, including any secret.
    pub(crate) fn render(&self) -> String {
        match self {
            AdminStatement::DropRoleIfExists(name) => {
                format!("DROP ROLE IF EXISTS {}", quote_ident(name.as_str()))
            }
            AdminStatement::CreateLoginRole { name, secret } => format!(
                "CREATE ROLE {} WITH LOGIN PASSWORD {}",
                quote_ident(name.as_str()),
                quote_literal(secret.expose())
            ),
            AdminStatement::SetPassword { name, secret } => format!(
                "ALTER ROLE {} WITH PASSWORD {}",
                quote_ident(name.as_str()),
                quote_literal(secret.expose())
            ),
            AdminStatement::RenameRole { from, to } => format!(
                "ALTER ROLE {} RENAME TO {}",
                quote_ident(from.as_str()),
                quote_ident(to.as_str())
            ),
            AdminStatement::Grant { grant, to } => {
                let privileges: Vec<&str> = grant.privileges.iter().map(|p| p.keyword()).collect();
                format!(
                    "GRANT {} ON {} TO {}",
                    privileges.join(", "),
                    render_target(&grant.target),
                    quote_ident(to.as_str())
                )
            }
            AdminStatement::RevokeAll { target, from } => format!(
                "REVOKE ALL PRIVILEGES ON {} FROM {}",
                render_target(target),
                quote_ident(from.as_str())
            ),
        }
    }
}

/// Log-safe rendering: secrets are replaced.
impl fmt::Display for AdminStatement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminStatement::CreateLoginRole { name, .. } => write!(
                f,
                "CREATE ROLE {} WITH LOGIN PASSWORD <redacted>",
                quote_ident(name.as_str())
            ),
            AdminStatement::SetPassword { name, .. } => {
                write!(f, "ALTER ROLE {} WITH PASSWORD <redacted>", quote_ident(name.as_str()))
            }
            other => f.write_str(&other.render()),
        }
    }
}

fn render_target(target: &GrantTarget) -> String {
    match target {
        GrantTarget::Database(name) => format!("DATABASE {}", quote_ident(name)),
        GrantTarget::Schema(name) => format!("SCHEMA {}", quote_ident(name)),
        GrantTarget::AllTablesInSchema(name) => format!("ALL TABLES IN SCHEMA {}", quote_ident(name)),
        GrantTarget::Table { schema, table } => {
            format!("TABLE {}.{}", quote_ident(schema), quote_ident(table))
        }
    }
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal (standard-conforming strings).
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
