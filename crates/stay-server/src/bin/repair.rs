//! Administrative repair for listings that lost their owner.
//!
//! ```text
//! stay-repair                    report orphaned listings
//! stay-repair --assign <USER_ID> make an existing user the owner of every orphan
//! stay-repair --delete           delete every orphan and its reviews
//! ```

use std::path::PathBuf;

use anyhow::{Context, bail};
use tracing::info;
use uuid::Uuid;

use stay_db::Database;

enum Action {
    Report,
    Assign(Uuid),
    Delete,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Action> {
    let action = match args.next().as_deref() {
        None => Action::Report,
        Some("--assign") => {
            let raw = args.next().context("--assign needs a user id")?;
            let id = raw
                .parse()
                .with_context(|| format!("'{}' is not a valid user id", raw))?;
            Action::Assign(id)
        }
        Some("--delete") => Action::Delete,
        Some(other) => bail!("unknown argument '{}'", other),
    };

    if let Some(extra) = args.next() {
        bail!("unexpected argument '{}'", extra);
    }
    Ok(action)
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stay_repair=info,stay_db=info".into()),
        )
        .init();

    let action = parse_args(std::env::args().skip(1))?;

    let db_path: PathBuf = std::env::var("STAY_DB_PATH")
        .unwrap_or_else(|_| "stay.db".into())
        .into();
    let db = Database::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;

    match action {
        Action::Report => {
            let orphans = db.list_orphan_listings()?;
            if orphans.is_empty() {
                println!("No orphaned listings.");
            }
            for row in &orphans {
                println!("{}  {}  ({}, {})", row.id, row.title, row.location, row.country);
            }
            info!("{} orphaned listing(s) in {}", orphans.len(), db_path.display());
        }
        Action::Assign(user_id) => {
            let user_key = user_id.to_string();
            let Some(user) = db.get_user_by_id(&user_key)? else {
                bail!("no user with id {}", user_id);
            };
            let repaired = db.assign_orphans(&user.id)?;
            println!("Assigned {} listing(s) to {}", repaired, user.username);
        }
        Action::Delete => {
            let deleted = db.delete_orphans()?;
            println!("Deleted {} listing(s)", deleted);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_actions() {
        assert!(matches!(parse_args(args(&[])).unwrap(), Action::Report));
        assert!(matches!(parse_args(args(&["--delete"])).unwrap(), Action::Delete));

        let id = Uuid::new_v4();
        let action = parse_args(args(&["--assign", &id.to_string()])).unwrap();
        assert!(matches!(action, Action::Assign(got) if got == id));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(args(&["--assign"])).is_err());
        assert!(parse_args(args(&["--assign", "bob"])).is_err());
        assert!(parse_args(args(&["--delete", "now"])).is_err());
        assert!(parse_args(args(&["--purge"])).is_err());
    }
}
