// src/admin_cli.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_log;
use crate::auth::issue_token;
use crate::core::config_manager::AuthSettings;
use crate::core::{ConfigManager, CvRepository, Database, FsOps, UserRepository};
use crate::environment::EnvironmentConfig;
use crate::export::{BlobFetcher, CommandRenderer, ExportPipeline, ExportRequest};
use crate::reconcile::{ReconcileOptions, ReconcileTarget, Reconciler};
use crate::storage::build_store;
use crate::utils::split_full_name;

#[derive(Parser)]
#[command(name = "cvfolio-admin")]
#[command(about = "Administer cvfolio users, exports and stored media")]
pub struct AdminCli {
    #[command(subcommand)]
    pub command: AdminCommand,

    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum AdminCommand {
    /// Initialize the database and media directories
    Init,
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Export a user's CV with certificates to a PDF file
    Export {
        username: String,
        /// Output file; defaults to the download filename in the current directory
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Upload legacy local media to the blob store and rewrite references
    Reconcile {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum)]
        only: Option<ReconcileTarget>,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Register a user
    Add {
        username: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Issue an access token (needs CVFOLIO_JWT_SECRET)
    Token { username: String },
    /// List all users
    List,
    /// Re-enable a disabled user
    Enable { username: String },
    /// Disable a user; their tokens stop working
    Disable { username: String },
    /// Import users from a CSV file with columns username,full_name,email
    Import { csv_file: PathBuf },
}

pub async fn handle_admin_command(cli: AdminCli) -> Result<()> {
    let environment = ConfigManager::load_environment(&cli.config)?;
    environment.ensure_directories().await?;
    let db = Database::new(&environment.database_path).await?;

    match cli.command {
        AdminCommand::Init => {
            app_log!(
                info,
                "✅ Database initialized at: {}",
                environment.database_path.display()
            );
            app_log!(info, "   Media root: {}", environment.media_root.display());
            app_log!(info, "   Tables: users, profiles, sections");
        }
        AdminCommand::User { command } => handle_user_command(&db, command).await?,
        AdminCommand::Export { username, output } => {
            export_user(&environment, &db, &username, output).await?
        }
        AdminCommand::Reconcile { dry_run, only } => {
            let store = build_store(&environment.storage).await;
            let report = Reconciler::new(db.pool(), store.as_ref(), &environment.media_root)
                .run(ReconcileOptions { dry_run, only })
                .await?;

            if dry_run {
                app_log!(info, "DRY RUN: no changes were made");
            }
            for migration in &report.migrated {
                match &migration.to {
                    Some(to) => app_log!(
                        info,
                        "✅ {} [{}] {} -> {}",
                        migration.username,
                        migration.target,
                        migration.from,
                        to
                    ),
                    None => app_log!(
                        info,
                        "   would migrate {} [{}] {}",
                        migration.username,
                        migration.target,
                        migration.from
                    ),
                }
            }
            for reference in &report.missing {
                app_log!(info, "⚠️  Local file missing: {}", reference);
            }
            for reference in &report.failed {
                app_log!(info, "❌ Failed: {}", reference);
            }

            app_log!(info, "Reconciliation summary:");
            app_log!(info, "  Examined:       {}", report.examined);
            app_log!(info, "  Already stored: {}", report.already_stored);
            app_log!(info, "  Migrated:       {}", report.migrated.len());
            app_log!(info, "  Errors:         {}", report.error_count());
        }
    }

    Ok(())
}

async fn handle_user_command(db: &Database, command: UserCommand) -> Result<()> {
    let users = UserRepository::new(db.pool());

    match command {
        UserCommand::Add {
            username,
            first_name,
            last_name,
            email,
        } => match users
            .create(&username, &first_name, &last_name, email.as_deref())
            .await
        {
            Ok(user) => {
                app_log!(info, "✅ User created:");
                app_log!(info, "   Username: {}", user.username);
                app_log!(info, "   Name: {}", user.full_name());
                app_log!(info, "   ID: {}", user.id);
            }
            Err(e) if is_duplicate_user(&e) => {
                app_log!(info, "❌ Error: username '{}' already exists", username);
                anyhow::bail!("username '{}' already exists", username);
            }
            Err(e) => return Err(e.context(format!("Failed to create user '{}'", username))),
        },

        UserCommand::Token { username } => {
            let auth = AuthSettings::from_env()?;
            let user = users
                .find_by_username(&username)
                .await?
                .with_context(|| format!("No user named '{}'", username))?;
            let token = issue_token(&auth, &user)?;
            app_log!(
                info,
                "Token for {} (valid {} hours):",
                user.username,
                auth.token_ttl_hours
            );
            println!("{}", token);
        }

        UserCommand::List => {
            let all = users.list_all().await?;
            if all.is_empty() {
                app_log!(info, "No users found.");
            } else {
                app_log!(
                    info,
                    "{:<5} {:<20} {:<30} {:<8} {:<20}",
                    "ID",
                    "Username",
                    "Name",
                    "Active",
                    "Created"
                );
                app_log!(info, "{}", "-".repeat(85));
                for user in all {
                    app_log!(
                        info,
                        "{:<5} {:<20} {:<30} {:<8} {:<20}",
                        user.id,
                        user.username,
                        user.full_name(),
                        if user.is_active { "yes" } else { "no" },
                        user.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        UserCommand::Enable { username } => set_active(&users, &username, true).await?,
        UserCommand::Disable { username } => set_active(&users, &username, false).await?,

        UserCommand::Import { csv_file } => {
            if !csv_file.exists() {
                app_log!(info, "❌ CSV file not found: {}", csv_file.display());
                return Ok(());
            }

            let content = tokio::fs::read_to_string(&csv_file).await?;
            let mut reader = csv::Reader::from_reader(content.as_bytes());

            let mut success_count = 0;
            let mut error_count = 0;

            for result in reader.records() {
                let record = match result {
                    Ok(record) => record,
                    Err(e) => {
                        error_count += 1;
                        app_log!(info, "❌ CSV parsing error: {}", e);
                        continue;
                    }
                };

                let username = record.get(0).unwrap_or("").trim();
                if username.is_empty() {
                    error_count += 1;
                    app_log!(info, "⚠️  Skipping record without username");
                    continue;
                }
                let (first_name, last_name) = split_full_name(record.get(1).unwrap_or(""));
                let email = record.get(2).map(str::trim).filter(|e| !e.is_empty());

                match users.create(username, &first_name, &last_name, email).await {
                    Ok(user) => {
                        success_count += 1;
                        app_log!(info, "✅ Added: {}", user.username);
                    }
                    Err(e) => {
                        error_count += 1;
                        if is_duplicate_user(&e) {
                            app_log!(info, "⚠️  Skipped (already exists): {}", username);
                        } else {
                            app_log!(info, "❌ Failed to add {}: {:#}", username, e);
                        }
                    }
                }
            }

            app_log!(info, "Import completed:");
            app_log!(info, "  ✅ Success: {}", success_count);
            app_log!(info, "  ❌ Errors:  {}", error_count);
        }
    }

    Ok(())
}

fn is_duplicate_user(error: &anyhow::Error) -> bool {
    format!("{:#}", error).contains("UNIQUE constraint failed")
}

async fn set_active(users: &UserRepository<'_>, username: &str, active: bool) -> Result<()> {
    let state = if active { "enabled" } else { "disabled" };
    if users.set_active(username, active).await? {
        app_log!(info, "✅ User {} {}", username, state);
    } else {
        app_log!(info, "❌ No user named '{}'", username);
    }
    Ok(())
}

async fn export_user(
    environment: &EnvironmentConfig,
    db: &Database,
    username: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let user = UserRepository::new(db.pool())
        .find_by_username(username)
        .await?
        .with_context(|| format!("No user named '{}'", username))?;
    let document = CvRepository::new(db.pool()).load_document(&user).await?;

    let store = build_store(&environment.storage).await;
    let fetcher = BlobFetcher::new(Arc::clone(&store), environment.media_root.clone());
    let renderer = CommandRenderer::new(environment.renderer.clone());

    let assembled = ExportPipeline::new(&fetcher, &renderer, &environment.site)
        .run(ExportRequest::from_document(document))
        .await?;

    let path = output.unwrap_or_else(|| Path::new(".").join(&assembled.filename));
    FsOps::write_bytes(&path, &assembled.bytes).await?;

    app_log!(info, "✅ Exported {} to {}", user.username, path.display());
    if let Some(pages) = assembled.page_count {
        app_log!(
            info,
            "   Pages: {} ({} CV, {} certificates)",
            pages,
            assembled.cv_pages.unwrap_or_default(),
            assembled.certificates_added
        );
    }
    for skipped in &assembled.skipped {
        app_log!(info, "⚠️  Skipped {}: {:?}", skipped.reference, skipped.reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_reconcile_flags() {
        let cli = AdminCli::try_parse_from([
            "cvfolio-admin",
            "reconcile",
            "--dry-run",
            "--only",
            "course",
        ])
        .unwrap();
        match cli.command {
            AdminCommand::Reconcile { dry_run, only } => {
                assert!(dry_run);
                assert_eq!(only, Some(ReconcileTarget::Course));
            }
            _ => panic!("expected reconcile"),
        }
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
    }

    #[test]
    fn test_parses_user_add() {
        let cli = AdminCli::try_parse_from([
            "cvfolio-admin",
            "--config",
            "prod.yaml",
            "user",
            "add",
            "ana",
            "--first-name",
            "Ana",
            "--email",
            "ana@example.com",
        ])
        .unwrap();
        match cli.command {
            AdminCommand::User {
                command:
                    UserCommand::Add {
                        username,
                        first_name,
                        last_name,
                        email,
                    },
            } => {
                assert_eq!(username, "ana");
                assert_eq!(first_name, "Ana");
                assert_eq!(last_name, "");
                assert_eq!(email.as_deref(), Some("ana@example.com"));
            }
            _ => panic!("expected user add"),
        }
        assert_eq!(cli.config, PathBuf::from("prod.yaml"));
    }

    #[tokio::test]
    async fn test_duplicate_user_add_fails() {
        let db = Database::in_memory().await.unwrap();
        let add = || UserCommand::Add {
            username: "ana".to_string(),
            first_name: "Ana".to_string(),
            last_name: String::new(),
            email: None,
        };

        handle_user_command(&db, add()).await.unwrap();
        let err = handle_user_command(&db, add()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(
            UserRepository::new(db.pool()).list_all().await.unwrap().len(),
            1
        );
    }

    #[test]
    fn test_rejects_unknown_reconcile_target() {
        assert!(AdminCli::try_parse_from(["cvfolio-admin", "reconcile", "--only", "skills"]).is_err());
    }
}
