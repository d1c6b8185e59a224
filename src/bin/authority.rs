//! authority CLI - operator access to the permission store
//!
//! Reads `$HOME/.authority/config.json` (or `AUTHORITY_CONFIG_PATH`) for the
//! database location and the declared permission sets.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use authority_lib::config;
use authority_lib::models::{ContentType, Group, ObjectRef, Target, User};
use authority_lib::permissions::requests;
use authority_lib::{Authority, PermissionStore};

const EXAMPLES_HELP: &str = r#"EXAMPLES:
    authority init
    authority user add alice
    authority group add editors
    authority group join alice editors
    authority model add flatpages.flatpage
    authority assign --user alice flatpage_permission --check top_secret flatpages.flatpage:1
    authority check --user alice flatpage_permission.top_secret flatpages.flatpage:1
    authority request --user alice flatpage_permission change flatpages.flatpage:1
    authority approve <grant-id> --by admin
    authority list flatpages.flatpage:1"#;

#[derive(Parser)]
#[command(name = "authority")]
#[command(author, version)]
#[command(about = "Row-level permissions from the command line")]
#[command(after_help = EXAMPLES_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json, pretty
    #[arg(short, long, default_value = "pretty", global = true)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    /// JSON output (compact)
    Json,
    /// JSON output (pretty-printed)
    #[default]
    Pretty,
}

/// Who a command acts for
#[derive(Args)]
struct ActorArgs {
    /// Username
    #[arg(long, conflicts_with = "group")]
    user: Option<String>,

    /// Group name
    #[arg(long)]
    group: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and database
    Init,

    /// User accounts
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Groups and membership
    Group {
        #[command(subcommand)]
        action: GroupCommands,
    },

    /// Models that accept per-object grants
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },

    /// Evaluate a check signature like flatpage_permission.top_secret
    Check {
        #[command(flatten)]
        actor: ActorArgs,
        signature: String,
        /// Targets: app.model or app.model:id
        targets: Vec<String>,
    },

    /// Grant checks of a permission set
    Assign {
        #[command(flatten)]
        actor: ActorArgs,
        /// Permission set label
        label: String,
        /// Checks to grant (all checks when omitted)
        #[arg(short, long = "check")]
        checks: Vec<String>,
        /// Suffix codenames with the model name
        #[arg(long)]
        generic: bool,
        /// Targets: app.model or app.model:id (the set's model when omitted)
        targets: Vec<String>,
    },

    /// Request a permission on an object
    Request {
        #[command(flatten)]
        actor: ActorArgs,
        label: String,
        check: String,
        target: String,
        #[arg(long)]
        generic: bool,
    },

    /// Approve a pending request
    Approve {
        grant_id: String,
        /// Approving username
        #[arg(long)]
        by: String,
    },

    /// Delete a grant or request
    Revoke {
        grant_id: String,
        /// Deleting username
        #[arg(long)]
        by: String,
    },

    /// Grants and requests on an object
    List {
        target: String,
        /// Only show what this username may manage
        #[arg(long = "as")]
        viewer: Option<String>,
    },

    /// Check signatures available for a model or object
    Choices { target: String },
}

#[derive(Subcommand)]
enum UserCommands {
    Add {
        username: String,
        #[arg(long)]
        superuser: bool,
        #[arg(long)]
        inactive: bool,
    },
    /// Mark a user inactive
    Deactivate { username: String },
}

#[derive(Subcommand)]
enum GroupCommands {
    Add { name: String },
    Join { username: String, group: String },
}

#[derive(Subcommand)]
enum ModelCommands {
    Add { label: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(output) => {
            print_output(&output, cli.format);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn print_output(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value).unwrap_or_default());
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_default()
            );
        }
    }
}

fn parse_target(s: &str) -> Result<Target> {
    Target::parse(s).ok_or_else(|| anyhow::anyhow!("Invalid target: {} (expected app.model[:id])", s))
}

fn parse_object(s: &str) -> Result<ObjectRef> {
    match parse_target(s)? {
        Target::Instance(obj) => Ok(obj),
        Target::Model(_) => Err(anyhow::anyhow!("{} is not an object (expected app.model:id)", s)),
    }
}

async fn open_authority() -> Result<(Authority, config::AuthorityConfig)> {
    let config = config::load_config().context("Failed to load configuration")?;
    let authority = Authority::open(&config)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path))?;
    Ok((authority, config))
}

async fn run(command: Commands) -> Result<Value> {
    let (authority, config) = open_authority().await?;

    match command {
        Commands::Init => {
            Ok(json!({
                "config": config::get_config_path()?.display().to_string(),
                "database": config.database_path,
                "use_smart_cache": authority.smart_cache,
                "permission_sets": authority.registry.permission_sets().len(),
            }))
        }
        Commands::User { action } => handle_user(&authority, action).await,
        Commands::Group { action } => handle_group(&authority, action).await,
        Commands::Model {
            action: ModelCommands::Add { label },
        } => {
            let content_type = ContentType::parse(&label)
                .ok_or_else(|| anyhow::anyhow!("Invalid model label: {}", label))?;
            authority.add_model(&content_type).await?;
            Ok(json!({ "model": content_type.label() }))
        }
        Commands::Check {
            actor,
            signature,
            targets,
        } => {
            let actor = authority
                .find_actor(actor.user.as_deref(), actor.group.as_deref())
                .await?;
            let targets = targets.iter().map(|t| parse_target(t)).collect::<Result<Vec<_>>>()?;

            let granted = match authority
                .registry
                .get_check(authority.permission_store(), actor, &signature)
            {
                Some(mut check) => {
                    check.resolver().set_smart_cache(authority.smart_cache);
                    check.call(&targets).await?
                }
                None => false,
            };
            Ok(json!({ "signature": signature, "granted": granted }))
        }
        Commands::Assign {
            actor,
            label,
            checks,
            generic,
            targets,
        } => {
            let actor = authority
                .find_actor(actor.user.as_deref(), actor.group.as_deref())
                .await?;
            let targets = targets.iter().map(|t| parse_target(t)).collect::<Result<Vec<_>>>()?;
            let checks: Vec<&str> = checks.iter().map(String::as_str).collect();

            let mut resolver = authority.resolver_for(&label, actor)?;
            let assigned = resolver.assign(&checks, &targets, generic).await?;
            Ok(serde_json::to_value(assigned)?)
        }
        Commands::Request {
            actor,
            label,
            check,
            target,
            generic,
        } => {
            let actor = authority
                .find_actor(actor.user.as_deref(), actor.group.as_deref())
                .await?;
            let obj = parse_object(&target)?;

            let mut resolver = authority.resolver_for(&label, actor)?;
            let codename = resolver.get_codename(&check, &obj.content_type, generic);
            let grant = resolver.request_perm(&codename, &obj).await?;
            Ok(serde_json::to_value(grant)?)
        }
        Commands::Approve { grant_id, by } => {
            let approver = authority.find_user(&by).await?;
            let grant = requests::approve(&*authority.store, &grant_id, &approver).await?;
            Ok(serde_json::to_value(grant)?)
        }
        Commands::Revoke { grant_id, by } => {
            let actor = authority.find_user(&by).await?;
            let grant = requests::delete_grant(&*authority.store, &grant_id, &actor).await?;
            Ok(json!({ "deleted": grant.grant_id, "codename": grant.codename }))
        }
        Commands::List { target, viewer } => {
            let obj = parse_object(&target)?;
            let grants = match viewer {
                Some(username) => {
                    let viewer = authority.find_user(&username).await?;
                    requests::manageable_permissions_for_object(
                        &*authority.store,
                        &obj,
                        &viewer,
                    )
                    .await?
                }
                None => requests::permissions_for_object(&*authority.store, &obj).await?,
            };
            Ok(serde_json::to_value(grants)?)
        }
        Commands::Choices { target } => {
            let target = parse_target(&target)?;
            let choices: Vec<Value> = authority
                .registry
                .get_choices_for(&target)
                .into_iter()
                .map(|(signature, label)| json!({ "signature": signature, "label": label }))
                .collect();
            Ok(Value::Array(choices))
        }
    }
}

async fn handle_user(authority: &Authority, action: UserCommands) -> Result<Value> {
    match action {
        UserCommands::Add {
            username,
            superuser,
            inactive,
        } => {
            let mut user = if superuser {
                User::superuser(username)
            } else {
                User::new(username)
            };
            user.is_active = !inactive;
            authority.store.create_user(&user).await?;
            Ok(serde_json::to_value(user)?)
        }
        UserCommands::Deactivate { username } => {
            let mut user = authority.find_user(&username).await?;
            user.is_active = false;
            authority.store.update_user(&user).await?;
            Ok(serde_json::to_value(user)?)
        }
    }
}

async fn handle_group(authority: &Authority, action: GroupCommands) -> Result<Value> {
    match action {
        GroupCommands::Add { name } => {
            let group = Group::new(name);
            authority.store.create_group(&group).await?;
            Ok(serde_json::to_value(group)?)
        }
        GroupCommands::Join { username, group } => {
            let user = authority.find_user(&username).await?;
            let group = authority
                .store
                .get_group_by_name(&group)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Unknown group {}", group))?;
            authority
                .store
                .add_user_to_group(&user.user_id, &group.group_id)
                .await?;
            Ok(json!({ "user": user.username, "group": group.name }))
        }
    }
}
