//! The `lookalike profiles` command for managing profiles.

use clap::{Args, Subcommand};
use lookalike_core::{Config, DeletePolicy, ProfileService};

/// Arguments for the `profiles` command.
#[derive(Args, Debug)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: ProfilesCommand,
}

/// Subcommands for profile management.
#[derive(Subcommand, Debug)]
pub enum ProfilesCommand {
    /// List profiles
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create a profile
    Create { name: String },

    /// Delete a profile
    Delete {
        name: String,

        /// Also delete every image in the profile
        #[arg(long)]
        cascade: bool,
    },
}

/// Execute the profiles command.
pub async fn execute(args: ProfilesArgs, config: Config) -> anyhow::Result<()> {
    let (store, blobs) = super::open_stores(&config).await?;
    let profiles = ProfileService::new(store, blobs);

    match args.command {
        ProfilesCommand::List { json } => {
            let list = profiles.list_profiles().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("No profiles. Create one with `lookalike profiles create <name>`.");
            } else {
                println!("  {:>6}  {:30}  {}", "ID", "NAME", "CREATED");
                for profile in list {
                    println!(
                        "  {:>6}  {:30}  {}",
                        profile.id,
                        profile.name,
                        profile.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }

        ProfilesCommand::Create { name } => {
            let profile = profiles.create_profile(&name).await?;
            println!("Created profile {:?} (id {})", profile.name, profile.id);
        }

        ProfilesCommand::Delete { name, cascade } => {
            let policy = if cascade {
                DeletePolicy::Cascade
            } else {
                DeletePolicy::Reject
            };
            profiles.delete_profile(&name, policy).await?;
            println!("Deleted profile {:?}", name);
        }
    }

    Ok(())
}
