use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "allowance", version, about = "Track chores and allowance for your kids")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Read backend settings from this file instead of the usual locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show whether a session is active.
    Status,
    /// Create a parent account; a code is emailed for verification.
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Confirm the account with the emailed code.
    Verify {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignOut,
    /// Manage child profiles.
    #[command(subcommand)]
    Profiles(ProfileCommand),
    /// Manage chores.
    #[command(subcommand)]
    Tasks(TaskCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        birthdate: Option<NaiveDate>,
        /// JPEG or PNG file to use as the avatar.
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    Edit {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        birthdate: Option<NaiveDate>,
    },
    /// Replace a profile's avatar.
    Photo {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        file: PathBuf,
    },
    Remove {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    List {
        /// Only chores assigned to this child.
        #[arg(long)]
        child: Option<Uuid>,
    },
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        points: i32,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        child: Option<Uuid>,
    },
    Done {
        #[arg(long)]
        id: Uuid,
    },
    Undo {
        #[arg(long)]
        id: Uuid,
    },
    Remove {
        #[arg(long)]
        id: Uuid,
    },
}
