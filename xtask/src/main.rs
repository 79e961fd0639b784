use allowance_core::{telemetry, AppContext, InMemoryBackend, NewProfile, NewTask};
use anyhow::{anyhow, ensure, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Allowance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk the sign-up, verify, profile and chore flow against the in-memory backend.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let ctx = AppContext::in_memory(InMemoryBackend::new().with_signup_code("482913"));

    runtime.block_on(async {
        ctx.session.bootstrap().await;
        ctx.session.set_email("parent@example.com");
        ctx.session.set_password("Secret123!");
        ctx.session.sign_up().await;
        ctx.session.verify_code("482913").await;
        let session = ctx.session.snapshot();
        ensure!(
            session.is_signed_in,
            "verification did not sign in: {:?}",
            session.last_error
        );

        let birthdate = NaiveDate::from_ymd_opt(2016, 4, 2).ok_or_else(|| anyhow!("bad date"))?;
        ctx.profiles.add(NewProfile::new("Mia").born(birthdate)).await;
        let mia = ctx
            .profiles
            .profiles()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("profile was not saved"))?;

        ctx.tasks
            .add(NewTask::new("Make the bed", 2).assigned_to(mia.id))
            .await;
        let task = ctx
            .tasks
            .tasks()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("task was not saved"))?;
        ctx.tasks.set_completed(task.id, true).await;
        info!(
            "points" = ctx.tasks.points_earned(mia.id),
            "smoke test chore completed"
        );

        ctx.profiles.delete(mia.id).await;
        ensure!(ctx.profiles.profiles().is_empty(), "profile was not deleted");
        ctx.session.sign_out().await;
        ensure!(!ctx.session.is_signed_in(), "sign out failed");
        Ok(())
    })
}
