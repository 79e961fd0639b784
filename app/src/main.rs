use allowance::{dispatch, Cli};
use allowance_core::{telemetry, AppContext, BackendSettings, CredentialStore};
use clap::Parser;
use tokio::runtime::Runtime;

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::env_filter())?;

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => BackendSettings::from_file(path),
        None => BackendSettings::load(),
    }
    .map_err(|err| anyhow::anyhow!(err.user_message()))?;

    let runtime = Runtime::new()?;
    let ctx = AppContext::supabase(settings, Some(CredentialStore::default_location()));

    runtime.block_on(async {
        ctx.session.bootstrap().await;
        let mut stdout = std::io::stdout().lock();
        dispatch(&ctx, cli.command, &mut stdout).await
    })
}
