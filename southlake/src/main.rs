use anyhow::Result;
use clap::Parser;
use southlake::cli::{Cli, Commands};
use southlake::{commands, init_tracing, resolve_store, AppContext};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let store = resolve_store(cli.store, &cli.name)?;
    debug!("Using store {}", store.display());
    let cx = AppContext::open(&store, &cli.name).await?;

    match cli.command {
        Commands::Init => commands::handle_init(cx).await?,
        Commands::Sections => commands::handle_sections(cx).await?,
        Commands::Tags => commands::handle_tags(cx).await?,
        Commands::Files => commands::handle_files(cx).await?,
        Commands::Status => commands::handle_status(cx).await?,
        Commands::AddFile(args) => commands::handle_add_file(args, cx).await?,
        Commands::Tag(args) => commands::handle_tag(args, cx).await?,
    }

    Ok(())
}
