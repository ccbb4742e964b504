use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    tankobon::logging::init().context("init logging")?;

    let cli = tankobon::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        tankobon::cli::Command::Ingest(args) => {
            tankobon::ingest::run(args).await.context("ingest")?;
        }
        tankobon::cli::Command::List(args) => {
            tankobon::query::list(args).await.context("list")?;
        }
        tankobon::cli::Command::Search(args) => {
            tankobon::query::search(args).await.context("search")?;
        }
        tankobon::cli::Command::Detail(args) => {
            tankobon::query::detail(args).await.context("detail")?;
        }
        tankobon::cli::Command::Pages(args) => {
            tankobon::query::pages(args).await.context("pages")?;
        }
        tankobon::cli::Command::Delete(args) => {
            tankobon::ingest::delete(args).await.context("delete")?;
        }
    }

    Ok(())
}
