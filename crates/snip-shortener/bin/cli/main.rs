mod cli;

use crate::cli::{Command, LogFormat, CLI};
use clap::Parser;
use snip_core::{BatchItem, BatchOutcome, ShortToken, Shortened, Shortener};
use snip_generator::DigestGenerator;
use snip_shortener::ShortenerService;
use snip_storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type Service = ShortenerService<Storage, DigestGenerator>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CLI::parse();
    init_tracing(cli.log_format);

    let config = cli.storage_config();
    info!(
        storage_backend = %config.backend,
        token_length = config.token_length,
        base_url = %config.base_url,
        "opening storage"
    );

    let generator = DigestGenerator::new(config.token_length)?;
    let storage = snip_storage::open(&config).await?;
    let service = ShortenerService::new(storage, generator, config.base_url.clone());

    let owner = cli.owner().to_owned();
    let result = run(&service, &owner, cli.command).await;

    // Always finalize so queued deletions reach the backend.
    if let Err(err) = service.finalize().await {
        error!(error = %err, "failed to finalize storage");
        if result.is_ok() {
            return Err(err.into());
        }
    }
    result
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

async fn run(service: &Service, owner: &str, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Shorten { urls } => shorten(service, owner, urls).await?,
        Command::Resolve { token } => {
            let token = ShortToken::new(token)?;
            let record = service.resolve(&token).await?;
            if record.deleted {
                println!("{} (deleted)", record.original_url);
            } else {
                println!("{}", record.original_url);
            }
        }
        Command::Summary => {
            let summary = service.summary_json(owner).await;
            if summary.is_empty() {
                info!(owner, "nothing to list");
            } else {
                println!("{summary}");
            }
        }
        Command::Delete { tokens } => {
            let tokens = tokens
                .into_iter()
                .map(ShortToken::new)
                .collect::<Result<Vec<_>, _>>()?;
            info!(owner, count = tokens.len(), "scheduling deletion");
            service.delete(owner, tokens).await;
        }
        Command::Ping => {
            service.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}

async fn shorten(service: &Service, owner: &str, urls: Vec<String>) -> anyhow::Result<()> {
    if let [url] = urls.as_slice() {
        match service.shorten(owner, url).await? {
            Shortened::Created(token) => println!("{}", service.short_url(&token)),
            Shortened::Duplicate(token) => {
                println!("{} (already shortened)", service.short_url(&token))
            }
        }
        return Ok(());
    }

    let items = urls
        .into_iter()
        .enumerate()
        .map(|(index, original_url)| BatchItem {
            correlation_id: (index + 1).to_string(),
            original_url,
        })
        .collect();

    match service.shorten_batch(owner, items).await? {
        BatchOutcome::Created(results) => {
            for result in results {
                println!("{}\t{}", result.correlation_id, result.short_url);
            }
        }
        BatchOutcome::Duplicate {
            correlation_id,
            short_url,
        } => {
            println!("{correlation_id}\t{short_url} (already shortened, batch rolled back)");
        }
    }

    Ok(())
}
