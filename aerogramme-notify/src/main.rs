use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use aero_notify::config::{read_config, BrokerConfig, NotifyConfig};
use aero_notify::host::{CommitChanges, MailRef, MailUser};
use aero_notify::{MailHooks, NotifyPlugin, Registry};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(
        short,
        long,
        env = "AEROGRAMME_NOTIFY_CONFIG",
        default_value = "aerogramme-notify.toml"
    )]
    /// Path to the notifier configuration file
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the broker settings of a user
    Check {
        #[clap(short, long)]
        user: String,
    },
    /// Run a full transaction as if a delivery agent injected one mail
    Probe {
        #[clap(short, long)]
        user: String,
        #[clap(short, long, default_value = "INBOX")]
        folder: String,
        #[clap(long, default_value = "1")]
        uid: u32,
    },
}

fn tracer() {
    tracing_subscriber::fmt::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,aero_notify=info,aero_amqp=info")
    }

    // Abort on panic (same behavior as in Go)
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracer();

    let args = Args::parse();
    let config = read_config(args.config_file.clone())
        .with_context(|| format!("unable to load {}", args.config_file.display()))?;

    match &args.command {
        Command::Check { user } => check(&config, user),
        Command::Probe { user, folder, uid } => probe(&config, user, folder, *uid).await,
    }
}

fn check(config: &NotifyConfig, user: &str) -> Result<()> {
    let broker = BrokerConfig::from_settings(&config.settings_for(user))
        .with_context(|| format!("settings of user {} are unusable", user))?;
    println!("{:#?}", broker);
    Ok(())
}

async fn probe(config: &NotifyConfig, user: &str, folder: &str, uid: u32) -> Result<()> {
    let registry = Registry::amqp(config.timeout());
    let plugin = NotifyPlugin::new(registry.clone());

    let session = plugin.user_created(&MailUser::new(user, config.settings_for(user)));
    let mut txn = plugin.transaction_begin(&session, folder);
    plugin.mail_copy(&mut txn, &MailRef::raw(), &MailRef::new("probe", folder));
    plugin
        .transaction_commit(txn, &CommitChanges::new([uid].into_iter().collect()))
        .await;
    registry.shutdown();

    let stats = registry.stats().snapshot();
    tracing::info!(?stats, "probe done");
    if stats.published == 0 {
        bail!("no notification was published, see the logs above");
    }
    Ok(())
}
