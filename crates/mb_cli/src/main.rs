use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use mb_crypto::IdentityKeyPair;
use mb_proto::{ChatMessage, ReactionAction, SendOptions};
use mb_session::{KeyStore, LoopbackHub, LoopbackTransport, SecureChat, SessionConfig};

#[derive(Parser)]
#[command(name = "mb-chat")]
#[command(about = "End-to-end encrypted chat session tools", long_about = None)]
struct Cli {
    /// JSON session config. The user id given on the command line wins.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair and store the private key
    Keygen {
        user: String,
        /// Key store directory
        #[arg(long)]
        dir: PathBuf,
        /// Replace an existing key
        #[arg(long)]
        force: bool,
    },

    /// Print the public key and fingerprint of a stored key
    Fingerprint {
        user: String,
        #[arg(long)]
        dir: PathBuf,
    },

    /// Run a two-party conversation over the in-process hub
    Demo {
        #[arg(long, default_value = "alice")]
        alice: String,
        #[arg(long, default_value = "bob")]
        bob: String,
        /// Persist generated keys here instead of keeping them in memory
        #[arg(long)]
        key_store_dir: Option<PathBuf>,
        /// Lines to exchange, alternating senders
        messages: Vec<String>,
    },
}

const DEFAULT_SCRIPT: [&str; 4] = [
    "Assalamu alaykum! Are you coming to the halaqa tonight?",
    "Wa alaykum assalam, yes, after Isha.",
    "Great, I'll save you a seat.",
    "JazakAllahu khayran!",
];

fn load_config(path: Option<&Path>, user_id: &str) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SessionConfig::from_env(user_id),
    };
    config.user_id = user_id.to_string();
    config.validate()?;
    Ok(config)
}

fn keygen(config: &SessionConfig, dir: &Path, force: bool) -> Result<()> {
    let store = KeyStore::new(dir);
    if !force && store.load(&config.user_id)?.is_some() {
        bail!("a key for {} already exists in {} (use --force to replace it)", config.user_id, dir.display());
    }
    let pair = IdentityKeyPair::generate_with_bits(config.key_bits)?;
    let path = store.save(&config.user_id, pair.private_key())?;
    println!("saved:       {}", path.display());
    println!("fingerprint: {}", pair.public.fingerprint()?);
    Ok(())
}

fn fingerprint(user_id: &str, dir: &Path) -> Result<()> {
    let key = KeyStore::new(dir)
        .load(user_id)?
        .ok_or_else(|| anyhow!("no key stored for {user_id} in {}", dir.display()))?;
    let public = key.public_key();
    println!("public key:  {}", public.export()?);
    println!("fingerprint: {}", public.fingerprint()?);
    Ok(())
}

fn open_chat(hub: &LoopbackHub, mut config: SessionConfig, peer: &str, key_store_dir: Option<&Path>) -> SecureChat<LoopbackTransport> {
    if let Some(dir) = key_store_dir {
        config.key_store_dir = Some(dir.to_path_buf());
    }
    let transport = hub.transport(config.hub_url.clone());
    SecureChat::new(config, transport, peer)
}

fn print_message(viewer: &str, msg: &ChatMessage) {
    let lock = if msg.is_encrypted { "🔒" } else { "  " };
    let mut line = format!("  [{viewer}] {lock} {}: {}", msg.sender_id, msg.content);
    if msg.is_edited {
        line.push_str(" (edited)");
    }
    for (emoji, users) in &msg.reactions {
        line.push_str(&format!(" {emoji}x{}", users.len()));
    }
    println!("{line}");
}

async fn demo(
    config_path: Option<&Path>,
    alice: &str,
    bob: &str,
    key_store_dir: Option<&Path>,
    messages: Vec<String>,
) -> Result<()> {
    let hub = LoopbackHub::new();
    let mut a = open_chat(&hub, load_config(config_path, alice)?, bob, key_store_dir);
    let mut b = open_chat(&hub, load_config(config_path, bob)?, alice, key_store_dir);

    for chat in [&mut a, &mut b] {
        if !chat.start().await {
            bail!("{}", chat.error().unwrap_or("start failed"));
        }
    }
    // bob registered after alice's announcement went out
    a.client_mut().announce_public_key().await?;
    a.process_pending();
    b.process_pending();
    tracing::info!(target: "mb_cli", event = "key_exchange_done", alice_secure = a.is_secure(), bob_secure = b.is_secure());

    let script: Vec<String> = if messages.is_empty() {
        DEFAULT_SCRIPT.iter().map(|s| s.to_string()).collect()
    } else {
        messages
    };

    let mut first_id = None;
    for (i, text) in script.iter().enumerate() {
        let (sender, receiver) = if i % 2 == 0 { (&mut a, &mut b) } else { (&mut b, &mut a) };
        match sender.send_message(text, &SendOptions::default()).await {
            Some(id) => {
                first_id.get_or_insert(id);
            }
            None => {
                tracing::warn!(
                    target: "mb_cli",
                    event = "demo_send_failed",
                    sender = %sender.client().user_id(),
                    error = sender.error().unwrap_or_default()
                );
            }
        }
        receiver.process_pending();
    }

    if let Some(id) = &first_id {
        b.react_to_message(id, "🤲", ReactionAction::Add).await;
        a.process_pending();
        b.process_pending();
    }

    for (name, chat) in [(alice, &a), (bob, &b)] {
        println!("{name}'s view:");
        for msg in chat.visible_messages() {
            print_message(name, &msg);
        }
    }

    a.stop().await;
    b.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mb_session=info,mb_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Keygen { user, dir, force } => {
            let config = load_config(config_path, &user)?;
            keygen(&config, &dir, force)?;
        }

        Commands::Fingerprint { user, dir } => {
            fingerprint(&user, &dir)?;
        }

        Commands::Demo { alice, bob, key_store_dir, messages } => {
            demo(config_path, &alice, &bob, key_store_dir.as_deref(), messages).await?;
        }
    }

    Ok(())
}
