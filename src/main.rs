//! # Passkey Ceremony Client
//!
//! Terminal front end for running WebAuthn/passkey ceremonies against a
//! relying party. Credentials live in an in-memory software authenticator,
//! so a session typically looks like:
//!
//! ```text
//! > register alice
//! > authenticate alice
//! > quit
//! ```
//!
//! ## Key Concepts
//! - **Registration**: the relying party issues a challenge, the authenticator
//!   creates a key pair, the server verifies the attestation
//! - **Authentication**: the relying party issues a challenge, the authenticator
//!   signs it, the server verifies the signature

use anyhow::Context;
use clap::Parser;
use passkey_ceremony_client::config::Config;
use passkey_ceremony_client::platform::software::{
    AutoPresence, SoftwareAuthenticator, UserPresence,
};
use passkey_ceremony_client::presentation::{LineSource, TerminalPresence, TerminalStatus};
use passkey_ceremony_client::state::CeremonyClient;
use passkey_ceremony_client::transport::HttpRelyingParty;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Command-line overrides; anything not given comes from the environment
#[derive(Debug, Parser)]
#[command(name = "passkey-client", version, about = "Run passkey ceremonies against a relying party")]
struct Cli {
    /// Base URL of the relying party
    #[arg(long)]
    rp_url: Option<String>,

    /// Origin written into clientDataJSON
    #[arg(long)]
    origin: Option<String>,

    /// Attestation conveyance preference (none, indirect, direct)
    #[arg(long)]
    attestation: Option<String>,

    /// Authenticator attachment (platform, cross-platform)
    #[arg(long)]
    attachment: Option<String>,

    /// User verification requirement (required, preferred, discouraged)
    #[arg(long)]
    user_verification: Option<String>,

    /// Resident key requirement (required, preferred, discouraged)
    #[arg(long)]
    resident_key: Option<String>,

    /// HTTP timeout per request, in seconds
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Platform call limit when the server sends none, in seconds
    #[arg(long)]
    ceremony_timeout: Option<u64>,

    /// Approve every presence check without prompting
    #[arg(long)]
    auto_approve: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(rp_url) = self.rp_url {
            // The origin tracks the URL unless it was set on its own
            if config.rp_origin == config.rp_url && self.origin.is_none() {
                config.rp_origin = rp_url.clone();
            }
            config.rp_url = rp_url;
        }
        if let Some(origin) = self.origin {
            config.rp_origin = origin;
        }
        if let Some(attestation) = self.attestation {
            config.attestation_type = attestation;
        }
        if let Some(attachment) = self.attachment {
            config.authenticator_attachment = attachment;
        }
        if let Some(user_verification) = self.user_verification {
            config.user_verification = user_verification;
        }
        if let Some(resident_key) = self.resident_key {
            config.resident_key = resident_key;
        }
        if let Some(secs) = self.request_timeout {
            config.request_timeout_secs = secs;
        }
        if let Some(secs) = self.ceremony_timeout {
            config.ceremony_timeout_secs = secs;
        }
    }
}

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Register(String),
    Authenticate(String),
    Help,
    Quit,
    Empty,
    /// A yes/no typed after its presence prompt expired
    LateAnswer,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Command::Empty;
        };
        let argument = words.collect::<Vec<_>>().join(" ");

        match (verb.to_ascii_lowercase().as_str(), argument.is_empty()) {
            ("register" | "r", false) => Command::Register(argument),
            ("authenticate" | "login" | "a", false) => Command::Authenticate(argument),
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit" | "q", _) => Command::Quit,
            ("y" | "yes" | "n" | "no", true) => Command::LateAnswer,
            _ => Command::Unknown(line.trim().to_string()),
        }
    }
}

const USAGE: &str = "\
Commands:
  register <username>       create a passkey for <username>
  authenticate <username>   sign in as <username>
  help                      show this message
  quit                      leave";

/// Main application entry point
///
/// 1. Sets up logging (stderr, so it does not mix with the prompts)
/// 2. Loads configuration from the environment and applies CLI overrides
/// 3. Builds the relying party client, software authenticator and presentation
/// 4. Runs the command loop until `quit` or end of input
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,passkey_ceremony_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let auto_approve = cli.auto_approve;
    let mut config = Config::from_env()?;
    cli.apply(&mut config);
    tracing::info!("Configuration loaded: {:?}", config);

    let rp_url = Url::parse(&config.rp_url)
        .with_context(|| format!("RP_URL is not a valid URL: {}", config.rp_url))?;
    let origin = Url::parse(&config.rp_origin)
        .with_context(|| format!("RP_ORIGIN is not a valid URL: {}", config.rp_origin))?;

    let relying_party = HttpRelyingParty::new(rp_url, config.request_timeout())
        .context("failed to build HTTP client")?;

    let lines = LineSource::stdin();
    let presence: Arc<dyn UserPresence> = if auto_approve {
        Arc::new(AutoPresence(true))
    } else {
        Arc::new(TerminalPresence::new(lines.clone()))
    };
    let platform = Arc::new(SoftwareAuthenticator::new(origin, presence));

    let client = CeremonyClient::new(relying_party, platform, Arc::new(TerminalStatus))
        .with_registration(config.registration())
        .with_authentication(config.authentication())
        .with_ceremony_timeout(config.ceremony_timeout());

    println!("Relying party: {}", config.rp_url);
    println!("{}", USAGE);

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await else {
            break;
        };
        match Command::parse(&line) {
            Command::Register(username) => {
                client.register(&username).await;
            }
            Command::Authenticate(username) => {
                client.authenticate(&username).await;
            }
            Command::Help => println!("{}", USAGE),
            Command::Quit => break,
            Command::Empty => {}
            Command::LateAnswer => {
                println!("No authenticator prompt is waiting; it has expired. Run the command again.");
            }
            Command::Unknown(input) => {
                println!("Unrecognized command: {}", input);
                println!("{}", USAGE);
            }
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}
