//! evp-kiosk - Attendee self-service portal
//!
//! Resolves an attendee from a lookup, lets the attendee pick among several
//! matches, shows the QR and exports the ID card.
//!
//! ```text
//! evp-kiosk verify --mobile 9876543210 --identifier YC-0202 --export pdf
//! evp-kiosk verify --mobile 9876543210 --export qr
//! evp-kiosk --mode search search "KAKKAD" --pick 2 --export png --export qr
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use evp_common::config::ConfigResolver;
use evp_common::query::mask_mobile;
use evp_common::{Attendee, EventBus, ExportFormat, LookupMode, LookupQuery, PortalPhase};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use evp_kiosk::{DirectorySink, HttpResolver, Portal, RasterCardSurface};

/// Command-line arguments for evp-kiosk
#[derive(Parser, Debug)]
#[command(name = "evp-kiosk")]
#[command(about = "Attendee self-service portal: find your registration, get your QR and ID card")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides EVP_CONFIG and the per-user file)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Resolver base URL (overrides config and EVP_API_BASE_URL)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Lookup mode of this kiosk (verify, download, search)
    #[arg(long)]
    mode: Option<LookupMode>,

    /// Directory receiving exported files
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify by mobile number, optionally with confirmation/application number or name
    Verify {
        #[arg(long)]
        mobile: String,

        /// Confirmation or application number
        #[arg(long, conflicts_with = "name")]
        identifier: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        actions: Actions,
    },

    /// Download QR by full name plus mobile, or by confirmation number
    Download {
        #[arg(long, requires = "mobile", required_unless_present = "confirmation")]
        full_name: Option<String>,

        #[arg(long, requires = "full_name")]
        mobile: Option<String>,

        #[arg(long, conflicts_with_all = ["full_name", "mobile"])]
        confirmation: Option<String>,

        #[command(flatten)]
        actions: Actions,
    },

    /// Free-text search
    Search {
        query: String,

        #[command(flatten)]
        actions: Actions,
    },
}

#[derive(clap::Args, Debug)]
struct Actions {
    /// Candidate to choose when several attendees match (1-based)
    #[arg(long, value_name = "N")]
    pick: Option<usize>,

    /// What to produce once the QR is ready (repeatable)
    #[arg(long = "export", value_enum, value_name = "WHAT")]
    exports: Vec<ExportTarget>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExportTarget {
    Png,
    Pdf,
    Qr,
    Preview,
}

impl Command {
    fn into_parts(self) -> (LookupQuery, Actions) {
        match self {
            Command::Verify {
                mobile,
                identifier,
                name,
                actions,
            } => {
                let query = match (identifier, name) {
                    (Some(identifier), _) => LookupQuery::MobileIdentifier { mobile, identifier },
                    (None, Some(name)) => LookupQuery::MobileName { mobile, name },
                    (None, None) => LookupQuery::Mobile { mobile },
                };
                (query, actions)
            }
            Command::Download {
                full_name,
                mobile,
                confirmation,
                actions,
            } => {
                let query = match confirmation {
                    Some(confirmation_number) => LookupQuery::Confirmation {
                        confirmation_number,
                    },
                    None => LookupQuery::NameMobile {
                        full_name: full_name.unwrap_or_default(),
                        mobile: mobile.unwrap_or_default(),
                    },
                };
                (query, actions)
            }
            Command::Search { query, actions } => (LookupQuery::FreeText { query }, actions),
        }
    }
}

fn print_candidates(candidates: &[Attendee]) {
    println!("Several registrations match. Choose one with --pick N:");
    for (i, attendee) in candidates.iter().enumerate() {
        println!(
            "  {}. {}  [{}]  mobile {}{}",
            i + 1,
            attendee.display_name(),
            attendee.confirmation_or_id(),
            mask_mobile(&attendee.mobile),
            attendee
                .district
                .as_deref()
                .map(|d| format!("  {}", d))
                .unwrap_or_default(),
        );
    }
}

fn print_attendee(attendee: &Attendee) {
    println!("{}", attendee.display_name());
    println!("  Confirmation: {}", attendee.confirmation_or_id());
    if let Some(role) = &attendee.role {
        println!("  Role:         {}", role);
    }
    if let Some(event) = &attendee.event_name {
        println!("  Event:        {}", event);
    }
    if attendee.is_checked_in {
        println!("  ✓ CHECKED IN");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_resolver = ConfigResolver::new(cli.config.clone());
    let mut config = config_resolver
        .load()
        .context("Failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config.resolver.base_url = base_url;
    }
    if let Some(mode) = cli.mode {
        config.lookup.mode = mode;
    }
    if let Some(out) = cli.out {
        config.export.output_dir = out;
    }
    config.validate().context("Invalid configuration")?;

    evp_kiosk::logging::init_tracing(&config.logging)
        .context("Failed to initialise logging")?;

    info!("{}", evp_kiosk::build_info());
    info!(
        source = ?config_resolver.source(),
        base_url = %config.resolver.base_url,
        mode = %config.lookup.mode,
        "Configuration loaded"
    );

    let resolver = Arc::new(
        HttpResolver::new(&config.resolver).context("Failed to create resolver client")?,
    );
    let surface = Arc::new(RasterCardSurface::new());
    let sink = Arc::new(DirectorySink::new(config.export.output_dir.clone()));
    let mut portal = Portal::new(&config, resolver, surface, sink, EventBus::default());

    let (query, actions) = cli.command.into_parts();
    let mut phase = portal.search(&query).await.context("Lookup rejected")?;

    if phase == PortalPhase::Disambiguating {
        match actions.pick {
            Some(pick) if pick >= 1 => {
                phase = portal.select(pick - 1).await.context("Selection rejected")?;
            }
            Some(_) => bail!("--pick is 1-based"),
            None => {
                print_candidates(portal.session().candidates());
                return Ok(());
            }
        }
    }

    if let Some(correction) = portal.session().correction() {
        println!("Note: {}", correction);
    }

    if !phase.has_artifact() {
        let message = portal
            .session()
            .notice()
            .map(|n| n.message().to_string())
            .unwrap_or_else(|| format!("lookup ended while {}", phase));
        bail!(message);
    }

    if let Some(attendee) = portal.session().attendee() {
        print_attendee(attendee);
    }

    let mut failures = 0;
    for target in actions.exports {
        let outcome = match target {
            ExportTarget::Png => portal.export(ExportFormat::Png).await,
            ExportTarget::Pdf => portal.export(ExportFormat::Pdf).await,
            ExportTarget::Preview => portal.export(ExportFormat::Preview).await,
            ExportTarget::Qr => portal.download_qr().map(Some),
        };
        match outcome {
            Ok(Some(saved)) => println!("Saved {}", saved.path.display()),
            Ok(None) => println!("Card preview ready"),
            Err(e) => {
                error!(what = ?target, error = %e, "Export failed");
                eprintln!("Export {:?} failed: {}", target, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} export(s) failed", failures);
    }
    Ok(())
}
