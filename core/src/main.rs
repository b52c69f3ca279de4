use anyhow::Result;
use clap::{Parser, Subcommand};
use scour::ui::progress::{format_duration, human_bytes};
use scour::{
    ata_secure_erase, crypto_erase, destroy, device_info, nvme_sanitize, wipe_with, ClearMethod,
    PurgeResult, SanitizeAction, WipeOptions,
};

#[derive(Parser)]
#[command(name = "scour")]
#[command(about = "NIST SP 800-88 storage sanitization: Clear, Purge and Destroy")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print results as compact JSON instead of pretty-printed
    #[arg(long, global = true)]
    compact: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show size and bus classification of a device
    Info {
        /// Device path (e.g. /dev/sdb or \\.\PhysicalDrive1)
        device: String,
    },

    /// Software overwrite (Clear tier)
    Wipe {
        device: String,

        /// Overwrite algorithm (zero, random, dod, gutmann)
        #[arg(short, long, default_value = "zero")]
        algorithm: String,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// ATA Secure Erase (Purge tier, SATA devices)
    SecureErase {
        device: String,

        /// Use Enhanced Secure Erase when the drive supports it
        #[arg(long)]
        enhanced: bool,

        /// Probe only; no destructive commands
        #[arg(long)]
        dry_run: bool,
    },

    /// NVMe Sanitize (Purge tier, NVMe devices)
    Sanitize {
        device: String,

        /// Sanitize action (crypto, block, overwrite)
        #[arg(short, long, default_value = "crypto")]
        action: String,

        /// Probe only; no destructive commands
        #[arg(long)]
        dry_run: bool,
    },

    /// Cryptographic erase with automatic strategy selection
    CryptoErase {
        device: String,

        /// Probe only; no destructive commands
        #[arg(long)]
        dry_run: bool,
    },

    /// Destroy tier: 35-pass overwrite plus partition-structure destruction
    Destroy {
        device: String,

        /// Required confirmation; the drive is left unusable
        #[arg(long = "yes-destroy-all-data")]
        confirm: bool,
    },
}

fn log(message: &str) {
    println!("[{}] {}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"), message);
}

fn parse_algorithm(name: &str) -> Result<ClearMethod> {
    match name.to_ascii_lowercase().as_str() {
        "zero" => Ok(ClearMethod::Zero),
        "random" => Ok(ClearMethod::Random),
        "dod" => Ok(ClearMethod::DoD5220),
        "gutmann" => Ok(ClearMethod::Gutmann),
        other => anyhow::bail!("unknown algorithm '{}' (zero, random, dod, gutmann)", other),
    }
}

fn print_result(result: &PurgeResult, compact: bool) -> Result<i32> {
    let json = if compact {
        serde_json::to_string(result)?
    } else {
        serde_json::to_string_pretty(result)?
    };
    println!("{}", json);
    Ok(if result.success { 0 } else { 1 })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let compact = cli.compact;

    let exit_code = match cli.command {
        Commands::Info { device } => {
            let info = device_info(&device)?;
            let json = if compact {
                serde_json::to_string(&info)?
            } else {
                serde_json::to_string_pretty(&info)?
            };
            println!("{}", json);
            0
        }

        Commands::Wipe {
            device,
            algorithm,
            quiet,
        } => {
            let method = parse_algorithm(&algorithm)?;
            let mut options = WipeOptions::default();
            if !quiet {
                options.progress = Some(Box::new(|sample| {
                    log(&format!(
                        "pass {}/{}: {:.0}% ({} written) @ {}/s",
                        sample.pass_index,
                        sample.pass_count,
                        sample.percent,
                        human_bytes(sample.bytes_written as f64),
                        human_bytes(sample.speed_mbps * 1024.0 * 1024.0),
                    ));
                }));
            }

            log(&format!("starting {} wipe on {}", algorithm, device));
            let result = wipe_with(&device, method, options);
            if result.success {
                log(&format!(
                    "wipe finished in {}",
                    format_duration(result.duration_seconds as u64)
                ));
            }
            print_result(&result, compact)?
        }

        Commands::SecureErase {
            device,
            enhanced,
            dry_run,
        } => {
            if !dry_run {
                log("WARNING: secure erase cannot be interrupted once the drive accepts it");
            }
            let result = ata_secure_erase(&device, enhanced, dry_run);
            print_result(&result, compact)?
        }

        Commands::Sanitize {
            device,
            action,
            dry_run,
        } => {
            let action: SanitizeAction = action
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            if !dry_run {
                log("WARNING: sanitize cannot be cancelled once started");
            }
            let result = nvme_sanitize(&device, action, dry_run);
            print_result(&result, compact)?
        }

        Commands::CryptoErase { device, dry_run } => {
            let result = crypto_erase(&device, dry_run);
            print_result(&result, compact)?
        }

        Commands::Destroy { device, confirm } => {
            if confirm {
                log("WARNING: destroy leaves the drive unusable and unbootable");
            }
            let result = destroy(&device, confirm);
            print_result(&result, compact)?
        }
    };

    std::process::exit(exit_code);
}
