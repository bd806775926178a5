use anyhow::{Context, Result};
use askama::Template;
use clap::{Parser, Subcommand};
use heck::{ToPascalCase, ToSnakeCase};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::{Path, PathBuf};
use std::{env, fs, io};

pub mod filters;

#[derive(Parser)]
#[command(name = "mailroom", about = "Scaffolding for mailroom mailables")]
struct Cli {
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbosity: u8,

    /// Crate root to generate into (default: current directory).
    #[arg(long)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(alias = "g")]
    Generate {
        #[arg(short = 'f', long = "force", global = true, default_value_t = false)]
        force: bool,

        #[command(subcommand)]
        generate_type: GenerateType,
    },
}

#[derive(Subcommand)]
enum GenerateType {
    /// A mailable content type in src/mail/.
    Mail {
        #[arg(value_name = "mail_name")]
        name: String,

        /// Deliver through the queue when sent.
        #[arg(long)]
        queued: bool,

        /// Prefix of the stable job type, e.g. `app` for `app::order_shipped`.
        #[arg(long = "namespace", default_value = "app")]
        namespace: String,
    },
}

#[derive(Template)]
#[template(path = "mail.rst", escape = "none")]
struct MailTemplate<'a> {
    name: &'a str,
    mail_type: &'a str,
    queued: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("initializing logger")?;

    let dir = match cli.dir {
        Some(dir) => dir,
        None => env::current_dir()?,
    };

    match &cli.command {
        Commands::Generate {
            generate_type,
            force,
        } => match generate_type {
            GenerateType::Mail {
                name,
                queued,
                namespace,
            } => {
                let name = name.to_pascal_case();
                let mail_type = format!("{}::{}", namespace, name.to_snake_case());
                let template = MailTemplate {
                    name: &name,
                    mail_type: &mail_type,
                    queued: *queued,
                };
                let path = dir.join(format!("src/mail/{}.rs", name.to_snake_case()));
                generate_file(&path, template, *force)?;
                import_mod(&path)?;
            }
        },
    }
    Ok(())
}

/// Write the rendered template unless the file exists and `force` is off.
/// Returns whether anything was written.
fn generate_file(path: &Path, template: impl Template, force: bool) -> Result<bool> {
    if path.exists() && !force {
        log::warn!("{} already exists, skipping (use --force to overwrite)", path.display());
        return Ok(false);
    }

    let source = template.render().context("rendering mail template")?;
    log::trace!("{}", source);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, source).with_context(|| format!("writing {}", path.display()))?;
    log::info!("created {}", path.display());
    Ok(true)
}

/// Declare and re-export the generated module from its sibling `mod.rs`,
/// creating `mod.rs` when the directory has none.
fn import_mod(path: &Path) -> Result<()> {
    let module = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("{} has no usable module name", path.display()))?;
    let mod_file = path.with_file_name("mod.rs");

    let existing = match fs::read_to_string(&mod_file) {
        Ok(existing) => existing,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", mod_file.display()))
        }
    };

    let declaration = format!("mod {module};");
    let reexport = format!("pub use {module}::*;");
    let mut lines: Vec<&str> = existing.lines().collect();
    if lines.iter().any(|line| line.trim() == declaration) {
        log::debug!("{} already declares {}", mod_file.display(), module);
        return Ok(());
    }

    // Keep declarations grouped at the top, ahead of any items.
    let at = lines
        .iter()
        .rposition(|line| is_declaration(line))
        .map_or(0, |i| i + 1);
    lines.splice(at..at, [declaration.as_str(), reexport.as_str()]);

    let mut updated = lines.join("\n");
    updated.push('\n');
    fs::write(&mod_file, updated).with_context(|| format!("writing {}", mod_file.display()))?;
    log::info!("registered {} in {}", module, mod_file.display());
    Ok(())
}

fn is_declaration(line: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("pub ").unwrap_or(line);
    line.starts_with("mod ") || line.starts_with("use ")
}
