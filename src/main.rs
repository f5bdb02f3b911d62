use clap::{Parser, Subcommand, ValueEnum};
use pagewright::api::App;
use pagewright::patch::OnUnchanged;
use pagewright::types::Page;
use pagewright::{auth, config, diagnose, output, server};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pagewright")]
#[command(about = "Content console for marker-patched static pages")]
#[command(long_about = "\
Content console for marker-patched static pages

Projects and blog posts are kept in SQLite. The public listing pages are
ordinary HTML files; each carries one marked region that pagewright owns:

  <!-- ADMIN:PROJECTS:START -->
  ... generated cards ...
  <!-- ADMIN:PROJECTS:END -->

Everything outside the markers is left exactly as written.

Site layout (defaults):

  site/
  ├── projects.html     # must contain the PROJECTS markers
  ├── blog.html         # must contain the BLOG markers
  └── images/           # uploads land here

Run 'pagewright gen-config' to generate a documented pagewright.toml, and
'pagewright hash-password' to produce admin.password_hash.")]
#[command(version)]
struct Cli {
    /// Configuration file (missing file means stock defaults)
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Projects,
    Blog,
    All,
}

impl Target {
    fn pages(self) -> &'static [Page] {
        match self {
            Target::Projects => &[Page::Projects],
            Target::Blog => &[Page::Blog],
            Target::All => &Page::ALL,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Serve the console API, detail pages and the static site
    Serve,
    /// Re-render a listing page from the store
    Rebuild {
        #[arg(value_enum, default_value = "all")]
        target: Target,
    },
    /// Check documents, markers, asset root, store and credential
    Diagnose,
    /// Read a password from stdin and print its argon2 hash
    HashPassword,
    /// Print a stock pagewright.toml with all options documented
    GenConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info,tower_http=warn")
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::HashPassword => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let password = line.trim_end_matches(['\r', '\n']);
            if password.is_empty() {
                eprintln!("error: empty password");
                return Ok(ExitCode::FAILURE);
            }
            println!("{}", auth::hash_password(password)?);
        }
        Command::Serve => {
            let app = App::open(config::load_config(&cli.config)?)?;
            tokio::runtime::Runtime::new()?.block_on(server::serve(app))?;
        }
        Command::Rebuild { target } => {
            let app = App::open(config::load_config(&cli.config)?)?;
            let mut failed = false;
            for &page in target.pages() {
                match app.rebuild(page, OnUnchanged::Skip) {
                    Ok(report) => output::print_rebuild(&report, &app.config().page_path(page)),
                    Err(e) => {
                        eprintln!("{page}: {e}");
                        failed = true;
                    }
                }
            }
            app.close()?;
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Diagnose => {
            let config = config::load_config(&cli.config)?;
            let report = diagnose::run_detached(&config);
            output::print_diagnose(&report);
            if !report.ok {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
