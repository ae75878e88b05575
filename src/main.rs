use clap::{Parser, ValueEnum};
use jamr::graph::headers::SearchKind;
use jamr::interpreter::state::DebugFlags;
use jamr::jam::{Jam, JamOptions, DEFAULT_JAMBASE};

#[derive(Parser)]
#[command(name = "jamr")]
#[command(about = "Jam build system front-end for ninja")]
#[command(version)]
struct Cli {
    /// Call ninja after writing build.ninja
    #[arg(short = 'b', long = "build")]
    build: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Headers search type (default is the basic jam algorithm)
    #[arg(short = 's', long = "search-type", default_value = "base")]
    search_type: SearchTypeArg,

    /// Debug channels
    #[arg(short = 'd', long = "debug", value_delimiter = ',')]
    debug: Vec<DebugArg>,

    /// Limit target for debug info
    #[arg(short = 't', long = "target")]
    target: Option<String>,

    /// Jam file name
    #[arg(short = 'f', long = "jamfile", default_value = "Jamfile")]
    jamfile: String,

    /// Extra env variables, K=V
    #[arg(short = 'e', long = "env")]
    env: Vec<String>,

    /// Alternative Jambase file (defaults to the built-in prelude)
    #[arg(long = "jambase")]
    jambase: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchTypeArg {
    Base,
    Ripgrep,
    Grep,
    None,
}

impl From<SearchTypeArg> for SearchKind {
    fn from(arg: SearchTypeArg) -> Self {
        match arg {
            SearchTypeArg::Base => SearchKind::Base,
            SearchTypeArg::Ripgrep => SearchKind::Ripgrep,
            SearchTypeArg::Grep => SearchKind::Grep,
            SearchTypeArg::None => SearchKind::None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum DebugArg {
    Headers,
    Depends,
    Include,
    Env,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    let jambase = match &cli.jambase {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                eprintln!("cannot read {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => DEFAULT_JAMBASE.to_string(),
    };

    let mut jam = Jam::new(JamOptions {
        jamfile: cli.jamfile,
        jambase: Some(jambase),
        verbose: cli.verbose,
        debug: DebugFlags {
            headers: cli.debug.contains(&DebugArg::Headers),
            deps: cli.debug.contains(&DebugArg::Depends),
            include: cli.debug.contains(&DebugArg::Include),
            env: cli.debug.contains(&DebugArg::Env),
        },
        search_type: cli.search_type.into(),
        limit_target: cli.target,
        env_overrides: cli.env,
        ..JamOptions::default()
    });

    if let Err(err) = jam.generate() {
        eprintln!("{}", err);
        std::process::exit(1);
    }

    if cli.build {
        match std::process::Command::new("ninja").status() {
            Ok(status) if status.success() => {}
            Ok(status) => std::process::exit(status.code().unwrap_or(1)),
            Err(err) => {
                eprintln!("cannot run ninja: {}", err);
                std::process::exit(1);
            }
        }
    }
}
