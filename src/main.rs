use clap::Parser;
use shparse::{parse_with_options, ParseOptions};
use std::io::Read;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "shparse")]
#[command(about = "Parse a bash script and print its syntax tree")]
#[command(version)]
struct Cli {
    /// Parse the script given on the command line
    #[arg(short = 'c')]
    script: Option<String>,

    /// Recognize extended glob patterns such as @(a|b)
    #[arg(long = "extglob")]
    extglob: bool,

    /// Print the tree as JSON instead of the debug form
    #[arg(long = "json")]
    json: bool,

    /// Maximum nesting depth of compound commands and substitutions
    #[arg(long = "max-depth")]
    max_depth: Option<usize>,

    /// Script file to parse (stdin when omitted)
    #[arg()]
    script_file: Option<String>,
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("SHPARSE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_script(cli: &Cli) -> Result<String, String> {
    if let Some(script) = &cli.script {
        return Ok(script.clone());
    }
    if let Some(file) = &cli.script_file {
        return std::fs::read_to_string(file).map_err(|e| format!("Cannot read script file: {}: {}", file, e));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("Cannot read stdin: {}", e))?;
    Ok(buf)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();

    let script = match read_script(&cli) {
        Ok(script) => script,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::from(1);
        }
    };

    let mut options = ParseOptions {
        extglob: cli.extglob,
        ..Default::default()
    };
    if let Some(depth) = cli.max_depth {
        options.max_depth = depth;
    }

    match parse_with_options(&script, &options) {
        Ok(nodes) => {
            if cli.json {
                match serde_json::to_string_pretty(&nodes) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::from(1);
                    }
                }
            } else {
                for node in &nodes {
                    println!("{:#?}", node);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            // 2 tells an interactive caller the script may continue on the next line
            if e.is_unterminated() {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}
