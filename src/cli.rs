use crate::commands::{self, GenerateOverrides};
use crate::common::CommonParams;
use crate::log_debug;
use crate::prompt::CompositionMode;
use clap::builder::{Styles, styling::AnsiColor};
use clap::{Parser, Subcommand, crate_version};
use std::path::PathBuf;

const LOG_FILE: &str = "specforge-debug.log";

/// CLI structure defining the available commands and global arguments
#[derive(Parser)]
#[command(
    author,
    version = crate_version!(),
    about = "Specforge: generate tests from an API specification with a local LLM",
    long_about = "Specforge combines an API specification with a scaffolding prompt, asks a local model for code, extracts the code block from the answer, and writes it to disk or opens a merge request with it.",
    styles = get_styles(),
)]
pub struct Cli {
    /// Subcommands available for the CLI
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug messages to a file
    #[arg(
        short = 'l',
        long = "log",
        global = true,
        help = "Log debug messages to a file"
    )]
    pub log: bool,

    /// Specify a custom log file path
    #[arg(
        long = "log-file",
        global = true,
        help = "Specify a custom log file path"
    )]
    pub log_file: Option<String>,

    /// Mirror debug logs to stderr
    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        help = "Print debug logs to stderr, including HTTP transport details"
    )]
    pub verbose: bool,

    /// Suppress non-essential output (spinners, status lines)
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Suppress non-essential output"
    )]
    pub quiet: bool,
}

/// Enumeration of available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate code from the specification
    #[command(
        about = "Generate code from the specification",
        long_about = "Compose the prompt from the specification and scaffolding instructions, send it to the model, extract the code block, and write or publish it."
    )]
    Generate {
        #[command(flatten)]
        common: CommonParams,

        /// Specification document
        #[arg(long, help = "Path to the API specification")]
        spec: Option<PathBuf>,

        /// Instruction template
        #[arg(long, help = "Path to the scaffolding prompt template")]
        prompt: Option<PathBuf>,

        /// Dependency manifest
        #[arg(long, help = "Path to a dependency manifest (build.gradle, requirements.txt)")]
        deps: Option<PathBuf>,

        /// Output file
        #[arg(short, long, help = "Where to write the generated code")]
        output: Option<PathBuf>,

        /// Expected code fence language
        #[arg(long, help = "Expected code block language (defaults to the output extension)")]
        language: Option<String>,

        /// Request the whole response at once
        #[arg(long, help = "Disable streaming and wait for the whole response")]
        no_stream: bool,

        /// Echo the response as it streams in
        #[arg(long, help = "Echo the model response to stdout as it arrives")]
        echo: bool,

        /// Skip extraction
        #[arg(long, help = "Write the raw model response without extracting a code block")]
        raw: bool,

        /// Prompt composition mode
        #[arg(long, help = "Prompt composition: concatenation or placeholder")]
        mode: Option<CompositionMode>,

        /// Open a merge request with the result
        #[arg(long, help = "Publish the result as a merge request (needs CI_GITLAB_TOKEN)")]
        publish: bool,

        /// Show the start of the prompt before sending it
        #[arg(long, help = "Print the first 500 characters of the composed prompt")]
        preview: bool,

        /// Cancel the run after this many seconds
        #[arg(long, help = "Cancel the run if it takes longer than this many seconds")]
        deadline: Option<u64>,
    },

    /// Re-run extraction on a saved response
    #[command(about = "Extract the code block from a saved model response")]
    Extract {
        /// Raw response file
        #[arg(short, long, help = "File holding a raw model response")]
        input: PathBuf,

        /// Expected code fence language
        #[arg(long, help = "Expected code block language")]
        language: Option<String>,

        /// Output file; stdout when omitted
        #[arg(short, long, help = "Write the extracted code here instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Show the dependency lines the prompt would receive
    #[command(about = "Print the dependency declarations found in a manifest")]
    Deps {
        /// Manifest to reduce
        #[arg(help = "build.gradle, build.gradle.kts or requirements.txt")]
        manifest: PathBuf,
    },

    /// Configure model settings
    #[command(about = "Configure model settings")]
    Config {
        #[command(flatten)]
        common: CommonParams,

        /// Print the effective configuration
        #[arg(short, long, help = "Print the effective configuration")]
        print: bool,
    },
}

/// Define custom styles for Clap
fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Magenta.on_default().bold())
        .usage(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Green.on_default().bold())
        .placeholder(AnsiColor::Yellow.on_default())
        .valid(AnsiColor::Blue.on_default().bold())
        .invalid(AnsiColor::Red.on_default().bold())
        .error(AnsiColor::Red.on_default().bold())
}

/// Parse the command-line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Main function to parse arguments and handle the command
pub async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    if cli.log || cli.verbose {
        crate::logger::enable_logging();
    } else {
        crate::logger::disable_logging();
    }
    if cli.log {
        let log_file = cli.log_file.as_deref().unwrap_or(LOG_FILE);
        crate::logger::set_log_file(log_file)?;
    }
    if cli.verbose {
        crate::logger::set_verbose_logging(true);
        crate::logger::set_echo_to_stderr(true);
    }

    if cli.quiet {
        crate::ui::set_quiet_mode(true);
    }

    handle_command(cli.command).await
}

pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Generate {
            common,
            spec,
            prompt,
            deps,
            output,
            language,
            no_stream,
            echo,
            raw,
            mode,
            publish,
            preview,
            deadline,
        } => {
            let overrides = GenerateOverrides {
                spec,
                prompt,
                deps,
                output,
                language,
                stream: !no_stream,
                echo,
                raw,
                mode,
                publish,
                preview,
                deadline,
            };
            log_debug!("Handling 'generate' with {:?} / {:?}", common, overrides);
            commands::handle_generate(&common, overrides).await
        }
        Commands::Extract {
            input,
            language,
            output,
        } => commands::handle_extract(&input, language.as_deref(), output.as_deref()),
        Commands::Deps { manifest } => commands::handle_deps(&manifest),
        Commands::Config { common, print } => {
            log_debug!("Handling 'config' with {:?}", common);
            commands::handle_config(&common, print)
        }
    }
}
