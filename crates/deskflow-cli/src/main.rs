mod actions;
mod console_ui;
mod runtime;
mod settings;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deskflow_bridge::{OutputSink, lua_host};
use deskflow_core::{LogEntry, LogLevel, LogOutput, VariableStore};
use deskflow_platform::{InputRecorder, Platform};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::runtime::HostRuntime;
use crate::settings::HostSettings;

#[derive(Parser)]
#[command(name = "deskflow", version)]
#[command(about = "Desktop automation: run and record flows, host user scripts", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Settings file (default: <config dir>/deskflow/settings.json)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a flow file
    Run {
        #[arg(value_name = "FILE", help = "Path to the flow .json file")]
        flow: PathBuf,

        #[arg(
            long,
            help = "Set variable in format NAME=VALUE",
            value_name = "VAR=VAL"
        )]
        var: Vec<String>,

        #[arg(long, value_name = "MS", help = "Pause between steps")]
        delay: Option<u64>,

        #[arg(short, long, help = "Print every log entry and the final variables")]
        verbose: bool,
    },
    /// Record keyboard and mouse input into a flow
    Record {
        #[arg(long, default_value_t = 10, help = "How long to record")]
        seconds: u64,

        #[arg(short, long, value_name = "FILE", help = "Write the flow here instead of stdout")]
        output: Option<PathBuf>,
    },
    /// Bind the configured hotkeys and serve scripts until `quit`
    Serve,
    /// Run a script file in the sandbox
    Script {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_name = "SECS", help = "Kill the script after this long")]
        timeout: Option<u64>,
    },
    /// Interpreter entry point used by the sandbox runner
    #[command(hide = true)]
    ScriptHost {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

struct CliLogOutput {
    verbose: bool,
    warnings: usize,
    errors: usize,
}

impl LogOutput for CliLogOutput {
    fn log(&mut self, entry: LogEntry) {
        match entry.level {
            LogLevel::Warning => self.warnings += 1,
            LogLevel::Error => self.errors += 1,
            LogLevel::Info | LogLevel::Debug => {}
        }
        if self.verbose || !matches!(entry.level, LogLevel::Info | LogLevel::Debug) {
            println!(
                "{} [{}] {}: {}",
                entry.timestamp,
                entry.level.as_str(),
                entry.activity.as_str(),
                entry.message
            );
        }
    }
}

fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Script hosts share stderr with the script's own output.
    match cli.command {
        Command::ScriptHost { .. } => init_logging("warn"),
        _ => init_logging("info"),
    }

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Run {
            flow,
            var,
            delay,
            verbose,
        } => {
            let mut settings = HostSettings::load(config)?;
            if let Some(delay) = delay {
                settings.default_delay_ms = delay;
            }
            run_flow(settings, &flow, parse_variables(&var), verbose)
        }
        Command::Record { seconds, output } => record(seconds, output.as_deref()),
        Command::Serve => serve(HostSettings::load(config)?),
        Command::Script { file, timeout } => run_script(HostSettings::load(config)?, &file, timeout),
        Command::ScriptHost { file } => {
            lua_host::run_file(&file).with_context(|| format!("running {}", file.display()))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Starts the runtime and answers script prompts on a background thread.
fn start_runtime(settings: HostSettings) -> Result<HostRuntime> {
    let (runtime, ui_rx) = HostRuntime::start(settings, Platform::native())?;
    let lines = console_ui::stdin_lines();
    thread::Builder::new()
        .name("deskflow-prompts".into())
        .spawn(move || console_ui::serve_prompts(&ui_rx, &lines))
        .context("starting the prompt thread")?;
    Ok(runtime)
}

fn run_flow(
    settings: HostSettings,
    path: &Path,
    variables: VariableStore,
    verbose: bool,
) -> Result<ExitCode> {
    let flow = runtime::load_flow(path)?;
    println!("Flow: {} ({} steps)", path.display(), flow.len());
    println!();

    let runtime = start_runtime(settings)?;
    let mut log_output = CliLogOutput {
        verbose,
        warnings: 0,
        errors: 0,
    };
    let summary = runtime.launcher().run(&flow, variables, &mut log_output);

    if verbose && !summary.variables.is_empty() {
        println!();
        println!("Final Variables:");
        println!("================");

        let max_name_len = summary
            .variables
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(10);
        for (name, value) in summary.variables.iter() {
            println!("  {name:max_name_len$}  {value}");
        }
    }

    println!();
    println!("Execution Summary:");
    println!("==================");
    println!("  Run:      {}", summary.run_id);
    println!("  Steps:    {}", summary.steps_executed);
    println!("  Warnings: {}", log_output.warnings);
    println!("  Errors:   {}", log_output.errors);

    Ok(match &summary.error {
        None => ExitCode::SUCCESS,
        Some(error) => {
            println!("  Result:   {error}");
            ExitCode::FAILURE
        }
    })
}

fn record(seconds: u64, output: Option<&Path>) -> Result<ExitCode> {
    let platform = Platform::native();
    let mut recorder = InputRecorder::new(Arc::clone(&platform.input));
    recorder.start().context("starting the recorder")?;

    eprintln!("Recording for {seconds}s...");
    thread::sleep(Duration::from_secs(seconds));
    recorder.stop();

    let flow = recorder.to_steps();
    let json = flow.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} events recorded, {} steps written to {}",
                recorder.event_count(),
                flow.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn serve(settings: HostSettings) -> Result<ExitCode> {
    let (mut runtime, ui_rx) = HostRuntime::start(settings, Platform::native())?;
    let bound = runtime.bind_hotkeys();
    tracing::info!("{bound} trigger(s) bound");

    console_ui::run_console(&runtime, &ui_rx, console_ui::stdin_lines());
    runtime.shutdown();
    Ok(ExitCode::SUCCESS)
}

fn run_script(settings: HostSettings, file: &Path, timeout: Option<u64>) -> Result<ExitCode> {
    let timeout = timeout.unwrap_or(settings.script_timeout_secs);
    let runtime = start_runtime(settings)?;

    let sink: OutputSink = Arc::new(|line: &str| println!("{}", line.trim_end_matches(['\r', '\n'])));
    let result = runtime.runner().run_file(file, timeout, Some(sink));
    if result.returncode == -1 {
        eprintln!("{}", result.stderr.lines().next().unwrap_or("script failed"));
    }

    Ok(match u8::try_from(result.returncode) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    })
}

fn parse_variables(var_args: &[String]) -> VariableStore {
    let mut vars = VariableStore::new();

    for arg in var_args {
        if let Some((name, value)) = arg.split_once('=') {
            vars.set(name, value);
        } else {
            tracing::warn!("invalid variable format '{arg}', expected NAME=VALUE");
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_variables() {
        let vars = parse_variables(&[
            "name=ada".to_string(),
            "eq=a=b".to_string(),
            "broken".to_string(),
        ]);
        assert_eq!(vars.get("name"), Some("ada"));
        assert_eq!(vars.get("eq"), Some("a=b"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["deskflow", "run", "a.json", "--config", "s.json", "--delay", "0"]);
        assert_eq!(cli.config, Some(PathBuf::from("s.json")));
        assert!(matches!(cli.command, Command::Run { delay: Some(0), .. }));
    }

    #[test]
    fn test_cli_log_output_counts_levels() {
        let mut output = CliLogOutput {
            verbose: false,
            warnings: 0,
            errors: 0,
        };
        for level in [LogLevel::Info, LogLevel::Warning, LogLevel::Error, LogLevel::Error] {
            output.log(LogEntry {
                timestamp: "[00:00.000]".into(),
                run_id: None,
                level,
                activity: deskflow_core::LogActivity::System,
                message: String::new(),
            });
        }
        assert_eq!((output.warnings, output.errors), (1, 2));
    }
}
