use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use recvc::cell::{self, Cell};
use recvc::compile::{self, CompileOptions, CompilerError};
use recvc::diagnostics;
use recvc::dispatch::Dispatcher;
use recvc::ident;
use recvc::language;
use recvc::program::Direction;
use recvc::router::RouterPlan;
use recvc::value::Record;
use recvc_contracts::{
    RECVC_DISPATCH_SCHEMA_VERSION, RECVC_PLAN_SCHEMA_VERSION, RECVC_REPORT_SCHEMA_VERSION,
};

#[derive(Parser)]
#[command(name = "recvc")]
#[command(about = "Receiver dispatch backend (contract receivers -> FunC).", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Internal,
    External,
}

impl From<DirectionArg> for Direction {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Internal => Direction::Internal,
            DirectionArg::External => Direction::External,
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    LangId,
    /// Compile a unit document to FunC.
    Compile {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Only build routers (and receivers) for these directions.
        #[arg(long, value_enum)]
        direction: Vec<DirectionArg>,
        #[arg(long)]
        no_comments: bool,
        #[arg(long, value_name = "BYTES")]
        max_output_bytes: Option<usize>,
        #[arg(long)]
        report_json: bool,
    },
    /// Print the router plans of a unit as JSON.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        contract: Option<String>,
    },
    /// Print the pseudo-opcode of a text comment.
    CommentOpcode { text: String },
    /// Run one message through a contract's router.
    Dispatch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        contract: String,
        #[arg(long, value_enum, default_value_t = DirectionArg::Internal)]
        direction: DirectionArg,
        /// Message body as hex bytes.
        #[arg(long, default_value = "")]
        body_hex: String,
        #[arg(long)]
        bounced: bool,
        /// Contract state as a JSON object; missing fields are zero.
        #[arg(long)]
        state: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct RecvcToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<diagnostics::Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<serde_json::Value>,
    exit_code: u8,
}

#[derive(Debug, Serialize)]
struct PlanDoc<'a> {
    schema_version: &'static str,
    plans: &'a [RouterPlan],
}

fn main() -> ExitCode {
    init_logging();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("RECVC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::LangId => {
            println!("{}", language::LANG_ID);
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Compile {
            input,
            out,
            direction,
            no_comments,
            max_output_bytes,
            report_json,
        } => {
            if let Some(max_output_bytes) = max_output_bytes {
                std::env::set_var("RECVC_MAX_OUTPUT_BYTES", max_output_bytes.to_string());
            }
            let bytes =
                std::fs::read(&input).with_context(|| format!("read unit: {}", input.display()))?;
            let mut options = CompileOptions {
                emit_comments: !no_comments,
                ..CompileOptions::default()
            };
            if !direction.is_empty() {
                options.directions = direction.into_iter().map(Direction::from).collect();
            }

            let compiled = compile::compile_unit_with_meta(&bytes, &options);
            if report_json {
                let (diags, stats) = match &compiled {
                    Ok(compiled) => (
                        Vec::new(),
                        Some(serde_json::json!({
                            "contracts": compiled.stats.contracts,
                            "routers": compiled.stats.routers,
                            "receivers": compiled.stats.receivers,
                            "output_bytes": compiled.stats.output_bytes,
                        })),
                    ),
                    Err(e) => (vec![e.to_diagnostic()], None),
                };
                let diag = diagnostics::Report::ok().with_diagnostics(diags);
                let report = RecvcToolReport {
                    schema_version: RECVC_REPORT_SCHEMA_VERSION,
                    command: "compile",
                    ok: diag.ok,
                    r#in: input.display().to_string(),
                    diagnostics_count: diag.diagnostics.len(),
                    diagnostics: diag.diagnostics,
                    stats,
                    exit_code: if diag.ok { 0 } else { 1 },
                };
                if let (Ok(compiled), Some(path)) = (&compiled, &out) {
                    write_output(path, &compiled.func_src)?;
                }
                print_json(&report)?;
                return Ok(ExitCode::from(report.exit_code));
            }

            let compiled = compiled.map_err(compile_failed)?;
            match out {
                Some(path) => write_output(&path, &compiled.func_src)?,
                None => print!("{}", compiled.func_src),
            }
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Plan { input, contract } => {
            let bytes =
                std::fs::read(&input).with_context(|| format!("read unit: {}", input.display()))?;
            let unit = compile::load_unit(&bytes).map_err(compile_failed)?;
            let options = CompileOptions::default();
            let mut plans = Vec::new();
            for c in &unit.contracts {
                if contract.as_deref().is_some_and(|name| name != c.name) {
                    continue;
                }
                plans.extend(
                    compile::router_plans(c, &unit.registry, &options).map_err(compile_failed)?,
                );
            }
            if let Some(name) = &contract {
                if plans.is_empty() {
                    anyhow::bail!("unknown contract {name:?}");
                }
            }
            print_json(&PlanDoc {
                schema_version: RECVC_PLAN_SCHEMA_VERSION,
                plans: &plans,
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::CommentOpcode { text } => {
            let hash = ident::comment_pseudo_opcode(&text, None).map_err(compile_failed)?;
            println!("0x{hash}");
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Dispatch {
            input,
            contract,
            direction,
            body_hex,
            bounced,
            state,
        } => {
            let bytes =
                std::fs::read(&input).with_context(|| format!("read unit: {}", input.display()))?;
            let unit = compile::load_unit(&bytes).map_err(compile_failed)?;
            let c = unit
                .contract(&contract)
                .with_context(|| format!("unknown contract {contract:?}"))?;
            let state_v: serde_json::Value = match &state {
                Some(s) => serde_json::from_str(s).context("parse --state JSON")?,
                None => serde_json::Value::Null,
            };
            let state = Record::from_json(&c.fields, &state_v).map_err(anyhow::Error::msg)?;
            let body = cell::parse_hex(&body_hex).map_err(anyhow::Error::msg)?;
            let body = Cell::from_bytes(&body).context("message body does not fit one cell")?;

            let dispatcher = Dispatcher::new(c, &unit.registry).map_err(compile_failed)?;
            let doc = match dispatcher.dispatch(direction.into(), state, body, bounced) {
                Ok(out) => serde_json::json!({
                    "schema_version": RECVC_DISPATCH_SCHEMA_VERSION,
                    "handled": out.handled,
                    "receiver": out.receiver,
                    "state": out.state.to_json(),
                }),
                Err(exit) => serde_json::json!({
                    "schema_version": RECVC_DISPATCH_SCHEMA_VERSION,
                    "exit_code": exit.code,
                    "message": exit.message,
                }),
            };
            print_json(&doc)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn compile_failed(e: CompilerError) -> anyhow::Error {
    anyhow::anyhow!("compile failed: {:?}: {}", e.kind, e.message)
}

fn write_output(path: &Path, src: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir: {}", parent.display()))?;
        }
    }
    std::fs::write(path, src.as_bytes()).with_context(|| format!("write: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
