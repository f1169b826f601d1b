use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use hintguard::diagnostics::{self, Diagnostic, Report};
use hintguard::language;
use hintguard::logging::{self, LogFormat, LogLevel, LogOptions};
use hintguard::random::{RandomIndexSource, XorShiftRandom};
use hintguard::universe::Universe;
use hintguard::{CheckConfig, CheckError, Engine, Value};
use hintguard_contracts::{
    HINTGUARD_CHECK_REPORT_SCHEMA_VERSION, HINTGUARD_CODEGEN_REPORT_SCHEMA_VERSION,
};

#[derive(Parser)]
#[command(name = "hintguard")]
#[command(about = "Runtime type-hint checking: generate and run checks.", long_about = None)]
#[command(subcommand_required = false)]
struct Cli {
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(clap::Args)]
struct EngineArgs {
    /// Universe document declaring modules, classes and callables.
    #[arg(long)]
    universe: Option<PathBuf>,
    /// Module hints are evaluated in and relative forward references resolve against.
    #[arg(long, default_value = "__main__")]
    module: String,
    /// Let `float` also accept `int`.
    #[arg(long)]
    pep484_tower: bool,
    #[arg(long)]
    debug_codegen: bool,
    #[arg(long, value_name = "N")]
    max_hint_children: Option<usize>,
}

#[derive(Subcommand)]
enum Cmd {
    LangId,
    /// Print the check generated for a hint.
    Codegen {
        #[command(flatten)]
        engine: EngineArgs,
        /// Hint as a JSON s-expression, e.g. '["list", "int"]'.
        #[arg(long)]
        hint: String,
        #[arg(long, default_value = "value")]
        slot: String,
        #[arg(long)]
        report_json: bool,
    },
    /// Check a value against a hint, or arguments against a declared callable.
    Check {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, conflicts_with = "callable", requires = "value")]
        hint: Option<String>,
        /// Value as JSON (with `$tuple`, `$set`, ... escapes).
        #[arg(long)]
        value: Option<String>,
        /// `module.name` of a `def` declared in the universe.
        #[arg(long, requires = "args")]
        callable: Option<String>,
        /// JSON array of positional arguments for `--callable`.
        #[arg(long)]
        args: Option<String>,
        /// Return value to check for `--callable`.
        #[arg(long)]
        returns: Option<String>,
        #[arg(long, default_value = "value")]
        slot: String,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        #[arg(long)]
        report_json: bool,
    },
}

#[derive(Debug, Serialize)]
struct CodegenReport {
    schema_version: &'static str,
    ok: bool,
    hint: Option<String>,
    ignorable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    needs_random_index: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    forward_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scope: Vec<String>,
    diagnostics: Report,
    exit_code: u8,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    schema_version: &'static str,
    ok: bool,
    target: String,
    runs: u32,
    violations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    diagnostics: Report,
    exit_code: u8,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    logging::init_logging(&LogOptions::resolve(cli.log_format, cli.log_level));

    let Some(cmd) = cli.cmd else {
        anyhow::bail!("missing subcommand (try --help)");
    };

    match cmd {
        Cmd::LangId => {
            println!("{}", language::LANG_ID);
            Ok(std::process::ExitCode::SUCCESS)
        }
        Cmd::Codegen {
            engine,
            hint,
            slot,
            report_json,
        } => cmd_codegen(&engine, &hint, &slot, report_json),
        Cmd::Check {
            engine,
            hint,
            value,
            callable,
            args,
            returns,
            slot,
            seed,
            repeat,
            report_json,
        } => {
            let target = match (hint, callable) {
                (Some(hint), None) => CheckTarget::Hint {
                    hint,
                    value: value.unwrap_or_default(),
                    slot,
                },
                (None, Some(callable)) => CheckTarget::Callable {
                    name: callable,
                    args: args.unwrap_or_default(),
                    returns,
                },
                _ => anyhow::bail!("set exactly one of --hint or --callable"),
            };
            cmd_check(&engine, target, seed, repeat.max(1), report_json)
        }
    }
}

fn load(args: &EngineArgs) -> Result<(Universe, Engine), Diagnostic> {
    let universe = match &args.universe {
        None => Universe::empty(),
        Some(path) => {
            let bytes = std::fs::read(path).map_err(|err| {
                Diagnostic::error(
                    "HG0101",
                    diagnostics::Stage::Parse,
                    format!("read universe {}: {err}", path.display()),
                )
            })?;
            Universe::parse_json(&bytes).map_err(|err| Diagnostic::from(&err))?
        }
    };
    universe.table().module(&args.module);

    let mut config = CheckConfig::default()
        .with_pep484_tower(args.pep484_tower)
        .with_debug(args.debug_codegen);
    if let Some(max) = args.max_hint_children {
        config = config.with_max_hint_children(max);
    }
    let engine = Engine::new(universe.table().clone()).with_config(config);
    Ok((universe, engine))
}

fn parse_json_arg(what: &str, text: &str) -> Result<serde_json::Value, Diagnostic> {
    serde_json::from_str(text).map_err(|err| {
        Diagnostic::error(
            "HG0102",
            diagnostics::Stage::Parse,
            format!("--{what} is not valid JSON: {err}"),
        )
    })
}

fn cmd_codegen(
    args: &EngineArgs,
    hint_text: &str,
    slot: &str,
    report_json: bool,
) -> Result<std::process::ExitCode> {
    let mut report = CodegenReport {
        schema_version: HINTGUARD_CODEGEN_REPORT_SCHEMA_VERSION,
        ok: false,
        hint: None,
        ignorable: false,
        template: None,
        code: None,
        needs_random_index: false,
        forward_refs: Vec::new(),
        scope: Vec::new(),
        diagnostics: Report::ok(),
        exit_code: 2,
    };

    let outcome = (|| -> Result<(), Diagnostic> {
        let (universe, engine) = load(args)?;
        let json = parse_json_arg("hint", hint_text)?;
        let hint = universe
            .hint(&args.module, &json)
            .map_err(|err| Diagnostic::from(&err))?;
        report.hint = Some(hint.repr());
        let Some(code) = engine
            .make_check_code(&hint, "")
            .map_err(|err| Diagnostic::from(&err))?
        else {
            report.ignorable = true;
            return Ok(());
        };
        let checker = engine
            .checker(&hint, slot, &args.module, "")
            .map_err(|err| Diagnostic::from(&err))?;
        report.template = Some(code.template.clone());
        report.code = checker.map(|c| c.source().to_string());
        report.needs_random_index = code.needs_random_index;
        report.forward_refs = code.forward_ref_names.clone();
        report.scope = code.scope.iter().map(|(name, _)| name.clone()).collect();
        Ok(())
    })();

    match outcome {
        Ok(()) => {
            report.ok = true;
            report.exit_code = 0;
        }
        Err(diag) => {
            report.diagnostics = Report::ok().with_diagnostics(vec![diag]);
        }
    }

    if report_json {
        print_json(&report)?;
    } else if let Some(diag) = report.diagnostics.diagnostics.first() {
        anyhow::bail!("{}: {}", diag.code, diag.message);
    } else if report.ignorable {
        println!("# {} is ignorable; no check is generated", report.hint.unwrap_or_default());
    } else {
        println!("{}", report.code.unwrap_or_default());
    }
    Ok(std::process::ExitCode::from(report.exit_code))
}

enum CheckTarget {
    Hint {
        hint: String,
        value: String,
        slot: String,
    },
    Callable {
        name: String,
        args: String,
        returns: Option<String>,
    },
}

/// One compiled check, run `repeat` times against fixed inputs.
type CheckRun = Box<dyn Fn(&mut dyn RandomIndexSource) -> Result<(), CheckError>>;

fn build_check(
    args: &EngineArgs,
    target: &CheckTarget,
) -> Result<(String, CheckRun), Diagnostic> {
    let (universe, engine) = load(args)?;
    match target {
        CheckTarget::Hint { hint, value, slot } => {
            let hint = universe
                .hint(&args.module, &parse_json_arg("hint", hint)?)
                .map_err(|err| Diagnostic::from(&err))?;
            let value = universe
                .value(&args.module, &parse_json_arg("value", value)?)
                .map_err(|err| Diagnostic::from(&err))?;
            let label = hint.repr();
            let checker = engine
                .checker(&hint, slot, &args.module, "")
                .map_err(|err| Diagnostic::from(&err))?;
            let run: CheckRun = match checker {
                Some(checker) => Box::new(move |rng: &mut dyn RandomIndexSource| checker.check_with(&value, rng)),
                None => Box::new(|_: &mut dyn RandomIndexSource| Ok(())),
            };
            Ok((label, run))
        }
        CheckTarget::Callable {
            name,
            args: args_text,
            returns,
        } => {
            let sig = universe.callable(name).ok_or_else(|| {
                Diagnostic::error(
                    "HG0103",
                    diagnostics::Stage::Parse,
                    format!("no callable named {name:?} in the universe"),
                )
            })?;
            let typed = engine.wrap(sig).map_err(|err| Diagnostic::from(&err))?;
            let values = match parse_json_arg("args", args_text)? {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| universe.value(&sig.module, item))
                    .collect::<Result<Vec<Value>, _>>()
                    .map_err(|err| Diagnostic::from(&err))?,
                _ => {
                    return Err(Diagnostic::error(
                        "HG0102",
                        diagnostics::Stage::Parse,
                        "--args must be a JSON array",
                    ))
                }
            };
            let returned = match returns {
                None => None,
                Some(text) => Some(
                    universe
                        .value(&sig.module, &parse_json_arg("returns", text)?)
                        .map_err(|err| Diagnostic::from(&err))?,
                ),
            };
            let run: CheckRun = Box::new(move |rng: &mut dyn RandomIndexSource| {
                typed.check_args_with(&values, rng)?;
                match &returned {
                    Some(v) => typed.check_return_with(v, rng),
                    None => Ok(()),
                }
            });
            Ok((name.clone(), run))
        }
    }
}

fn cmd_check(
    args: &EngineArgs,
    target: CheckTarget,
    seed: Option<u64>,
    repeat: u32,
    report_json: bool,
) -> Result<std::process::ExitCode> {
    let mut report = CheckReport {
        schema_version: HINTGUARD_CHECK_REPORT_SCHEMA_VERSION,
        ok: false,
        target: String::new(),
        runs: 0,
        violations: 0,
        seed,
        diagnostics: Report::ok(),
        exit_code: 2,
    };

    let mut diags = Vec::new();
    match build_check(args, &target) {
        Err(diag) => diags.push(diag),
        Ok((label, run)) => {
            report.target = label;
            let mut rng = match seed {
                Some(seed) => XorShiftRandom::seeded(seed),
                None => XorShiftRandom::from_entropy(),
            };
            for _ in 0..repeat {
                report.runs += 1;
                match run(&mut rng) {
                    Ok(()) => {}
                    Err(err @ CheckError::Violation(_)) => {
                        report.violations += 1;
                        // Sampling can report the same failure many times over.
                        let diag = Diagnostic::from(&err);
                        if !diags.contains(&diag) {
                            diags.push(diag);
                        }
                    }
                    Err(err) => {
                        diags.push(Diagnostic::from(&err));
                        break;
                    }
                }
            }
            report.exit_code = if report.violations > 0 {
                1
            } else if diags.is_empty() {
                0
            } else {
                2
            };
        }
    }
    report.ok = report.exit_code == 0;
    report.diagnostics = Report::ok().with_diagnostics(diags);

    if report_json {
        print_json(&report)?;
    } else if report.exit_code == 2 {
        let diag = report
            .diagnostics
            .diagnostics
            .first()
            .context("check failed without a diagnostic")?;
        anyhow::bail!("{}: {}", diag.code, diag.message);
    } else {
        for diag in &report.diagnostics.diagnostics {
            println!("{}", diag.message);
        }
        println!(
            "{}: {} run(s), {} violation(s)",
            report.target, report.runs, report.violations
        );
    }
    Ok(std::process::ExitCode::from(report.exit_code))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
