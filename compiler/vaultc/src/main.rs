//! `vault`: run a sandboxed script under the reference interpreter.
//!
//! ```text
//! vault script.vlt
//! vault --allow os --allow math script.vlt
//! vault --allow-relative-imports pkg/main.vlt
//! ```

use clap::Parser;
use std::process::ExitCode;
use std::sync::OnceLock;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};
use vault_frontend::Frontend;
use vaultc::{run_source, build_interpreter, Outcome, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "vault", about = "Run a script under the sandboxed interpreter")]
struct Args {
    /// Script to run.
    script: String,

    /// Restrict `import` to this module name; repeatable. Omit entirely to
    /// allow any registered module.
    #[arg(long = "allow", value_name = "MODULE")]
    allow: Vec<String>,

    /// Permit `from . import x` / `from ..pkg import y` style relative
    /// imports, disabled by default.
    #[arg(long)]
    allow_relative_imports: bool,

    /// Override `VAULT_LOG`/`RUST_LOG` with an explicit `tracing`
    /// env-filter string (e.g. `vault_eval=debug`).
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize the tracing subscriber. `--log` takes precedence over
/// `VAULT_LOG`, which in turn falls back to `RUST_LOG`; defaults to
/// `warn` when none are set. Safe to call more than once — only the
/// first call takes effect.
fn init_tracing(override_filter: Option<&str>) {
    INIT.get_or_init(|| {
        let filter = override_filter
            .map(EnvFilter::new)
            .or_else(|| EnvFilter::try_from_env("VAULT_LOG").ok())
            .or_else(|| EnvFilter::try_from_env("RUST_LOG").ok())
            .unwrap_or_else(|| EnvFilter::new("warn"));
        Registry::default()
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr).compact())
            .with(filter)
            .init();
    });
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    let source = match std::fs::read_to_string(&args.script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("vault: error reading '{}': {e}", args.script);
            return ExitCode::from(2);
        }
    };

    let config = RunConfig {
        allowed_imports: (!args.allow.is_empty()).then_some(args.allow),
        allow_relative_imports: args.allow_relative_imports,
    };
    let interpreter = build_interpreter(config);
    let frontend = Frontend;

    match run_source(&interpreter, &frontend, &source, &args.script) {
        Ok(outcome) => exit_code(&outcome),
        Err(err) => {
            let mut stderr = std::io::stderr();
            if err.0.render(&args.script, &source, &mut stderr).is_err() {
                eprintln!("{err}");
            }
            ExitCode::from(2)
        }
    }
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    let code = outcome.exit_code();
    ExitCode::from(code.rem_euclid(256) as u8)
}
